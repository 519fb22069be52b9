//! RemNote API client (v0).
//!
//! Every call is a form-encoded POST carrying the API key and user id. The v0
//! API answers lookups with `{"found": false}` rather than a 404.

use crate::cache::LruCache;
use crate::client::{NewNote, NoteUpdate, TargetClient};
use crate::config::TargetConfig;
use crate::error::{SyncError, SyncResult};
use crate::http::{fetch_json, HttpClient, HttpRequest};
use annosync_model::{Note, NoteId};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Created {
    #[serde(rename = "remId")]
    rem_id: NoteId,
}

/// Client for the RemNote backend API.
pub struct RemNoteClient<C: HttpClient> {
    base_url: String,
    api_key: String,
    user_id: String,
    client: C,
    cache: Mutex<LruCache<NoteId, Note>>,
}

impl<C: HttpClient> RemNoteClient<C> {
    /// Creates a client. Fails with `MissingCredentials` without an API key
    /// and user id.
    pub fn new(config: TargetConfig, client: C) -> SyncResult<Self> {
        let (api_key, user_id) = config.require_credentials()?;
        Ok(Self {
            api_key: api_key.to_string(),
            user_id: user_id.to_string(),
            cache: Mutex::new(LruCache::new(config.cache_capacity)),
            base_url: config.base_url,
            client,
        })
    }

    fn post(&self, path: &str) -> HttpRequest {
        HttpRequest::post(format!("{}{}", self.base_url, path))
            .form("apiKey", self.api_key.as_str())
            .form("userId", self.user_id.as_str())
    }

    /// Sends a lookup and decodes the note, caching it when found.
    fn lookup(&self, request: &HttpRequest, endpoint: &str) -> SyncResult<Option<Note>> {
        let value = fetch_json(&self.client, request, endpoint)?;
        if value.get("found").and_then(Value::as_bool) != Some(true) {
            debug!(endpoint, "no note found in scope");
            return Ok(None);
        }
        let note = Note::from_value(value)?;
        self.cache.lock().put(note.id.clone(), note.clone());
        Ok(Some(note))
    }

    /// Fetches a note by id.
    pub fn get(&self, id: &NoteId) -> SyncResult<Option<Note>> {
        if let Some(note) = self.cache.lock().get(id) {
            debug!(note_id = %id, "note found in cache");
            return Ok(Some(note.clone()));
        }
        self.lookup(&self.post("/get").form("remId", id.as_str()), "/get")
    }

    /// Fetches the note whose source links to `url`.
    pub fn get_by_source_url(&self, url: &str) -> SyncResult<Option<Note>> {
        if let Some(note) = self.cache.lock().find(|note| note.has_source(url)) {
            debug!(note_id = %note.id, "note found in cache");
            return Ok(Some(note.clone()));
        }
        self.lookup(
            &self.post("/get_by_source_url").form("url", url),
            "/get_by_source_url",
        )
    }

    /// Reads a note back after a write.
    fn refetch(&self, id: &NoteId, endpoint: &str) -> SyncResult<Note> {
        self.cache.lock().remove(id);
        self.get(id)?.ok_or_else(|| {
            SyncError::Decode(format!("{endpoint} succeeded but note {id} cannot be read back"))
        })
    }
}

impl<C: HttpClient> TargetClient for RemNoteClient<C> {
    fn find_by_provenance(&self, key: &str) -> SyncResult<Option<Note>> {
        self.get_by_source_url(key)
    }

    fn create(&self, note: &NewNote) -> SyncResult<Note> {
        let mut request = self
            .post("/create")
            .form("text", note.text.as_str())
            .form("source", note.source.as_str());
        if let Some(parent_id) = &note.parent_id {
            request = request.form("parentId", parent_id.as_str());
        }
        if note.is_document {
            request = request.form("isDocument", "true");
        }

        let created: Created = serde_json::from_value(fetch_json(&self.client, &request, "/create")?)?;
        debug!(note_id = %created.rem_id, "created note");
        self.refetch(&created.rem_id, "/create")
    }

    fn update(&self, update: &NoteUpdate) -> SyncResult<Note> {
        let mut request = self.post("/update").form("remId", update.id.as_str());
        if let Some(parent_id) = &update.parent_id {
            request = request.form("parent", parent_id.as_str());
        }
        if let Some(name) = &update.name {
            request = request.form("name", name.as_str());
        }
        if let Some(content) = &update.content {
            request = request.form("content", content.as_str());
        }
        if let Some(source) = &update.source {
            request = request.form("source", source.as_str());
        }

        fetch_json(&self.client, &request, "/update")?;
        debug!(note_id = %update.id, "updated note");
        self.refetch(&update.id, "/update")
    }
}
