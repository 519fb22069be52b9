//! Hypothes.is API client (v1).

use crate::cache::LruCache;
use crate::client::{SearchFilter, SortOrder, SourceClient};
use crate::config::{SourceConfig, SourceCredentials};
use crate::error::{SyncError, SyncResult};
use crate::http::{fetch_json, fetch_json_optional, HttpClient, HttpRequest};
use annosync_model::{Annotation, AnnotationId, Group};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, warn};

/// Media type requested from the API.
pub const MEDIA_TYPE: &str = "application/vnd.hypothesis.v1+json";

#[derive(Debug, Deserialize)]
struct SearchPage {
    total: usize,
    #[serde(default)]
    rows: Vec<Annotation>,
}

/// Client for the Hypothes.is annotations API.
///
/// Fetched annotations are kept in an LRU cache, so resolving the parents of
/// a freshly searched batch costs no extra requests.
pub struct HypothesisClient<C: HttpClient> {
    config: SourceConfig,
    authorization: String,
    client: C,
    cache: Mutex<LruCache<AnnotationId, Annotation>>,
}

impl<C: HttpClient> HypothesisClient<C> {
    /// Creates a client. Fails with `MissingCredentials` when the
    /// configuration carries neither a token nor a client pair.
    pub fn new(config: SourceConfig, client: C) -> SyncResult<Self> {
        let authorization = match config.require_credentials()? {
            SourceCredentials::Token(token) => format!("Bearer {token}"),
            SourceCredentials::ClientPair {
                client_id,
                client_secret,
            } => format!(
                "Basic {}",
                STANDARD.encode(format!("{client_id}:{client_secret}"))
            ),
        };
        let cache = Mutex::new(LruCache::new(config.cache_capacity));
        Ok(Self {
            config,
            authorization,
            client,
            cache,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn get(&self, path: &str) -> HttpRequest {
        HttpRequest::get(format!("{}{}", self.config.base_url, path))
            .header("Accept", MEDIA_TYPE)
            .header("Authorization", self.authorization.as_str())
    }

    /// Groups the authenticated account can access.
    pub fn groups(&self) -> SyncResult<Vec<Group>> {
        debug!("requesting annotation groups");
        let value = fetch_json(&self.client, &self.get("/groups"), "/groups")?;
        let groups: Vec<Group> = serde_json::from_value(value)?;
        debug!(count = groups.len(), "got groups");
        Ok(groups)
    }

    /// The first group named `name` (names are case-sensitive and not unique).
    pub fn group_by_name(&self, name: &str) -> SyncResult<Group> {
        match self.groups()?.into_iter().find(|group| group.name == name) {
            Some(group) => {
                debug!(group_id = %group.id, "found group '{name}'");
                Ok(group)
            }
            None => {
                warn!("no group named '{name}' was found in this account");
                Err(SyncError::GroupNotFound(name.to_string()))
            }
        }
    }

    /// Searches annotations, following `search_after` until every match is
    /// collected.
    pub fn search(
        &self,
        filter: &SearchFilter,
        references: Option<&AnnotationId>,
    ) -> SyncResult<Vec<Annotation>> {
        let mut annotations: Vec<Annotation> = Vec::new();
        let mut search_after = filter.after;

        loop {
            let mut request = self
                .get("/search")
                .query("limit", self.config.page_size.to_string())
                .query("sort", filter.sort.as_str())
                .query("order", filter.order.as_str());
            if let Some(group) = &filter.group {
                request = request.query("group", group.as_str());
            }
            if let Some(uri) = &filter.uri {
                request = request.query("uri", uri.as_str());
            }
            if let Some(references) = references {
                request = request.query("references", references.as_str());
            }
            if let Some(after) = search_after {
                request = request.query("search_after", format_timestamp(after));
            }

            let page: SearchPage =
                serde_json::from_value(fetch_json(&self.client, &request, "/search")?)?;
            if page.rows.is_empty() {
                break;
            }
            annotations.extend(page.rows);
            debug!("unpacked {}/{} annotations", annotations.len(), page.total);
            if annotations.len() >= page.total {
                break;
            }

            let keys = annotations.iter().map(|a| filter.sort.of(a));
            search_after = match filter.order {
                SortOrder::Asc => keys.max(),
                SortOrder::Desc => keys.min(),
            };
        }

        let mut cache = self.cache.lock();
        for annotation in &annotations {
            cache.put(annotation.id.clone(), annotation.clone());
        }
        Ok(annotations)
    }

    /// Fetches one annotation; `None` if it does not exist or is out of scope.
    pub fn annotation(&self, id: &AnnotationId) -> SyncResult<Option<Annotation>> {
        if let Some(annotation) = self.cache.lock().get(id) {
            debug!(annotation_id = %id, "annotation found in cache");
            return Ok(Some(annotation.clone()));
        }

        let path = format!("/annotations/{id}");
        let Some(value) = fetch_json_optional(&self.client, &self.get(&path), &path)? else {
            warn!(annotation_id = %id, "no annotation found in scope");
            return Ok(None);
        };
        let annotation = Annotation::from_value(value)?;
        self.cache.lock().put(annotation.id.clone(), annotation.clone());
        Ok(Some(annotation))
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, false)
}

impl<C: HttpClient> SourceClient for HypothesisClient<C> {
    fn fetch_batch(&self, filter: &SearchFilter) -> SyncResult<Vec<Annotation>> {
        self.search(filter, None)
    }

    fn resolve_by_id(&self, id: &AnnotationId) -> SyncResult<Option<Annotation>> {
        self.annotation(id)
    }

    fn query_family(
        &self,
        uri: &str,
        ancestor: Option<&AnnotationId>,
    ) -> SyncResult<Vec<Annotation>> {
        let family = self.search(&SearchFilter::new().with_uri(uri), ancestor)?;
        Ok(match ancestor {
            Some(_) => family,
            None => family.into_iter().filter(|a| !a.is_reply()).collect(),
        })
    }
}
