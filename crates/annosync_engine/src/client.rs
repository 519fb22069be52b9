//! Client capabilities consumed by the sync engine.
//!
//! The engine only talks to the two remote services through these traits,
//! allowing HTTP implementations, in-memory implementations for tests, or
//! anything else in between.

use crate::error::{SyncError, SyncResult};
use annosync_model::{Annotation, AnnotationId, GroupId, Note, NoteId, NoteType, RichText};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Field annotations are sorted by when searching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    /// Creation time.
    #[default]
    Created,
    /// Last update time.
    Updated,
}

impl SortKey {
    /// Name used by the search API.
    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Created => "created",
            SortKey::Updated => "updated",
        }
    }

    /// Value of this key on an annotation.
    pub fn of(self, annotation: &Annotation) -> DateTime<Utc> {
        match self {
            SortKey::Created => annotation.created,
            SortKey::Updated => annotation.updated,
        }
    }
}

/// Search result ordering.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortOrder {
    /// Name used by the search API.
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Selects the batch of annotations to sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    /// Restrict to one group.
    pub group: Option<GroupId>,
    /// Restrict to one annotated resource.
    pub uri: Option<String>,
    /// Sort key.
    pub sort: SortKey,
    /// Sort order.
    pub order: SortOrder,
    /// Only annotations whose sort key is after this time.
    pub after: Option<DateTime<Utc>>,
}

impl SearchFilter {
    /// Creates a filter matching everything, oldest first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts to a group.
    pub fn with_group(mut self, group: GroupId) -> Self {
        self.group = Some(group);
        self
    }

    /// Restricts to a resource URI.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Sets the sort key.
    pub fn with_sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    /// Sets the sort order.
    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    /// Only annotations after `after`.
    pub fn with_after(mut self, after: DateTime<Utc>) -> Self {
        self.after = Some(after);
        self
    }

    /// Returns true if `annotation` passes the filter.
    pub fn matches(&self, annotation: &Annotation) -> bool {
        if let Some(group) = &self.group {
            if annotation.group.as_ref() != Some(group) {
                return false;
            }
        }
        if let Some(uri) = &self.uri {
            if annotation.source_uri() != Some(uri.as_str()) {
                return false;
            }
        }
        if let Some(after) = self.after {
            if self.sort.of(annotation) <= after {
                return false;
            }
        }
        true
    }
}

/// Request to create a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
    /// Note text.
    pub text: String,
    /// Source statement (a provenance stamp, or a bare URI for documents).
    pub source: String,
    /// Parent note.
    pub parent_id: Option<NoteId>,
    /// Create the note as a document.
    pub is_document: bool,
}

/// Request to update a note. `None` fields are left unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteUpdate {
    /// Note to update.
    pub id: NoteId,
    /// New name.
    pub name: Option<String>,
    /// New content.
    pub content: Option<String>,
    /// New source statement.
    pub source: Option<String>,
    /// New parent.
    pub parent_id: Option<NoteId>,
}

/// Read access to the annotation service.
pub trait SourceClient: Send + Sync {
    /// Fetches every annotation matching `filter`, across all pages.
    fn fetch_batch(&self, filter: &SearchFilter) -> SyncResult<Vec<Annotation>>;

    /// Resolves a single annotation; `None` if it does not exist in scope.
    fn resolve_by_id(&self, id: &AnnotationId) -> SyncResult<Option<Annotation>>;

    /// All annotations on `uri` referencing `ancestor`, directly or not; all
    /// top-level annotations on `uri` when `ancestor` is `None`.
    fn query_family(&self, uri: &str, ancestor: Option<&AnnotationId>)
        -> SyncResult<Vec<Annotation>>;
}

/// Read/write access to the note service.
pub trait TargetClient: Send + Sync {
    /// Finds the note whose source links to `key`.
    fn find_by_provenance(&self, key: &str) -> SyncResult<Option<Note>>;

    /// Creates a note and returns its full representation.
    fn create(&self, note: &NewNote) -> SyncResult<Note>;

    /// Updates a note and returns its full representation.
    fn update(&self, update: &NoteUpdate) -> SyncResult<Note>;
}

impl<T: SourceClient + ?Sized> SourceClient for Arc<T> {
    fn fetch_batch(&self, filter: &SearchFilter) -> SyncResult<Vec<Annotation>> {
        (**self).fetch_batch(filter)
    }

    fn resolve_by_id(&self, id: &AnnotationId) -> SyncResult<Option<Annotation>> {
        (**self).resolve_by_id(id)
    }

    fn query_family(
        &self,
        uri: &str,
        ancestor: Option<&AnnotationId>,
    ) -> SyncResult<Vec<Annotation>> {
        (**self).query_family(uri, ancestor)
    }
}

impl<T: TargetClient + ?Sized> TargetClient for Arc<T> {
    fn find_by_provenance(&self, key: &str) -> SyncResult<Option<Note>> {
        (**self).find_by_provenance(key)
    }

    fn create(&self, note: &NewNote) -> SyncResult<Note> {
        (**self).create(note)
    }

    fn update(&self, update: &NoteUpdate) -> SyncResult<Note> {
        (**self).update(update)
    }
}

/// An in-memory annotation service for testing.
#[derive(Debug, Default)]
pub struct MemorySource {
    annotations: RwLock<IndexMap<AnnotationId, Annotation>>,
    lookups: AtomicUsize,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source holding `annotations`.
    pub fn with_annotations(annotations: impl IntoIterator<Item = Annotation>) -> Self {
        let source = Self::new();
        for annotation in annotations {
            source.insert(annotation);
        }
        source
    }

    /// Adds or replaces an annotation.
    pub fn insert(&self, annotation: Annotation) {
        self.annotations
            .write()
            .insert(annotation.id.clone(), annotation);
    }

    /// Removes an annotation.
    pub fn remove(&self, id: &AnnotationId) -> Option<Annotation> {
        self.annotations.write().shift_remove(id)
    }

    /// Number of stored annotations.
    pub fn len(&self) -> usize {
        self.annotations.read().len()
    }

    /// Returns true if no annotation is stored.
    pub fn is_empty(&self) -> bool {
        self.annotations.read().is_empty()
    }

    /// Number of `resolve_by_id` and `query_family` calls served so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl SourceClient for MemorySource {
    fn fetch_batch(&self, filter: &SearchFilter) -> SyncResult<Vec<Annotation>> {
        let mut batch: Vec<Annotation> = self
            .annotations
            .read()
            .values()
            .filter(|annotation| filter.matches(annotation))
            .cloned()
            .collect();
        batch.sort_by_key(|annotation| filter.sort.of(annotation));
        if filter.order == SortOrder::Desc {
            batch.reverse();
        }
        Ok(batch)
    }

    fn resolve_by_id(&self, id: &AnnotationId) -> SyncResult<Option<Annotation>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.annotations.read().get(id).cloned())
    }

    fn query_family(
        &self,
        uri: &str,
        ancestor: Option<&AnnotationId>,
    ) -> SyncResult<Vec<Annotation>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .annotations
            .read()
            .values()
            .filter(|annotation| annotation.source_uri() == Some(uri))
            .filter(|annotation| match ancestor {
                Some(ancestor) => annotation.references.contains(ancestor),
                None => !annotation.is_reply(),
            })
            .cloned()
            .collect())
    }
}

/// An in-memory note service for testing.
///
/// Mimics the remote service: ids are assigned on create, every write bumps
/// `updated`, source statements are stored as rich text with link elements,
/// and parents keep their `children` lists in sync.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    notes: RwLock<IndexMap<NoteId, Note>>,
    next_id: AtomicU64,
    creates: AtomicUsize,
    updates: AtomicUsize,
}

impl MemoryTarget {
    /// Creates an empty target.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a note by id.
    pub fn get(&self, id: &NoteId) -> Option<Note> {
        self.notes.read().get(id).cloned()
    }

    /// Returns all notes, in creation order.
    pub fn notes(&self) -> Vec<Note> {
        self.notes.read().values().cloned().collect()
    }

    /// Number of stored notes.
    pub fn len(&self) -> usize {
        self.notes.read().len()
    }

    /// Returns true if no note is stored.
    pub fn is_empty(&self) -> bool {
        self.notes.read().is_empty()
    }

    /// Number of `create` calls served.
    pub fn create_count(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    /// Number of `update` calls served.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Simulates a manual edit made at `at`.
    pub fn touch(&self, id: &NoteId, at: DateTime<Utc>) -> bool {
        match self.notes.write().get_mut(id) {
            Some(note) => {
                note.updated = at;
                true
            }
            None => false,
        }
    }

    /// Overwrites a note's source statement without touching `updated`.
    pub fn set_source(&self, id: &NoteId, statement: &str) -> bool {
        match self.notes.write().get_mut(id) {
            Some(note) => {
                note.source = RichText::from_source_statement(statement);
                true
            }
            None => false,
        }
    }

    fn attach(notes: &mut IndexMap<NoteId, Note>, child: &NoteId, parent: Option<&NoteId>) {
        for note in notes.values_mut() {
            note.children.retain(|id| id != child);
        }
        if let Some(parent) = parent {
            if let Some(parent_note) = notes.get_mut(parent) {
                parent_note.children.push(child.clone());
            }
        }
    }
}

impl TargetClient for MemoryTarget {
    fn find_by_provenance(&self, key: &str) -> SyncResult<Option<Note>> {
        Ok(self
            .notes
            .read()
            .values()
            .find(|note| note.has_source(key))
            .cloned())
    }

    fn create(&self, request: &NewNote) -> SyncResult<Note> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let id = NoteId::new(format!(
            "note-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst) + 1
        ));
        let now = Utc::now();
        let note = Note {
            id: id.clone(),
            parent: request.parent_id.clone(),
            children: Vec::new(),
            name: RichText::plain(request.text.clone()),
            name_md: request.text.clone(),
            content: None,
            content_md: None,
            source: RichText::from_source_statement(&request.source),
            note_type: NoteType::NoContent,
            is_document: request.is_document,
            created: now,
            updated: now,
            tag_children: Vec::new(),
            tags: None,
        };

        let mut notes = self.notes.write();
        notes.insert(id.clone(), note.clone());
        Self::attach(&mut notes, &id, request.parent_id.as_ref());
        Ok(note)
    }

    fn update(&self, request: &NoteUpdate) -> SyncResult<Note> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut notes = self.notes.write();
        let note = notes
            .get_mut(&request.id)
            .ok_or_else(|| SyncError::HttpStatus {
                status: 404,
                endpoint: format!("/update {}", request.id),
            })?;

        if let Some(name) = &request.name {
            note.name = RichText::plain(name.clone());
            note.name_md = name.clone();
        }
        if let Some(content) = &request.content {
            note.content = Some(RichText::plain(content.clone()));
            note.content_md = Some(content.clone());
        }
        if let Some(source) = &request.source {
            note.source = RichText::from_source_statement(source);
        }
        let reparent = request.parent_id.is_some() && request.parent_id != note.parent;
        if reparent {
            note.parent = request.parent_id.clone();
        }
        note.updated = Utc::now();
        let updated = note.clone();

        if reparent {
            Self::attach(&mut notes, &request.id, request.parent_id.as_ref());
        }
        Ok(updated)
    }
}
