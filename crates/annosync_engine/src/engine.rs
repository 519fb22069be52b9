//! Sync engine state machine.
//!
//! The engine walks a batch of annotations and makes sure every one of them
//! has an up-to-date note. A reply can only be synced once its parent's note
//! exists, and a note can only be placed once its elder sibling's note exists,
//! so `sync_one` reports such gaps as [`SyncOutcome::BlockedOn`] and
//! `sync_all` resolves them depth-first with an explicit work stack.

use crate::client::{NewNote, NoteUpdate, SearchFilter, SourceClient, TargetClient};
use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::hierarchy::HierarchyResolver;
use annosync_model::{provenance, Annotation, AnnotationId, Note, ProvenanceStamp, SyncPolicy};
use indexmap::IndexSet;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No run started yet.
    Idle,
    /// A run is in progress.
    Syncing,
    /// The last run went through the whole batch.
    Synced,
    /// The last run was aborted by an error.
    Failed,
}

/// Why an annotation cannot be synced yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockerKind {
    /// The parent annotation has no up-to-date note.
    ParentNotSynced,
    /// The elder sibling has no up-to-date note.
    SiblingNotSynced,
}

impl fmt::Display for BlockerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockerKind::ParentNotSynced => f.write_str("parent not synced"),
            BlockerKind::SiblingNotSynced => f.write_str("older sibling not synced"),
        }
    }
}

/// A hierarchy gap: `dependency` has to be synced first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blocker {
    /// Kind of gap.
    pub kind: BlockerKind,
    /// Annotation to sync first.
    pub dependency: AnnotationId,
}

/// Result of syncing a single annotation.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The annotation's note, created, updated or left as is.
    Ready(Note),
    /// The annotation has to wait for another one.
    BlockedOn(Blocker),
}

impl SyncOutcome {
    /// Returns the note if the annotation was synced.
    pub fn note(&self) -> Option<&Note> {
        match self {
            SyncOutcome::Ready(note) => Some(note),
            SyncOutcome::BlockedOn(_) => None,
        }
    }

    /// Returns true if the annotation was synced.
    pub fn is_ready(&self) -> bool {
        matches!(self, SyncOutcome::Ready(_))
    }
}

/// Statistics about a sync run.
///
/// "Targets" are annotations of the batch; "other" covers annotations pulled
/// in to fill hierarchy gaps. Document containers are counted apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Annotations in the batch.
    pub total_targets: usize,
    /// Notes created.
    pub total_created: usize,
    /// Notes updated.
    pub total_updated: usize,
    /// Notes created or updated.
    pub total_synced: usize,
    /// Notes created for batch annotations.
    pub targets_created: usize,
    /// Notes updated for batch annotations.
    pub targets_updated: usize,
    /// Notes created or updated for batch annotations.
    pub targets_synced: usize,
    /// Notes created for annotations outside the batch.
    pub other_created: usize,
    /// Notes updated for annotations outside the batch.
    pub other_updated: usize,
    /// Notes created or updated for annotations outside the batch.
    pub other_synced: usize,
    /// Document container notes created.
    pub containers_created: usize,
    /// Annotations that could not be synced in this run.
    pub blocked: usize,
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = [
            ("Total targets", self.total_targets),
            ("Total created", self.total_created),
            ("Total updated", self.total_updated),
            ("Total synced", self.total_synced),
            ("Targets created", self.targets_created),
            ("Targets updated", self.targets_updated),
            ("Targets synced", self.targets_synced),
            ("Other created", self.other_created),
            ("Other updated", self.other_updated),
            ("Other synced", self.other_synced),
            ("Containers created", self.containers_created),
            ("Blocked", self.blocked),
        ];
        for (label, value) in rows {
            writeln!(f, "{label}: {value}")?;
        }
        Ok(())
    }
}

/// Returns true if `note` is older than the last change to `annotation`.
///
/// A note without a readable sync stamp is always considered stale.
pub fn check_updatable(annotation: &Annotation, note: &Note) -> bool {
    provenance::is_stale(annotation.updated, note)
}

/// Syncs one batch of annotations into notes.
///
/// An engine handles a single run: once [`SyncEngine::sync_all`] has gone
/// through the batch nothing is pending, and a later call only returns the
/// notes of that run. Build a new engine to sync again.
pub struct SyncEngine<S: SourceClient, T: TargetClient> {
    config: EngineConfig,
    source: S,
    target: T,
    resolver: HierarchyResolver,
    /// The batch, in processing order.
    queue: Vec<Annotation>,
    batch: HashSet<AnnotationId>,
    pending: HashSet<AnnotationId>,
    /// Annotations that reached `Ready` during this run.
    settled: HashSet<AnnotationId>,
    blocked: IndexSet<AnnotationId>,
    created: Vec<Note>,
    updated: Vec<Note>,
    containers: Vec<Note>,
    targets_created: usize,
    targets_updated: usize,
    state: SyncState,
}

impl<S: SourceClient, T: TargetClient> SyncEngine<S, T> {
    /// Creates an engine for `batch`.
    ///
    /// The batch is sorted by (source URI, depth, creation time) so that
    /// parents and elder siblings usually come first.
    pub fn new(config: EngineConfig, source: S, target: T, batch: Vec<Annotation>) -> Self {
        let mut queue = batch;
        queue.sort_by(|a, b| {
            a.source_uri()
                .cmp(&b.source_uri())
                .then(a.depth().cmp(&b.depth()))
                .then(a.created.cmp(&b.created))
        });

        let mut resolver = HierarchyResolver::new();
        for annotation in &queue {
            resolver.remember(annotation);
        }
        let batch: HashSet<AnnotationId> = queue.iter().map(|a| a.id.clone()).collect();

        Self {
            config,
            source,
            target,
            resolver,
            pending: batch.clone(),
            batch,
            queue,
            settled: HashSet::new(),
            blocked: IndexSet::new(),
            created: Vec::new(),
            updated: Vec::new(),
            containers: Vec::new(),
            targets_created: 0,
            targets_updated: 0,
            state: SyncState::Idle,
        }
    }

    /// Creates an engine for the annotations matching `filter`.
    pub fn from_filter(
        config: EngineConfig,
        source: S,
        target: T,
        filter: &SearchFilter,
    ) -> SyncResult<Self> {
        let batch = source.fetch_batch(filter)?;
        debug!(count = batch.len(), "fetched batch");
        Ok(Self::new(config, source, target, batch))
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Gets the update policy.
    pub fn policy(&self) -> SyncPolicy {
        self.config.policy
    }

    /// The batch, in processing order.
    pub fn batch(&self) -> &[Annotation] {
        &self.queue
    }

    /// Batch annotations not synced yet.
    pub fn pending(&self) -> Vec<&Annotation> {
        self.queue
            .iter()
            .filter(|a| self.pending.contains(&a.id))
            .collect()
    }

    /// Annotations given up on during this run.
    pub fn blocked(&self) -> Vec<&AnnotationId> {
        self.blocked.iter().collect()
    }

    /// Notes created so far.
    pub fn created(&self) -> &[Note] {
        &self.created
    }

    /// Notes updated so far.
    pub fn updated(&self) -> &[Note] {
        &self.updated
    }

    /// Document containers created so far.
    pub fn containers(&self) -> &[Note] {
        &self.containers
    }

    /// Notes created or updated so far.
    pub fn synced(&self) -> Vec<Note> {
        self.created
            .iter()
            .chain(self.updated.iter())
            .cloned()
            .collect()
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        let total_created = self.created.len();
        let total_updated = self.updated.len();
        SyncStats {
            total_targets: self.queue.len(),
            total_created,
            total_updated,
            total_synced: total_created + total_updated,
            targets_created: self.targets_created,
            targets_updated: self.targets_updated,
            targets_synced: self.targets_created + self.targets_updated,
            other_created: total_created - self.targets_created,
            other_updated: total_updated - self.targets_updated,
            other_synced: total_created + total_updated
                - self.targets_created
                - self.targets_updated,
            containers_created: self.containers.len(),
            blocked: self.blocked.len(),
        }
    }

    /// Syncs every annotation of the batch and returns the notes created or
    /// updated.
    ///
    /// Hierarchy gaps are filled on the fly. A remote failure aborts the run;
    /// notes synced before it stay as they are. Annotations already synced
    /// by an earlier call are not visited again.
    pub fn sync_all(&mut self) -> SyncResult<Vec<Note>> {
        self.state = SyncState::Syncing;
        info!(
            count = self.queue.len(),
            policy = %self.config.policy,
            "starting sync"
        );

        match self.run_batch() {
            Ok(()) => {
                self.state = SyncState::Synced;
                info!(
                    created = self.created.len(),
                    updated = self.updated.len(),
                    blocked = self.blocked.len(),
                    "sync complete"
                );
                Ok(self.synced())
            }
            Err(e) => {
                self.state = SyncState::Failed;
                Err(e)
            }
        }
    }

    fn run_batch(&mut self) -> SyncResult<()> {
        let order = self.queue.clone();
        let total = order.len();
        for annotation in &order {
            if !self.pending.contains(&annotation.id) {
                continue;
            }
            info!(
                "Syncing annotation #{}: '{}' ({}/{})",
                annotation.id,
                annotation.excerpt(10),
                self.targets_synced(),
                total
            );
            self.sync_family(annotation)?;
        }
        Ok(())
    }

    fn targets_synced(&self) -> usize {
        self.targets_created + self.targets_updated
    }

    /// Syncs `annotation`, syncing whatever it is blocked on first.
    fn sync_family(&mut self, annotation: &Annotation) -> SyncResult<()> {
        let allow_update = self.config.policy.allows_updates();
        let mut stack = vec![annotation.clone()];

        while let Some(member) = stack.pop() {
            let blocker = match self.sync_one(&member, allow_update)? {
                SyncOutcome::Ready(_) => continue,
                SyncOutcome::BlockedOn(blocker) => blocker,
            };
            debug!(
                annotation_id = %member.id,
                dependency = %blocker.dependency,
                "{}",
                blocker.kind
            );

            if member.id == blocker.dependency
                || stack.iter().any(|waiting| waiting.id == blocker.dependency)
            {
                return Err(SyncError::CyclicHierarchy {
                    annotation_id: blocker.dependency,
                });
            }

            match self.resolver.resolve(&self.source, &blocker.dependency)? {
                Some(dependency) => {
                    stack.push(member);
                    stack.push(dependency);
                }
                None => {
                    warn!(
                        annotation_id = %member.id,
                        dependency = %blocker.dependency,
                        "{} and it cannot be found; skipping",
                        blocker.kind
                    );
                    self.mark_blocked(&member);
                    for waiting in stack.drain(..) {
                        self.mark_blocked(&waiting);
                    }
                }
            }
        }
        Ok(())
    }

    fn mark_blocked(&mut self, annotation: &Annotation) {
        self.pending.remove(&annotation.id);
        self.blocked.insert(annotation.id.clone());
    }

    /// Syncs exactly one annotation, assuming its parent and elder sibling
    /// are synced.
    ///
    /// Returns `BlockedOn` when one of them has no note yet or, if the policy
    /// propagates updates, has a stale one.
    pub fn sync_one(
        &mut self,
        annotation: &Annotation,
        allow_update: bool,
    ) -> SyncResult<SyncOutcome> {
        debug!(annotation_id = %annotation.id, "syncing annotation");

        let parent_note = if let Some(parent_id) = annotation.parent_id() {
            let parent_note = match self.resolver.resolve(&self.source, parent_id)? {
                Some(parent) => self.dependency_note(&parent)?,
                None => None,
            };
            match parent_note {
                Some(note) => note,
                None => {
                    return Ok(blocked_on(BlockerKind::ParentNotSynced, parent_id));
                }
            }
        } else {
            self.container_for(annotation)?
        };

        if let Some(sibling) = self.resolver.older_sibling(&self.source, annotation)? {
            if self.dependency_note(&sibling)?.is_none() {
                return Ok(blocked_on(BlockerKind::SiblingNotSynced, &sibling.id));
            }
        }

        let note = match self.find_note(annotation)? {
            None => self.create_note(annotation, &parent_note)?,
            Some(existing) if allow_update && check_updatable(annotation, &existing) => {
                self.update_note(annotation, existing, &parent_note)?
            }
            Some(existing) => {
                debug!(note_id = %existing.id, "note is up to date");
                existing
            }
        };

        self.pending.remove(&annotation.id);
        self.blocked.shift_remove(&annotation.id);
        self.settled.insert(annotation.id.clone());
        Ok(SyncOutcome::Ready(note))
    }

    /// The note of a parent or elder sibling, if it is good enough to build on.
    fn dependency_note(&mut self, dependency: &Annotation) -> SyncResult<Option<Note>> {
        let Some(note) = self.find_note(dependency)? else {
            return Ok(None);
        };
        if self.config.policy.propagates_updates()
            && !self.settled.contains(&dependency.id)
            && check_updatable(dependency, &note)
        {
            debug!(annotation_id = %dependency.id, "dependency note is stale");
            return Ok(None);
        }
        Ok(Some(note))
    }

    fn find_note(&self, annotation: &Annotation) -> SyncResult<Option<Note>> {
        self.target.find_by_provenance(&annotation.provenance_key())
    }

    /// The document-level note for a top-level annotation's resource.
    fn container_for(&mut self, annotation: &Annotation) -> SyncResult<Note> {
        let uri = annotation
            .source_uri()
            .ok_or_else(|| SyncError::MissingSourceUri {
                annotation_id: annotation.id.clone(),
            })?;
        if let Some(container) = self.target.find_by_provenance(uri)? {
            return Ok(container);
        }

        debug!(uri, "creating document note");
        let container = self.target.create(&NewNote {
            text: annotation.document_title().unwrap_or_default().to_string(),
            source: uri.to_string(),
            parent_id: None,
            is_document: true,
        })?;
        info!(note_id = %container.id, uri, "created document note");
        self.containers.push(container.clone());
        Ok(container)
    }

    fn create_note(&mut self, annotation: &Annotation, parent: &Note) -> SyncResult<Note> {
        let stamp = ProvenanceStamp::now(annotation.provenance_key());
        let note = self.target.create(&NewNote {
            text: annotation.content().to_string(),
            source: stamp.render(),
            parent_id: Some(parent.id.clone()),
            is_document: false,
        })?;
        debug!(annotation_id = %annotation.id, note_id = %note.id, "created note");

        if self.batch.contains(&annotation.id) {
            self.targets_created += 1;
        }
        self.created.push(note.clone());
        Ok(note)
    }

    fn update_note(
        &mut self,
        annotation: &Annotation,
        existing: Note,
        parent: &Note,
    ) -> SyncResult<Note> {
        if let Some(last_sync) = provenance::last_sync(&existing.source) {
            if existing.updated > last_sync + self.config.edit_grace {
                if self.config.policy.safe_updates_only() {
                    warn!(
                        note_id = %existing.id,
                        policy = %self.config.policy,
                        "note was modified since last sync; leaving it unchanged"
                    );
                    return Ok(existing);
                }
                warn!(
                    note_id = %existing.id,
                    "note was modified since last sync; overwriting"
                );
            } else if existing.updated > last_sync {
                debug!(
                    note_id = %existing.id,
                    grace_secs = self.config.edit_grace.num_seconds(),
                    "note modified within the edit grace period; treating it as unedited"
                );
            }
        }

        let (name, content) = annotation.name_and_content();
        let stamp = ProvenanceStamp::now(annotation.provenance_key());
        let note = self.target.update(&NoteUpdate {
            id: existing.id.clone(),
            name: Some(name.to_string()),
            content: content.map(str::to_string),
            source: Some(stamp.render()),
            parent_id: Some(parent.id.clone()),
        })?;
        debug!(annotation_id = %annotation.id, note_id = %note.id, "updated note");

        if self.batch.contains(&annotation.id) {
            self.targets_updated += 1;
        }
        self.updated.push(note.clone());
        Ok(note)
    }
}

fn blocked_on(kind: BlockerKind, dependency: &AnnotationId) -> SyncOutcome {
    SyncOutcome::BlockedOn(Blocker {
        kind,
        dependency: dependency.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MemorySource, MemoryTarget};
    use annosync_testkit::AnnotationBuilder;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    const URI: &str = "https://example.com/article";

    fn engine(
        policy: SyncPolicy,
        source: &Arc<MemorySource>,
        target: &Arc<MemoryTarget>,
        batch: Vec<Annotation>,
    ) -> SyncEngine<Arc<MemorySource>, Arc<MemoryTarget>> {
        SyncEngine::new(
            EngineConfig::new(policy),
            Arc::clone(source),
            Arc::clone(target),
            batch,
        )
    }

    #[test]
    fn batch_is_sorted_by_uri_depth_and_creation() {
        let root = AnnotationBuilder::new("root").uri(URI).created_minutes(10).build();
        let reply = AnnotationBuilder::new("reply")
            .uri(URI)
            .reply_to(&root)
            .created_minutes(0)
            .build();
        let early = AnnotationBuilder::new("early").uri(URI).created_minutes(5).build();
        let other = AnnotationBuilder::new("other")
            .uri("https://a.example.org")
            .created_minutes(99)
            .build();
        let source = Arc::new(MemorySource::new());
        let target = Arc::new(MemoryTarget::new());

        let engine = engine(
            SyncPolicy::SafeStrict,
            &source,
            &target,
            vec![reply, root, other, early],
        );
        let order: Vec<&str> = engine.batch().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(order, vec!["other", "early", "root", "reply"]);
        assert_eq!(engine.pending().len(), 4);
        assert_eq!(engine.state(), SyncState::Idle);
    }

    #[test]
    fn sync_one_reports_missing_parent() {
        let root = AnnotationBuilder::new("root").uri(URI).build();
        let reply = AnnotationBuilder::new("reply").uri(URI).reply_to(&root).build();
        let source = Arc::new(MemorySource::with_annotations([root.clone(), reply.clone()]));
        let target = Arc::new(MemoryTarget::new());
        let mut engine = engine(SyncPolicy::SafeStrict, &source, &target, vec![reply.clone()]);

        let outcome = engine.sync_one(&reply, true).unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::BlockedOn(Blocker {
                kind: BlockerKind::ParentNotSynced,
                dependency: root.id.clone(),
            })
        );
        assert!(target.is_empty());

        assert!(engine.sync_one(&root, true).unwrap().is_ready());
        let note = engine.sync_one(&reply, true).unwrap();
        assert!(note.is_ready());
        assert!(engine.pending().is_empty());
    }

    #[test]
    fn sync_one_reports_missing_older_sibling() {
        let first = AnnotationBuilder::new("first").uri(URI).created_minutes(0).build();
        let second = AnnotationBuilder::new("second").uri(URI).created_minutes(5).build();
        let source = Arc::new(MemorySource::with_annotations([first.clone(), second.clone()]));
        let target = Arc::new(MemoryTarget::new());
        let mut engine = engine(SyncPolicy::SafeStrict, &source, &target, vec![second.clone()]);

        let outcome = engine.sync_one(&second, true).unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::BlockedOn(Blocker {
                kind: BlockerKind::SiblingNotSynced,
                dependency: first.id.clone(),
            })
        );
        // The document container was still resolved.
        assert_eq!(engine.containers().len(), 1);
    }

    #[test]
    fn container_created_once_per_resource() {
        let a = AnnotationBuilder::new("a")
            .uri(URI)
            .title("An Article")
            .created_minutes(0)
            .build();
        let b = AnnotationBuilder::new("b").uri(URI).created_minutes(1).build();
        let source = Arc::new(MemorySource::with_annotations([a.clone(), b.clone()]));
        let target = Arc::new(MemoryTarget::new());
        let mut engine = engine(SyncPolicy::SafeStrict, &source, &target, vec![a, b]);

        engine.sync_all().unwrap();
        assert_eq!(engine.containers().len(), 1);
        let container = &engine.containers()[0];
        assert!(container.is_document);
        assert_eq!(container.name_md, "An Article");
        assert!(container.has_source(URI));
        assert_eq!(target.get(&container.id).unwrap().children.len(), 2);

        let stats = engine.stats();
        assert_eq!(stats.total_created, 2);
        assert_eq!(stats.containers_created, 1);
    }

    #[test]
    fn update_splits_name_and_content() {
        let created = Utc::now() - Duration::hours(2);
        let annotation = AnnotationBuilder::new("a")
            .uri(URI)
            .text("Term:: definition:: more")
            .created(created)
            .build();
        let source = Arc::new(MemorySource::with_annotations([annotation.clone()]));
        let target = Arc::new(MemoryTarget::new());
        engine(SyncPolicy::SafeStrict, &source, &target, vec![annotation.clone()])
            .sync_all()
            .unwrap();

        let edited = AnnotationBuilder::from(annotation)
            .updated(Utc::now() + Duration::hours(1))
            .build();
        source.insert(edited.clone());
        let mut engine = engine(SyncPolicy::SafeStrict, &source, &target, vec![edited]);
        let synced = engine.sync_all().unwrap();

        assert_eq!(synced.len(), 1);
        assert_eq!(synced[0].name_md, "Term");
        assert_eq!(synced[0].content_md.as_deref(), Some("definition:: more"));
        assert_eq!(engine.stats().targets_updated, 1);
    }

    #[test]
    fn stale_note_without_stamp_is_updatable() {
        let annotation = AnnotationBuilder::new("a").uri(URI).build();
        let source = Arc::new(MemorySource::with_annotations([annotation.clone()]));
        let target = Arc::new(MemoryTarget::new());
        let mut engine = engine(SyncPolicy::All, &source, &target, vec![annotation.clone()]);
        let note = engine.sync_one(&annotation, true).unwrap();
        let note = note.note().unwrap().clone();

        assert!(!check_updatable(&annotation, &note));
        target.set_source(&note.id, &annotation.provenance_key());
        let note = target.get(&note.id).unwrap();
        assert!(check_updatable(&annotation, &note));
    }

    #[test]
    fn stats_display_lists_every_counter() {
        let stats = SyncStats {
            total_targets: 2,
            total_created: 2,
            total_synced: 2,
            targets_created: 2,
            targets_synced: 2,
            containers_created: 1,
            ..SyncStats::default()
        };
        let rendered = stats.to_string();
        assert!(rendered.starts_with("Total targets: 2\n"));
        assert!(rendered.contains("Total synced: 2\n"));
        assert!(rendered.contains("Other synced: 0\n"));
        assert!(rendered.contains("Containers created: 1\n"));
        assert_eq!(rendered.lines().count(), 12);
    }
}
