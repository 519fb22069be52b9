//! Reply-hierarchy navigation.
//!
//! Annotations only know their ancestor ids. Everything else (the parent
//! annotation itself, the root of the thread, the ordered list of siblings)
//! needs lookups against the source service. `HierarchyResolver` performs
//! those lookups and memoizes the results in a side-table owned by the
//! engine, so annotations themselves stay plain immutable values.

use crate::client::SourceClient;
use crate::error::{SyncError, SyncResult};
use annosync_model::{Annotation, AnnotationId};
use std::collections::HashMap;
use tracing::debug;

/// Memoizing resolver for parents, roots and siblings.
#[derive(Debug, Default)]
pub struct HierarchyResolver {
    /// Resolved annotations by id; `None` records a lookup that found nothing.
    annotations: HashMap<AnnotationId, Option<Annotation>>,
    /// Ordered sibling lists, stored under every member's id.
    siblings: HashMap<AnnotationId, Vec<Annotation>>,
}

impl HierarchyResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the table with an already known annotation.
    pub fn remember(&mut self, annotation: &Annotation) {
        self.annotations
            .insert(annotation.id.clone(), Some(annotation.clone()));
    }

    /// Resolves an annotation by id, asking the source only once per id.
    pub fn resolve<S>(&mut self, source: &S, id: &AnnotationId) -> SyncResult<Option<Annotation>>
    where
        S: SourceClient + ?Sized,
    {
        if let Some(known) = self.annotations.get(id) {
            return Ok(known.clone());
        }
        debug!(annotation_id = %id, "resolving annotation");
        let resolved = source.resolve_by_id(id)?;
        self.annotations.insert(id.clone(), resolved.clone());
        Ok(resolved)
    }

    /// The annotation `annotation` replies to; `None` for top-level
    /// annotations and for parents the source cannot find.
    pub fn parent<S>(&mut self, source: &S, annotation: &Annotation) -> SyncResult<Option<Annotation>>
    where
        S: SourceClient + ?Sized,
    {
        match annotation.parent_id() {
            Some(parent_id) => self.resolve(source, parent_id),
            None => Ok(None),
        }
    }

    /// Top-level annotation of the thread; `annotation` itself when it is
    /// top-level, `None` when some ancestor cannot be resolved.
    pub fn root<S>(&mut self, source: &S, annotation: &Annotation) -> SyncResult<Option<Annotation>>
    where
        S: SourceClient + ?Sized,
    {
        let mut current = annotation.clone();
        let mut steps = 0;
        while current.is_reply() {
            // Each step must strictly reduce depth; anything else loops.
            if steps >= annotation.depth() {
                return Err(SyncError::CyclicHierarchy {
                    annotation_id: annotation.id.clone(),
                });
            }
            match self.parent(source, &current)? {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
            steps += 1;
        }
        Ok(Some(current))
    }

    /// Annotations sharing `annotation`'s parent and depth, itself included,
    /// ordered by text position (top-level only) and then creation time.
    pub fn siblings<S>(&mut self, source: &S, annotation: &Annotation) -> SyncResult<Vec<Annotation>>
    where
        S: SourceClient + ?Sized,
    {
        if let Some(known) = self.siblings.get(&annotation.id) {
            return Ok(known.clone());
        }

        let uri = annotation
            .source_uri()
            .ok_or_else(|| SyncError::MissingSourceUri {
                annotation_id: annotation.id.clone(),
            })?;
        let family = source.query_family(uri, annotation.parent_id())?;

        // The family query also returns deeper descendants; keep direct
        // children of the same parent only.
        let mut siblings: Vec<Annotation> = family
            .into_iter()
            .filter(|member| {
                member.parent_id() == annotation.parent_id() && member.depth() == annotation.depth()
            })
            .collect();

        // Replies share their root, so only creation time tells them apart.
        siblings.sort_by(|a, b| {
            sibling_position(a)
                .cmp(&sibling_position(b))
                .then(a.created.cmp(&b.created))
                .then_with(|| a.id.cmp(&b.id))
        });
        debug!(
            annotation_id = %annotation.id,
            count = siblings.len(),
            "resolved siblings"
        );

        for member in &siblings {
            self.remember(member);
            self.siblings.insert(member.id.clone(), siblings.clone());
        }
        self.siblings.insert(annotation.id.clone(), siblings.clone());
        Ok(siblings)
    }

    /// Index of `annotation` in its sibling list.
    ///
    /// An annotation missing from its own sibling list means the source
    /// returned inconsistent data; that is an error, not a `None`.
    pub fn position_amongst_siblings<S>(
        &mut self,
        source: &S,
        annotation: &Annotation,
    ) -> SyncResult<usize>
    where
        S: SourceClient + ?Sized,
    {
        self.siblings(source, annotation)?
            .iter()
            .position(|member| member.id == annotation.id)
            .ok_or_else(|| {
                SyncError::HierarchyInvariant(format!(
                    "annotation {} is missing from its own sibling list",
                    annotation.id
                ))
            })
    }

    /// The sibling right before `annotation`, if any.
    pub fn older_sibling<S>(
        &mut self,
        source: &S,
        annotation: &Annotation,
    ) -> SyncResult<Option<Annotation>>
    where
        S: SourceClient + ?Sized,
    {
        let position = self.position_amongst_siblings(source, annotation)?;
        if position == 0 {
            return Ok(None);
        }
        Ok(self
            .siblings
            .get(&annotation.id)
            .and_then(|siblings| siblings.get(position - 1))
            .cloned())
    }
}

fn sibling_position(annotation: &Annotation) -> Option<u64> {
    if annotation.is_reply() {
        None
    } else {
        annotation.text_position().map(|(start, _)| start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemorySource;
    use annosync_testkit::AnnotationBuilder;

    const URI: &str = "https://example.com/article";

    #[test]
    fn parent_and_root() {
        let root = AnnotationBuilder::new("root").uri(URI).build();
        let mid = AnnotationBuilder::new("mid").uri(URI).reply_to(&root).build();
        let leaf = AnnotationBuilder::new("leaf").uri(URI).reply_to(&mid).build();
        let source = MemorySource::with_annotations([root.clone(), mid.clone(), leaf.clone()]);
        let mut resolver = HierarchyResolver::new();

        assert_eq!(resolver.parent(&source, &root).unwrap(), None);
        assert_eq!(resolver.parent(&source, &leaf).unwrap().unwrap().id, mid.id);
        assert_eq!(resolver.root(&source, &leaf).unwrap().unwrap().id, root.id);
        assert_eq!(resolver.root(&source, &root).unwrap().unwrap().id, root.id);
    }

    #[test]
    fn lookups_are_memoized() {
        let root = AnnotationBuilder::new("root").uri(URI).build();
        let reply = AnnotationBuilder::new("reply").uri(URI).reply_to(&root).build();
        let source = MemorySource::with_annotations([root.clone(), reply.clone()]);
        let mut resolver = HierarchyResolver::new();

        resolver.parent(&source, &reply).unwrap();
        resolver.parent(&source, &reply).unwrap();
        resolver.siblings(&source, &reply).unwrap();
        resolver.older_sibling(&source, &reply).unwrap();
        assert_eq!(source.lookup_count(), 2);
    }

    #[test]
    fn missing_parent_resolves_to_none() {
        let orphan = AnnotationBuilder::new("orphan")
            .uri(URI)
            .references(&["gone"])
            .build();
        let source = MemorySource::with_annotations([orphan.clone()]);
        let mut resolver = HierarchyResolver::new();

        assert_eq!(resolver.parent(&source, &orphan).unwrap(), None);
        assert_eq!(resolver.root(&source, &orphan).unwrap(), None);
    }

    #[test]
    fn top_level_siblings_ordered_by_position_then_creation() {
        let late_first = AnnotationBuilder::new("late-first")
            .uri(URI)
            .created_minutes(30)
            .position(10, 20)
            .build();
        let early_second = AnnotationBuilder::new("early-second")
            .uri(URI)
            .created_minutes(0)
            .position(50, 60)
            .build();
        let page_note = AnnotationBuilder::new("page-note")
            .uri(URI)
            .created_minutes(45)
            .build();
        let reply = AnnotationBuilder::new("reply").uri(URI).reply_to(&late_first).build();
        let elsewhere = AnnotationBuilder::new("elsewhere").uri("https://other.org").build();
        let source = MemorySource::with_annotations([
            early_second.clone(),
            late_first.clone(),
            page_note.clone(),
            reply,
            elsewhere,
        ]);
        let mut resolver = HierarchyResolver::new();

        let ids: Vec<String> = resolver
            .siblings(&source, &early_second)
            .unwrap()
            .into_iter()
            .map(|a| a.id.to_string())
            .collect();
        assert_eq!(ids, vec!["page-note", "late-first", "early-second"]);

        assert_eq!(resolver.position_amongst_siblings(&source, &early_second).unwrap(), 2);
        assert_eq!(
            resolver.older_sibling(&source, &early_second).unwrap().unwrap().id,
            late_first.id
        );
        assert_eq!(resolver.older_sibling(&source, &page_note).unwrap(), None);
    }

    #[test]
    fn reply_siblings_exclude_descendants() {
        let root = AnnotationBuilder::new("root").uri(URI).build();
        let first = AnnotationBuilder::new("first")
            .uri(URI)
            .reply_to(&root)
            .created_minutes(5)
            .build();
        let second = AnnotationBuilder::new("second")
            .uri(URI)
            .reply_to(&root)
            .created_minutes(10)
            .build();
        let nested = AnnotationBuilder::new("nested")
            .uri(URI)
            .reply_to(&first)
            .created_minutes(7)
            .build();
        let source = MemorySource::with_annotations([
            root,
            second.clone(),
            nested,
            first.clone(),
        ]);
        let mut resolver = HierarchyResolver::new();

        let ids: Vec<String> = resolver
            .siblings(&source, &second)
            .unwrap()
            .into_iter()
            .map(|a| a.id.to_string())
            .collect();
        assert_eq!(ids, vec!["first", "second"]);
        assert_eq!(
            resolver.older_sibling(&source, &second).unwrap().unwrap().id,
            first.id
        );
    }

    #[test]
    fn annotation_missing_from_siblings_is_an_invariant_violation() {
        let listed = AnnotationBuilder::new("listed").uri(URI).build();
        let unlisted = AnnotationBuilder::new("unlisted").uri(URI).build();
        let source = MemorySource::with_annotations([listed]);
        let mut resolver = HierarchyResolver::new();

        let err = resolver
            .position_amongst_siblings(&source, &unlisted)
            .unwrap_err();
        assert!(matches!(err, SyncError::HierarchyInvariant(_)));
    }

    #[test]
    fn cyclic_references_are_detected_when_walking_to_root() {
        let a = AnnotationBuilder::new("a").uri(URI).references(&["b"]).build();
        let b = AnnotationBuilder::new("b").uri(URI).references(&["a"]).build();
        let source = MemorySource::with_annotations([a.clone(), b]);
        let mut resolver = HierarchyResolver::new();

        assert!(matches!(
            resolver.root(&source, &a),
            Err(SyncError::CyclicHierarchy { .. })
        ));
    }
}
