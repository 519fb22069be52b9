//! Annotation fixtures.
//!
//! Builders for annotations and reply threads with deterministic ids and
//! timestamps.

use annosync_model::{
    Annotation, AnnotationId, Document, GroupId, Links, Selector, Target, TextPositionSelector,
    TextQuoteSelector,
};
use chrono::{DateTime, Duration, TimeZone, Utc};

/// Reference time all fixture timestamps are offset from (2021-01-01T00:00:00Z).
pub fn base_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_609_459_200, 0)
        .single()
        .unwrap_or_default()
}

/// Builds an [`Annotation`] with sensible defaults.
///
/// Unless overridden, the annotation is top-level, created at
/// [`base_time`], never updated since, and its `json` link follows the
/// Hypothes.is API layout.
#[derive(Debug, Clone)]
pub struct AnnotationBuilder {
    id: String,
    text: String,
    quote: Option<String>,
    uri: Option<String>,
    group: Option<String>,
    title: Option<String>,
    references: Vec<AnnotationId>,
    position: Option<(u64, u64)>,
    created: DateTime<Utc>,
    updated: Option<DateTime<Utc>>,
    json_link: Option<Option<String>>,
}

impl AnnotationBuilder {
    /// Starts a builder for annotation `id`.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            text: format!("note {id}"),
            quote: None,
            uri: None,
            group: None,
            title: None,
            references: Vec::new(),
            position: None,
            created: base_time(),
            updated: None,
            json_link: None,
        }
    }

    /// Sets the body text.
    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    /// Adds a highlighted quote.
    pub fn quote(mut self, exact: &str) -> Self {
        self.quote = Some(exact.to_string());
        self
    }

    /// Sets the annotated resource.
    pub fn uri(mut self, uri: &str) -> Self {
        self.uri = Some(uri.to_string());
        self
    }

    /// Sets the group.
    pub fn group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    /// Sets the document title.
    pub fn title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Sets the ancestor ids, oldest first.
    pub fn references(mut self, references: &[&str]) -> Self {
        self.references = references.iter().map(|r| AnnotationId::from(*r)).collect();
        self
    }

    /// Makes this a direct reply to `parent`, inheriting its resource.
    pub fn reply_to(mut self, parent: &Annotation) -> Self {
        self.references = parent.references.clone();
        self.references.push(parent.id.clone());
        if self.uri.is_none() {
            self.uri = parent.source_uri().map(str::to_string);
        }
        if self.group.is_none() {
            self.group = parent.group.as_ref().map(|g| g.as_str().to_string());
        }
        self
    }

    /// Anchors the annotation at a text span.
    pub fn position(mut self, start: u64, end: u64) -> Self {
        self.position = Some((start, end));
        self
    }

    /// Sets the creation time.
    pub fn created(mut self, at: DateTime<Utc>) -> Self {
        self.created = at;
        self
    }

    /// Sets the creation time to `minutes` after [`base_time`].
    pub fn created_minutes(self, minutes: i64) -> Self {
        self.created(base_time() + Duration::minutes(minutes))
    }

    /// Sets the last update time.
    pub fn updated(mut self, at: DateTime<Utc>) -> Self {
        self.updated = Some(at);
        self
    }

    /// Overrides the `json` link; `None` removes it.
    pub fn json_link(mut self, link: Option<&str>) -> Self {
        self.json_link = Some(link.map(str::to_string));
        self
    }

    /// Builds the annotation.
    pub fn build(self) -> Annotation {
        let mut selector = Vec::new();
        if let Some((start, end)) = self.position {
            selector.push(Selector::TextPositionSelector(TextPositionSelector { start, end }));
        }
        if let Some(exact) = self.quote {
            selector.push(Selector::TextQuoteSelector(TextQuoteSelector {
                exact,
                prefix: String::new(),
                suffix: String::new(),
            }));
        }
        let json = self
            .json_link
            .unwrap_or_else(|| Some(format!("https://hypothes.is/api/annotations/{}", self.id)));

        Annotation {
            id: AnnotationId::new(self.id.as_str()),
            created: self.created,
            updated: self.updated.unwrap_or(self.created),
            user: "acct:tester@hypothes.is".to_string(),
            text: self.text,
            tags: Vec::new(),
            group: self.group.map(GroupId::new),
            uri: self.uri.clone(),
            links: Links {
                html: Some(format!("https://hypothes.is/a/{}", self.id)),
                in_context: None,
                json,
            },
            document: self.title.map(|title| Document { title: vec![title] }),
            references: self.references,
            target: vec![Target {
                source: self.uri,
                selector,
            }],
            hidden: false,
            flagged: false,
        }
    }
}

impl From<Annotation> for AnnotationBuilder {
    /// Starts from an existing annotation, keeping its hierarchy, anchors and
    /// timestamps.
    fn from(annotation: Annotation) -> Self {
        let position = annotation.text_position();
        let title = annotation.document_title().map(str::to_string);
        let quote = annotation.target.first().and_then(|target| {
            target.selector.iter().find_map(|selector| match selector {
                Selector::TextQuoteSelector(quote) => Some(quote.exact.clone()),
                _ => None,
            })
        });
        Self {
            uri: annotation.source_uri().map(str::to_string),
            group: annotation.group.map(|g| g.as_str().to_string()),
            id: annotation.id.as_str().to_string(),
            text: annotation.text,
            quote,
            title,
            references: annotation.references,
            position,
            created: annotation.created,
            updated: Some(annotation.updated),
            json_link: Some(annotation.links.json),
        }
    }
}

/// Builds a thread of annotations on one resource with increasing
/// creation times.
#[derive(Debug, Clone)]
pub struct Thread {
    uri: String,
    minute: i64,
    /// Annotations in the order they were added.
    pub annotations: Vec<Annotation>,
}

impl Thread {
    /// Starts an empty thread on `uri`.
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            minute: 0,
            annotations: Vec::new(),
        }
    }

    fn next(&mut self, id: &str) -> AnnotationBuilder {
        self.minute += 1;
        AnnotationBuilder::new(id)
            .uri(&self.uri)
            .created_minutes(self.minute)
    }

    /// Adds a top-level annotation.
    pub fn top_level(mut self, id: &str) -> Self {
        let annotation = self.next(id).build();
        self.annotations.push(annotation);
        self
    }

    /// Adds a reply to the annotation `parent` already in the thread.
    ///
    /// # Panics
    ///
    /// Panics if `parent` was not added before.
    pub fn reply(mut self, id: &str, parent: &str) -> Self {
        let parent = self.get(parent).clone();
        let annotation = self.next(id).reply_to(&parent).build();
        self.annotations.push(annotation);
        self
    }

    /// Adds a chain of `depth` nested replies below the last annotation,
    /// named `{last}-r1`, `{last}-r2`, ...
    ///
    /// # Panics
    ///
    /// Panics if the thread is empty.
    pub fn reply_chain(mut self, depth: usize) -> Self {
        let start = self
            .annotations
            .last()
            .map(|a| a.id.as_str().to_string())
            .expect("reply_chain needs a starting annotation");
        let mut parent = start.clone();
        for level in 1..=depth {
            let id = format!("{start}-r{level}");
            self = self.reply(&id, &parent);
            parent = id;
        }
        self
    }

    /// Returns the annotation `id`.
    ///
    /// # Panics
    ///
    /// Panics if there is no such annotation.
    pub fn get(&self, id: &str) -> &Annotation {
        self.annotations
            .iter()
            .find(|a| a.id.as_str() == id)
            .unwrap_or_else(|| panic!("no annotation {id} in thread"))
    }

    /// Consumes the thread, returning its annotations.
    pub fn into_annotations(self) -> Vec<Annotation> {
        self.annotations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let a = AnnotationBuilder::new("a").uri("https://example.com").build();
        assert!(!a.is_reply());
        assert_eq!(a.created, base_time());
        assert_eq!(a.updated, a.created);
        assert_eq!(a.provenance_key(), "https://hypothes.is/api/annotations/a");
        assert_eq!(a.source_uri(), Some("https://example.com"));
    }

    #[test]
    fn reply_inherits_resource_and_ancestors() {
        let root = AnnotationBuilder::new("root")
            .uri("https://example.com")
            .group("g1")
            .build();
        let mid = AnnotationBuilder::new("mid").reply_to(&root).build();
        let leaf = AnnotationBuilder::new("leaf").reply_to(&mid).build();
        assert_eq!(leaf.depth(), 2);
        assert_eq!(leaf.parent_id(), Some(&mid.id));
        assert_eq!(leaf.root_id(), &root.id);
        assert_eq!(leaf.source_uri(), Some("https://example.com"));
        assert_eq!(leaf.group.as_ref().map(GroupId::as_str), Some("g1"));
    }

    #[test]
    fn rebuilding_keeps_everything() {
        let a = AnnotationBuilder::new("a")
            .uri("https://example.com")
            .title("Title")
            .quote("quoted")
            .position(3, 9)
            .created_minutes(5)
            .build();
        assert_eq!(AnnotationBuilder::from(a.clone()).build(), a);
    }

    #[test]
    fn thread_builder() {
        let thread = Thread::new("https://example.com")
            .top_level("x")
            .reply("y", "x")
            .reply_chain(2);
        let ids: Vec<&str> = thread.annotations.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "y-r1", "y-r2"]);
        assert_eq!(thread.get("y-r2").depth(), 3);
        assert!(thread.get("y").created > thread.get("x").created);
    }
}
