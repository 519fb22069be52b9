//! Hypothes.is annotations.
//!
//! Only the fields the sync engine reads are modelled; everything else in the
//! v1 API payload is ignored on decode.

use crate::error::{ModelError, ModelResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Base URL used to build a provenance key when an annotation has no `json` link.
const API_ANNOTATIONS_URL: &str = "https://hypothes.is/api/annotations/";

/// Unique identifier for a Hypothes.is annotation.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(String);

impl AnnotationId {
    /// Creates an annotation ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnnotationId({})", self.0)
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnnotationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Unique identifier for a Hypothes.is group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(String);

impl GroupId {
    /// Creates a group ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Describes a span by its start and end offsets in the document text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPositionSelector {
    /// Start offset.
    pub start: u64,
    /// End offset.
    pub end: u64,
}

/// Describes a span by a copy of the quoted text and its context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextQuoteSelector {
    /// The quoted text.
    pub exact: String,
    /// Text right before the quote.
    #[serde(default)]
    pub prefix: String,
    /// Text right after the quote.
    #[serde(default)]
    pub suffix: String,
}

/// Describes a span with XPath containers and offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeSelector {
    /// XPath of the start container.
    pub start_container: String,
    /// Offset within the start container.
    pub start_offset: u64,
    /// XPath of the end container.
    pub end_container: String,
    /// Offset within the end container.
    pub end_offset: u64,
}

/// One of the selectors attached to an annotation target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Selector {
    /// Offset-based selector.
    TextPositionSelector(TextPositionSelector),
    /// Quote-based selector.
    TextQuoteSelector(TextQuoteSelector),
    /// XPath range selector.
    RangeSelector(RangeSelector),
    /// Any selector type the engine does not use.
    #[serde(other)]
    Other,
}

/// Annotated resource and the selectors locating the annotated span.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// URI of the annotated resource.
    #[serde(default)]
    pub source: Option<String>,
    /// Selectors for the annotated span (empty for page notes and replies).
    #[serde(default)]
    pub selector: Vec<Selector>,
}

/// Hypermedia links for an annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    /// Link to the annotation's HTML page.
    #[serde(default)]
    pub html: Option<String>,
    /// Link to the annotation shown in context.
    #[serde(default, rename = "incontext")]
    pub in_context: Option<String>,
    /// Link to the annotation's API representation.
    #[serde(default)]
    pub json: Option<String>,
}

/// Metadata about the annotated document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Document titles, most relevant first.
    #[serde(default)]
    pub title: Vec<String>,
}

/// A Hypothes.is annotation.
///
/// Annotations are immutable snapshots. Replies carry the ids of all their
/// ancestors in `references`, oldest first, so the direct parent is the last
/// element and `depth()` is simply its length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Annotation ID.
    pub id: AnnotationId,
    /// Creation time.
    pub created: DateTime<Utc>,
    /// Last update time.
    pub updated: DateTime<Utc>,
    /// Author account.
    #[serde(default)]
    pub user: String,
    /// Annotation body.
    #[serde(default)]
    pub text: String,
    /// Tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Group the annotation belongs to.
    #[serde(default)]
    pub group: Option<GroupId>,
    /// URI of the annotated resource.
    #[serde(default)]
    pub uri: Option<String>,
    /// Hypermedia links.
    #[serde(default)]
    pub links: Links,
    /// Document metadata.
    #[serde(default)]
    pub document: Option<Document>,
    /// Ancestor ids, oldest first.
    #[serde(default)]
    pub references: Vec<AnnotationId>,
    /// Annotation targets.
    #[serde(default)]
    pub target: Vec<Target>,
    /// Hidden by a moderator.
    #[serde(default)]
    pub hidden: bool,
    /// Flagged by the current user.
    #[serde(default)]
    pub flagged: bool,
}

impl Annotation {
    /// Decodes an annotation from its API JSON representation.
    pub fn from_json(json: &str) -> ModelResult<Self> {
        serde_json::from_str(json).map_err(|e| ModelError::invalid_payload("annotation", e))
    }

    /// Decodes an annotation from an already parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> ModelResult<Self> {
        serde_json::from_value(value).map_err(|e| ModelError::invalid_payload("annotation", e))
    }

    /// Number of ancestors; 0 for top-level annotations.
    pub fn depth(&self) -> usize {
        self.references.len()
    }

    /// Returns true if this annotation replies to another one.
    pub fn is_reply(&self) -> bool {
        self.depth() > 0
    }

    /// Id of the annotation this one directly replies to.
    pub fn parent_id(&self) -> Option<&AnnotationId> {
        self.references.last()
    }

    /// Id of the top-level annotation of this thread.
    pub fn root_id(&self) -> &AnnotationId {
        self.references.first().unwrap_or(&self.id)
    }

    /// Text to sync: the body, or the highlighted quote for bare highlights.
    pub fn content(&self) -> &str {
        if !self.text.is_empty() {
            return &self.text;
        }
        self.target
            .first()
            .and_then(|target| {
                target.selector.iter().find_map(|selector| match selector {
                    Selector::TextQuoteSelector(quote) => Some(quote.exact.as_str()),
                    _ => None,
                })
            })
            .unwrap_or("")
    }

    /// Splits the content into a name and an optional body on the first `":: "`.
    pub fn name_and_content(&self) -> (&str, Option<&str>) {
        let mut parts = self.content().splitn(2, ":: ");
        let name = parts.next().unwrap_or("");
        (name, parts.next())
    }

    /// Start and end offsets of the annotated span, if the target carries them.
    pub fn text_position(&self) -> Option<(u64, u64)> {
        self.target.first().and_then(|target| {
            target.selector.iter().find_map(|selector| match selector {
                Selector::TextPositionSelector(pos) => Some((pos.start, pos.end)),
                _ => None,
            })
        })
    }

    /// Stable URL identifying this annotation; used as the note provenance key.
    pub fn provenance_key(&self) -> String {
        self.links
            .json
            .clone()
            .unwrap_or_else(|| format!("{}{}", API_ANNOTATIONS_URL, self.id))
    }

    /// URI of the annotated resource.
    pub fn source_uri(&self) -> Option<&str> {
        self.target
            .first()
            .and_then(|target| target.source.as_deref())
            .or(self.uri.as_deref())
    }

    /// Title of the annotated document, when known.
    pub fn document_title(&self) -> Option<&str> {
        self.document
            .as_ref()
            .and_then(|doc| doc.title.first())
            .map(String::as_str)
    }

    /// First characters of the content, for log lines.
    pub fn excerpt(&self, max_chars: usize) -> String {
        let content = self.content();
        match content.char_indices().nth(max_chars) {
            Some((idx, _)) => format!("{}...", &content[..idx]),
            None => content.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY_JSON: &str = r#"{
        "id": "reply-1",
        "created": "2020-12-12T10:00:00.000000+00:00",
        "updated": "2020-12-12T11:30:00.000000+00:00",
        "user": "acct:reader@hypothes.is",
        "text": "Agreed:: the second paragraph says so",
        "tags": ["remnote"],
        "group": "__world__",
        "uri": "https://example.com/article",
        "links": {
            "html": "https://hypothes.is/a/reply-1",
            "incontext": "https://hyp.is/reply-1/example.com/article",
            "json": "https://hypothes.is/api/annotations/reply-1"
        },
        "references": ["root-1", "mid-1"],
        "target": [{"source": "https://example.com/article"}],
        "hidden": false,
        "flagged": false,
        "permissions": {"read": ["group:__world__"]}
    }"#;

    const HIGHLIGHT_JSON: &str = r#"{
        "id": "hl-1",
        "created": "2020-12-12T10:00:00+00:00",
        "updated": "2020-12-12T10:00:00+00:00",
        "text": "",
        "uri": "https://example.com/article",
        "document": {"title": ["An Article"]},
        "target": [{
            "source": "https://example.com/article",
            "selector": [
                {"type": "RangeSelector", "startContainer": "/p[1]", "startOffset": 0,
                 "endContainer": "/p[1]", "endOffset": 12},
                {"type": "TextPositionSelector", "start": 120, "end": 132},
                {"type": "TextQuoteSelector", "exact": "quoted words", "prefix": "some ", "suffix": "."},
                {"type": "FragmentSelector", "value": "page=1"}
            ]
        }]
    }"#;

    #[test]
    fn reply_hierarchy_fields() {
        let annotation = Annotation::from_json(REPLY_JSON).unwrap();
        assert_eq!(annotation.depth(), 2);
        assert!(annotation.is_reply());
        assert_eq!(annotation.parent_id(), Some(&AnnotationId::from("mid-1")));
        assert_eq!(annotation.root_id(), &AnnotationId::from("root-1"));
        assert_eq!(annotation.text_position(), None);
        assert_eq!(
            annotation.provenance_key(),
            "https://hypothes.is/api/annotations/reply-1"
        );
    }

    #[test]
    fn highlight_content_falls_back_to_quote() {
        let annotation = Annotation::from_json(HIGHLIGHT_JSON).unwrap();
        assert!(!annotation.is_reply());
        assert_eq!(annotation.root_id(), &annotation.id);
        assert_eq!(annotation.content(), "quoted words");
        assert_eq!(annotation.text_position(), Some((120, 132)));
        assert_eq!(annotation.document_title(), Some("An Article"));
        assert_eq!(annotation.target[0].selector[3], Selector::Other);
    }

    #[test]
    fn provenance_key_without_json_link() {
        let annotation = Annotation::from_json(HIGHLIGHT_JSON).unwrap();
        assert_eq!(
            annotation.provenance_key(),
            "https://hypothes.is/api/annotations/hl-1"
        );
    }

    #[test]
    fn name_and_content_split_on_first_delimiter() {
        let mut annotation = Annotation::from_json(REPLY_JSON).unwrap();
        assert_eq!(
            annotation.name_and_content(),
            ("Agreed", Some("the second paragraph says so"))
        );

        annotation.text = "a:: b:: c".into();
        assert_eq!(annotation.name_and_content(), ("a", Some("b:: c")));

        annotation.text = "no delimiter".into();
        assert_eq!(annotation.name_and_content(), ("no delimiter", None));
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let mut annotation = Annotation::from_json(REPLY_JSON).unwrap();
        annotation.text = "çàèìòù and more".into();
        assert_eq!(annotation.excerpt(3), "çàè...");
        assert_eq!(annotation.excerpt(100), "çàèìòù and more");
    }

    #[test]
    fn invalid_payload_is_reported() {
        let err = Annotation::from_json(r#"{"id": 3}"#).unwrap_err();
        assert!(matches!(err, ModelError::InvalidPayload { entity: "annotation", .. }));
    }
}
