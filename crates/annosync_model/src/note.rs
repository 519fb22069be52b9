//! RemNote notes and rich text.

use crate::error::{ModelError, ModelResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::LazyLock;

// `< https://... >` spans, as written by provenance stamps.
static LINK_SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<\s*(\S+)\s*>").expect("link span pattern"));

/// Identifier generated by RemNote for a note.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Creates a note ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NoteId({})", self.0)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// One fragment of a rich-text field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RichTextElement {
    /// Plain text run.
    Text(String),
    /// Structured element (link, reference, formatting, ...).
    Object(Map<String, Value>),
}

impl RichTextElement {
    /// Creates a link element.
    pub fn link(url: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("url".into(), Value::String(url.into()));
        Self::Object(map)
    }

    /// URL carried by this element, if it is a link.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Object(map) => map.get("url").and_then(Value::as_str),
            Self::Text(_) => None,
        }
    }
}

/// Rich text as returned by RemNote: a sequence of text runs and objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RichText(pub Vec<RichTextElement>);

impl RichText {
    /// Rich text holding a single plain run.
    pub fn plain(text: impl Into<String>) -> Self {
        Self(vec![RichTextElement::Text(text.into())])
    }

    /// Renders a `source` statement the way RemNote stores it: `< url >`
    /// spans become link elements, a bare URL becomes a single link.
    pub fn from_source_statement(statement: &str) -> Self {
        let trimmed = statement.trim();
        if is_bare_uri(trimmed) {
            return Self(vec![RichTextElement::link(trimmed)]);
        }

        let mut elements = Vec::new();
        let mut cursor = 0;
        for captures in LINK_SPAN_RE.captures_iter(statement) {
            let (Some(whole), Some(url)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            if whole.start() > cursor {
                elements.push(RichTextElement::Text(
                    statement[cursor..whole.start()].to_string(),
                ));
            }
            elements.push(RichTextElement::link(url.as_str()));
            cursor = whole.end();
        }
        if cursor < statement.len() {
            elements.push(RichTextElement::Text(statement[cursor..].to_string()));
        }
        Self(elements)
    }

    /// Returns the elements.
    pub fn elements(&self) -> &[RichTextElement] {
        &self.0
    }

    /// Returns true if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Plain text runs, in order.
    pub fn text_fragments(&self) -> impl Iterator<Item = &str> {
        self.0.iter().filter_map(|element| match element {
            RichTextElement::Text(text) => Some(text.as_str()),
            RichTextElement::Object(_) => None,
        })
    }

    /// URLs of all link elements.
    pub fn source_urls(&self) -> Vec<&str> {
        self.0.iter().filter_map(RichTextElement::url).collect()
    }

    /// Concatenation of text runs, with links rendered as their URL.
    pub fn to_plain_text(&self) -> String {
        self.0
            .iter()
            .map(|element| match element {
                RichTextElement::Text(text) => text.as_str(),
                RichTextElement::Object(_) => element.url().unwrap_or(""),
            })
            .collect()
    }
}

fn is_bare_uri(s: &str) -> bool {
    !s.is_empty()
        && !s.contains(char::is_whitespace)
        && (s.contains("://") || s.starts_with("urn:"))
}

/// Kind of note.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteType {
    /// Concept note.
    Concept,
    /// Descriptor note.
    Descriptor,
    /// Plain note without a card type.
    #[default]
    NoContent,
}

/// A RemNote note ("Rem").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Note ID.
    #[serde(rename = "_id")]
    pub id: NoteId,
    /// Parent note, if any.
    #[serde(default)]
    pub parent: Option<NoteId>,
    /// Child notes, in display order.
    #[serde(default)]
    pub children: Vec<NoteId>,
    /// Display name.
    #[serde(default)]
    pub name: RichText,
    /// Display name rendered as markdown.
    #[serde(default, rename = "nameAsMarkdown")]
    pub name_md: String,
    /// Body content.
    #[serde(default)]
    pub content: Option<RichText>,
    /// Body content rendered as markdown.
    #[serde(default, rename = "contentAsMarkdown")]
    pub content_md: Option<String>,
    /// Source field; holds the provenance stamp for synced notes.
    #[serde(default)]
    pub source: RichText,
    /// Note type.
    #[serde(default, rename = "remType")]
    pub note_type: NoteType,
    /// Whether the note is a document (top-level container).
    #[serde(default, rename = "isDocument")]
    pub is_document: bool,
    /// Creation time.
    #[serde(rename = "createdAt", with = "chrono::serde::ts_milliseconds")]
    pub created: DateTime<Utc>,
    /// Last modification time, as recorded by RemNote.
    #[serde(rename = "updatedAt", with = "chrono::serde::ts_milliseconds")]
    pub updated: DateTime<Utc>,
    /// Tag children.
    #[serde(default, rename = "tagChildren")]
    pub tag_children: Vec<NoteId>,
    /// Tags.
    #[serde(default)]
    pub tags: Option<Vec<NoteId>>,
}

impl Note {
    /// Decodes a note from its API JSON representation.
    pub fn from_value(value: Value) -> ModelResult<Self> {
        serde_json::from_value(value).map_err(|e| ModelError::invalid_payload("note", e))
    }

    /// URLs linked from the note's source field.
    pub fn source_urls(&self) -> Vec<&str> {
        self.source.source_urls()
    }

    /// Returns true if the source field links to `key`.
    pub fn has_source(&self, key: &str) -> bool {
        self.source_urls().contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn note_from_api_json() {
        let note = Note::from_value(json!({
            "found": true,
            "_id": "rem-1",
            "parent": "doc-1",
            "children": ["rem-2"],
            "name": ["Agreed"],
            "nameAsMarkdown": "Agreed",
            "content": ["the second paragraph"],
            "contentAsMarkdown": "the second paragraph",
            "source": [
                "Imported from Hypothes.is: ",
                {"i": "o", "url": "https://hypothes.is/api/annotations/a1"},
                ". Last sync: 2020-12-12T10:00:00+00:00"
            ],
            "remType": "concept",
            "isDocument": false,
            "createdAt": 1607767200000i64,
            "updatedAt": 1607770800000i64,
            "tagChildren": [],
            "visibleRemOnDocument": []
        }))
        .unwrap();

        assert_eq!(note.id, NoteId::from("rem-1"));
        assert_eq!(note.parent, Some(NoteId::from("doc-1")));
        assert_eq!(note.note_type, NoteType::Concept);
        assert_eq!(note.created.timestamp(), 1_607_767_200);
        assert!(note.has_source("https://hypothes.is/api/annotations/a1"));
        assert!(!note.has_source("https://example.com"));
    }

    #[test]
    fn source_statement_becomes_link_elements() {
        let text = RichText::from_source_statement(
            "Imported from Hypothes.is: < https://hypothes.is/api/annotations/a1 >. Last sync: x",
        );
        assert_eq!(text.elements().len(), 3);
        assert_eq!(
            text.source_urls(),
            vec!["https://hypothes.is/api/annotations/a1"]
        );
        let fragments: Vec<&str> = text.text_fragments().collect();
        assert_eq!(fragments, vec!["Imported from Hypothes.is: ", ". Last sync: x"]);
    }

    #[test]
    fn bare_uri_becomes_single_link() {
        let text = RichText::from_source_statement("https://example.com/article");
        assert_eq!(text.source_urls(), vec!["https://example.com/article"]);
        assert_eq!(text.to_plain_text(), "https://example.com/article");

        let text = RichText::from_source_statement("urn:x-pdf:abc123");
        assert_eq!(text.source_urls(), vec!["urn:x-pdf:abc123"]);
    }

    #[test]
    fn plain_statement_has_no_links() {
        let text = RichText::from_source_statement("typed by hand");
        assert!(text.source_urls().is_empty());
        assert_eq!(text, RichText::plain("typed by hand"));
    }
}
