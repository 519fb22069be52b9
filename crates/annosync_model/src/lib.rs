//! # annosync model
//!
//! Data types shared by the annosync engine and CLI.
//!
//! This crate provides:
//! - `Annotation` for Hypothes.is annotations and their selectors
//! - `Group` for Hypothes.is groups
//! - `Note` and `RichText` for RemNote notes
//! - `ProvenanceStamp` for the sync marker embedded in a note's source
//! - `SyncPolicy` for controlling how existing notes are overwritten
//!
//! This is a pure data crate with no I/O operations. Hierarchy navigation
//! (parent, siblings, root) needs a source client and lives in the engine.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod annotation;
mod error;
mod group;
mod note;
mod policy;
pub mod provenance;

pub use annotation::{
    Annotation, AnnotationId, Document, GroupId, Links, RangeSelector, Selector, Target,
    TextPositionSelector, TextQuoteSelector,
};
pub use error::{ModelError, ModelResult};
pub use group::{Group, GroupType};
pub use note::{Note, NoteId, NoteType, RichText, RichTextElement};
pub use policy::SyncPolicy;
pub use provenance::ProvenanceStamp;
