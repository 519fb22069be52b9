//! # annosync engine
//!
//! Sync engine mirroring Hypothes.is annotation threads into RemNote notes.
//!
//! This crate provides:
//! - Source/target client traits and in-memory implementations
//! - Reply-hierarchy resolution (parent, root, ordered siblings)
//! - The sync engine: batch ordering, gap resolution, update policies
//! - HTTP-backed Hypothes.is and RemNote clients over an `HttpClient` trait
//! - Bounded LRU caches for remote lookups
//!
//! ## Architecture
//!
//! Notes mirror the reply tree: every top-level annotation lives under a
//! document note for its web page, every reply under its parent's note, and
//! siblings are created oldest first. The engine syncs one annotation at a
//! time; when its parent or elder sibling has no note yet it syncs that one
//! first, depth-first, then retries.
//!
//! ## Key Invariants
//!
//! - Each synced note carries a provenance stamp; it is the only sync state
//! - A note is rewritten only when its annotation changed after the stamp
//! - Notes edited by hand since the last sync survive under safe policies
//! - Remote errors abort the run; notes synced before stay valid

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod client;
mod config;
mod engine;
mod error;
mod hierarchy;
mod http;
mod hypothesis;
mod remnote;

pub use cache::LruCache;
pub use client::{
    MemorySource, MemoryTarget, NewNote, NoteUpdate, SearchFilter, SortKey, SortOrder,
    SourceClient, TargetClient,
};
pub use config::{
    EngineConfig, SourceConfig, SourceCredentials, TargetConfig, DEFAULT_CACHE_CAPACITY,
    DEFAULT_PAGE_SIZE, HYPOTHESIS_API_URL, REMNOTE_API_URL,
};
pub use engine::{
    check_updatable, Blocker, BlockerKind, SyncEngine, SyncOutcome, SyncState, SyncStats,
};
pub use error::{SyncError, SyncResult};
pub use hierarchy::HierarchyResolver;
pub use http::{CannedClient, HttpClient, HttpRequest, HttpResponse, Method};
pub use hypothesis::{HypothesisClient, MEDIA_TYPE};
pub use remnote::RemNoteClient;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
