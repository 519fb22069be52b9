//! # annosync testkit
//!
//! Test utilities for annosync.
//!
//! This crate provides:
//! - Annotation builders and reply-thread fixtures
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use annosync_testkit::prelude::*;
//!
//! #[test]
//! fn reply_has_parent() {
//!     let thread = Thread::new("https://example.com").top_level("x").reply_chain(2);
//!     assert_eq!(thread.annotations[2].depth(), 2);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
