//! # objgraph testkit
//!
//! Test utilities for the objgraph change-tracking core.
//!
//! This crate provides:
//! - Shared schema fixtures and context helpers
//! - A recording in-memory sync channel that plays the store's role,
//!   including temporary-to-permanent id replacement
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use objgraph_testkit::prelude::*;
//!
//! #[test]
//! fn commits_through_the_store() {
//!     let (ctx, store) = store_backed_context();
//!     // ... graph operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::channel::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use channel::*;
pub use fixtures::*;
pub use generators::*;
