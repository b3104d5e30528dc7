//! Ignore matching and debounced change batching for livegit.
//!
//! This crate observes the watched tree and produces a cancellable, pull-based
//! sequence of [`ChangeBatch`]es for the mirror to apply.
//!
//! # Overview
//!
//! - [`IgnoreMatcher`] compiles gitignore-style rules (with negation) once at
//!   startup; the internal metadata directory is always ignored
//! - [`ChangeWatcher`] bridges `notify` notifications into a tokio channel
//! - [`ChangeStream`] drops ignored paths, coalesces events inside one
//!   debounce window (last kind wins per path) and re-checks each path
//!   against the disk before yielding the batch
//! - [`SyntheticSource`] feeds a stream from code instead of the filesystem,
//!   for deterministic tests
//!
//! # Crate Dependencies
//!
//! ```text
//! lg-cli ──► lg-serve
//!        └─► lg-mirror ──► lg-watcher ──► lg-core
//! ```
//!
//! # Error Handling
//!
//! ```
//! use lg_watcher::WatchError;
//!
//! fn handle_watch_error(err: WatchError) {
//!     if err.is_fatal() {
//!         eprintln!("Fatal watcher error: {}", err);
//!     } else {
//!         eprintln!("Warning: {}", err);
//!     }
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod events;
pub mod filter;
pub mod watcher;

pub use error::WatchError;
pub use events::{BatchStats, ChangeBatch, ChangeEvent, ChangeKind};
pub use filter::{AcceptAllFilter, FileFilter, IgnoreMatcher};
pub use watcher::{ChangeStream, ChangeWatcher, SyntheticSource};
