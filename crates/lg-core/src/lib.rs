//! Core types, errors, and configuration for livegit.
//!
//! This crate provides the foundational values shared across the workspace:
//!
//! - [`Config`] and its per-component sections, passed explicitly into every
//!   component at construction
//! - [`ConfigError`] for configuration loading and validation failures
//! - [`Snapshot`], the immutable record created once per applied batch
//! - Relative-path helpers shared by the watcher and the mirror

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod paths;
pub mod snapshot;

pub use config::{Config, MirrorConfig, ServeConfig, WatchConfig};
pub use error::ConfigError;
pub use paths::{INTERNAL_METADATA_DIR, is_internal_metadata, relative_to};
pub use snapshot::{Snapshot, SnapshotId};
