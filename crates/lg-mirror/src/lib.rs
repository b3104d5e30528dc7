//! Mirror maintenance for livegit.
//!
//! This crate owns the two pieces of state in a livegit workspace: the mirror
//! working directory with its history, and the published repository that the
//! HTTP server reads.
//!
//! # Overview
//!
//! - [`Workspace`] creates the temporary directory holding both
//! - [`TreeWalker`] enumerates the non-ignored files of a tree
//! - [`MirrorSynchronizer`] applies a [`ChangeBatch`](lg_watcher::ChangeBatch)
//!   and records exactly one snapshot per batch
//! - [`RemotePublisher`] force-publishes the mirror history with retries
//! - [`VersionControl`] abstracts the history engine; [`GitCli`] drives `git`
//!   and [`MemoryVcs`] keeps history in memory
//! - [`Pipeline`] ties them together and consumes a stream of batches
//!
//! # Error Handling
//!
//! ```
//! use lg_mirror::MirrorError;
//!
//! fn handle_mirror_error(err: MirrorError) {
//!     if err.is_fatal() {
//!         eprintln!("Fatal mirror error: {}", err);
//!     } else {
//!         eprintln!("Warning: {}", err);
//!     }
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod error;
pub mod pipeline;
pub mod publish;
pub mod sync;
pub mod vcs;
pub mod walker;
pub mod workspace;

pub use error::{MirrorError, VcsError};
pub use pipeline::{Pipeline, PipelineReport};
pub use publish::{PublishState, RemotePublisher};
pub use sync::{AppliedChange, ApplyReport, MirrorSynchronizer, snapshot_message};
pub use vcs::{GitCli, MemoryVcs, VersionControl};
pub use walker::{TreeContents, TreeWalker};
pub use workspace::{MIRROR_DIR, PUBLISHED_DIR, Workspace};
