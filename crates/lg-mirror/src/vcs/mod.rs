//! The version-control seam.
//!
//! The mirror talks to history through [`VersionControl`] only. [`GitCli`]
//! drives the `git` executable; [`MemoryVcs`] keeps history in memory and is
//! used by tests that must not depend on an installed `git`.

mod git;
mod memory;

use camino::Utf8Path;
use lg_core::SnapshotId;

use crate::error::VcsError;

pub use git::GitCli;
pub use memory::MemoryVcs;

/// Operations the mirror needs from a version-control system.
///
/// A backend is bound to one mirror working directory at construction. All
/// methods are blocking and are called from the blocking thread pool.
pub trait VersionControl: Send + Sync + 'static {
    /// Creates an empty history in the mirror working directory.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError`] if the history cannot be created.
    fn init(&self) -> Result<(), VcsError>;

    /// Records the current working tree as one snapshot and returns its id.
    ///
    /// A snapshot is recorded even when nothing changed since the previous
    /// one.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError`] if nothing was recorded.
    fn commit(&self, message: &str) -> Result<SnapshotId, VcsError>;

    /// Creates the published repository at `published` from the mirror history.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError`] if the published repository cannot be created.
    fn clone_published(&self, published: &Utf8Path) -> Result<(), VcsError>;

    /// Overwrites every reference in `published` with the mirror's.
    ///
    /// Idempotent: publishing the same history twice leaves the published
    /// repository unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`VcsError`] if the published repository was not updated.
    fn publish(&self, published: &Utf8Path) -> Result<(), VcsError>;
}

impl<V: VersionControl + ?Sized> VersionControl for std::sync::Arc<V> {
    fn init(&self) -> Result<(), VcsError> {
        (**self).init()
    }

    fn commit(&self, message: &str) -> Result<SnapshotId, VcsError> {
        (**self).commit(message)
    }

    fn clone_published(&self, published: &Utf8Path) -> Result<(), VcsError> {
        (**self).clone_published(published)
    }

    fn publish(&self, published: &Utf8Path) -> Result<(), VcsError> {
        (**self).publish(published)
    }
}
