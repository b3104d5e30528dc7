//! Snapshot records produced by the mirror.
//!
//! A [`Snapshot`] is created exactly once per applied batch and never
//! mutated afterwards.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a recorded snapshot (a commit id for the git backend).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Creates an identifier from its textual form.
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the full identifier.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns an abbreviated identifier suitable for log lines.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..10).unwrap_or(&self.0)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable versioned record of the mirror state.
///
/// # Examples
///
/// ```
/// use lg_core::{Snapshot, SnapshotId};
///
/// let snapshot = Snapshot::new(SnapshotId::new("0123456789abcdef"), 1, "Modified a.txt");
/// assert_eq!(snapshot.id.short(), "0123456789");
/// assert_eq!(snapshot.subject(), "Modified a.txt");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Identifier assigned by the version-control backend.
    pub id: SnapshotId,

    /// Position in the mirror history, starting at 1 for the initial import.
    pub sequence: u64,

    /// Full commit message.
    pub message: String,
}

impl Snapshot {
    /// Creates a snapshot record.
    #[must_use]
    pub fn new(id: SnapshotId, sequence: u64, message: impl Into<String>) -> Self {
        Self {
            id,
            sequence,
            message: message.into(),
        }
    }

    /// Returns the first line of the message.
    #[must_use]
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}
