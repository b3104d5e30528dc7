//! Change event and batch types.
//!
//! # Event Flow
//!
//! ```text
//! File System Change
//!        │
//!        ▼
//!   ChangeEvent (kind + path relative to the watched root)
//!        │
//!        ▼
//!   IgnoreMatcher (ignored paths dropped)
//!        │
//!        ▼
//!   ChangeBatch (one debounce window, last kind wins per path)
//! ```

use std::fmt;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// The kind of change observed for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// The path was created.
    Added,
    /// The path's contents or metadata changed.
    Modified,
    /// The path was removed.
    Deleted,
}

impl ChangeKind {
    /// Returns the one-letter status code used in snapshot messages.
    #[inline]
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::Added => 'A',
            Self::Modified => 'M',
            Self::Deleted => 'D',
        }
    }

    /// Returns the human-readable label.
    #[inline]
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Added => "Added",
            Self::Modified => "Modified",
            Self::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single change to a path under the watched root.
///
/// # Examples
///
/// ```
/// use lg_watcher::{ChangeEvent, ChangeKind};
///
/// let event = ChangeEvent::new(ChangeKind::Modified, "src/app.rs");
/// assert_eq!(event.path.as_str(), "src/app.rs");
/// assert_eq!(event.kind, ChangeKind::Modified);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// What happened to the path.
    pub kind: ChangeKind,

    /// Path relative to the watched root.
    pub path: Utf8PathBuf,

    /// When the event was received.
    pub timestamp: Instant,
}

impl ChangeEvent {
    /// Creates a new change event stamped with the current instant.
    #[inline]
    #[must_use]
    pub fn new(kind: ChangeKind, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            timestamp: Instant::now(),
        }
    }

    /// Shorthand for an [`ChangeKind::Added`] event.
    #[inline]
    #[must_use]
    pub fn added(path: impl Into<Utf8PathBuf>) -> Self {
        Self::new(ChangeKind::Added, path)
    }

    /// Shorthand for a [`ChangeKind::Modified`] event.
    #[inline]
    #[must_use]
    pub fn modified(path: impl Into<Utf8PathBuf>) -> Self {
        Self::new(ChangeKind::Modified, path)
    }

    /// Shorthand for a [`ChangeKind::Deleted`] event.
    #[inline]
    #[must_use]
    pub fn deleted(path: impl Into<Utf8PathBuf>) -> Self {
        Self::new(ChangeKind::Deleted, path)
    }
}

/// An ordered group of changes collected inside one debounce window.
///
/// Pushing a second event for a path already in the batch replaces the
/// recorded kind (last wins) while keeping the first occurrence's position.
/// Order only affects human-readable summaries.
///
/// # Examples
///
/// ```
/// use lg_watcher::{ChangeBatch, ChangeEvent, ChangeKind};
/// use camino::Utf8Path;
///
/// let mut batch = ChangeBatch::new();
/// batch.push(ChangeEvent::added("a.txt"));
/// batch.push(ChangeEvent::modified("b.txt"));
/// batch.push(ChangeEvent::deleted("a.txt"));
///
/// assert_eq!(batch.len(), 2);
/// assert_eq!(batch.kind_of(Utf8Path::new("a.txt")), Some(ChangeKind::Deleted));
/// ```
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    events: SmallVec<[ChangeEvent; 8]>,
    index: FxHashMap<Utf8PathBuf, usize>,

    /// When the batch window opened.
    pub opened_at: Instant,
}

impl ChangeBatch {
    /// Creates an empty batch opened now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: SmallVec::new(),
            index: FxHashMap::default(),
            opened_at: Instant::now(),
        }
    }

    /// Creates a batch from events, collapsing duplicates.
    #[must_use]
    pub fn from_events(events: impl IntoIterator<Item = ChangeEvent>) -> Self {
        let mut batch = Self::new();
        for event in events {
            batch.push(event);
        }
        batch
    }

    /// Adds an event, collapsing onto an existing entry for the same path.
    pub fn push(&mut self, event: ChangeEvent) {
        if let Some(&slot) = self.index.get(&event.path) {
            let existing = &mut self.events[slot];
            existing.kind = event.kind;
            existing.timestamp = event.timestamp;
        } else {
            self.index.insert(event.path.clone(), self.events.len());
            self.events.push(event);
        }
    }

    /// Returns the recorded kind for `path`, if present.
    #[must_use]
    pub fn kind_of(&self, path: &Utf8Path) -> Option<ChangeKind> {
        self.index.get(path).map(|&slot| self.events[slot].kind)
    }

    /// Returns the number of distinct paths in this batch.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if the batch contains no events.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns an iterator over the events in arrival order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &ChangeEvent> {
        self.events.iter()
    }

    /// Returns mutable access to the events, for kind re-checks at flush time.
    pub(crate) fn events_mut(&mut self) -> impl Iterator<Item = &mut ChangeEvent> {
        self.events.iter_mut()
    }

    /// Computes summary statistics for this batch.
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        BatchStats::from_kinds(self.events.iter().map(|e| e.kind))
    }
}

impl Default for ChangeBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> IntoIterator for &'a ChangeBatch {
    type Item = &'a ChangeEvent;
    type IntoIter = std::slice::Iter<'a, ChangeEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

impl FromIterator<ChangeEvent> for ChangeBatch {
    fn from_iter<T: IntoIterator<Item = ChangeEvent>>(iter: T) -> Self {
        Self::from_events(iter)
    }
}

/// Summary counts for a batch of changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Total number of distinct paths.
    pub total: usize,
    /// Number of added paths.
    pub added: usize,
    /// Number of modified paths.
    pub modified: usize,
    /// Number of deleted paths.
    pub deleted: usize,
}

impl BatchStats {
    /// Tallies a sequence of kinds.
    #[must_use]
    pub fn from_kinds(kinds: impl IntoIterator<Item = ChangeKind>) -> Self {
        let mut stats = Self::default();
        for kind in kinds {
            stats.total += 1;
            match kind {
                ChangeKind::Added => stats.added += 1,
                ChangeKind::Modified => stats.modified += 1,
                ChangeKind::Deleted => stats.deleted += 1,
            }
        }
        stats
    }
}
