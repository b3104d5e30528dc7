//! Applying change batches to the mirror.
//!
//! [`MirrorSynchronizer`] owns the mirror working directory. Every call to
//! [`apply`](MirrorSynchronizer::apply) copies the batch's changes from the
//! watched tree and then records exactly one snapshot.
//!
//! # Failure Model
//!
//! A single event that cannot be applied (permission denied, disk full) is
//! logged and counted in [`ApplyReport::skipped`]; the rest of the batch
//! still goes through. If recording the snapshot fails, the copied files stay
//! in the mirror and are picked up by the next snapshot, since each commit
//! stages the whole working tree.

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use lg_core::{Snapshot, is_internal_metadata};
use lg_watcher::{BatchStats, ChangeBatch, ChangeEvent, ChangeKind, IgnoreMatcher};
use serde::Serialize;

use crate::error::MirrorError;
use crate::vcs::VersionControl;
use crate::walker::TreeWalker;

/// A change as it was actually applied to the mirror.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedChange {
    /// The kind after resolving the event against the disk.
    pub kind: ChangeKind,
    /// Path relative to the watched root.
    pub path: Utf8PathBuf,
}

impl AppliedChange {
    /// Creates an applied change.
    #[must_use]
    pub fn new(kind: ChangeKind, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }
}

/// Outcome of applying one batch.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    /// The snapshot recorded for the batch.
    pub snapshot: Snapshot,
    /// Changes applied, in batch order.
    pub applied: Vec<AppliedChange>,
    /// Events that were ignored or failed and left the mirror untouched.
    pub skipped: usize,
}

impl ApplyReport {
    /// Tallies the applied changes by kind.
    #[must_use]
    pub fn stats(&self) -> BatchStats {
        BatchStats::from_kinds(self.applied.iter().map(|c| c.kind))
    }
}

/// Keeps the mirror working directory in step with the watched tree.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use camino::Utf8Path;
/// use lg_mirror::{GitCli, MirrorSynchronizer};
/// use lg_watcher::{ChangeBatch, ChangeEvent, IgnoreMatcher};
///
/// let source = Utf8Path::new("/work/project");
/// let mirror = Utf8Path::new("/tmp/livegit__x/staging");
/// let matcher = Arc::new(IgnoreMatcher::load(source, ".gitignore")?);
///
/// let mut sync = MirrorSynchronizer::new(source, mirror, matcher, GitCli::new(mirror));
/// sync.initialize()?;
///
/// let report = sync.apply(&ChangeBatch::from_events([ChangeEvent::modified("a.txt")]))?;
/// println!("{}", report.snapshot.subject());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct MirrorSynchronizer<V> {
    source: Utf8PathBuf,
    mirror: Utf8PathBuf,
    matcher: Arc<IgnoreMatcher>,
    vcs: V,
    sequence: u64,
}

impl<V: VersionControl> MirrorSynchronizer<V> {
    /// Creates a synchronizer copying from `source` into `mirror`.
    #[must_use]
    pub fn new(source: &Utf8Path, mirror: &Utf8Path, matcher: Arc<IgnoreMatcher>, vcs: V) -> Self {
        Self {
            source: source.to_owned(),
            mirror: mirror.to_owned(),
            matcher,
            vcs,
            sequence: 0,
        }
    }

    /// Creates the mirror history and imports every non-ignored file.
    ///
    /// # Errors
    ///
    /// Returns an error if the history cannot be created, the watched tree
    /// cannot be walked, or the import snapshot cannot be recorded. All of
    /// these are startup failures.
    pub fn initialize(&mut self) -> Result<ApplyReport, MirrorError> {
        fs::create_dir_all(&self.mirror).map_err(|e| MirrorError::io(&self.mirror, e))?;
        self.vcs.init()?;

        let files = TreeWalker::new(&self.source, Arc::clone(&self.matcher))?.collect_files()?;
        let batch: ChangeBatch = files.into_iter().map(ChangeEvent::added).collect();

        let (applied, skipped) = self.apply_events(&batch);
        let message = format!("Initial import of {} files", applied.len());
        let snapshot = self.record(message)?;

        Ok(ApplyReport {
            snapshot,
            applied,
            skipped,
        })
    }

    /// Applies one batch and records one snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Vcs`] if the snapshot could not be recorded.
    /// Failures of individual events are not errors; see [`ApplyReport::skipped`].
    pub fn apply(&mut self, batch: &ChangeBatch) -> Result<ApplyReport, MirrorError> {
        let (applied, skipped) = self.apply_events(batch);
        let snapshot = self.record(snapshot_message(&applied))?;

        Ok(ApplyReport {
            snapshot,
            applied,
            skipped,
        })
    }

    /// Returns the mirror working directory.
    #[inline]
    #[must_use]
    pub fn mirror(&self) -> &Utf8Path {
        &self.mirror
    }

    /// Returns the version-control backend.
    #[inline]
    #[must_use]
    pub const fn vcs(&self) -> &V {
        &self.vcs
    }

    /// Returns the number of snapshots recorded so far.
    #[inline]
    #[must_use]
    pub const fn sequence(&self) -> u64 {
        self.sequence
    }

    fn apply_events(&self, batch: &ChangeBatch) -> (Vec<AppliedChange>, usize) {
        let mut applied = Vec::with_capacity(batch.len());
        let mut skipped = 0;

        for event in batch {
            match self.apply_event(event) {
                Ok(Some(change)) => {
                    tracing::debug!(kind = %change.kind, path = %change.path, "Applied change");
                    applied.push(change);
                }
                Ok(None) => skipped += 1,
                Err(error) => {
                    tracing::warn!(path = %event.path, error = %error, "Skipping change");
                    skipped += 1;
                }
            }
        }

        (applied, skipped)
    }

    fn apply_event(&self, event: &ChangeEvent) -> Result<Option<AppliedChange>, MirrorError> {
        let relative = event.path.as_path();
        if relative.as_str().is_empty() || relative.has_root() || is_internal_metadata(relative) {
            return Ok(None);
        }

        let source = self.source.join(relative);
        let target = self.mirror.join(relative);
        let existing = fs::symlink_metadata(&target).ok();

        // Symbolic links are not mirrored, matching the import walk.
        let metadata = match fs::symlink_metadata(&source) {
            Ok(metadata) if metadata.is_symlink() || self.behind_symlink(relative) => None,
            Ok(metadata) => Some(metadata),
            Err(e) if is_missing(&e) => None,
            Err(e) => return Err(MirrorError::io(source, e)),
        };

        let is_dir = metadata
            .as_ref()
            .or(existing.as_ref())
            .is_some_and(fs::Metadata::is_dir);
        if self.matcher.matches(relative, is_dir) {
            return Ok(None);
        }

        let Some(metadata) = metadata else {
            if existing.is_none() {
                return Ok(None);
            }
            self.remove(relative)?;
            return Ok(Some(AppliedChange::new(ChangeKind::Deleted, relative)));
        };

        let kind = if existing.is_some() {
            ChangeKind::Modified
        } else {
            ChangeKind::Added
        };

        if metadata.is_dir() {
            self.reconcile_directory(relative)?;
        } else if metadata.is_file() {
            self.copy_file(relative, &metadata)?;
        } else {
            return Ok(None);
        }

        Ok(Some(AppliedChange::new(kind, relative)))
    }

    /// Returns `true` if a parent of `relative` in the source is a symbolic link.
    fn behind_symlink(&self, relative: &Utf8Path) -> bool {
        relative
            .ancestors()
            .skip(1)
            .filter(|a| !a.as_str().is_empty())
            .any(|a| fs::symlink_metadata(self.source.join(a)).is_ok_and(|m| m.is_symlink()))
    }

    /// Copies one file, replacing whatever occupies the target path.
    fn copy_file(&self, relative: &Utf8Path, metadata: &fs::Metadata) -> Result<(), MirrorError> {
        let source = self.source.join(relative);
        let target = self.mirror.join(relative);

        self.prepare_parents(relative)?;
        if fs::symlink_metadata(&target).is_ok_and(|m| m.is_dir()) {
            fs::remove_dir_all(&target).map_err(|e| MirrorError::io(&target, e))?;
        }

        // `fs::copy` carries the permission bits over.
        fs::copy(&source, &target).map_err(|e| MirrorError::io(&source, e))?;

        if let Err(error) = copy_modified_time(&target, metadata) {
            tracing::debug!(path = %target, error = %error, "Could not preserve modification time");
        }
        Ok(())
    }

    /// Makes the mirror copy of directory `relative` match the source.
    fn reconcile_directory(&self, relative: &Utf8Path) -> Result<(), MirrorError> {
        let target = self.mirror.join(relative);
        self.prepare_parents(relative)?;
        if fs::symlink_metadata(&target).is_ok_and(|m| !m.is_dir()) {
            fs::remove_file(&target).map_err(|e| MirrorError::io(&target, e))?;
        }
        fs::create_dir_all(&target).map_err(|e| MirrorError::io(&target, e))?;

        let wanted = TreeWalker::new(&self.source, Arc::clone(&self.matcher))?
            .collect_files_under(relative)?;
        let present = TreeWalker::unfiltered(&self.mirror)?.collect_files_under(relative)?;

        for stale in present.iter().filter(|p| wanted.binary_search(p).is_err()) {
            self.remove(stale)?;
        }
        for file in &wanted {
            let source = self.source.join(file);
            match fs::symlink_metadata(&source) {
                Ok(metadata) if metadata.is_file() => self.copy_file(file, &metadata)?,
                Ok(_) => self.remove(file)?,
                Err(e) if is_missing(&e) => self.remove(file)?,
                Err(e) => return Err(MirrorError::io(source, e)),
            }
        }
        Ok(())
    }

    /// Removes the mirror copy of `relative` if present, then any parent
    /// directories left empty.
    fn remove(&self, relative: &Utf8Path) -> Result<(), MirrorError> {
        let target = self.mirror.join(relative);
        let result = match fs::symlink_metadata(&target) {
            Ok(m) if m.is_dir() => fs::remove_dir_all(&target),
            Ok(_) => fs::remove_file(&target),
            Err(e) if is_missing(&e) => return Ok(()),
            Err(e) => Err(e),
        };
        result.map_err(|e| MirrorError::io(&target, e))?;

        for parent in relative.ancestors().skip(1) {
            if parent.as_str().is_empty() || fs::remove_dir(self.mirror.join(parent)).is_err() {
                break;
            }
        }
        Ok(())
    }

    /// Ensures every ancestor of `relative` in the mirror is a directory.
    fn prepare_parents(&self, relative: &Utf8Path) -> Result<(), MirrorError> {
        let Some(parent) = relative.parent().filter(|p| !p.as_str().is_empty()) else {
            return Ok(());
        };

        let mut ancestors: Vec<&Utf8Path> =
            parent.ancestors().filter(|a| !a.as_str().is_empty()).collect();
        ancestors.reverse();
        for ancestor in ancestors {
            let path = self.mirror.join(ancestor);
            if fs::symlink_metadata(&path).is_ok_and(|m| !m.is_dir()) {
                fs::remove_file(&path).map_err(|e| MirrorError::io(&path, e))?;
            }
        }

        let target = self.mirror.join(parent);
        fs::create_dir_all(&target).map_err(|e| MirrorError::io(&target, e))
    }

    fn record(&mut self, message: String) -> Result<Snapshot, MirrorError> {
        let id = self.vcs.commit(&message)?;
        self.sequence += 1;
        let snapshot = Snapshot::new(id, self.sequence, message);

        tracing::info!(
            snapshot = snapshot.id.short(),
            sequence = snapshot.sequence,
            subject = snapshot.subject(),
            "Recorded snapshot"
        );
        Ok(snapshot)
    }
}

/// A path is missing when it, or one of its parents, no longer exists as a
/// directory.
fn is_missing(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

fn copy_modified_time(target: &Utf8Path, metadata: &fs::Metadata) -> io::Result<()> {
    let modified = metadata.modified()?;
    fs::File::options()
        .write(true)
        .open(target)?
        .set_modified(modified)
}

/// Builds the snapshot message summarizing `applied`.
///
/// # Examples
///
/// ```
/// use lg_mirror::{AppliedChange, snapshot_message};
/// use lg_watcher::ChangeKind;
///
/// let message = snapshot_message(&[AppliedChange::new(ChangeKind::Modified, "a.txt")]);
/// assert_eq!(message, "Modified a.txt");
/// ```
#[must_use]
pub fn snapshot_message(applied: &[AppliedChange]) -> String {
    match applied {
        [] => "No changes".to_owned(),
        [single] => format!("{} {}", single.kind, single.path),
        _ => {
            let stats = BatchStats::from_kinds(applied.iter().map(|c| c.kind));
            let mut message = format!(
                "Sync {} changes ({} added, {} modified, {} deleted)\n",
                stats.total, stats.added, stats.modified, stats.deleted
            );
            for change in applied {
                let _ = write!(message, "\n{} {}", change.kind.letter(), change.path);
            }
            message
        }
    }
}
