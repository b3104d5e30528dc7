//! [`VersionControl`] that keeps history in memory.

use camino::{Utf8Path, Utf8PathBuf};
use lg_core::SnapshotId;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use super::VersionControl;
use crate::error::VcsError;
use crate::walker::{TreeContents, TreeWalker};

#[derive(Debug)]
struct Recorded {
    id: SnapshotId,
    message: String,
    tree: TreeContents,
}

#[derive(Debug, Default)]
struct State {
    initialized: bool,
    history: Vec<Recorded>,
    published: FxHashMap<Utf8PathBuf, usize>,
    failing_commits: u32,
    failing_publishes: u32,
}

/// An in-memory version-control backend.
///
/// Each commit reads the full mirror working tree. Failures can be injected
/// to exercise retry paths.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use lg_mirror::{MemoryVcs, VersionControl};
///
/// let dir = tempfile::tempdir()?;
/// let mirror = Utf8Path::from_path(dir.path()).unwrap();
/// std::fs::write(mirror.join("a.txt"), "x")?;
///
/// let vcs = MemoryVcs::new(mirror);
/// vcs.init()?;
/// vcs.commit("init")?;
///
/// let head = vcs.head_tree().unwrap();
/// assert_eq!(head[Utf8Path::new("a.txt")], b"x");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct MemoryVcs {
    workdir: Utf8PathBuf,
    state: Mutex<State>,
}

impl MemoryVcs {
    /// Creates a backend reading the mirror at `workdir`.
    #[must_use]
    pub fn new(workdir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// Makes the next `count` commits fail.
    pub fn fail_next_commits(&self, count: u32) {
        self.state.lock().failing_commits = count;
    }

    /// Makes the next `count` publish attempts fail.
    pub fn fail_next_publishes(&self, count: u32) {
        self.state.lock().failing_publishes = count;
    }

    /// Returns the number of recorded snapshots.
    #[must_use]
    pub fn snapshot_count(&self) -> usize {
        self.state.lock().history.len()
    }

    /// Returns the messages of all recorded snapshots, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.state.lock().history.iter().map(|r| r.message.clone()).collect()
    }

    /// Returns the tree of the latest snapshot.
    #[must_use]
    pub fn head_tree(&self) -> Option<TreeContents> {
        self.state.lock().history.last().map(|r| r.tree.clone())
    }

    /// Returns the id of the latest snapshot.
    #[must_use]
    pub fn head(&self) -> Option<SnapshotId> {
        self.state.lock().history.last().map(|r| r.id.clone())
    }

    /// Returns the snapshot id the published repository at `published` points to.
    #[must_use]
    pub fn published_head(&self, published: &Utf8Path) -> Option<SnapshotId> {
        let state = self.state.lock();
        let index = *state.published.get(published)?;
        state.history.get(index).map(|r| r.id.clone())
    }

    /// Returns the tree the published repository at `published` serves.
    #[must_use]
    pub fn published_tree(&self, published: &Utf8Path) -> Option<TreeContents> {
        let state = self.state.lock();
        let index = *state.published.get(published)?;
        state.history.get(index).map(|r| r.tree.clone())
    }

    fn point_published(&self, published: &Utf8Path, create: bool) -> Result<(), VcsError> {
        let mut state = self.state.lock();
        if !create && !state.published.contains_key(published) {
            return Err(VcsError::command_failed(
                format!("publish {published}"),
                "missing",
                "published repository does not exist",
            ));
        }
        let Some(head) = state.history.len().checked_sub(1) else {
            return Err(VcsError::UnexpectedOutput("no snapshots to publish".to_owned()));
        };
        state.published.insert(published.to_owned(), head);
        Ok(())
    }
}

impl VersionControl for MemoryVcs {
    fn init(&self) -> Result<(), VcsError> {
        let mut state = self.state.lock();
        state.initialized = true;
        state.history.clear();
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<SnapshotId, VcsError> {
        {
            let mut state = self.state.lock();
            if !state.initialized {
                return Err(VcsError::UnexpectedOutput("history not initialized".to_owned()));
            }
            if state.failing_commits > 0 {
                state.failing_commits -= 1;
                return Err(VcsError::command_failed("commit", "injected", "commit failed"));
            }
        }

        let tree = TreeWalker::unfiltered(&self.workdir)
            .and_then(|walker| walker.read_all())
            .map_err(|e| VcsError::UnexpectedOutput(e.to_string()))?;

        let mut state = self.state.lock();
        let id = SnapshotId::new(format!("{:040x}", state.history.len() + 1));
        state.history.push(Recorded {
            id: id.clone(),
            message: message.to_owned(),
            tree,
        });
        Ok(id)
    }

    fn clone_published(&self, published: &Utf8Path) -> Result<(), VcsError> {
        self.point_published(published, true)
    }

    fn publish(&self, published: &Utf8Path) -> Result<(), VcsError> {
        {
            let mut state = self.state.lock();
            if state.failing_publishes > 0 {
                state.failing_publishes -= 1;
                return Err(VcsError::command_failed("publish", "injected", "publish failed"));
            }
        }
        self.point_published(published, false)
    }
}
