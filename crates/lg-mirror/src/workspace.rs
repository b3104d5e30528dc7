//! The temporary workspace holding the mirror and the published repository.

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;

use crate::error::MirrorError;

/// Name of the mirror working directory inside the workspace.
pub const MIRROR_DIR: &str = "staging";

/// Name of the published repository inside the workspace.
pub const PUBLISHED_DIR: &str = "bare";

/// A temporary directory that owns all pipeline state.
///
/// The mirror directory is created eagerly; the published repository is
/// created by the first clone. Everything is removed when the workspace is
/// dropped or [closed](Self::close).
///
/// # Examples
///
/// ```
/// use lg_mirror::Workspace;
///
/// let workspace = Workspace::create("livegit__")?;
/// assert!(workspace.mirror().is_dir());
/// assert!(workspace.published().ends_with("bare"));
/// # Ok::<(), lg_mirror::MirrorError>(())
/// ```
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    /// Creates a workspace in the system temporary directory.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Workspace`] if the directory cannot be created
    /// and [`MirrorError::NonUtf8Path`] if its path is not valid UTF-8.
    pub fn create(prefix: &str) -> Result<Self, MirrorError> {
        Self::build(tempfile::Builder::new().prefix(prefix).tempdir())
    }

    /// Creates a workspace inside `parent`.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub fn create_in(parent: &Utf8Path, prefix: &str) -> Result<Self, MirrorError> {
        Self::build(tempfile::Builder::new().prefix(prefix).tempdir_in(parent))
    }

    fn build(dir: std::io::Result<TempDir>) -> Result<Self, MirrorError> {
        let dir = dir
            .map_err(|e| MirrorError::workspace(format!("cannot create temporary directory: {e}")))?;
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
            .map_err(MirrorError::NonUtf8Path)?;

        let mirror = root.join(MIRROR_DIR);
        std::fs::create_dir(&mirror).map_err(|e| MirrorError::io(&mirror, e))?;

        tracing::debug!(path = %root, "Created workspace");
        Ok(Self { dir, root })
    }

    /// Checks that the workspace does not live inside the watched tree.
    ///
    /// A mirror under the watched root would report its own writes as
    /// changes and copy itself recursively.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Workspace`] if `watched` contains the
    /// workspace, or [`MirrorError::Io`] if either path cannot be resolved.
    pub fn ensure_outside(&self, watched: &Utf8Path) -> Result<(), MirrorError> {
        let root = self
            .root
            .canonicalize_utf8()
            .map_err(|e| MirrorError::io(&self.root, e))?;
        let watched = watched
            .canonicalize_utf8()
            .map_err(|e| MirrorError::io(watched, e))?;

        if root.starts_with(&watched) {
            return Err(MirrorError::workspace(format!(
                "workspace {root} is inside the watched directory {watched}; \
                 set TMPDIR to a directory outside it"
            )));
        }
        Ok(())
    }

    /// Returns the workspace root.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the mirror working directory.
    #[must_use]
    pub fn mirror(&self) -> Utf8PathBuf {
        self.root.join(MIRROR_DIR)
    }

    /// Returns the published repository path.
    #[must_use]
    pub fn published(&self) -> Utf8PathBuf {
        self.root.join(PUBLISHED_DIR)
    }

    /// Removes the workspace, reporting failures instead of ignoring them.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Io`] if the directory could not be removed.
    pub fn close(self) -> Result<(), MirrorError> {
        let root = self.root;
        self.dir.close().map_err(|e| MirrorError::io(root, e))
    }
}
