//! Relative-path helpers shared by the watcher and the mirror.
//!
//! Every path that crosses a component boundary is relative to the watched
//! root. These helpers convert notifier paths and recognise the internal
//! version-control metadata directory, which is never mirrored.

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

/// Name of the internal metadata directory that is always ignored.
pub const INTERNAL_METADATA_DIR: &str = ".git";

/// Returns `path` relative to `root`, or `None` if it lies outside `root`
/// or names `root` itself.
///
/// # Examples
///
/// ```
/// use lg_core::relative_to;
/// use camino::Utf8Path;
///
/// let rel = relative_to(Utf8Path::new("/work"), Utf8Path::new("/work/src/a.txt"));
/// assert_eq!(rel.as_deref().map(|p| p.as_str()), Some("src/a.txt"));
/// assert!(relative_to(Utf8Path::new("/work"), Utf8Path::new("/other/a.txt")).is_none());
/// ```
#[must_use]
pub fn relative_to(root: &Utf8Path, path: &Utf8Path) -> Option<Utf8PathBuf> {
    let rel = path.strip_prefix(root).ok()?;
    if rel.as_str().is_empty() {
        return None;
    }
    Some(rel.to_owned())
}

/// Returns `true` if any component of `path` is the internal metadata directory.
///
/// # Examples
///
/// ```
/// use lg_core::is_internal_metadata;
/// use camino::Utf8Path;
///
/// assert!(is_internal_metadata(Utf8Path::new(".git/HEAD")));
/// assert!(is_internal_metadata(Utf8Path::new("vendor/lib/.git")));
/// assert!(!is_internal_metadata(Utf8Path::new("src/.gitignore")));
/// ```
#[must_use]
pub fn is_internal_metadata(path: &Utf8Path) -> bool {
    path.components()
        .any(|c| matches!(c, Utf8Component::Normal(name) if name == INTERNAL_METADATA_DIR))
}
