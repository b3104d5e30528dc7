//! Full-tree traversal for the initial import and directory reconciliation.
//!
//! [`TreeWalker`] uses the `ignore` crate's walker with every built-in filter
//! turned off: the only rules applied are the ones compiled into the
//! [`IgnoreMatcher`], so the walk agrees exactly with what the change stream
//! lets through.

use std::collections::BTreeMap;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use ignore::{DirEntry, WalkBuilder};
use lg_core::{INTERNAL_METADATA_DIR, relative_to};
use lg_watcher::IgnoreMatcher;

use crate::error::MirrorError;

/// File contents keyed by path relative to the walked root.
pub type TreeContents = BTreeMap<Utf8PathBuf, Vec<u8>>;

/// Walks a directory tree and lists the regular files that are not ignored.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use camino::Utf8Path;
/// use lg_mirror::TreeWalker;
/// use lg_watcher::IgnoreMatcher;
///
/// let root = Utf8Path::new("/path/to/project");
/// let matcher = Arc::new(IgnoreMatcher::load(root, ".gitignore")?);
/// let walker = TreeWalker::new(root, matcher)?;
///
/// for path in walker.collect_files()? {
///     println!("tracked: {path}");
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct TreeWalker {
    root: Utf8PathBuf,
    matcher: Arc<IgnoreMatcher>,
    follow_links: bool,
}

impl TreeWalker {
    /// Creates a walker for `root`, filtering with `matcher`.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::MissingRoot`] if `root` is not an existing directory.
    pub fn new(root: &Utf8Path, matcher: Arc<IgnoreMatcher>) -> Result<Self, MirrorError> {
        if !root.is_dir() {
            return Err(MirrorError::MissingRoot(root.to_owned()));
        }
        Ok(Self {
            root: root.to_owned(),
            matcher,
            follow_links: false,
        })
    }

    /// Creates a walker that applies only the implicit metadata rule.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::MissingRoot`] if `root` is not an existing directory.
    pub fn unfiltered(root: &Utf8Path) -> Result<Self, MirrorError> {
        Self::new(root, Arc::new(IgnoreMatcher::empty(root)))
    }

    /// Configures whether to follow symbolic links. Off by default.
    #[must_use]
    pub const fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Lists every non-ignored regular file, relative to the root, sorted.
    ///
    /// Entries that vanish or cannot be read during the walk are logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::NonUtf8Path`] if a path is not valid UTF-8.
    pub fn collect_files(&self) -> Result<Vec<Utf8PathBuf>, MirrorError> {
        self.collect_files_under(Utf8Path::new(""))
    }

    /// Like [`collect_files`](Self::collect_files), restricted to the
    /// subdirectory `sub` (relative to the root). A missing `sub` yields no
    /// files.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::NonUtf8Path`] if a path is not valid UTF-8.
    pub fn collect_files_under(&self, sub: &Utf8Path) -> Result<Vec<Utf8PathBuf>, MirrorError> {
        let start = self.root.join(sub);
        if !start.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for result in self.build_walker(&start) {
            let entry = match result {
                Ok(entry) => entry,
                Err(error) => {
                    tracing::warn!(error = %error, "Skipping unreadable entry during walk");
                    continue;
                }
            };

            if !self.is_regular_file(&entry) {
                continue;
            }

            let path = Utf8Path::from_path(entry.path())
                .ok_or_else(|| MirrorError::NonUtf8Path(entry.path().to_owned()))?;
            let Some(relative) = relative_to(&self.root, path) else {
                continue;
            };
            if self.matcher.matches(&relative, false) {
                continue;
            }
            files.push(relative);
        }

        files.sort();
        Ok(files)
    }

    /// Reads every non-ignored file into memory.
    ///
    /// Files removed between listing and reading are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Io`] if a listed file exists but cannot be read.
    pub fn read_all(&self) -> Result<TreeContents, MirrorError> {
        let mut contents = TreeContents::new();
        for relative in self.collect_files()? {
            let absolute = self.root.join(&relative);
            match std::fs::read(&absolute) {
                Ok(bytes) => {
                    contents.insert(relative, bytes);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(MirrorError::io(absolute, e)),
            }
        }
        Ok(contents)
    }

    /// Returns the root directory being walked.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn build_walker(&self, start: &Utf8Path) -> ignore::Walk {
        let root = self.root.clone();
        let matcher = Arc::clone(&self.matcher);
        let prune_ignored = !matcher.has_negations();

        WalkBuilder::new(start)
            // Only the compiled matcher decides what is ignored.
            .standard_filters(false)
            .follow_links(self.follow_links)
            .threads(1)
            .filter_entry(move |entry| keep_entry(&root, &matcher, prune_ignored, entry))
            .build()
    }

    fn is_regular_file(&self, entry: &DirEntry) -> bool {
        match entry.file_type() {
            Some(ft) if ft.is_file() => true,
            Some(ft) if ft.is_symlink() => self.follow_links && entry.path().is_file(),
            _ => false,
        }
    }
}

fn keep_entry(
    root: &Utf8Path,
    matcher: &IgnoreMatcher,
    prune_ignored: bool,
    entry: &DirEntry,
) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    if entry.file_name() == INTERNAL_METADATA_DIR {
        return false;
    }
    if !prune_ignored || !entry.file_type().is_some_and(|ft| ft.is_dir()) {
        return true;
    }
    let Some(relative) = Utf8Path::from_path(entry.path()).and_then(|p| relative_to(root, p))
    else {
        return true;
    };
    !matcher.matches(&relative, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn tree(files: &[(&str, &str)]) -> (TempDir, Utf8PathBuf) {
        let dir = TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        for (path, content) in files {
            let full = root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, content).unwrap();
        }
        (dir, root)
    }

    fn names(paths: &[Utf8PathBuf]) -> Vec<&str> {
        paths.iter().map(|p| p.as_str()).collect()
    }

    #[test]
    fn test_new_rejects_missing_root() {
        let result = TreeWalker::unfiltered(Utf8Path::new("/nonexistent/livegit"));
        assert!(matches!(result, Err(MirrorError::MissingRoot(_))));
    }

    #[test]
    fn test_collect_files_includes_hidden_and_skips_metadata() {
        let (_dir, root) = tree(&[
            ("a.txt", "x"),
            (".env", "secret"),
            ("src/lib.rs", "fn main() {}"),
            (".git/HEAD", "ref: refs/heads/main"),
            ("vendor/.git/config", "[core]"),
        ]);

        let files = TreeWalker::unfiltered(&root).unwrap().collect_files().unwrap();
        assert_eq!(names(&files), vec![".env", "a.txt", "src/lib.rs"]);
    }

    #[test]
    fn test_collect_files_applies_matcher() {
        let (_dir, root) = tree(&[
            ("a.txt", "x"),
            ("b.tmp", "y"),
            ("node_modules/pkg/index.js", "z"),
        ]);
        let matcher =
            IgnoreMatcher::from_lines(&root, ["*.tmp", "node_modules/"]).unwrap();

        let files = TreeWalker::new(&root, Arc::new(matcher))
            .unwrap()
            .collect_files()
            .unwrap();
        assert_eq!(names(&files), vec!["a.txt"]);
    }

    #[test]
    fn test_collect_files_respects_negation_inside_ignored_glob() {
        let (_dir, root) = tree(&[("logs/debug.log", "1"), ("logs/keep.log", "2")]);
        let matcher = IgnoreMatcher::from_lines(&root, ["*.log", "!keep.log"]).unwrap();

        let files = TreeWalker::new(&root, Arc::new(matcher))
            .unwrap()
            .collect_files()
            .unwrap();
        assert_eq!(names(&files), vec!["logs/keep.log"]);
    }

    #[test]
    fn test_collect_files_under_subdirectory() {
        let (_dir, root) = tree(&[("a.txt", "x"), ("dir/b.txt", "y"), ("dir/sub/c.txt", "z")]);
        let walker = TreeWalker::unfiltered(&root).unwrap();

        let files = walker.collect_files_under(Utf8Path::new("dir")).unwrap();
        assert_eq!(names(&files), vec!["dir/b.txt", "dir/sub/c.txt"]);
        assert!(walker.collect_files_under(Utf8Path::new("missing")).unwrap().is_empty());
    }

    #[test]
    fn test_read_all() {
        let (_dir, root) = tree(&[("a.txt", "hello"), ("b/c.txt", "world")]);
        let contents = TreeWalker::unfiltered(&root).unwrap().read_all().unwrap();

        assert_eq!(contents.len(), 2);
        assert_eq!(contents[Utf8Path::new("a.txt")], b"hello");
        assert_eq!(contents[Utf8Path::new("b/c.txt")], b"world");
    }
}
