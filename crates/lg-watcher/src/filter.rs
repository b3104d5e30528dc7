//! Path filtering for change events.
//!
//! The [`FileFilter`] trait is the predicate the change stream applies to
//! every event before batching. [`IgnoreMatcher`] is the production filter:
//! it compiles gitignore-style rules once at startup and is immutable
//! afterwards.
//!
//! # Examples
//!
//! ```
//! use lg_watcher::{FileFilter, IgnoreMatcher};
//! use camino::Utf8Path;
//!
//! let matcher = IgnoreMatcher::from_lines(Utf8Path::new("/work"), ["*.tmp", "!keep.tmp"]).unwrap();
//!
//! assert!(matcher.matches(Utf8Path::new("scratch.tmp"), false));
//! assert!(!matcher.matches(Utf8Path::new("keep.tmp"), false));
//! assert!(matcher.should_process(Utf8Path::new("src/lib.rs")));
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use lg_core::is_internal_metadata;

use crate::error::WatchError;

/// A filter for determining which change events to process.
///
/// Filters must be [`Send`] and [`Sync`] because they are shared between
/// the watcher and the mirror, which run on different threads.
pub trait FileFilter: Send + Sync + 'static {
    /// Returns `true` if the path (relative to the watched root) should be processed.
    fn should_process(&self, path: &Utf8Path) -> bool;
}

/// A filter that accepts all files.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAllFilter;

impl FileFilter for AcceptAllFilter {
    #[inline]
    fn should_process(&self, _path: &Utf8Path) -> bool {
        true
    }
}

/// Compiled ignore rules for the watched tree.
///
/// Rules follow gitignore semantics: later patterns override earlier ones,
/// `!pattern` re-includes a path, a trailing `/` restricts a pattern to
/// directories and a leading `/` anchors it to the root. The internal
/// metadata directory is always ignored and no rule can re-include it.
///
/// Malformed pattern lines are logged and skipped.
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    root: Utf8PathBuf,
    rules: Gitignore,
    skipped_lines: usize,
}

impl IgnoreMatcher {
    /// Creates a matcher with only the implicit internal-metadata rule.
    #[must_use]
    pub fn empty(root: &Utf8Path) -> Self {
        Self {
            root: root.to_owned(),
            rules: Gitignore::empty(),
            skipped_lines: 0,
        }
    }

    /// Compiles a matcher from pattern lines.
    ///
    /// Blank lines and `#` comments are accepted and have no effect.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Ignore`] if the compiled rule set cannot be built.
    /// Individual malformed lines never produce an error.
    pub fn from_lines<I, S>(root: &Utf8Path, lines: I) -> Result<Self, WatchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GitignoreBuilder::new(root.as_std_path());
        let mut skipped_lines = 0;

        for (number, line) in lines.into_iter().enumerate() {
            let line = line.as_ref();
            if let Err(error) = builder.add_line(None, line) {
                tracing::warn!(
                    line = number + 1,
                    pattern = line,
                    error = %error,
                    "Skipping malformed ignore pattern"
                );
                skipped_lines += 1;
            }
        }

        Ok(Self {
            root: root.to_owned(),
            rules: builder.build()?,
            skipped_lines,
        })
    }

    /// Loads the ignore file `file_name` from the watched root.
    ///
    /// A missing file yields a matcher with only the implicit rule.
    ///
    /// # Errors
    ///
    /// Returns [`WatchError::Io`] if the file exists but cannot be read.
    pub fn load(root: &Utf8Path, file_name: &str) -> Result<Self, WatchError> {
        let path = root.join(file_name);
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let matcher = Self::from_lines(root, content.lines())?;
                tracing::info!(
                    path = %path,
                    rules = matcher.rule_count(),
                    skipped = matcher.skipped_lines(),
                    "Loaded ignore rules"
                );
                Ok(matcher)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path, "No ignore file, using implicit rules only");
                Ok(Self::empty(root))
            }
            Err(e) => Err(WatchError::Io(e)),
        }
    }

    /// Returns `true` if `path` (relative to the root) is ignored.
    ///
    /// The path itself is checked first, then each parent directory, so a
    /// file inside an ignored directory is ignored too.
    #[must_use]
    pub fn matches(&self, path: &Utf8Path, is_dir: bool) -> bool {
        if is_internal_metadata(path) {
            return true;
        }
        if path.has_root() || path.as_str().is_empty() {
            return false;
        }
        self.rules
            .matched_path_or_any_parents(path.as_std_path(), is_dir)
            .is_ignore()
    }

    /// Like [`matches`](Self::matches), looking up whether the path is a
    /// directory on disk under the watched root.
    #[must_use]
    pub fn matches_on_disk(&self, path: &Utf8Path) -> bool {
        self.matches(path, self.root.join(path).is_dir())
    }

    /// Returns the watched root these rules are anchored to.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the number of compiled rules, not counting the implicit one.
    #[inline]
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if any rule re-includes paths with `!`.
    ///
    /// Without negations, a directory that matches can be skipped wholesale
    /// because nothing beneath it can be re-included.
    #[inline]
    #[must_use]
    pub fn has_negations(&self) -> bool {
        self.rules.num_whitelists() > 0
    }

    /// Returns the number of pattern lines skipped as malformed.
    #[inline]
    #[must_use]
    pub const fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }
}

impl FileFilter for IgnoreMatcher {
    fn should_process(&self, path: &Utf8Path) -> bool {
        !self.matches_on_disk(path)
    }
}

impl<F: FileFilter + ?Sized> FileFilter for Box<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}

impl<F: FileFilter + ?Sized> FileFilter for std::sync::Arc<F> {
    fn should_process(&self, path: &Utf8Path) -> bool {
        (**self).should_process(path)
    }
}
