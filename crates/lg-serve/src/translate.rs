//! Request path translation.
//!
//! [`PathTranslator`] maps a request path under the configured prefix onto
//! the published repository. Anything else is a [`Rejection`], which the
//! server answers with 404; a rejected request never reaches the file
//! service.

use camino::{Utf8Path, Utf8PathBuf};
use percent_encoding::percent_decode_str;

/// Why a request path was not translated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The path does not start with the served prefix.
    #[error("path is outside the served prefix")]
    OutsidePrefix,

    /// A segment is `.` or `..`, or smuggles a separator.
    #[error("path segment escapes the repository root")]
    Traversal,

    /// A segment is not valid percent-encoded UTF-8.
    #[error("path is not valid UTF-8")]
    Malformed,
}

/// A request path resolved against the published repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    /// Filesystem path inside the published repository.
    pub path: Utf8PathBuf,

    /// The request path with the prefix removed, still percent-encoded and
    /// always starting with `/`.
    pub remainder: String,
}

/// Translates request paths under one prefix onto one directory.
///
/// # Examples
///
/// ```
/// use camino::Utf8Path;
/// use lg_serve::{PathTranslator, Rejection};
///
/// let translator = PathTranslator::new("/user/module/", Utf8Path::new("/srv/bare"));
///
/// let resolved = translator.translate("/user/module/info/refs").unwrap();
/// assert_eq!(resolved.path, "/srv/bare/info/refs");
/// assert_eq!(resolved.remainder, "/info/refs");
///
/// assert_eq!(translator.translate("/etc/passwd"), Err(Rejection::OutsidePrefix));
/// ```
#[derive(Debug, Clone)]
pub struct PathTranslator {
    prefix: String,
    root: Utf8PathBuf,
}

impl PathTranslator {
    /// Creates a translator. `prefix` is normalized to one leading and one
    /// trailing slash.
    #[must_use]
    pub fn new(prefix: &str, root: &Utf8Path) -> Self {
        let trimmed = prefix.trim_matches('/');
        let prefix = if trimmed.is_empty() {
            "/".to_owned()
        } else {
            format!("/{trimmed}/")
        };
        Self {
            prefix,
            root: root.to_owned(),
        }
    }

    /// Returns the normalized prefix.
    #[inline]
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the directory requests resolve into.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Translates `request_path` (the raw, percent-encoded URI path).
    ///
    /// The prefix without its trailing slash maps to the root.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] if the path is outside the prefix or any
    /// segment could leave the root.
    pub fn translate(&self, request_path: &str) -> Result<Resolved, Rejection> {
        let rest = if request_path == self.prefix.trim_end_matches('/') {
            ""
        } else {
            request_path
                .strip_prefix(self.prefix.as_str())
                .ok_or(Rejection::OutsidePrefix)?
        };

        let mut path = self.root.clone();
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            let decoded = percent_decode_str(segment)
                .decode_utf8()
                .map_err(|_| Rejection::Malformed)?;
            if decoded == "." || decoded == ".." || decoded.contains(['/', '\\', '\0']) {
                return Err(Rejection::Traversal);
            }
            path.push(&*decoded);
        }

        Ok(Resolved {
            path,
            remainder: format!("/{rest}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> PathTranslator {
        PathTranslator::new("/user/module/", Utf8Path::new("/srv/bare"))
    }

    #[test]
    fn test_prefix_is_normalized() {
        assert_eq!(PathTranslator::new("user/module", Utf8Path::new("/r")).prefix(), "/user/module/");
        assert_eq!(PathTranslator::new("/", Utf8Path::new("/r")).prefix(), "/");
        assert_eq!(PathTranslator::new("", Utf8Path::new("/r")).prefix(), "/");
    }

    #[test]
    fn test_translate_under_prefix() {
        let resolved = translator().translate("/user/module/info/refs").unwrap();
        assert_eq!(resolved.path, Utf8Path::new("/srv/bare/info/refs"));
        assert_eq!(resolved.remainder, "/info/refs");
    }

    #[test]
    fn test_other_prefix_is_rejected() {
        assert_eq!(translator().translate("/other/info/refs"), Err(Rejection::OutsidePrefix));
        assert_eq!(translator().translate("/user/modulex/info/refs"), Err(Rejection::OutsidePrefix));
    }

    #[test]
    fn test_system_path_never_resolves_outside_root() {
        assert_eq!(translator().translate("/etc/passwd"), Err(Rejection::OutsidePrefix));

        let root_prefix = PathTranslator::new("/", Utf8Path::new("/srv/bare"));
        let resolved = root_prefix.translate("/etc/passwd").unwrap();
        assert!(resolved.path.starts_with("/srv/bare"));
    }

    #[test]
    fn test_prefix_without_trailing_slash_maps_to_root() {
        let resolved = translator().translate("/user/module").unwrap();
        assert_eq!(resolved.path, Utf8Path::new("/srv/bare"));
        assert_eq!(resolved.remainder, "/");

        let resolved = translator().translate("/user/module/").unwrap();
        assert_eq!(resolved.remainder, "/");
    }

    #[test]
    fn test_dot_segments_are_rejected() {
        let t = translator();
        for path in [
            "/user/module/../../etc/passwd",
            "/user/module/./info/refs",
            "/user/module/%2e%2e/secret",
            "/user/module/%2E./secret",
            "/user/module/objects/..",
        ] {
            assert_eq!(t.translate(path), Err(Rejection::Traversal), "{path}");
        }
    }

    #[test]
    fn test_encoded_separators_are_rejected() {
        let t = translator();
        assert_eq!(t.translate("/user/module/a%2f..%2fb"), Err(Rejection::Traversal));
        assert_eq!(t.translate("/user/module/a%5Cb"), Err(Rejection::Traversal));
        assert_eq!(t.translate("/user/module/a%00b"), Err(Rejection::Traversal));
    }

    #[test]
    fn test_invalid_utf8_is_rejected() {
        assert_eq!(translator().translate("/user/module/%ff"), Err(Rejection::Malformed));
    }

    #[test]
    fn test_encoded_names_are_decoded() {
        let resolved = translator().translate("/user/module/a%20b/c").unwrap();
        assert_eq!(resolved.path, Utf8Path::new("/srv/bare/a b/c"));
        assert_eq!(resolved.remainder, "/a%20b/c");
    }

    #[test]
    fn test_repeated_slashes_collapse() {
        let resolved = translator().translate("/user/module//objects//info").unwrap();
        assert_eq!(resolved.path, Utf8Path::new("/srv/bare/objects/info"));
    }
}
