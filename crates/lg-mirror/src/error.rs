//! Error types for the lg-mirror crate.
//!
//! This module provides [`VcsError`] for failures of the version-control
//! collaborator and [`MirrorError`] for everything else that can go wrong
//! while maintaining the mirror.

use camino::Utf8PathBuf;

/// Errors reported by a [`VersionControl`](crate::VersionControl) backend.
///
/// Every variant is recoverable from the pipeline's point of view: the
/// snapshot or publish is retried by the next batch.
#[derive(Debug, thiserror::Error)]
pub enum VcsError {
    /// The version-control executable could not be started.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// The executable that was invoked.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A version-control command exited unsuccessfully.
    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        /// The command line, without the executable.
        command: String,
        /// The rendered exit status.
        status: String,
        /// Captured standard error, trimmed.
        stderr: String,
    },

    /// A command succeeded but produced output that could not be used.
    #[error("unexpected version-control output: {0}")]
    UnexpectedOutput(String),

    /// Reading the working tree failed.
    #[error("failed to read working tree: {0}")]
    Io(#[from] std::io::Error),
}

impl VcsError {
    /// Creates a new [`VcsError::CommandFailed`] error.
    #[inline]
    pub fn command_failed(
        command: impl Into<String>,
        status: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::CommandFailed {
            command: command.into(),
            status: status.into(),
            stderr: stderr.into(),
        }
    }
}

/// Errors that can occur while maintaining the mirror.
///
/// # Error Recovery Strategy
///
/// - **Version control** ([`MirrorError::Vcs`]): Recoverable - retried by the next batch
/// - **File I/O** ([`MirrorError::Io`]): Recoverable - the single event is skipped
/// - **Non-UTF-8 path** ([`MirrorError::NonUtf8Path`]): Recoverable - skip and continue
/// - **Missing root** ([`MirrorError::MissingRoot`]): Fatal - nothing to mirror
/// - **Workspace** ([`MirrorError::Workspace`]): Fatal - no place to keep history
/// - **Join** ([`MirrorError::Join`]): Fatal - the blocking worker panicked
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// The version-control collaborator failed.
    #[error(transparent)]
    Vcs(#[from] VcsError),

    /// A filesystem operation on a specific path failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path being read or written.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// The tree to walk does not exist or is not a directory.
    #[error("not a directory: {0}")]
    MissingRoot(Utf8PathBuf),

    /// The temporary workspace could not be prepared.
    #[error("workspace error: {0}")]
    Workspace(String),

    /// A blocking worker panicked or was cancelled.
    #[error("mirror worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl MirrorError {
    /// Creates a new [`MirrorError::Io`] error.
    #[inline]
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a new [`MirrorError::Workspace`] error.
    #[inline]
    pub fn workspace(message: impl Into<String>) -> Self {
        Self::Workspace(message.into())
    }

    /// Returns `true` if this error is recoverable (mirroring can continue).
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Vcs(_) | Self::Io { .. } | Self::NonUtf8Path(_))
    }

    /// Returns `true` if this error is fatal.
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_vcs_error_display() {
        let err = VcsError::command_failed("git push --mirror", "exit status: 128", "fatal: nope");
        assert_eq!(
            err.to_string(),
            "`git push --mirror` failed (exit status: 128): fatal: nope"
        );
    }

    #[test]
    fn test_vcs_errors_are_recoverable() {
        let err = MirrorError::from(VcsError::UnexpectedOutput("empty".to_owned()));
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_io_error_is_recoverable() {
        let err = MirrorError::io(
            "src/a.txt",
            io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("src/a.txt"));
    }

    #[test]
    fn test_workspace_error_is_fatal() {
        let err = MirrorError::workspace("cannot create temporary directory");
        assert!(err.is_fatal());
        assert!(MirrorError::MissingRoot(Utf8PathBuf::from("/x")).is_fatal());
    }
}
