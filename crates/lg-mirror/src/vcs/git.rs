//! [`VersionControl`] backed by the `git` executable.

use std::process::Command;

use camino::{Utf8Path, Utf8PathBuf};
use lg_core::SnapshotId;

use super::VersionControl;
use crate::error::VcsError;

/// Identity recorded on every snapshot.
const COMMITTER_NAME: &str = "livegit";
const COMMITTER_EMAIL: &str = "livegit@localhost";

/// Branch the mirror history lives on.
pub const DEFAULT_BRANCH: &str = "main";

/// Drives `git` as a subprocess against one mirror working directory.
///
/// Commits use a fixed identity and never sign or run hooks, so the user's
/// global git configuration cannot make a snapshot fail or prompt.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    workdir: Utf8PathBuf,
}

impl GitCli {
    /// Creates a backend for the mirror at `workdir` using `git` from `PATH`.
    #[must_use]
    pub fn new(workdir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            program: "git".to_owned(),
            workdir: workdir.into(),
        }
    }

    /// Uses a specific executable instead of `git` from `PATH`.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Returns the mirror working directory.
    #[inline]
    #[must_use]
    pub fn workdir(&self) -> &Utf8Path {
        &self.workdir
    }

    /// Returns `true` if the executable can be run.
    #[must_use]
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .is_ok_and(|output| output.status.success())
    }

    /// Runs the executable with `args` in `cwd` and returns its stdout.
    fn run(&self, cwd: &Utf8Path, args: &[&str]) -> Result<String, VcsError> {
        tracing::trace!(cwd = %cwd, args = ?args, "Running git");

        let output = Command::new(&self.program)
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|source| VcsError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(VcsError::command_failed(
                format!("{} {}", self.program, args.join(" ")),
                output.status.to_string(),
                String::from_utf8_lossy(&output.stderr).trim(),
            ))
        }
    }

    /// Regenerates the index files dumb-HTTP clients read.
    fn update_server_info(&self, published: &Utf8Path) -> Result<(), VcsError> {
        self.run(published, &["update-server-info"]).map(drop)
    }
}

impl VersionControl for GitCli {
    fn init(&self) -> Result<(), VcsError> {
        self.run(&self.workdir, &["init", "--quiet"])?;
        let head = format!("refs/heads/{DEFAULT_BRANCH}");
        self.run(&self.workdir, &["symbolic-ref", "HEAD", &head])?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<SnapshotId, VcsError> {
        let name = format!("user.name={COMMITTER_NAME}");
        let email = format!("user.email={COMMITTER_EMAIL}");

        // The mirror already holds exactly the filtered tree; global excludes
        // must not drop anything from it.
        self.run(&self.workdir, &["add", "--all", "--force", "--", "."])?;
        self.run(
            &self.workdir,
            &[
                "-c",
                &name,
                "-c",
                &email,
                "-c",
                "commit.gpgsign=false",
                "commit",
                "--quiet",
                "--allow-empty",
                "--no-verify",
                "--message",
                message,
            ],
        )?;

        let head = self.run(&self.workdir, &["rev-parse", "HEAD"])?;
        let head = head.trim();
        if head.is_empty() {
            return Err(VcsError::UnexpectedOutput(
                "rev-parse HEAD printed nothing".to_owned(),
            ));
        }
        Ok(SnapshotId::new(head))
    }

    fn clone_published(&self, published: &Utf8Path) -> Result<(), VcsError> {
        self.run(
            &self.workdir,
            &["clone", "--bare", "--quiet", self.workdir.as_str(), published.as_str()],
        )?;
        self.update_server_info(published)
    }

    fn publish(&self, published: &Utf8Path) -> Result<(), VcsError> {
        self.run(
            &self.workdir,
            &["push", "--force", "--mirror", "--quiet", published.as_str()],
        )?;
        self.update_server_info(published)
    }
}
