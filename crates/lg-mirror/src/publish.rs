//! Publishing mirror history to the served repository.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use lg_core::{MirrorConfig, Snapshot, SnapshotId};
use serde::Serialize;

use crate::error::{MirrorError, VcsError};
use crate::vcs::VersionControl;

/// What the publisher knows about the published repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PublishState {
    /// The newest snapshot known to be visible to clients.
    pub last_published: Option<SnapshotId>,
    /// Publishes that failed, after retries, since the last success.
    pub consecutive_failures: u32,
}

/// Force-synchronizes the mirror's history into the published repository.
///
/// The published repository has no other writers, so every publish is a full
/// overwrite. A snapshot whose publish failed becomes visible with the next
/// successful publish; nothing is rolled back.
#[derive(Debug)]
pub struct RemotePublisher<V> {
    vcs: V,
    published: Utf8PathBuf,
    attempts: u32,
    backoff: Duration,
    state: PublishState,
}

impl<V: VersionControl> RemotePublisher<V> {
    /// Creates a publisher writing to `published`, with the retry policy from `config`.
    #[must_use]
    pub fn new(vcs: V, published: &Utf8Path, config: &MirrorConfig) -> Self {
        Self {
            vcs,
            published: published.to_owned(),
            attempts: config.publish_attempts.max(1),
            backoff: config.retry_backoff(),
            state: PublishState::default(),
        }
    }

    /// Creates the published repository from the mirror's first snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Vcs`] if the repository cannot be created.
    /// This is a startup failure and is not retried.
    pub fn initialize(&mut self, snapshot: &Snapshot) -> Result<(), MirrorError> {
        self.vcs.clone_published(&self.published)?;
        self.state.last_published = Some(snapshot.id.clone());
        tracing::info!(
            path = %self.published,
            snapshot = snapshot.id.short(),
            "Created published repository"
        );
        Ok(())
    }

    /// Publishes the mirror history, retrying with linear backoff.
    ///
    /// Blocks the calling thread between attempts.
    ///
    /// # Errors
    ///
    /// Returns the last [`VcsError`] once every attempt has failed.
    pub fn publish(&mut self, snapshot: &Snapshot) -> Result<(), VcsError> {
        let mut attempt = 1;
        loop {
            match self.vcs.publish(&self.published) {
                Ok(()) => {
                    self.state.last_published = Some(snapshot.id.clone());
                    self.state.consecutive_failures = 0;
                    tracing::info!(snapshot = snapshot.id.short(), attempt, "Published snapshot");
                    return Ok(());
                }
                Err(error) if attempt < self.attempts => {
                    tracing::warn!(attempt, error = %error, "Publish failed, retrying");
                    std::thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                Err(error) => {
                    self.state.consecutive_failures += 1;
                    tracing::error!(
                        snapshot = snapshot.id.short(),
                        attempts = self.attempts,
                        consecutive_failures = self.state.consecutive_failures,
                        error = %error,
                        "Publish failed; the next snapshot will publish it"
                    );
                    return Err(error);
                }
            }
        }
    }

    /// Returns `true` if `snapshot` is the newest published one.
    #[must_use]
    pub fn is_current(&self, snapshot: &Snapshot) -> bool {
        self.state.last_published.as_ref() == Some(&snapshot.id)
    }

    /// Returns the current publish state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> &PublishState {
        &self.state
    }

    /// Returns the published repository path.
    #[inline]
    #[must_use]
    pub fn published(&self) -> &Utf8Path {
        &self.published
    }
}
