//! The sequential apply-and-publish consumer.
//!
//! ```text
//! ChangeStream ──batch──▶ MirrorSynchronizer::apply ──snapshot──▶ RemotePublisher::publish
//! ```
//!
//! Batches are processed strictly one at a time on tokio's blocking pool.
//! The pipeline value moves into the blocking task and comes back with the
//! result, so the mirror and the published repository have exactly one writer.

use std::sync::Arc;

use camino::Utf8Path;
use futures_util::{Stream, StreamExt};
use lg_core::{MirrorConfig, Snapshot, SnapshotId};
use lg_watcher::{ChangeBatch, IgnoreMatcher};
use serde::Serialize;

use crate::error::MirrorError;
use crate::publish::{PublishState, RemotePublisher};
use crate::sync::{ApplyReport, MirrorSynchronizer};
use crate::vcs::VersionControl;

/// Counters describing a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    /// Batches received from the stream.
    pub batches: u64,
    /// Snapshots recorded, excluding the initial import.
    pub snapshots: u64,
    /// Batches whose snapshot could not be recorded.
    pub commit_failures: u64,
    /// Snapshots whose publish failed after all retries.
    pub publish_failures: u64,
    /// Events that left the mirror untouched.
    pub skipped_events: u64,
    /// The newest recorded snapshot.
    pub last_snapshot: Option<SnapshotId>,
}

enum BatchOutcome {
    Recorded { report: ApplyReport, published: bool },
    CommitFailed,
}

impl PipelineReport {
    fn record(&mut self, outcome: &BatchOutcome) {
        self.batches += 1;
        match outcome {
            BatchOutcome::Recorded { report, published } => {
                self.snapshots += 1;
                self.skipped_events += u64::try_from(report.skipped).unwrap_or(u64::MAX);
                self.last_snapshot = Some(report.snapshot.id.clone());
                if !published {
                    self.publish_failures += 1;
                }
            }
            BatchOutcome::CommitFailed => self.commit_failures += 1,
        }
    }
}

/// The synchronizer and publisher, bootstrapped and ready to consume batches.
#[derive(Debug)]
pub struct Pipeline<V> {
    synchronizer: MirrorSynchronizer<Arc<V>>,
    publisher: RemotePublisher<Arc<V>>,
    initial: Snapshot,
}

impl<V: VersionControl> Pipeline<V> {
    /// Initializes the mirror, imports the watched tree and creates the
    /// published repository.
    ///
    /// Blocking; call it from the blocking pool when inside a runtime.
    ///
    /// # Errors
    ///
    /// Any error is a startup failure: the published repository must not be
    /// served in an inconsistent initial state.
    pub fn bootstrap(
        config: &MirrorConfig,
        source: &Utf8Path,
        mirror: &Utf8Path,
        published: &Utf8Path,
        matcher: Arc<IgnoreMatcher>,
        vcs: V,
    ) -> Result<Self, MirrorError> {
        let vcs = Arc::new(vcs);
        let mut synchronizer = MirrorSynchronizer::new(source, mirror, matcher, Arc::clone(&vcs));
        let import = synchronizer.initialize()?;

        let mut publisher = RemotePublisher::new(vcs, published, config);
        publisher.initialize(&import.snapshot)?;

        tracing::info!(
            files = import.applied.len(),
            skipped = import.skipped,
            snapshot = import.snapshot.id.short(),
            "Initial import complete"
        );

        Ok(Self {
            synchronizer,
            publisher,
            initial: import.snapshot,
        })
    }

    /// Consumes `batches` until the stream ends, applying and publishing
    /// each batch in order.
    ///
    /// Commit and publish failures are logged and counted; the next batch
    /// retries them implicitly.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::Join`] if a blocking worker panicked.
    pub async fn run<S>(self, batches: S) -> Result<PipelineReport, MirrorError>
    where
        S: Stream<Item = ChangeBatch>,
    {
        tokio::pin!(batches);
        let mut pipeline = self;
        let mut report = PipelineReport {
            last_snapshot: Some(pipeline.initial.id.clone()),
            ..PipelineReport::default()
        };

        while let Some(batch) = batches.next().await {
            let stats = batch.stats();
            tracing::debug!(
                total = stats.total,
                added = stats.added,
                modified = stats.modified,
                deleted = stats.deleted,
                "Processing batch"
            );

            let (returned, outcome) = tokio::task::spawn_blocking(move || {
                let outcome = pipeline.process(&batch);
                (pipeline, outcome)
            })
            .await?;
            pipeline = returned;
            report.record(&outcome);
        }

        tracing::info!(
            batches = report.batches,
            snapshots = report.snapshots,
            commit_failures = report.commit_failures,
            publish_failures = report.publish_failures,
            "Pipeline stopped"
        );
        Ok(report)
    }

    fn process(&mut self, batch: &ChangeBatch) -> BatchOutcome {
        match self.synchronizer.apply(batch) {
            Ok(report) => {
                let published = self.publisher.publish(&report.snapshot).is_ok();
                BatchOutcome::Recorded { report, published }
            }
            Err(error) => {
                tracing::error!(
                    error = %error,
                    "Failed to record snapshot; changes will be included in the next one"
                );
                BatchOutcome::CommitFailed
            }
        }
    }

    /// Returns the snapshot recorded by the initial import.
    #[inline]
    #[must_use]
    pub const fn initial_snapshot(&self) -> &Snapshot {
        &self.initial
    }

    /// Returns the publisher's current state.
    #[inline]
    #[must_use]
    pub const fn publish_state(&self) -> &PublishState {
        self.publisher.state()
    }
}
