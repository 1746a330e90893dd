//! Success batching and notification coalescing
//!
//! The first success after a quiet period is urgent and flushes
//! immediately with the webhook notification. Later successes arriving
//! within the quiet window are debounced into a single batch email sent one
//! quiet window after the *last* arrival (trailing-edge debounce, not a
//! fixed-interval batch). Failures bypass batching entirely.
//!
//! All buffer mutations are serialized behind one async mutex, so the
//! append-then-decide step is atomic with respect to concurrent arrivals.
//! Flush I/O runs on a frozen snapshot taken under the lock (copy-then-
//! clear). A superseded timer can never flush: each re-arm bumps a
//! generation counter that the timer re-checks under the lock before
//! taking the buffer.

use chrono::Utc;
use doorwatch_common::events::{AnalysisEvent, EventBus};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::services::archiver::{Archiver, Disposition};
use crate::services::mailer::Mailer;
use crate::services::notifier::Notifier;
use crate::types::Artifact;

struct PendingFlush {
    generation: u64,
    handle: JoinHandle<()>,
}

struct BatchState {
    buffer: Vec<Artifact>,
    /// Timestamp of the previous successful admission, compared against the
    /// quiet window before it is updated
    last_admission: Option<Instant>,
    pending: Option<PendingFlush>,
    generation: u64,
}

impl BatchState {
    /// Cancel the pending flush timer, if any. Idempotent; aborting an
    /// already-finished task is a no-op.
    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
        }
    }
}

pub struct BatchCoalescer {
    quiet_window: Duration,
    state: Mutex<BatchState>,
    archiver: Arc<Archiver>,
    mailer: Arc<dyn Mailer>,
    notifier: Arc<dyn Notifier>,
    event_bus: EventBus,
}

impl BatchCoalescer {
    pub fn new(
        quiet_window: Duration,
        archiver: Arc<Archiver>,
        mailer: Arc<dyn Mailer>,
        notifier: Arc<dyn Notifier>,
        event_bus: EventBus,
    ) -> Arc<Self> {
        Arc::new(Self {
            quiet_window,
            state: Mutex::new(BatchState {
                buffer: Vec::new(),
                last_admission: None,
                pending: None,
                generation: 0,
            }),
            archiver,
            mailer,
            notifier,
            event_bus,
        })
    }

    /// Admit one successfully classified artifact
    ///
    /// A success arriving after the quiet window has already elapsed since
    /// the previous one flushes immediately (including this artifact) with
    /// the webhook notification. Anything else re-arms the single pending
    /// timer for one quiet window from now. The very first success of a
    /// process has no previous admission to measure against and is
    /// buffered.
    pub async fn on_success(self: &Arc<Self>, artifact: Artifact) {
        let immediate_batch = {
            let mut state = self.state.lock().await;
            state.buffer.push(artifact);

            let now = Instant::now();
            let fresh_burst = state
                .last_admission
                .map_or(false, |previous| now.duration_since(previous) >= self.quiet_window);
            state.last_admission = Some(now);

            state.cancel_pending();
            if fresh_burst {
                Some(std::mem::take(&mut state.buffer))
            } else {
                state.generation += 1;
                let generation = state.generation;
                let coalescer = Arc::clone(self);
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(coalescer.quiet_window).await;
                    coalescer.flush_pending(generation).await;
                });
                state.pending = Some(PendingFlush { generation, handle });

                self.event_bus.emit(AnalysisEvent::FlushScheduled {
                    buffered: state.buffer.len(),
                    flush_in_seconds: self.quiet_window.as_secs(),
                    timestamp: Utc::now(),
                });
                None
            }
        };

        if let Some(batch) = immediate_batch {
            info!("Fresh burst, flushing {} artifact(s) immediately", batch.len());
            self.flush(batch, true).await;
        }
    }

    /// Route a failed artifact straight to the failure archive, unbatched
    pub async fn on_failure(&self, artifact: Artifact) {
        if let Err(e) = self.archiver.archive(&artifact, Disposition::Failure).await {
            error!("Failed to archive {} as failure: {}", artifact.name(), e);
        }
        self.archiver.delete_local(&artifact).await;
    }

    /// Timer body: flush only if this timer is still the armed one
    async fn flush_pending(self: &Arc<Self>, generation: u64) {
        let batch = {
            let mut state = self.state.lock().await;
            match &state.pending {
                Some(pending) if pending.generation == generation => {
                    state.pending = None;
                    std::mem::take(&mut state.buffer)
                }
                _ => {
                    debug!("Superseded flush timer (generation {}), skipping", generation);
                    return;
                }
            }
        };
        self.flush(batch, false).await;
    }

    /// Deliver one batch: webhook (when firing), one batch email, then
    /// per-artifact archive + local delete. Collaborator failures are
    /// isolated; archival and deletion proceed regardless of notification
    /// or email problems. An empty batch does nothing.
    async fn flush(&self, batch: Vec<Artifact>, fire_notification: bool) {
        if batch.is_empty() {
            return;
        }

        if fire_notification {
            if let Err(e) = self.notifier.send_notification().await {
                error!("Error sending notification: {}", e);
            }
        }

        if let Err(e) = self.mailer.send_batch(&batch).await {
            error!("Error sending batch email: {}", e);
        }

        let single = batch.len() == 1;
        for artifact in &batch {
            match self.archiver.archive(artifact, Disposition::Success).await {
                Ok(Some(location)) if single => {
                    if let Err(e) = self.notifier.send_after_stored(&location).await {
                        error!("Error sending after-stored callback: {}", e);
                    }
                }
                Ok(_) => {}
                Err(e) => error!("Failed to archive {}: {}", artifact.name(), e),
            }
            self.archiver.delete_local(artifact).await;
        }

        self.event_bus.emit(AnalysisEvent::BatchFlushed {
            artifact_count: batch.len(),
            fired_notification: fire_notification,
            timestamp: Utc::now(),
        });
        info!(
            "Flushed {} artifact(s), notification fired: {}",
            batch.len(),
            fire_notification
        );
    }

    /// Number of artifacts currently buffered (diagnostics)
    pub async fn buffered(&self) -> usize {
        self.state.lock().await.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::archiver::{ObjectStore, StoreError};
    use crate::services::mailer::MailError;
    use crate::services::notifier::NotifyError;
    use async_trait::async_trait;
    use std::io::Write;
    use std::sync::Mutex as StdMutex;

    /// Records every collaborator interaction with a logical timestamp
    #[derive(Default)]
    struct Recording {
        emails: Vec<Vec<String>>,
        notifications: usize,
        after_stored: Vec<String>,
        puts: Vec<String>,
        fail_email: bool,
    }

    struct RecordingRig {
        inner: StdMutex<Recording>,
    }

    impl RecordingRig {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: StdMutex::new(Recording::default()),
            })
        }

        fn with_failing_email() -> Arc<Self> {
            let rig = Self::new();
            rig.inner.lock().unwrap().fail_email = true;
            rig
        }
    }

    #[async_trait]
    impl ObjectStore for RecordingRig {
        async fn put(&self, key: &str, _bytes: Vec<u8>) -> Result<String, StoreError> {
            self.inner.lock().unwrap().puts.push(key.to_string());
            Ok(format!("memory://{}", key))
        }

        async fn presign(&self, key: &str, _ttl: Duration) -> Result<String, StoreError> {
            Ok(format!("memory://{}?signed", key))
        }
    }

    #[async_trait]
    impl Mailer for RecordingRig {
        async fn send_batch(&self, files: &[Artifact]) -> Result<(), MailError> {
            let mut inner = self.inner.lock().unwrap();
            if inner.fail_email {
                return Err(MailError::Transport("relay down".to_string()));
            }
            inner
                .emails
                .push(files.iter().map(|f| f.name().to_string()).collect());
            Ok(())
        }
    }

    #[async_trait]
    impl Notifier for RecordingRig {
        async fn send_notification(&self) -> Result<(), NotifyError> {
            self.inner.lock().unwrap().notifications += 1;
            Ok(())
        }

        async fn send_after_stored(&self, location: &str) -> Result<(), NotifyError> {
            self.inner
                .lock()
                .unwrap()
                .after_stored
                .push(location.to_string());
            Ok(())
        }
    }

    struct Fixture {
        rig: Arc<RecordingRig>,
        coalescer: Arc<BatchCoalescer>,
        dir: tempfile::TempDir,
    }

    fn fixture_with(rig: Arc<RecordingRig>, quiet_window: Duration) -> Fixture {
        let archiver = Arc::new(Archiver::new(
            Arc::clone(&rig) as Arc<dyn ObjectStore>,
            Duration::from_secs(3600),
        ));
        let coalescer = BatchCoalescer::new(
            quiet_window,
            archiver,
            Arc::clone(&rig) as Arc<dyn Mailer>,
            Arc::clone(&rig) as Arc<dyn Notifier>,
            EventBus::new(64),
        );
        Fixture {
            rig,
            coalescer,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn fixture(quiet_window: Duration) -> Fixture {
        fixture_with(RecordingRig::new(), quiet_window)
    }

    impl Fixture {
        fn artifact(&self, name: &str) -> Artifact {
            let path = self.dir.path().join(name);
            std::fs::File::create(&path)
                .unwrap()
                .write_all(b"jpeg")
                .unwrap();
            Artifact::new(path)
        }
    }

    const QUIET: Duration = Duration::from_secs(5 * 60);

    /// Let spawned timer tasks run to completion on the paused clock
    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn three_rapid_successes_debounce_into_one_flush() {
        let fx = fixture(QUIET);

        // Arrivals at t=0, t=1min, t=2min
        fx.coalescer.on_success(fx.artifact("a.jpg")).await;
        tokio::time::advance(Duration::from_secs(60)).await;
        fx.coalescer.on_success(fx.artifact("b.jpg")).await;
        tokio::time::advance(Duration::from_secs(60)).await;
        fx.coalescer.on_success(fx.artifact("c.jpg")).await;

        // At t=6min (4min after the last arrival) nothing has flushed yet
        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        settle().await;
        assert!(fx.rig.inner.lock().unwrap().emails.is_empty());

        // At t=7min the single trailing-edge flush carries all three
        tokio::time::advance(Duration::from_secs(60) + Duration::from_millis(10)).await;
        settle().await;

        let inner = fx.rig.inner.lock().unwrap();
        assert_eq!(inner.emails.len(), 1);
        assert_eq!(inner.emails[0], vec!["a.jpg", "b.jpg", "c.jpg"]);
        // Deferred flush does not fire the webhook
        assert_eq!(inner.notifications, 0);
        assert_eq!(inner.puts.len(), 3);
        drop(inner);

        assert_eq!(fx.coalescer.buffered().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_quiet_period_flushes_immediately_with_notification() {
        let fx = fixture(QUIET);

        // Seed a previous admission, let its deferred flush run
        fx.coalescer.on_success(fx.artifact("old.jpg")).await;
        tokio::time::advance(QUIET + Duration::from_millis(10)).await;
        settle().await;
        assert_eq!(fx.rig.inner.lock().unwrap().emails.len(), 1);

        // Well past the quiet window: fresh burst, synchronous flush
        tokio::time::advance(Duration::from_secs(60)).await;
        fx.coalescer.on_success(fx.artifact("fresh.jpg")).await;

        let inner = fx.rig.inner.lock().unwrap();
        assert_eq!(inner.notifications, 1);
        assert_eq!(inner.emails.len(), 2);
        assert_eq!(inner.emails[1], vec!["fresh.jpg"]);
    }

    #[tokio::test(start_paused = true)]
    async fn rearmed_timer_supersedes_the_previous_one() {
        let fx = fixture(QUIET);

        fx.coalescer.on_success(fx.artifact("a.jpg")).await;
        // Just before the first timer fires, another arrival re-arms it
        tokio::time::advance(QUIET - Duration::from_secs(1)).await;
        fx.coalescer.on_success(fx.artifact("b.jpg")).await;

        // Where the first timer would have fired: nothing
        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert!(fx.rig.inner.lock().unwrap().emails.is_empty());

        // One quiet window after the second arrival: one flush, both files
        tokio::time::advance(QUIET).await;
        settle().await;
        let inner = fx.rig.inner.lock().unwrap();
        assert_eq!(inner.emails.len(), 1);
        assert_eq!(inner.emails[0], vec!["a.jpg", "b.jpg"]);
    }

    #[tokio::test(start_paused = true)]
    async fn single_artifact_flush_fires_after_stored_callback() {
        let fx = fixture(QUIET);

        fx.coalescer.on_success(fx.artifact("only.jpg")).await;
        tokio::time::advance(QUIET + Duration::from_millis(10)).await;
        settle().await;

        let inner = fx.rig.inner.lock().unwrap();
        assert_eq!(inner.after_stored.len(), 1);
        assert!(inner.after_stored[0].contains("only.jpg"));
    }

    #[tokio::test(start_paused = true)]
    async fn multi_artifact_flush_skips_after_stored_callback() {
        let fx = fixture(QUIET);

        fx.coalescer.on_success(fx.artifact("a.jpg")).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        fx.coalescer.on_success(fx.artifact("b.jpg")).await;
        tokio::time::advance(QUIET + Duration::from_millis(10)).await;
        settle().await;

        let inner = fx.rig.inner.lock().unwrap();
        assert_eq!(inner.emails.len(), 1);
        assert!(inner.after_stored.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn email_failure_does_not_block_archive_and_delete() {
        let fx = fixture_with(RecordingRig::with_failing_email(), QUIET);

        let artifact = fx.artifact("kept.jpg");
        let path = artifact.path().to_path_buf();
        fx.coalescer.on_success(artifact).await;
        tokio::time::advance(QUIET + Duration::from_millis(10)).await;
        settle().await;

        let inner = fx.rig.inner.lock().unwrap();
        assert_eq!(inner.puts.len(), 1);
        drop(inner);
        assert!(!path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_path_archives_directly_without_batching() {
        let fx = fixture(QUIET);

        let artifact = fx.artifact("dull.jpg");
        let path = artifact.path().to_path_buf();
        fx.coalescer.on_failure(artifact).await;

        let inner = fx.rig.inner.lock().unwrap();
        assert_eq!(inner.puts.len(), 1);
        assert!(inner.puts[0].starts_with("Failure/"));
        assert!(inner.emails.is_empty());
        assert_eq!(inner.notifications, 0);
        drop(inner);
        assert!(!path.exists());
        assert_eq!(fx.coalescer.buffered().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_flush_is_a_no_op() {
        let fx = fixture(QUIET);

        fx.coalescer.flush(Vec::new(), true).await;

        let inner = fx.rig.inner.lock().unwrap();
        assert!(inner.emails.is_empty());
        assert!(inner.puts.is_empty());
        assert_eq!(inner.notifications, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_arrivals_produce_a_single_timer() {
        let fx = fixture(QUIET);

        let mut handles = Vec::new();
        for i in 0..8 {
            let coalescer = Arc::clone(&fx.coalescer);
            let artifact = fx.artifact(&format!("burst-{}.jpg", i));
            handles.push(tokio::spawn(async move {
                coalescer.on_success(artifact).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(fx.coalescer.buffered().await, 8);

        tokio::time::advance(QUIET + Duration::from_millis(10)).await;
        settle().await;

        let inner = fx.rig.inner.lock().unwrap();
        assert_eq!(inner.emails.len(), 1);
        assert_eq!(inner.emails[0].len(), 8);
    }
}
