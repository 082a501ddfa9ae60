//! RecordingSession - Per-Camera Recording State Machine
//!
//! ## Responsibilities
//!
//! - Idle/Active lifecycle per recording episode
//! - Duration ceiling: once started, a recording runs until the configured
//!   duration elapses; a new start() is required after that
//! - Snapshot cadence independent of video writes
//! - Idempotent stop(), mandatory at shutdown to flush the sink
//!
//! A session constructed in no-record mode tracks timing but opens no sink,
//! so the rest of the pipeline behaves identically with persistence off.

pub mod ffmpeg;

use crate::error::{Error, Result};
use crate::event_log::{EventKind, EventLog};
use crate::frame::Frame;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Open video sink for one recording episode. Accepts frames of the
/// dimensions it was opened with; must be closed to flush the artifact.
#[async_trait]
pub trait VideoSink: Send {
    async fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and finalize the artifact. Called exactly once per episode.
    async fn close(&mut self) -> Result<()>;

    fn path(&self) -> &std::path::Path;
}

/// Factory for video sinks and snapshot artifacts
#[async_trait]
pub trait SinkProvider: Send + Sync {
    /// Open a new timestamped video artifact sized to the given dimensions
    async fn open_video(
        &self,
        camera_id: usize,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn VideoSink>>;

    /// Persist a single timestamped still image
    async fn save_snapshot(&self, camera_id: usize, frame: &Frame) -> Result<PathBuf>;
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    /// Hard ceiling on one episode's length
    pub duration: Duration,
    /// Snapshot cadence; `None` disables snapshots
    pub snapshot_interval: Option<Duration>,
    /// Track timing but never open a sink or write artifacts
    pub no_record: bool,
}

/// Per-camera recording session
///
/// Invariant: `sink` is `Some` iff a recording is in progress (and the
/// session is not in no-record mode); `started_at` is set exactly when the
/// session becomes Active and cleared when it returns to Idle.
pub struct RecordingSession {
    camera_id: usize,
    config: RecordingConfig,
    sinks: Arc<dyn SinkProvider>,
    events: Arc<EventLog>,
    sink: Option<Box<dyn VideoSink>>,
    started_at: Option<DateTime<Utc>>,
    last_snapshot_at: Option<DateTime<Utc>>,
    episode_id: Option<Uuid>,
}

impl RecordingSession {
    pub fn new(
        camera_id: usize,
        config: RecordingConfig,
        sinks: Arc<dyn SinkProvider>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            camera_id,
            config,
            sinks,
            events,
            sink: None,
            started_at: None,
            last_snapshot_at: None,
            episode_id: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.started_at.is_some()
    }

    /// Begin a recording episode. Valid only from Idle.
    ///
    /// A sink that fails to open leaves the session Idle; the attempt is
    /// abandoned for this episode and the error surfaces to the caller.
    pub async fn start(&mut self, frame: &Frame) -> Result<()> {
        if self.is_active() {
            return Err(Error::Internal(format!(
                "Recording already active for camera {}",
                self.camera_id
            )));
        }

        let episode_id = Uuid::new_v4();

        if !self.config.no_record {
            let sink = self
                .sinks
                .open_video(self.camera_id, frame.width, frame.height)
                .await?;
            tracing::info!(
                camera_id = self.camera_id,
                episode_id = %episode_id,
                path = %sink.path().display(),
                "Recording started"
            );
            self.sink = Some(sink);
        } else {
            tracing::info!(
                camera_id = self.camera_id,
                episode_id = %episode_id,
                "Recording episode started (no-record mode, no artifact)"
            );
        }

        let now = Utc::now();
        self.started_at = Some(now);
        self.last_snapshot_at = Some(now);
        self.episode_id = Some(episode_id);
        self.events
            .record(self.camera_id, EventKind::RecordingStarted)
            .await;
        Ok(())
    }

    /// Drive an Active session with one frame.
    ///
    /// Returns `false` (and performs no writes) from Idle or in no-record
    /// mode. Otherwise appends the frame, persists a snapshot when the
    /// cadence elapses, and stops once the duration ceiling is exceeded.
    pub async fn update(&mut self, frame: &Frame) -> Result<bool> {
        let started_at = match self.started_at {
            Some(t) => t,
            None => return Ok(false),
        };

        let now = Utc::now();
        let elapsed = (now - started_at)
            .to_std()
            .unwrap_or(Duration::ZERO);

        if elapsed > self.config.duration {
            self.stop().await;
            return Ok(false);
        }

        // No-record mode tracks episode timing but never writes
        if self.config.no_record {
            return Ok(false);
        }

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.write_frame(frame).await {
                // A broken sink ends the episode; detection continues
                tracing::error!(
                    camera_id = self.camera_id,
                    error = %e,
                    "Frame write failed, stopping episode"
                );
                self.stop().await;
                return Err(e);
            }
        }

        if let Some(interval) = self.config.snapshot_interval {
            let since_last = self
                .last_snapshot_at
                .map(|t| (now - t).to_std().unwrap_or(Duration::ZERO))
                .unwrap_or(Duration::MAX);
            if since_last > interval {
                match self.sinks.save_snapshot(self.camera_id, frame).await {
                    Ok(path) => {
                        tracing::info!(
                            camera_id = self.camera_id,
                            path = %path.display(),
                            "Snapshot saved"
                        );
                        self.events
                            .record(
                                self.camera_id,
                                EventKind::SnapshotSaved {
                                    path: path.display().to_string(),
                                },
                            )
                            .await;
                        self.last_snapshot_at = Some(now);
                    }
                    Err(e) => {
                        tracing::warn!(
                            camera_id = self.camera_id,
                            error = %e,
                            "Snapshot failed"
                        );
                    }
                }
            }
        }

        Ok(true)
    }

    /// End the episode and flush the sink. Idempotent: a no-op from Idle.
    pub async fn stop(&mut self) {
        if self.started_at.is_some() {
            self.events
                .record(self.camera_id, EventKind::RecordingStopped)
                .await;
        }
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.close().await {
                tracing::error!(
                    camera_id = self.camera_id,
                    error = %e,
                    "Sink close failed"
                );
            } else {
                tracing::info!(
                    camera_id = self.camera_id,
                    episode_id = ?self.episode_id,
                    "Recording stopped"
                );
            }
        }
        self.started_at = None;
        self.last_snapshot_at = None;
        self.episode_id = None;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tokio::sync::Mutex;

    /// In-memory sink provider counting writes and snapshots
    #[derive(Default)]
    pub struct MemorySinks {
        pub frames_written: Mutex<usize>,
        pub snapshots: Mutex<Vec<DateTime<Utc>>>,
        pub fail_open: std::sync::atomic::AtomicBool,
    }

    pub struct MemoryVideoSink {
        provider: Arc<MemorySinks>,
        path: PathBuf,
    }

    #[async_trait]
    impl VideoSink for MemoryVideoSink {
        async fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
            *self.provider.frames_written.lock().await += 1;
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn path(&self) -> &std::path::Path {
            &self.path
        }
    }

    #[async_trait]
    impl SinkProvider for Arc<MemorySinks> {
        async fn open_video(
            &self,
            camera_id: usize,
            _width: u32,
            _height: u32,
        ) -> Result<Box<dyn VideoSink>> {
            if self.fail_open.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::Sink("simulated open failure".to_string()));
            }
            Ok(Box::new(MemoryVideoSink {
                provider: self.clone(),
                path: PathBuf::from(format!("mem/cam{}/record.avi", camera_id)),
            }))
        }

        async fn save_snapshot(&self, _camera_id: usize, _frame: &Frame) -> Result<PathBuf> {
            let mut snaps = self.snapshots.lock().await;
            snaps.push(Utc::now());
            Ok(PathBuf::from(format!("mem/snap_{}.jpg", snaps.len())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::MemorySinks;
    use super::*;

    fn config(duration_ms: u64, snapshot_ms: Option<u64>, no_record: bool) -> RecordingConfig {
        RecordingConfig {
            duration: Duration::from_millis(duration_ms),
            snapshot_interval: snapshot_ms.map(Duration::from_millis),
            no_record,
        }
    }

    fn session(config: RecordingConfig) -> (RecordingSession, Arc<MemorySinks>) {
        let sinks = Arc::new(MemorySinks::default());
        let events = Arc::new(crate::event_log::EventLog::new(64));
        (
            RecordingSession::new(0, config, Arc::new(sinks.clone()), events),
            sinks,
        )
    }

    #[tokio::test]
    async fn test_update_before_start_is_noop() {
        let (mut session, sinks) = session(config(1000, None, false));
        let frame = Frame::filled(8, 8, [0, 0, 0]);
        assert!(!session.update(&frame).await.unwrap());
        assert_eq!(*sinks.frames_written.lock().await, 0);
    }

    #[tokio::test]
    async fn test_records_until_duration_elapses() {
        let (mut session, sinks) = session(config(80, None, false));
        let frame = Frame::filled(8, 8, [0, 0, 0]);

        session.start(&frame).await.unwrap();
        assert!(session.is_active());
        assert!(session.update(&frame).await.unwrap());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!session.update(&frame).await.unwrap());
        assert!(!session.is_active());
        assert_eq!(*sinks.frames_written.lock().await, 1);
    }

    #[tokio::test]
    async fn test_session_restartable_after_duration() {
        let (mut session, _sinks) = session(config(40, None, false));
        let frame = Frame::filled(8, 8, [0, 0, 0]);

        session.start(&frame).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!session.update(&frame).await.unwrap());

        session.start(&frame).await.unwrap();
        assert!(session.is_active());
    }

    #[tokio::test]
    async fn test_snapshot_cadence() {
        let (mut session, sinks) = session(config(500, Some(60), false));
        let frame = Frame::filled(8, 8, [0, 0, 0]);

        session.start(&frame).await.unwrap();
        for _ in 0..5 {
            tokio::time::sleep(Duration::from_millis(70)).await;
            session.update(&frame).await.unwrap();
        }

        let snaps = sinks.snapshots.lock().await;
        assert!(snaps.len() >= 2, "expected >= 2 snapshots, got {}", snaps.len());
        for pair in snaps.windows(2) {
            assert!((pair[1] - pair[0]).num_milliseconds() >= 60);
        }
    }

    #[tokio::test]
    async fn test_no_record_mode_writes_nothing() {
        let (mut session, sinks) = session(config(1000, Some(10), true));
        let frame = Frame::filled(8, 8, [0, 0, 0]);

        session.start(&frame).await.unwrap();
        assert!(session.is_active());
        assert!(!session.update(&frame).await.unwrap());
        assert_eq!(*sinks.frames_written.lock().await, 0);
        assert!(sinks.snapshots.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (mut session, _sinks) = session(config(1000, None, false));
        let frame = Frame::filled(8, 8, [0, 0, 0]);

        session.start(&frame).await.unwrap();
        session.stop().await;
        assert!(!session.is_active());
        // Second stop from Idle is a no-op
        session.stop().await;
        assert!(!session.is_active());
    }

    #[tokio::test]
    async fn test_failed_sink_open_leaves_session_idle() {
        let (mut session, sinks) = session(config(1000, None, false));
        sinks
            .fail_open
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let frame = Frame::filled(8, 8, [0, 0, 0]);

        assert!(session.start(&frame).await.is_err());
        assert!(!session.is_active());
        assert!(!session.update(&frame).await.unwrap());
    }
}
