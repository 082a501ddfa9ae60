//! CameraOrchestrator - Multi-Camera Polling and Recording Policy
//!
//! ## Responsibilities
//!
//! - Sequential per-tick camera scan: motion detection every frame, face
//!   recognition every `face_interval` frames (annotations stay sticky in
//!   between)
//! - Global aggregation before any decision: `any_motion` and trust state
//!   are computed across all cameras for the tick, then each camera's
//!   session is driven
//! - Recording policy: a camera records iff motion is present anywhere and
//!   that camera shows no trusted face
//! - Shutdown: every still-active session is stopped to flush its sink
//!
//! A camera whose read fails this tick is skipped whole: no detector,
//! recognizer, or recording call, and no participation in aggregation.

use crate::camera_status_tracker::{CameraStatusEvent, CameraStatusTracker};
use crate::event_log::{EventKind, EventLog};
use crate::frame::{Frame, Rect};
use crate::frame_source::FrameSource;
use crate::motion_detector::{MotionConfig, MotionDetector, MotionResult};
use crate::recognizer::{FaceAnnotation, Recognizer};
use crate::recording::{RecordingConfig, RecordingSession, SinkProvider};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Run face recognition every N frames per camera
    pub face_interval: u64,
    /// Polling rate, ticks per second
    pub fps: f32,
    pub motion: MotionConfig,
    pub recording: RecordingConfig,
}

/// Per-camera temporal state. Owned exclusively by the orchestrator; never
/// touched by another camera's processing.
pub struct CameraState {
    detector: MotionDetector,
    last_motion: MotionResult,
    /// Most recent annotations, sticky across `face_interval` frames
    annotations: Vec<FaceAnnotation>,
    frame_counter: u64,
    session: RecordingSession,
}

impl CameraState {
    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    pub fn last_motion(&self) -> &MotionResult {
        &self.last_motion
    }

    pub fn annotations(&self) -> &[FaceAnnotation] {
        &self.annotations
    }

    pub fn recording_active(&self) -> bool {
        self.session.is_active()
    }

    fn trusted_present(&self) -> bool {
        self.annotations.iter().any(|a| a.trusted)
    }
}

/// One monitored camera: its source plus its state
struct CameraSlot {
    source: Box<dyn FrameSource>,
    state: CameraState,
}

/// Presentation collaborator, invoked once per camera per tick with the
/// annotated frame. Has no effect on pipeline state.
pub trait FrameObserver: Send {
    fn observe(&mut self, camera_id: usize, frame: &Frame);
}

/// The control loop driving all cameras
pub struct CameraOrchestrator {
    cameras: Vec<Option<CameraSlot>>,
    recognizer: Recognizer,
    events: Arc<EventLog>,
    status: Arc<CameraStatusTracker>,
    observer: Option<Box<dyn FrameObserver>>,
    config: OrchestratorConfig,
    running: Arc<RwLock<bool>>,
}

impl CameraOrchestrator {
    /// Build the orchestrator from already-opened sources. A `None` source
    /// is a camera that failed to open at startup: it is recorded as
    /// absent and permanently skipped.
    pub fn new(
        sources: Vec<Option<Box<dyn FrameSource>>>,
        recognizer: Recognizer,
        sinks: Arc<dyn SinkProvider>,
        events: Arc<EventLog>,
        status: Arc<CameraStatusTracker>,
        config: OrchestratorConfig,
    ) -> Self {
        let cameras = sources
            .into_iter()
            .enumerate()
            .map(|(camera_id, source)| {
                let source = match source {
                    Some(s) => s,
                    None => {
                        tracing::warn!(camera_id = camera_id, "Camera absent, skipped for process lifetime");
                        return None;
                    }
                };
                Some(CameraSlot {
                    source,
                    state: CameraState {
                        detector: MotionDetector::new(config.motion.clone()),
                        last_motion: MotionResult::quiet(),
                        annotations: Vec::new(),
                        frame_counter: 0,
                        session: RecordingSession::new(
                            camera_id,
                            config.recording.clone(),
                            sinks.clone(),
                            events.clone(),
                        ),
                    },
                })
            })
            .collect();

        Self {
            cameras,
            recognizer,
            events,
            status,
            observer: None,
            config,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Attach a presentation collaborator (display/annotation only)
    pub fn with_observer(mut self, observer: Box<dyn FrameObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Handle for requesting a stop from another task
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            running: self.running.clone(),
        }
    }

    pub fn camera_state(&self, camera_id: usize) -> Option<&CameraState> {
        self.cameras.get(camera_id)?.as_ref().map(|slot| &slot.state)
    }

    /// Run the polling loop until stopped, then flush all sessions
    pub async fn run(&mut self) {
        *self.running.write().await = true;
        let period = Duration::from_secs_f32(1.0 / self.config.fps.max(0.1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            cameras = self.cameras.len(),
            fps = self.config.fps,
            face_interval = self.config.face_interval,
            "Starting camera orchestrator"
        );

        loop {
            interval.tick().await;
            if !*self.running.read().await {
                break;
            }
            self.tick().await;
        }

        self.shutdown().await;
        tracing::info!("Camera orchestrator stopped");
    }

    /// One polling tick: scan every camera, then decide every camera.
    ///
    /// The scan phase completes for all cameras before any decision is
    /// made, so a trusted face on one camera is already known when another
    /// camera's recording decision is evaluated.
    pub async fn tick(&mut self) {
        // Phase 1: scan. Cameras with a live frame this tick.
        let mut scanned: Vec<(usize, Frame)> = Vec::with_capacity(self.cameras.len());

        for camera_id in 0..self.cameras.len() {
            let frame = {
                let slot = match self.cameras[camera_id].as_mut() {
                    Some(slot) => slot,
                    None => continue,
                };
                slot.source.read().await
            };

            let frame = match frame {
                Some(frame) => frame,
                None => {
                    // No data this tick: state untouched, no aggregation
                    if let Some(event) = self.status.update_status(camera_id, false).await {
                        self.record_status_event(camera_id, event).await;
                    }
                    continue;
                }
            };
            if let Some(event) = self.status.update_status(camera_id, true).await {
                self.record_status_event(camera_id, event).await;
            }

            let (motion, recognition_due) = {
                let slot = match self.cameras[camera_id].as_mut() {
                    Some(slot) => slot,
                    None => continue,
                };
                let state = &mut slot.state;
                state.frame_counter += 1;
                state.last_motion = state.detector.detect(&frame);
                (
                    state.last_motion,
                    state.frame_counter % self.config.face_interval == 0,
                )
            };

            if motion.motion_detected {
                self.events
                    .record(
                        camera_id,
                        EventKind::MotionDetected {
                            roi: motion.region_of_interest,
                        },
                    )
                    .await;
            }

            // Recognition tick: the expensive step runs at intervals and
            // its result stays sticky until the next one
            if recognition_due {
                match self.recognizer.recognize(&frame).await {
                    Ok(annotations) => {
                        if let Some(slot) = self.cameras[camera_id].as_mut() {
                            slot.state.annotations = annotations;
                        }
                    }
                    Err(e) => {
                        // Never fatal mid-loop; previous annotations stand
                        tracing::warn!(
                            camera_id = camera_id,
                            error = %e,
                            "Recognition failed, keeping previous annotations"
                        );
                    }
                }
            }

            scanned.push((camera_id, frame));
        }

        // Phase 2: aggregate, then decide per camera
        let any_motion = scanned.iter().any(|(id, _)| {
            self.camera_state(*id)
                .map(|s| s.last_motion.motion_detected)
                .unwrap_or(false)
        });
        let trusted_anywhere = scanned.iter().any(|(id, _)| {
            self.camera_state(*id)
                .map(|s| s.trusted_present())
                .unwrap_or(false)
        });

        if any_motion {
            tracing::debug!(
                trusted_anywhere = trusted_anywhere,
                cameras_scanned = scanned.len(),
                "Motion present this tick"
            );
        }

        for (camera_id, mut frame) in scanned {
            let slot = match self.cameras[camera_id].as_mut() {
                Some(slot) => slot,
                None => continue,
            };
            let state = &mut slot.state;

            let record = any_motion && !state.trusted_present();

            if record && !state.session.is_active() {
                if let Err(e) = state.session.start(&frame).await {
                    // Abandon this episode; detection continues
                    tracing::error!(
                        camera_id = camera_id,
                        error = %e,
                        "Failed to start recording"
                    );
                }
            }
            // Once active, an episode is driven by its own duration, not
            // re-evaluated against this tick's decision
            if state.session.is_active() {
                if let Err(e) = state.session.update(&frame).await {
                    tracing::error!(
                        camera_id = camera_id,
                        error = %e,
                        "Recording update failed"
                    );
                }
            }

            if let Some(observer) = self.observer.as_mut() {
                annotate(&mut frame, &state.last_motion, &state.annotations);
                observer.observe(camera_id, &frame);
            }
        }
    }

    async fn record_status_event(&self, camera_id: usize, event: CameraStatusEvent) {
        let kind = match event {
            CameraStatusEvent::Lost => EventKind::CameraLost,
            CameraStatusEvent::Recovered => EventKind::CameraRecovered,
        };
        self.events.record(camera_id, kind).await;
    }

    /// Stop every still-active session so sinks are flushed. Mandatory at
    /// process shutdown.
    pub async fn shutdown(&mut self) {
        for slot in self.cameras.iter_mut().flatten() {
            slot.state.session.stop().await;
        }
    }
}

/// Clonable handle that requests the run loop to stop
#[derive(Clone)]
pub struct StopHandle {
    running: Arc<RwLock<bool>>,
}

impl StopHandle {
    pub async fn stop(&self) {
        *self.running.write().await = false;
        tracing::info!("Stop requested");
    }
}

/// Draw the motion ROI and face boxes onto a frame. Presentation only.
pub fn annotate(frame: &mut Frame, motion: &MotionResult, annotations: &[FaceAnnotation]) {
    if let Some(roi) = motion.region_of_interest {
        draw_outline(frame, roi, [255, 0, 0]);
    }
    for ann in annotations {
        let color = if ann.trusted { [0, 255, 0] } else { [0, 0, 255] };
        draw_outline(frame, ann.bounds, color);
    }
}

fn draw_outline(frame: &mut Frame, rect: Rect, rgb: [u8; 3]) {
    let t = 2; // border thickness
    frame.fill_rect(Rect::new(rect.x, rect.y, rect.width, t), rgb);
    frame.fill_rect(
        Rect::new(rect.x, (rect.y + rect.height).saturating_sub(t), rect.width, t),
        rgb,
    );
    frame.fill_rect(Rect::new(rect.x, rect.y, t, rect.height), rgb);
    frame.fill_rect(
        Rect::new((rect.x + rect.width).saturating_sub(t), rect.y, t, rect.height),
        rgb,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result as CwResult;
    use crate::frame_source::test_support::ScriptedSource;
    use crate::recognizer::{FaceCandidate, FaceClassifier, IdentityInterner};
    use crate::recording::test_support::MemorySinks;
    use async_trait::async_trait;

    /// Classifier keyed on frame width: 64-wide frames contain a trusted
    /// face, everything else is empty
    struct WidthKeyedClassifier;

    #[async_trait]
    impl FaceClassifier for WidthKeyedClassifier {
        async fn classify(&self, frame: &Frame) -> CwResult<Vec<FaceCandidate>> {
            if frame.width == 64 {
                Ok(vec![FaceCandidate {
                    bounds: Rect::new(10, 10, 20, 20),
                    identity: "alice".to_string(),
                    confidence: 0.95,
                }])
            } else {
                Ok(Vec::new())
            }
        }
    }

    struct EmptyClassifier;

    #[async_trait]
    impl FaceClassifier for EmptyClassifier {
        async fn classify(&self, _frame: &Frame) -> CwResult<Vec<FaceCandidate>> {
            Ok(Vec::new())
        }
    }

    fn recognizer(classifier: Box<dyn FaceClassifier>) -> Recognizer {
        Recognizer::new(
            classifier,
            IdentityInterner::new(),
            &["alice".to_string()],
            0.7,
        )
    }

    fn config() -> OrchestratorConfig {
        OrchestratorConfig {
            face_interval: 1,
            fps: 20.0,
            motion: MotionConfig {
                min_area: 100,
                ..Default::default()
            },
            recording: RecordingConfig {
                duration: Duration::from_secs(10),
                snapshot_interval: None,
                no_record: false,
            },
        }
    }

    /// Background frame then a frame with a bright moving square
    fn motion_frames(size: u32) -> (Frame, Frame) {
        let bg = Frame::filled(size, size, [20, 20, 20]);
        let mut moving = bg.clone();
        moving.fill_rect(Rect::new(25, 25, 40, 40), [250, 250, 250]);
        (bg, moving)
    }

    fn static_frames(size: u32, count: usize) -> Vec<Option<Frame>> {
        let f = Frame::filled(size, size, [60, 60, 60]);
        std::iter::repeat_with(|| Some(f.clone())).take(count).collect()
    }

    fn orchestrator(
        sources: Vec<Option<Box<dyn FrameSource>>>,
        classifier: Box<dyn FaceClassifier>,
    ) -> (CameraOrchestrator, Arc<MemorySinks>, Arc<EventLog>) {
        let sinks = Arc::new(MemorySinks::default());
        let events = Arc::new(EventLog::new(256));
        let orch = CameraOrchestrator::new(
            sources,
            recognizer(classifier),
            Arc::new(sinks.clone()),
            events.clone(),
            Arc::new(CameraStatusTracker::new()),
            config(),
        );
        (orch, sinks, events)
    }

    #[tokio::test]
    async fn test_motion_without_trust_starts_recording() {
        let (bg, moving) = motion_frames(96);
        let source = ScriptedSource::new(96, 96, vec![Some(bg.clone()), Some(bg), Some(moving)]);
        let (mut orch, _sinks, _events) =
            orchestrator(vec![Some(Box::new(source))], Box::new(EmptyClassifier));

        orch.tick().await; // seeds background
        orch.tick().await;
        assert!(!orch.camera_state(0).unwrap().recording_active());

        orch.tick().await; // motion frame
        assert!(orch.camera_state(0).unwrap().recording_active());
    }

    #[tokio::test]
    async fn test_trusted_camera_stays_idle_while_untrusted_records() {
        // Camera A (96px): motion, no trusted face
        // Camera B (64px): trusted face, no motion
        let (bg_a, moving_a) = motion_frames(96);
        let source_a =
            ScriptedSource::new(96, 96, vec![Some(bg_a.clone()), Some(bg_a), Some(moving_a)]);
        let source_b = ScriptedSource::new(64, 64, static_frames(64, 3));

        let (mut orch, _sinks, _events) = orchestrator(
            vec![Some(Box::new(source_a)), Some(Box::new(source_b))],
            Box::new(WidthKeyedClassifier),
        );

        orch.tick().await;
        orch.tick().await;
        orch.tick().await;

        assert!(orch.camera_state(0).unwrap().recording_active());
        assert!(!orch.camera_state(1).unwrap().recording_active());
        assert!(orch.camera_state(1).unwrap().annotations()[0].trusted);
    }

    #[tokio::test]
    async fn test_both_cameras_record_when_no_trust_anywhere() {
        let (bg_a, moving_a) = motion_frames(96);
        let (bg_b, moving_b) = motion_frames(128);
        let source_a =
            ScriptedSource::new(96, 96, vec![Some(bg_a.clone()), Some(bg_a), Some(moving_a)]);
        let source_b =
            ScriptedSource::new(128, 128, vec![Some(bg_b.clone()), Some(bg_b), Some(moving_b)]);

        let (mut orch, _sinks, _events) = orchestrator(
            vec![Some(Box::new(source_a)), Some(Box::new(source_b))],
            Box::new(EmptyClassifier),
        );

        orch.tick().await;
        orch.tick().await;
        orch.tick().await;

        assert!(orch.camera_state(0).unwrap().recording_active());
        assert!(orch.camera_state(1).unwrap().recording_active());
    }

    #[tokio::test]
    async fn test_failed_read_leaves_state_untouched() {
        let bg = Frame::filled(96, 96, [20, 20, 20]);
        let source = ScriptedSource::new(96, 96, vec![Some(bg.clone()), Some(bg), None]);
        let (mut orch, _sinks, _events) =
            orchestrator(vec![Some(Box::new(source))], Box::new(EmptyClassifier));

        orch.tick().await;
        orch.tick().await;
        let counter_before = orch.camera_state(0).unwrap().frame_counter();

        orch.tick().await; // read fails
        let state = orch.camera_state(0).unwrap();
        assert_eq!(state.frame_counter(), counter_before);
        assert!(!state.recording_active());
    }

    #[tokio::test]
    async fn test_absent_camera_is_permanently_skipped() {
        let (bg, moving) = motion_frames(96);
        let source = ScriptedSource::new(96, 96, vec![Some(bg.clone()), Some(bg), Some(moving)]);
        let (mut orch, _sinks, _events) = orchestrator(
            vec![None, Some(Box::new(source))],
            Box::new(EmptyClassifier),
        );

        orch.tick().await;
        orch.tick().await;
        orch.tick().await;

        assert!(orch.camera_state(0).is_none());
        assert!(orch.camera_state(1).unwrap().recording_active());
    }

    #[tokio::test]
    async fn test_annotations_sticky_between_recognition_ticks() {
        // face_interval = 2: recognition runs on frames 2 and 4 only
        let mut cfg = config();
        cfg.face_interval = 2;

        let frames = static_frames(64, 4);
        let source = ScriptedSource::new(64, 64, frames);
        let sinks = Arc::new(MemorySinks::default());
        let events = Arc::new(EventLog::new(64));
        let mut orch = CameraOrchestrator::new(
            vec![Some(Box::new(source))],
            recognizer(Box::new(WidthKeyedClassifier)),
            Arc::new(sinks),
            events,
            Arc::new(CameraStatusTracker::new()),
            cfg,
        );

        orch.tick().await; // frame 1: no recognition yet
        assert!(orch.camera_state(0).unwrap().annotations().is_empty());

        orch.tick().await; // frame 2: recognition tick
        assert_eq!(orch.camera_state(0).unwrap().annotations().len(), 1);

        orch.tick().await; // frame 3: sticky
        assert_eq!(orch.camera_state(0).unwrap().annotations().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_active_sessions() {
        let (bg, moving) = motion_frames(96);
        let source = ScriptedSource::new(96, 96, vec![Some(bg.clone()), Some(bg), Some(moving)]);
        let (mut orch, _sinks, events) =
            orchestrator(vec![Some(Box::new(source))], Box::new(EmptyClassifier));

        orch.tick().await;
        orch.tick().await;
        orch.tick().await;
        assert!(orch.camera_state(0).unwrap().recording_active());

        orch.shutdown().await;
        assert!(!orch.camera_state(0).unwrap().recording_active());

        let kinds: Vec<_> = events
            .get_by_camera(0, 10)
            .await
            .into_iter()
            .map(|e| e.kind)
            .collect();
        assert!(kinds.contains(&EventKind::RecordingStopped));
    }
}
