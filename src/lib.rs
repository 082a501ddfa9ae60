//! camwatch - Multi-Camera Motion & Trust Recording
//!
//! Continuously monitors live camera feeds, detects motion against a
//! running background model, classifies faces against a trusted identity
//! set at intervals, and decides per camera, per tick whether to record.
//!
//! ## Components
//!
//! 1. MotionDetector - background-model motion detection per camera
//! 2. Recognizer - trust policy over an external face classifier
//! 3. RecordingSession - per-camera Idle/Active recording state machine
//! 4. CameraOrchestrator - the polling loop and recording policy
//! 5. EventLog - bounded in-memory event history
//! 6. CameraStatusTracker - lost/recovered transition tracking
//!
//! ## Design notes
//!
//! - One camera's background model and session are owned by that camera's
//!   state only; the sole cross-camera data is the per-tick aggregate
//! - Global aggregation completes before any camera's recording decision

pub mod camera_status_tracker;
pub mod error;
pub mod event_log;
pub mod frame;
pub mod frame_source;
pub mod motion_detector;
pub mod orchestrator;
pub mod recognizer;
pub mod recording;
pub mod state;

pub use error::{Error, Result};
pub use state::AppConfig;
