//! EventLog - Pipeline Event Recording (Ring Buffer)
//!
//! ## Responsibilities
//!
//! - Store motion/recording/camera events in a bounded ring buffer
//! - Provide latest and per-camera queries

use crate::frame::Rect;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// What happened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    MotionDetected { roi: Option<Rect> },
    RecordingStarted,
    RecordingStopped,
    SnapshotSaved { path: String },
    CameraLost,
    CameraRecovered,
}

/// One pipeline event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub event_id: u64,
    pub camera_id: usize,
    pub kind: EventKind,
    pub occurred_at: DateTime<Utc>,
}

/// Ring buffer for events
struct EventRingBuffer {
    events: VecDeque<PipelineEvent>,
    capacity: usize,
    next_id: u64,
}

impl EventRingBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 1,
        }
    }

    fn push(&mut self, camera_id: usize, kind: EventKind) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        if self.events.len() >= self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(PipelineEvent {
            event_id: id,
            camera_id,
            kind,
            occurred_at: Utc::now(),
        });
        id
    }
}

/// EventLog instance
pub struct EventLog {
    buffer: RwLock<EventRingBuffer>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: RwLock::new(EventRingBuffer::new(capacity)),
        }
    }

    /// Record an event, returning its id
    pub async fn record(&self, camera_id: usize, kind: EventKind) -> u64 {
        let mut buffer = self.buffer.write().await;
        let id = buffer.push(camera_id, kind);
        tracing::debug!(event_id = id, camera_id = camera_id, "Event recorded");
        id
    }

    /// Get latest events, newest first
    pub async fn get_latest(&self, count: usize) -> Vec<PipelineEvent> {
        let buffer = self.buffer.read().await;
        buffer.events.iter().rev().take(count).cloned().collect()
    }

    /// Get events for one camera, newest first
    pub async fn get_by_camera(&self, camera_id: usize, count: usize) -> Vec<PipelineEvent> {
        let buffer = self.buffer.read().await;
        buffer
            .events
            .iter()
            .rev()
            .filter(|e| e.camera_id == camera_id)
            .take(count)
            .cloned()
            .collect()
    }

    pub async fn count(&self) -> usize {
        self.buffer.read().await.events.len()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(2000)
    }
}
