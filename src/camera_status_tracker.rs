//! Camera Status Tracker
//!
//! Tracks per-camera read health so that lost/recovered transitions are
//! logged once, not on every failed tick.

use std::collections::HashMap;
use tokio::sync::RwLock;

/// Camera connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraConnectionStatus {
    /// Initial state (never polled)
    Unknown,
    /// Camera delivered a frame on the last poll
    Online,
    /// Camera failed to deliver a frame on the last poll
    Offline,
}

/// Status transition event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraStatusEvent {
    /// Online (or first poll) to Offline
    Lost,
    /// Offline to Online
    Recovered,
}

/// Tracks camera read status and detects transitions
pub struct CameraStatusTracker {
    statuses: RwLock<HashMap<usize, CameraConnectionStatus>>,
}

impl CameraStatusTracker {
    pub fn new() -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
        }
    }

    /// Update a camera's status from this tick's read outcome.
    ///
    /// Returns `Some(Lost)` on Online-to-Offline (or a first poll that
    /// fails), `Some(Recovered)` on Offline-to-Online, `None` otherwise.
    pub async fn update_status(
        &self,
        camera_id: usize,
        is_online: bool,
    ) -> Option<CameraStatusEvent> {
        let mut statuses = self.statuses.write().await;
        let prev = statuses
            .get(&camera_id)
            .copied()
            .unwrap_or(CameraConnectionStatus::Unknown);

        let new_status = if is_online {
            CameraConnectionStatus::Online
        } else {
            CameraConnectionStatus::Offline
        };
        statuses.insert(camera_id, new_status);

        match (prev, new_status) {
            (CameraConnectionStatus::Online, CameraConnectionStatus::Offline) => {
                tracing::warn!(camera_id = camera_id, "Camera connection lost");
                Some(CameraStatusEvent::Lost)
            }
            (CameraConnectionStatus::Offline, CameraConnectionStatus::Online) => {
                tracing::info!(camera_id = camera_id, "Camera connection recovered");
                Some(CameraStatusEvent::Recovered)
            }
            (CameraConnectionStatus::Unknown, CameraConnectionStatus::Offline) => {
                tracing::warn!(camera_id = camera_id, "Camera first poll failed");
                Some(CameraStatusEvent::Lost)
            }
            _ => None,
        }
    }

    pub async fn get_status(&self, camera_id: usize) -> CameraConnectionStatus {
        self.statuses
            .read()
            .await
            .get(&camera_id)
            .copied()
            .unwrap_or(CameraConnectionStatus::Unknown)
    }

    pub async fn get_offline_cameras(&self) -> Vec<usize> {
        self.statuses
            .read()
            .await
            .iter()
            .filter(|(_, s)| **s == CameraConnectionStatus::Offline)
            .map(|(id, _)| *id)
            .collect()
    }
}

impl Default for CameraStatusTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_initial_online_no_event() {
        let tracker = CameraStatusTracker::new();
        assert!(tracker.update_status(0, true).await.is_none());
    }

    #[tokio::test]
    async fn test_initial_offline_triggers_lost() {
        let tracker = CameraStatusTracker::new();
        assert_eq!(
            tracker.update_status(0, false).await,
            Some(CameraStatusEvent::Lost)
        );
    }

    #[tokio::test]
    async fn test_transitions() {
        let tracker = CameraStatusTracker::new();
        tracker.update_status(0, true).await;
        assert_eq!(
            tracker.update_status(0, false).await,
            Some(CameraStatusEvent::Lost)
        );
        // Repeated offline does not re-fire
        assert!(tracker.update_status(0, false).await.is_none());
        assert_eq!(
            tracker.update_status(0, true).await,
            Some(CameraStatusEvent::Recovered)
        );
        assert!(tracker.update_status(0, true).await.is_none());
    }
}
