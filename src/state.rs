//! Application configuration
//!
//! Env-var-backed defaults for the full configuration surface. CLI flags
//! (see `main.rs`) override these.

use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Number of cameras to monitor (device indices 0..n)
    pub camera_count: usize,
    /// Minimum motion region area in pixels
    pub min_area: u64,
    /// Run face recognition every N frames
    pub face_interval: u64,
    /// Max recording duration per episode, seconds
    pub duration_secs: u64,
    /// Enable snapshots during recording
    pub snapshot: bool,
    /// Snapshot interval, seconds
    pub snapshot_interval_secs: u64,
    /// Detect and track but never write artifacts
    pub no_record: bool,
    /// Confidence threshold below which a face is "Unknown" (0-1)
    pub threshold: f32,
    /// Capture/recording frame rate
    pub fps: f32,
    /// Capture resolution, e.g. "640x480"
    pub resolution: String,
    /// Directory for recordings and snapshots
    pub output_dir: PathBuf,
    /// Face classifier sidecar URL
    pub classifier_url: String,
    /// Comma-separated trusted identities
    pub trusted: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            camera_count: env_parse("CAMWATCH_CAMERAS", 1),
            min_area: env_parse("CAMWATCH_MIN_AREA", 500),
            face_interval: env_parse("CAMWATCH_FACE_INTERVAL", 10),
            duration_secs: env_parse("CAMWATCH_DURATION", 20),
            snapshot: env_parse("CAMWATCH_SNAPSHOT", false),
            snapshot_interval_secs: env_parse("CAMWATCH_SNAPSHOT_INTERVAL", 5),
            no_record: env_parse("CAMWATCH_NO_RECORD", false),
            threshold: env_parse("CAMWATCH_THRESHOLD", 0.7),
            fps: env_parse("CAMWATCH_FPS", 20.0),
            resolution: std::env::var("CAMWATCH_RESOLUTION")
                .unwrap_or_else(|_| "640x480".to_string()),
            output_dir: std::env::var("CAMWATCH_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("recordings")),
            classifier_url: std::env::var("CAMWATCH_CLASSIFIER_URL")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            trusted: std::env::var("CAMWATCH_TRUSTED")
                .map(|s| {
                    s.split(',')
                        .map(|t| t.trim().to_string())
                        .filter(|t| !t.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

impl AppConfig {
    /// Parse `resolution` into (width, height)
    pub fn parse_resolution(&self) -> crate::error::Result<(u32, u32)> {
        let (w, h) = self
            .resolution
            .split_once('x')
            .ok_or_else(|| {
                crate::error::Error::Config(format!("Invalid resolution: {}", self.resolution))
            })?;
        let width = w.parse().map_err(|_| {
            crate::error::Error::Config(format!("Invalid resolution width: {}", w))
        })?;
        let height = h.parse().map_err(|_| {
            crate::error::Error::Config(format!("Invalid resolution height: {}", h))
        })?;
        Ok((width, height))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resolution() {
        let config = AppConfig {
            resolution: "320x240".to_string(),
            ..Default::default()
        };
        assert_eq!(config.parse_resolution().unwrap(), (320, 240));
    }

    #[test]
    fn test_parse_resolution_rejects_garbage() {
        let config = AppConfig {
            resolution: "320by240".to_string(),
            ..Default::default()
        };
        assert!(config.parse_resolution().is_err());
    }
}
