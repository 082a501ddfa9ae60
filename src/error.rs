//! Error handling for camwatch
//!
//! Three families matter at runtime: device errors (skip the camera, keep
//! the loop alive), model errors (fatal at startup, never mid-loop), and
//! sink errors (abandon the recording episode, keep detecting).

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Camera device failed to open or read
    #[error("Device error for camera {camera_id}: {message}")]
    Device { camera_id: usize, message: String },

    /// Face classifier unavailable or malformed
    #[error("Model error: {0}")]
    Model(String),

    /// Video or snapshot sink failure
    #[error("Sink error: {0}")]
    Sink(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
