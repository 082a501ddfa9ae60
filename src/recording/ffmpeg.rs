//! Ffmpeg-backed sinks
//!
//! Video episodes are encoded by an ffmpeg child process fed rawvideo over
//! stdin. `kill_on_drop(true)` ensures no orphaned encoder survives if a
//! session is dropped without a clean close. Snapshots are JPEG stills
//! written directly.
//!
//! Artifacts land under `<output_dir>/cam<N>/` with timestamped names:
//! `record_YYYYmmdd_HHMMSS.avi`, `snap_YYYYmmdd_HHMMSS.jpg`.

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::recording::{SinkProvider, VideoSink};
use async_trait::async_trait;
use chrono::Local;
use image::codecs::jpeg::JpegEncoder;
use image::ImageEncoder;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

/// How long to wait for ffmpeg to finalize the container on close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Video sink writing rawvideo frames into an ffmpeg encoder
pub struct FfmpegVideoSink {
    child: Child,
    stdin: Option<ChildStdin>,
    path: PathBuf,
    width: u32,
    height: u32,
}

impl FfmpegVideoSink {
    /// Spawn the encoder for a new artifact sized to the given dimensions
    pub async fn open(path: PathBuf, width: u32, height: u32, fps: f32) -> Result<Self> {
        let size = format!("{}x{}", width, height);
        let mut child = Command::new("ffmpeg")
            .args([
                "-f", "rawvideo",
                "-pixel_format", "rgb24",
                "-video_size", &size,
                "-framerate", &fps.to_string(),
                "-i", "-",
                "-c:v", "mpeg4",
                "-q:v", "5",
                "-loglevel", "error",
                "-y",
            ])
            .arg(&path)
            .stdin(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Sink(format!("ffmpeg spawn failed: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Sink("ffmpeg stdin unavailable".to_string()))?;

        Ok(Self {
            child,
            stdin: Some(stdin),
            path,
            width,
            height,
        })
    }
}

#[async_trait]
impl VideoSink for FfmpegVideoSink {
    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.width != self.width || frame.height != self.height {
            return Err(Error::Sink(format!(
                "Frame size {}x{} does not match sink {}x{}",
                frame.width, frame.height, self.width, self.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Sink("Sink already closed".to_string()))?;
        stdin
            .write_all(&frame.data)
            .await
            .map_err(|e| Error::Sink(format!("Frame write failed: {}", e)))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping stdin sends EOF so ffmpeg finalizes the container
        drop(self.stdin.take());

        match tokio::time::timeout(CLOSE_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) if status.success() => Ok(()),
            Ok(Ok(status)) => Err(Error::Sink(format!("ffmpeg exited with {}", status))),
            Ok(Err(e)) => Err(Error::Sink(format!("ffmpeg wait failed: {}", e))),
            Err(_) => {
                // Timed out; kill_on_drop reaps the process
                Err(Error::Sink("ffmpeg close timeout".to_string()))
            }
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Filesystem sink provider: per-camera subdirectories, timestamped names
pub struct FfmpegSinks {
    output_dir: PathBuf,
    fps: f32,
}

impl FfmpegSinks {
    pub fn new(output_dir: PathBuf, fps: f32) -> Self {
        Self { output_dir, fps }
    }

    async fn camera_dir(&self, camera_id: usize) -> Result<PathBuf> {
        let dir = self.output_dir.join(format!("cam{}", camera_id));
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    fn timestamp() -> String {
        Local::now().format("%Y%m%d_%H%M%S").to_string()
    }

    /// Check that ffmpeg is on PATH; called once at startup
    pub async fn check_ffmpeg() -> Result<String> {
        let output = Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .map_err(|e| Error::Sink(format!("ffmpeg not found: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Sink("ffmpeg version check failed".to_string()));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        Ok(version.lines().next().unwrap_or("unknown").to_string())
    }
}

#[async_trait]
impl SinkProvider for FfmpegSinks {
    async fn open_video(
        &self,
        camera_id: usize,
        width: u32,
        height: u32,
    ) -> Result<Box<dyn VideoSink>> {
        let dir = self.camera_dir(camera_id).await?;
        let path = dir.join(format!("record_{}.avi", Self::timestamp()));
        let sink = FfmpegVideoSink::open(path, width, height, self.fps).await?;
        Ok(Box::new(sink))
    }

    async fn save_snapshot(&self, camera_id: usize, frame: &Frame) -> Result<PathBuf> {
        let dir = self.camera_dir(camera_id).await?;
        let path = dir.join(format!("snap_{}.jpg", Self::timestamp()));

        let mut jpeg = Vec::new();
        let encoder = JpegEncoder::new_with_quality(&mut jpeg, 90);
        encoder
            .write_image(
                &frame.data,
                frame.width,
                frame.height,
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| Error::Sink(format!("JPEG encode failed: {}", e)))?;

        fs::write(&path, &jpeg).await?;
        Ok(path)
    }
}
