//! Ffmpeg-backed capture source
//!
//! Reads fixed-size rgb24 frames from an ffmpeg child decoding a capture
//! device (v4l2 path like `/dev/video0`) or any input URL ffmpeg accepts.

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::frame_source::FrameSource;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

/// Per-frame read deadline; a slow or dead device counts as a failed read
const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct FfmpegDeviceSource {
    _child: Child,
    stdout: ChildStdout,
    width: u32,
    height: u32,
    frame_len: usize,
}

impl FfmpegDeviceSource {
    /// Open a capture device at the requested resolution and frame rate.
    /// Failure here is permanent for the process: the camera is absent.
    pub async fn open(
        camera_id: usize,
        input: &str,
        width: u32,
        height: u32,
        fps: f32,
    ) -> Result<Self> {
        let size = format!("{}x{}", width, height);
        let mut args: Vec<String> = Vec::new();
        if input.starts_with("/dev/video") {
            args.extend(["-f".into(), "v4l2".into()]);
            args.extend(["-video_size".into(), size.clone()]);
            args.extend(["-framerate".into(), fps.to_string()]);
        }
        args.extend(["-i".into(), input.to_string()]);
        args.extend([
            "-f".into(), "rawvideo".into(),
            "-pix_fmt".into(), "rgb24".into(),
            "-s".into(), size,
            "-r".into(), fps.to_string(),
            "-loglevel".into(), "error".into(),
            "-".into(),
        ]);

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Device {
                camera_id,
                message: format!("ffmpeg spawn failed for {}: {}", input, e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| Error::Device {
            camera_id,
            message: "ffmpeg stdout unavailable".to_string(),
        })?;

        Ok(Self {
            _child: child,
            stdout,
            width,
            height,
            frame_len: (width * height * 3) as usize,
        })
    }
}

#[async_trait]
impl FrameSource for FfmpegDeviceSource {
    async fn read(&mut self) -> Option<Frame> {
        let mut buf = vec![0u8; self.frame_len];
        match tokio::time::timeout(READ_TIMEOUT, self.stdout.read_exact(&mut buf)).await {
            Ok(Ok(_)) => Some(Frame::new(self.width, self.height, buf)),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Frame read failed");
                None
            }
            Err(_) => {
                tracing::warn!(timeout_sec = READ_TIMEOUT.as_secs(), "Frame read timeout");
                None
            }
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
