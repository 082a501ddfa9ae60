//! camwatch - Multi-Camera Security Monitor
//!
//! Main entry point.

use anyhow::Context;
use camwatch::camera_status_tracker::CameraStatusTracker;
use camwatch::event_log::EventLog;
use camwatch::frame_source::ffmpeg::FfmpegDeviceSource;
use camwatch::frame_source::FrameSource;
use camwatch::motion_detector::{MotionConfig, RegionPolicy};
use camwatch::orchestrator::{CameraOrchestrator, OrchestratorConfig};
use camwatch::recognizer::http::HttpClassifier;
use camwatch::recognizer::{IdentityInterner, Recognizer};
use camwatch::recording::ffmpeg::FfmpegSinks;
use camwatch::recording::RecordingConfig;
use camwatch::AppConfig;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Security cam with multi-face trust policy
#[derive(Debug, Parser)]
#[command(name = "camwatch", version, about)]
struct Cli {
    /// Number of cameras to use
    #[arg(long)]
    cam_num: Option<usize>,

    /// Minimum contour area for motion detection
    #[arg(long)]
    min_area: Option<u64>,

    /// Run face recognition every N frames
    #[arg(long)]
    face_interval: Option<u64>,

    /// Max recording duration (seconds)
    #[arg(long)]
    duration: Option<u64>,

    /// Enable snapshots during recording
    #[arg(long)]
    snapshot: bool,

    /// Snapshot interval (seconds)
    #[arg(long)]
    snapshot_interval: Option<u64>,

    /// Detect motion but do not record video
    #[arg(long)]
    no_record: bool,

    /// Camera resolution, e.g. 640x480 or 320x240
    #[arg(long)]
    resolution: Option<String>,

    /// Frame rate for capture and recording
    #[arg(long)]
    fps: Option<f32>,

    /// Confidence threshold for unknown faces (0-1)
    #[arg(long)]
    threshold: Option<f32>,

    /// Directory for recordings and snapshots
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Face classifier service URL
    #[arg(long)]
    classifier_url: Option<String>,

    /// Comma-separated trusted identities
    #[arg(long)]
    trusted: Option<String>,

    /// Select the largest motion region instead of the first
    #[arg(long)]
    largest_region: bool,

    /// Enable debug logging
    #[arg(long)]
    verbose: bool,
}

fn apply_cli(mut config: AppConfig, cli: &Cli) -> AppConfig {
    if let Some(n) = cli.cam_num {
        config.camera_count = n;
    }
    if let Some(a) = cli.min_area {
        config.min_area = a;
    }
    if let Some(i) = cli.face_interval {
        config.face_interval = i;
    }
    if let Some(d) = cli.duration {
        config.duration_secs = d;
    }
    if cli.snapshot {
        config.snapshot = true;
    }
    if let Some(s) = cli.snapshot_interval {
        config.snapshot_interval_secs = s;
    }
    if cli.no_record {
        config.no_record = true;
    }
    if let Some(ref r) = cli.resolution {
        config.resolution = r.clone();
    }
    if let Some(f) = cli.fps {
        config.fps = f;
    }
    if let Some(t) = cli.threshold {
        config.threshold = t;
    }
    if let Some(ref d) = cli.output_dir {
        config.output_dir = d.clone();
    }
    if let Some(ref u) = cli.classifier_url {
        config.classifier_url = u.clone();
    }
    if let Some(ref t) = cli.trusted {
        config.trusted = t
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    config
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "camwatch=debug"
    } else {
        "camwatch=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting camwatch v{}", env!("CARGO_PKG_VERSION"));

    let config = apply_cli(AppConfig::default(), &cli);
    let (width, height) = config.parse_resolution()?;
    tracing::info!(
        cameras = config.camera_count,
        resolution = %config.resolution,
        fps = config.fps,
        face_interval = config.face_interval,
        no_record = config.no_record,
        output_dir = %config.output_dir.display(),
        "Configuration loaded"
    );

    // Verify ffmpeg before touching any device
    let ffmpeg_version = FfmpegSinks::check_ffmpeg()
        .await
        .context("ffmpeg is required for capture and recording")?;
    tracing::info!(version = %ffmpeg_version, "ffmpeg available");

    // The classifier is required at startup; unavailability is fatal here
    // and only here
    let classifier = HttpClassifier::new(config.classifier_url.clone());
    let recognizer = Recognizer::new(
        Box::new(classifier),
        IdentityInterner::new(),
        &config.trusted,
        config.threshold,
    );
    if !recognizer.health_check().await.unwrap_or(false) {
        anyhow::bail!(
            "Face classifier unreachable at {}",
            config.classifier_url
        );
    }
    tracing::info!(
        url = %config.classifier_url,
        trusted = config.trusted.len(),
        threshold = config.threshold,
        "Face classifier ready"
    );

    // Open cameras; a device that fails to open stays absent for the
    // process lifetime
    let mut sources: Vec<Option<Box<dyn FrameSource>>> =
        Vec::with_capacity(config.camera_count);
    for camera_id in 0..config.camera_count {
        let device = format!("/dev/video{}", camera_id);
        match FfmpegDeviceSource::open(camera_id, &device, width, height, config.fps).await {
            Ok(source) => {
                tracing::info!(camera_id = camera_id, device = %device, "Camera opened");
                sources.push(Some(Box::new(source)));
            }
            Err(e) => {
                tracing::warn!(camera_id = camera_id, error = %e, "Camera could not be opened");
                sources.push(None);
            }
        }
    }
    if sources.iter().all(|s| s.is_none()) {
        anyhow::bail!("No camera could be opened");
    }

    let sinks = Arc::new(FfmpegSinks::new(config.output_dir.clone(), config.fps));
    let events = Arc::new(EventLog::default());
    let status = Arc::new(CameraStatusTracker::new());

    let orchestrator_config = OrchestratorConfig {
        face_interval: config.face_interval.max(1),
        fps: config.fps,
        motion: MotionConfig {
            min_area: config.min_area,
            region_policy: if cli.largest_region {
                RegionPolicy::Largest
            } else {
                RegionPolicy::First
            },
            ..Default::default()
        },
        recording: RecordingConfig {
            duration: Duration::from_secs(config.duration_secs),
            snapshot_interval: config
                .snapshot
                .then(|| Duration::from_secs(config.snapshot_interval_secs)),
            no_record: config.no_record,
        },
    };

    let mut orchestrator = CameraOrchestrator::new(
        sources,
        recognizer,
        sinks,
        events,
        status,
        orchestrator_config,
    );

    // Ctrl-C requests a stop; the run loop flushes every active session
    // before returning
    let stop = orchestrator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            stop.stop().await;
        }
    });

    orchestrator.run().await;

    tracing::info!("camwatch stopped");
    Ok(())
}
