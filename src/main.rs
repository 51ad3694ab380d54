//! depthcam: live camera feed to depth visualization

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use tokio::task::JoinHandle;
use tracing::{error, info};

use depthcam::capture::{FrameAnalyzer, RawFrame, SyntheticCapture};
use depthcam::depth::{DepthModel, LuminanceDepthModel};
use depthcam::display::{run_display, LogSink, PngDumpSink};
use depthcam::error::CaptureError;
use depthcam::{utils, CaptureConfig, CaptureSource, Config, FramePipeline};
use depthcam::{LatestFrameSlot, PerformanceTracker};

/// Frame sources the binary can drive
enum Source {
    Synthetic(SyntheticCapture),
    #[cfg(feature = "v4l2")]
    V4l2(depthcam::capture::V4l2Capture),
}

impl Source {
    fn open(config: CaptureConfig) -> Result<Self> {
        match config.source {
            CaptureSource::Synthetic => {
                let mut capture = SyntheticCapture::new(config)?;
                capture.start_stream()?;
                Ok(Source::Synthetic(capture))
            }
            #[cfg(feature = "v4l2")]
            CaptureSource::V4l2 => {
                let mut config = config;
                if config.device.is_empty() {
                    let (device, format) = depthcam::capture::v4l2::auto_detect_device()?;
                    config.device = device;
                    config.format = format;
                }
                info!("Using capture device: {}", config.device);
                let mut capture = depthcam::capture::V4l2Capture::new(config)?;
                capture.start_stream()?;
                Ok(Source::V4l2(capture))
            }
            #[cfg(not(feature = "v4l2"))]
            CaptureSource::V4l2 => Err(color_eyre::eyre::eyre!("built without the `v4l2` feature")),
        }
    }

    async fn capture_frame(&mut self) -> Result<RawFrame, CaptureError> {
        match self {
            Source::Synthetic(capture) => capture.capture_frame().await,
            #[cfg(feature = "v4l2")]
            Source::V4l2(capture) => capture.capture_frame().await,
        }
    }
}

fn spawn_capture(mut source: Source, analyzer: FrameAnalyzer) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match source.capture_frame().await {
                Ok(frame) => {
                    analyzer.analyze(frame);
                }
                Err(e) => {
                    error!("Capture error: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    utils::init_tracing("depthcam=info");

    info!("depthcam launching...");

    let config_path = std::env::args_os()
        .nth(1)
        .or_else(|| std::env::var_os("DEPTHCAM_CONFIG"))
        .map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    info!("Configuration: {:?}", config);

    let tracker = Arc::new(PerformanceTracker::new());
    let slot = Arc::new(LatestFrameSlot::new());

    let model = LuminanceDepthModel::new(config.model.preset.spec())
        .with_latency(Duration::from_millis(config.model.latency_ms));
    info!(
        "Model {} expects {:?} input",
        model.name(),
        model.input_dimensions()
    );

    let (mut pipeline, updates) = FramePipeline::builder(Arc::new(model))
        .slot(slot.clone())
        .tracker(tracker.clone())
        .idle_wait(Duration::from_millis(config.pipeline.idle_wait_ms))
        .display_queue(config.pipeline.display_queue)
        .worker_core(config.pipeline.worker_core)
        .build();
    pipeline.start()?;

    // The display task is the only place the sink is touched
    let display = match config.display.dump_dir.clone() {
        Some(dir) => {
            let mut sink = PngDumpSink::new(dir, config.display.dump_every)?;
            tokio::spawn(async move { run_display(updates, &mut sink).await })
        }
        None => {
            let mut sink = LogSink::new(config.display.report_every);
            tokio::spawn(async move { run_display(updates, &mut sink).await })
        }
    };

    let source = Source::open(config.capture.clone())?;
    let capture = spawn_capture(source, FrameAnalyzer::new(slot.clone(), tracker.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    capture.abort();
    // Dropping the pipeline closes the display channel
    let stopped = tokio::task::spawn_blocking(move || {
        let stopped = pipeline.stop();
        drop(pipeline);
        stopped
    })
    .await?;
    stopped?;

    let shown = display.await?;
    let stats = slot.stats();
    info!(
        shown,
        captured = stats.put,
        dropped = stats.dropped,
        "depthcam shutting down"
    );
    info!("Last report:\n{}", tracker.report());
    Ok(())
}
