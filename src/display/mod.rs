pub mod colormap;
pub mod sink;

use std::time::Duration;

use flume::Receiver;
use image::RgbImage;
use tracing::{debug, info};

pub use colormap::{depth_colormap, Colormap};
pub use sink::{LogSink, PngDumpSink};

/// Destination of finished depth images and the performance overlay.
///
/// Only ever touched from the display context that drains the pipeline's
/// update channel. Failures stay inside the sink.
pub trait DisplaySink {
    fn show(&mut self, image: &RgbImage);

    fn show_text(&mut self, text: &str);
}

/// One completed inference, posted from the worker to the display context
#[derive(Debug, Clone)]
pub struct DisplayUpdate {
    pub sequence: u64,
    /// Colormapped depth at model resolution
    pub image: RgbImage,
    /// Camera frame size the depth was estimated from
    pub source_dimensions: (u32, u32),
    pub model_dimensions: (u32, u32),
    /// Model header plus the performance report
    pub status: String,
    /// Capture to publish
    pub latency: Duration,
}

/// Drain `updates` into `sink` until the pipeline side hangs up.
///
/// Returns the number of updates shown.
pub async fn run_display<S: DisplaySink>(updates: Receiver<DisplayUpdate>, sink: &mut S) -> u64 {
    let mut shown = 0;
    while let Ok(update) = updates.recv_async().await {
        debug!(
            sequence = update.sequence,
            latency_ms = update.latency.as_millis() as u64,
            "Displaying depth frame"
        );
        metrics::histogram!("frame_latency_ms").record(update.latency.as_millis() as f64);

        sink.show(&update.image);
        sink.show_text(&update.status);
        shown += 1;
    }
    info!(shown, "Display channel closed");
    shown
}
