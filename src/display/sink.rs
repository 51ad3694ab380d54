//! Headless display sinks

use std::fs;
use std::path::PathBuf;

use image::RgbImage;
use tracing::{debug, info, warn};

use super::DisplaySink;

/// Logs the performance overlay every `every` updates
pub struct LogSink {
    every: u64,
    images: u64,
    texts: u64,
}

impl LogSink {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            images: 0,
            texts: 0,
        }
    }

    pub fn images_shown(&self) -> u64 {
        self.images
    }
}

impl DisplaySink for LogSink {
    fn show(&mut self, image: &RgbImage) {
        self.images += 1;
        debug!(width = image.width(), height = image.height(), "Depth image");
    }

    fn show_text(&mut self, text: &str) {
        if self.texts % self.every == 0 {
            info!("\n{}", text);
        }
        self.texts += 1;
    }
}

/// Writes every `every`-th depth image to `dir` as PNG
pub struct PngDumpSink {
    dir: PathBuf,
    every: u64,
    seen: u64,
    last_text: String,
}

impl PngDumpSink {
    pub fn new(dir: impl Into<PathBuf>, every: u64) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!("Dumping depth images to {}", dir.display());
        Ok(Self {
            dir,
            every: every.max(1),
            seen: 0,
            last_text: String::new(),
        })
    }

    pub fn last_text(&self) -> &str {
        &self.last_text
    }
}

impl DisplaySink for PngDumpSink {
    fn show(&mut self, image: &RgbImage) {
        let index = self.seen;
        self.seen += 1;
        if index % self.every != 0 {
            return;
        }

        let path = self.dir.join(format!("depth_{index:06}.png"));
        match image.save(&path) {
            Ok(()) => debug!("Wrote {}", path.display()),
            Err(e) => warn!("Failed to write {}: {}", path.display(), e),
        }
    }

    fn show_text(&mut self, text: &str) {
        self.last_text.clear();
        self.last_text.push_str(text);
    }
}
