pub mod capture;
pub mod clock;
pub mod depth;
pub mod display;
pub mod error;
pub mod perf;
pub mod pipeline;
pub mod utils;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use capture::{Frame, PixelFormat};
pub use depth::{DepthField, DepthModel, ModelPreset};
pub use display::{DisplaySink, DisplayUpdate};
pub use error::{ConfigError, ModelError, PipelineError};
pub use perf::{PerformanceTracker, Stream};
pub use pipeline::{FramePipeline, LatestFrameSlot};

/// Environment variables override file settings, e.g. `DEPTHCAM__CAPTURE__FPS=15`
pub const ENV_PREFIX: &str = "DEPTHCAM";

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub model: ModelConfig,
    pub pipeline: PipelineConfig,
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureSource {
    /// Generated test pattern, no hardware needed
    Synthetic,
    /// V4L2 camera, requires the `v4l2` feature
    V4l2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: CaptureSource,
    /// Device path, empty to auto-detect
    pub device: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub format: PixelFormat,
    /// Clockwise rotation applied after decoding
    pub rotation: u32,
    pub buffer_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub preset: ModelPreset,
    /// Extra time spent in every prediction, to emulate a slow runtime
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub idle_wait_ms: u64,
    pub display_queue: usize,
    pub worker_core: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Log the performance report every n depth frames
    pub report_every: u64,
    /// Write colormapped depth images here when set
    pub dump_dir: Option<PathBuf>,
    pub dump_every: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: CaptureSource::Synthetic,
            device: "/dev/video0".into(),
            width: 640,
            height: 480,
            fps: 30,
            format: PixelFormat::Mjpeg,
            rotation: 0,
            buffer_count: 4,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            preset: ModelPreset::Midas,
            latency_ms: 60,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            idle_wait_ms: 2,
            display_queue: 2,
            worker_core: None,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            report_every: 30,
            dump_dir: None,
            dump_every: 10,
        }
    }
}

impl Config {
    /// Defaults, then `path` if given, then `DEPTHCAM__*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder =
            config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capture = &self.capture;
        if capture.width == 0 || capture.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "capture size {}x{} is empty",
                capture.width, capture.height
            )));
        }
        if capture.fps == 0 {
            return Err(ConfigError::Invalid("capture.fps must be positive".into()));
        }
        if capture.rotation % 90 != 0 {
            return Err(ConfigError::Invalid(format!(
                "capture.rotation {} is not a multiple of 90",
                capture.rotation
            )));
        }
        if self.pipeline.idle_wait_ms == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.idle_wait_ms must be positive".into(),
            ));
        }
        if self.display.dump_every == 0 || self.display.report_every == 0 {
            return Err(ConfigError::Invalid(
                "display intervals must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.capture.source, CaptureSource::Synthetic);
        assert_eq!(config.model.preset, ModelPreset::Midas);
    }

    #[test]
    fn file_overrides_defaults_partially() {
        let path = std::env::temp_dir().join(format!("depthcam-config-{}.toml", std::process::id()));
        fs::write(
            &path,
            r#"
            [capture]
            fps = 12
            format = "Rgb24"
            rotation = 270

            [model]
            preset = "depth-anything"

            [pipeline]
            worker_core = 1
            "#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(config.capture.fps, 12);
        assert_eq!(config.capture.format, PixelFormat::Rgb24);
        assert_eq!(config.capture.rotation, 270);
        assert_eq!(config.capture.width, 640);
        assert_eq!(config.model.preset, ModelPreset::DepthAnything);
        assert_eq!(config.model.latency_ms, 60);
        assert_eq!(config.pipeline.worker_core, Some(1));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = Config::default();
        config.capture.rotation = 45;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.capture.fps = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_idle_wait_is_rejected() {
        let mut config = Config::default();
        config.pipeline.idle_wait_ms = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_is_an_error() {
        let missing = Path::new("/nonexistent/depthcam.toml");
        assert!(matches!(
            Config::load(Some(missing)),
            Err(ConfigError::Load(_))
        ));
    }
}
