//! ABOUTME: Configuration management with validation and environment loading
//! ABOUTME: Pipeline settings are fixed at construction; there is no hot reload

use config::{Config as ConfigBuilder, Environment, File};
use fw_core::{Error, Result};
use fw_vision::LocalizerKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use validator::{Validate, ValidationError};

/// File picked up from the working directory when no explicit path is given
pub const DEFAULT_CONFIG_FILE: &str = "framewatch.toml";

/// Main configuration struct
#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub frame: FrameConfig,
    #[validate(nested)]
    pub background: BackgroundConfig,
    #[validate(nested)]
    pub motion: MotionConfig,
    #[validate(nested)]
    pub capture: CaptureConfig,
    #[validate(nested)]
    pub display: DisplayConfig,
    pub telemetry: TelemetryConfig,
}

/// Frame geometry and ring buffer length
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct FrameConfig {
    #[validate(range(min = 1, max = 8192))]
    pub width: u32,
    #[validate(range(min = 1, max = 8192))]
    pub height: u32,
    #[validate(range(min = 1, max = 10000))]
    pub buffer_len: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            width: 352,
            height: 240,
            buffer_len: 100,
        }
    }
}

/// Background model refresh policy
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct BackgroundConfig {
    /// Captured frames between two background samples
    #[validate(range(min = 1, max = 100000))]
    pub frames_per_background: u32,
    /// How often the sampler checks the capture counter
    #[validate(range(min = 1, max = 10000))]
    pub poll_interval_ms: u64,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            frames_per_background: 20,
            poll_interval_ms: 10,
        }
    }
}

/// Motion mask thresholds and localizer choice
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct MotionConfig {
    /// Mask values strictly above this count as motion
    pub threshold_cutoff: u8,
    /// Divisor applied to surviving mask intensities by the grid localizer
    #[validate(range(min = 1.0, max = 65536.0))]
    pub intensity_scale: f32,
    pub localizer: LocalizerKind,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            threshold_cutoff: 40,
            intensity_scale: 256.0,
            localizer: LocalizerKind::Blob,
        }
    }
}

/// Kind of camera source
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Generated scene with a moving square
    #[default]
    Synthetic,
    /// Image files read from a directory in name order
    Directory,
}

/// One camera source
#[derive(Debug, Clone, Deserialize, Serialize, Validate, Default)]
#[validate(schema(function = "validate_source"))]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,
    #[serde(default)]
    pub path: Option<String>,
}

fn validate_source(source: &SourceConfig) -> std::result::Result<(), ValidationError> {
    match (source.kind, source.path.as_deref()) {
        (SourceKind::Directory, None) | (SourceKind::Directory, Some("")) => {
            Err(ValidationError::new("directory_source_requires_path"))
        }
        _ => Ok(()),
    }
}

/// Capture workers
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct CaptureConfig {
    #[validate(nested)]
    pub primary: SourceConfig,
    #[validate(nested)]
    pub secondary: Option<SourceConfig>,
    /// Failed grabs in a row before a capture worker gives up
    #[validate(range(min = 1, max = 100000))]
    pub max_consecutive_failures: u32,
    /// Pause between grabs; zero means grab as fast as the source allows
    #[validate(range(max = 60000))]
    pub frame_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            primary: SourceConfig::default(),
            secondary: None,
            max_consecutive_failures: 30,
            frame_interval_ms: 33,
        }
    }
}

/// Consumer loop cadence
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct DisplayConfig {
    #[validate(range(min = 1, max = 600000))]
    pub interval_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { interval_ms: 500 }
    }
}

/// Log output flavour
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    pub environment: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from defaults, `framewatch.toml` if present, and the environment
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, reading `path` instead of the default file when given
    ///
    /// Environment variables use the `FRAMEWATCH_` prefix and `__` between
    /// sections, e.g. `FRAMEWATCH_MOTION__LOCALIZER=grid`.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        // Set defaults first
        builder = builder
            .set_default("frame.width", 352)?
            .set_default("frame.height", 240)?
            .set_default("frame.buffer_len", 100)?
            .set_default("background.frames_per_background", 20)?
            .set_default("background.poll_interval_ms", 10)?
            .set_default("motion.threshold_cutoff", 40)?
            .set_default("motion.intensity_scale", 256.0)?
            .set_default("motion.localizer", "blob")?
            .set_default("capture.primary.kind", "synthetic")?
            .set_default("capture.max_consecutive_failures", 30)?
            .set_default("capture.frame_interval_ms", 33)?
            .set_default("display.interval_ms", 500)?
            .set_default("telemetry.environment", "development")?;

        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file does not exist: {}",
                        path.display()
                    )));
                }
                builder = builder.add_source(File::from(path).required(true));
            }
            None => {
                if Path::new(DEFAULT_CONFIG_FILE).exists() {
                    builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
                }
            }
        }

        // Environment variables have the highest priority
        builder = builder.add_source(
            Environment::with_prefix("FRAMEWATCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| Error::Config(format!("Failed to build config: {}", e)))?;

        let parsed: Config = config
            .try_deserialize()
            .map_err(|e| Error::Config(format!("Failed to deserialize config: {}", e)))?;

        parsed.check()?;
        Ok(parsed)
    }

    /// Validate field ranges and source settings
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|e| Error::Config(format!("Config validation failed: {}", e)))
    }
}
