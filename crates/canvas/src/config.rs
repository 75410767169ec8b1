use std::fs;
use std::path::{Path, PathBuf};

use driver::{LiftFallback, NormalizerConfig};
use engine::{CanvasBootstrap, WorkerConfig};
use images::ChannelOrder;
use log::{debug, info};
use serde::{Deserialize, Serialize};

pub const MAX_SURFACE_EXTENT: u32 = 16_384;
pub const MAX_COALESCED_COMMANDS_LIMIT: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurfaceConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 800,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushConfig {
    pub initial_color: [f32; 3],
    pub initial_size: Option<f32>,
    /// Brush definition file loaded when the canvas attaches.
    pub preset: Option<PathBuf>,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            initial_color: [0.0, 0.7, 1.0],
            initial_size: None,
            preset: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    pub max_coalesced_commands: usize,
    pub thread_name: String,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            max_coalesced_commands: engine::worker::DEFAULT_MAX_COALESCED_COMMANDS,
            thread_name: engine::worker::DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub lift_fallback: LiftFallback,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub channel_order: ChannelOrder,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub surface: SurfaceConfig,
    pub brush: BrushConfig,
    pub worker: WorkerSection,
    pub input: InputConfig,
    pub display: DisplayConfig,
}

impl CanvasConfig {
    /// Loads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("config file not found, using defaults");
            debug!("expected config at: {}", path.display());
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate_and_clamp();

        info!("loaded config from {}", path.display());
        debug!("config: {config:?}");
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn validate_and_clamp(&mut self) {
        // Surface: 1 - 16384 px per side
        if !(1..=MAX_SURFACE_EXTENT).contains(&self.surface.width) {
            log::warn!(
                "Invalid surface width {}, clamping to 1-{MAX_SURFACE_EXTENT} range",
                self.surface.width
            );
            self.surface.width = self.surface.width.clamp(1, MAX_SURFACE_EXTENT);
        }
        if !(1..=MAX_SURFACE_EXTENT).contains(&self.surface.height) {
            log::warn!(
                "Invalid surface height {}, clamping to 1-{MAX_SURFACE_EXTENT} range",
                self.surface.height
            );
            self.surface.height = self.surface.height.clamp(1, MAX_SURFACE_EXTENT);
        }

        for channel in &mut self.brush.initial_color {
            let value = *channel;
            if !(0.0..=1.0).contains(&value) {
                log::warn!("Invalid color channel {value:.3}, clamping to 0.0-1.0 range");
                *channel = if value.is_nan() {
                    0.0
                } else {
                    value.clamp(0.0, 1.0)
                };
            }
        }

        if let Some(size) = self.brush.initial_size {
            if !(size.is_finite() && size > 0.0) {
                log::warn!("Invalid initial brush size {size}, ignoring it");
                self.brush.initial_size = None;
            }
        }

        if !(1..=MAX_COALESCED_COMMANDS_LIMIT).contains(&self.worker.max_coalesced_commands) {
            log::warn!(
                "Invalid max_coalesced_commands {}, clamping to 1-{MAX_COALESCED_COMMANDS_LIMIT} range",
                self.worker.max_coalesced_commands
            );
            self.worker.max_coalesced_commands = self
                .worker
                .max_coalesced_commands
                .clamp(1, MAX_COALESCED_COMMANDS_LIMIT);
        }

        if self.worker.thread_name.trim().is_empty() {
            log::warn!("Empty worker thread_name, falling back to the default");
            self.worker.thread_name = engine::worker::DEFAULT_THREAD_NAME.to_string();
        }
    }

    pub fn normalizer_config(&self) -> NormalizerConfig {
        NormalizerConfig {
            lift_fallback: self.input.lift_fallback,
        }
    }

    /// Worker settings; `initial_preset` holds the already-read preset file.
    pub fn worker_config(&self, initial_preset: Option<String>) -> WorkerConfig {
        WorkerConfig {
            max_coalesced_commands: self.worker.max_coalesced_commands,
            thread_name: self.worker.thread_name.clone(),
            bootstrap: CanvasBootstrap {
                width: self.surface.width,
                height: self.surface.height,
                initial_color: self.brush.initial_color,
                initial_brush_size: self.brush.initial_size,
                initial_preset,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_stock_canvas() {
        let config = CanvasConfig::default();
        assert_eq!((config.surface.width, config.surface.height), (1024, 800));
        assert_eq!(config.brush.initial_color, [0.0, 0.7, 1.0]);
        assert_eq!(config.worker.max_coalesced_commands, 100);
        assert_eq!(config.worker.thread_name, "stroke-worker");
        assert_eq!(config.input.lift_fallback, LiftFallback::KeepLiftAxes);
        assert_eq!(config.display.channel_order, ChannelOrder::Bgra);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_sections() {
        let config = CanvasConfig::from_toml(
            r#"
            [surface]
            width = 640

            [input]
            lift_fallback = "reuse_last_sample"

            [display]
            channel_order = "rgba"
            "#,
        )
        .expect("parse config");
        assert_eq!(config.surface.width, 640);
        assert_eq!(config.surface.height, 800);
        assert_eq!(config.input.lift_fallback, LiftFallback::ReuseLastSample);
        assert_eq!(config.display.channel_order, ChannelOrder::Rgba);
        assert_eq!(config.worker, WorkerSection::default());
    }

    #[test]
    fn out_of_range_values_are_clamped() {
        let mut config = CanvasConfig::from_toml(
            r#"
            [surface]
            width = 0
            height = 40000

            [brush]
            initial_color = [-0.5, 0.5, 3.0]
            initial_size = -2.0

            [worker]
            max_coalesced_commands = 0
            thread_name = "  "
            "#,
        )
        .expect("parse config");
        config.validate_and_clamp();

        assert_eq!(config.surface.width, 1);
        assert_eq!(config.surface.height, MAX_SURFACE_EXTENT);
        assert_eq!(config.brush.initial_color, [0.0, 0.5, 1.0]);
        assert_eq!(config.brush.initial_size, None);
        assert_eq!(config.worker.max_coalesced_commands, 1);
        assert_eq!(config.worker.thread_name, "stroke-worker");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config = CanvasConfig::load(&dir.path().join("absent.toml")).expect("load");
        assert_eq!(config, CanvasConfig::default());
    }

    #[test]
    fn load_reads_and_clamps_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[worker]\nmax_coalesced_commands = 50000").expect("write config");
        let config = CanvasConfig::load(file.path()).expect("load");
        assert_eq!(config.worker.max_coalesced_commands, MAX_COALESCED_COMMANDS_LIMIT);
    }

    #[test]
    fn malformed_file_reports_parse_error_with_path() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[surface\nwidth = 3").expect("write config");
        let error = CanvasConfig::load(file.path()).expect_err("malformed config");
        assert!(matches!(error, ConfigError::Parse { .. }));
        assert!(error.to_string().contains(&file.path().display().to_string()));
    }

    #[test]
    fn worker_config_carries_bootstrap_settings() {
        let mut config = CanvasConfig::default();
        config.brush.initial_size = Some(9.0);
        let worker = config.worker_config(Some("{}".to_string()));
        assert_eq!(worker.bootstrap.width, 1024);
        assert_eq!(worker.bootstrap.initial_brush_size, Some(9.0));
        assert_eq!(worker.bootstrap.initial_preset.as_deref(), Some("{}"));
    }
}
