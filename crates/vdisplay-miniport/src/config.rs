//! Install-time adapter configuration.
//!
//! The number of present sources and child connectors, the mode set and the monitor identity
//! are fixed when the driver object is created and apply to every adapter it adds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vdisplay_ddi::DisplayMode;
use vdisplay_edid::{EdidBuilder, EdidError, EdidMode};

pub const MAX_VIDEO_PRESENT_SOURCES: u32 = 16;
pub const MAX_CHILDREN: u32 = 16;
pub const MAX_MODE_DIMENSION: u32 = 8192;
/// Longest drain window `StopDevice` may be configured to wait.
pub const MAX_STOP_DRAIN_TIMEOUT_MS: u64 = 60_000;

/// Environment variable naming a JSON config file for [`AdapterConfig::from_env`].
pub const CONFIG_ENV_VAR: &str = "VDISPLAY_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(&'static str),

    #[error("monitor descriptor cannot be built: {0}")]
    Edid(#[from] EdidError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdapterConfig {
    pub video_present_sources: u32,
    pub children: u32,
    /// Supported source modes; the first entry is the monitor's preferred mode.
    pub modes: Vec<DisplayMode>,
    pub monitor_name: String,
    /// Upper bound on how long `StopDevice` waits for in-flight dispatches.
    pub stop_drain_timeout_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            video_present_sources: 1,
            children: 1,
            modes: vec![
                DisplayMode::new(1920, 1080, 60),
                DisplayMode::new(1280, 720, 60),
                DisplayMode::new(1024, 768, 60),
            ],
            monitor_name: "VDisplay".to_string(),
            stop_drain_timeout_ms: 1000,
        }
    }
}

impl AdapterConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Load from the file named by `VDISPLAY_CONFIG`, or defaults if it is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_VIDEO_PRESENT_SOURCES).contains(&self.video_present_sources) {
            return Err(ConfigError::Invalid("video_present_sources must be 1..=16"));
        }
        if !(1..=MAX_CHILDREN).contains(&self.children) {
            return Err(ConfigError::Invalid("children must be 1..=16"));
        }
        if self.modes.is_empty() {
            return Err(ConfigError::Invalid("modes must not be empty"));
        }
        for (i, mode) in self.modes.iter().enumerate() {
            if mode.width == 0 || mode.height == 0 || mode.refresh_hz == 0 {
                return Err(ConfigError::Invalid("mode dimensions and refresh must be non-zero"));
            }
            if mode.width > MAX_MODE_DIMENSION || mode.height > MAX_MODE_DIMENSION {
                return Err(ConfigError::Invalid("mode dimensions exceed 8192"));
            }
            if self.modes[..i].contains(mode) {
                return Err(ConfigError::Invalid("duplicate mode"));
            }
        }
        if self.stop_drain_timeout_ms > MAX_STOP_DRAIN_TIMEOUT_MS {
            return Err(ConfigError::Invalid("stop_drain_timeout_ms exceeds 60000"));
        }
        // Catches bad monitor names and an unencodable preferred mode.
        self.edid_builder(0).build()?;
        Ok(())
    }

    pub fn preferred_mode(&self) -> Option<DisplayMode> {
        self.modes.first().copied()
    }

    pub fn supports_mode(&self, mode: &DisplayMode) -> bool {
        self.modes.contains(mode)
    }

    pub fn stop_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_drain_timeout_ms)
    }

    /// EDID for child `child_uid`; children differ only in serial number.
    pub fn edid_builder(&self, child_uid: u32) -> EdidBuilder {
        let preferred = self
            .preferred_mode()
            .map(edid_mode)
            .unwrap_or(EdidMode::new(1024, 768, 60));
        EdidBuilder::new(preferred)
            .modes(self.modes.iter().copied().map(edid_mode))
            .monitor_name(self.monitor_name.clone())
            .serial(child_uid.wrapping_add(1))
    }
}

fn edid_mode(mode: DisplayMode) -> EdidMode {
    EdidMode::new(mode.width, mode.height, mode.refresh_hz)
}
