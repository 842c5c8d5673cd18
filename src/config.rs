// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline configuration and the capture-request template

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Autofocus mode requested from the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AutofocusMode {
    /// Continuous autofocus tuned for still scenes (default for preview)
    #[default]
    ContinuousPicture,
    /// Single-shot autofocus triggered per request
    Auto,
    /// Fixed focus
    Off,
}

/// Auto-exposure mode requested from the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExposureMode {
    /// Automatic exposure (default)
    #[default]
    On,
    /// Manual exposure
    Off,
}

/// Anti-banding compensation for artificial lighting flicker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AntiBandingMode {
    /// Let the device pick the mains frequency (default)
    #[default]
    Auto,
    /// 50 Hz mains
    Hz50,
    /// 60 Hz mains
    Hz60,
    /// No compensation
    Off,
}

/// Template from which every capture request is built
///
/// The defaults match the standard preview parameter set: continuous-picture
/// autofocus, auto-exposure on, automatic anti-banding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PreviewParameters {
    pub autofocus: AutofocusMode,
    pub auto_exposure: ExposureMode,
    pub anti_banding: AntiBandingMode,
}

/// Host-side configuration for the demo binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Camera device identifier to open
    pub device_id: String,
    /// Capture target width in pixels
    pub width: u32,
    /// Capture target height in pixels
    pub height: u32,
    /// Capture request template
    pub parameters: PreviewParameters,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let (width, height) = crate::constants::ResolutionPreset::default().dimensions();
        Self {
            device_id: crate::constants::defaults::DEVICE_ID.to_string(),
            width,
            height,
            parameters: PreviewParameters::default(),
        }
    }
}

impl PipelineConfig {
    /// Path of the persisted configuration file, if a config dir exists
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("camera-stream").join("config.json"))
    }

    /// Load the persisted configuration, falling back to defaults
    ///
    /// A missing file is normal on first run; a malformed file is reported
    /// and replaced by defaults rather than aborting the pipeline.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Malformed config, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Persist the configuration as JSON
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
    }
}
