// SPDX-License-Identifier: GPL-3.0-only

//! Crate-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Preview resolution presets
///
/// Fixed geometry choices offered by the demo binary. The pipeline itself
/// accepts any non-zero dimensions through `bind_capture_target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResolutionPreset {
    /// SD: 640x480
    Sd,
    /// HD: 1280x720 (default)
    #[default]
    Hd,
    /// Full HD: 1920x1080
    FullHd,
}

impl ResolutionPreset {
    /// Get all preset variants for CLI iteration
    pub const ALL: [ResolutionPreset; 3] = [
        ResolutionPreset::Sd,
        ResolutionPreset::Hd,
        ResolutionPreset::FullHd,
    ];

    /// Get display name for the preset
    pub fn display_name(&self) -> &'static str {
        match self {
            ResolutionPreset::Sd => "SD",
            ResolutionPreset::Hd => "HD",
            ResolutionPreset::FullHd => "Full HD",
        }
    }

    /// Get the preview dimensions in pixels
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ResolutionPreset::Sd => (640, 480),
            ResolutionPreset::Hd => (1280, 720),
            ResolutionPreset::FullHd => (1920, 1080),
        }
    }
}

impl std::fmt::Display for ResolutionPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (w, h) = self.dimensions();
        write!(f, "{} ({}x{})", self.display_name(), w, h)
    }
}

/// Timing constants for frame production and demo loops
pub mod timing {
    use super::Duration;

    /// Frame interval used by the synthetic camera driver (~30 fps)
    pub const SYNTHETIC_FRAME_INTERVAL: Duration = Duration::from_millis(33);

    /// Poll interval for the demo binary's wait loop
    pub const DEMO_POLL_INTERVAL: Duration = Duration::from_millis(100);
}

/// Logging cadence
pub mod logging {
    /// Log every Nth presented frame to avoid flooding at preview rates
    pub const FRAME_LOG_INTERVAL: u64 = 30;
}

/// Defaults used when no configuration is present
pub mod defaults {
    /// Camera device identifier opened by default
    pub const DEVICE_ID: &str = "0";
}
