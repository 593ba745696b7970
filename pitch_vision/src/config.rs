//! Configuration for the pitch_vision pipeline

use crate::error::{Result, VisionError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// An RGB color triple.
pub type Rgb = [u8; 3];

/// Tunable rendering and accumulation parameters.
///
/// Every field has a default, so a config file only needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Radius in layout pixels of the disk added to the occupancy grid per object.
    pub stamp_radius: u32,
    /// Base of the logarithm used to compress occupancy counts for display.
    pub log_base: f32,
    /// Weight of the colorized heatmap when blended over the gray layout (0..=1).
    pub overlay_alpha: f32,
    /// Radius of the filled marker drawn on the layout for each projected object.
    pub marker_radius: u32,
    /// Width of the black ring around each layout marker.
    pub marker_border: u32,
    /// Color used for ball markers.
    pub ball_color: Rgb,
    /// Team/identity colors, indexed by `id % palette.len()`.
    pub palette: Vec<Rgb>,
    /// Height of the id triangle drawn above each player.
    pub label_triangle_height: u32,
    /// Half of the id triangle's base.
    pub label_triangle_half_base: u32,
    /// Gap between the top of a player's box and the id triangle.
    pub label_offset: u32,
    /// Log progress every this many frames (0 disables it).
    pub progress_interval: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stamp_radius: 10,
            log_base: 10.0,
            overlay_alpha: 0.7,
            marker_radius: 10,
            marker_border: 3,
            ball_color: [255, 255, 0],
            palette: vec![
                [0, 255, 0],
                [0, 0, 255],
                [255, 0, 0],
                [255, 255, 0],
                [255, 0, 255],
                [0, 255, 255],
            ],
            label_triangle_height: 25,
            label_triangle_half_base: 15,
            label_offset: 20,
            progress_interval: 100,
        }
    }
}

impl PipelineConfig {
    /// Load a config from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.stamp_radius == 0 {
            return Err(VisionError::Config("stamp_radius must be positive".to_string()));
        }
        if !(self.log_base > 1.0) || !self.log_base.is_finite() {
            return Err(VisionError::Config(format!(
                "log_base must be a finite number greater than 1, got {}",
                self.log_base
            )));
        }
        if !(0.0..=1.0).contains(&self.overlay_alpha) {
            return Err(VisionError::Config(format!(
                "overlay_alpha must be within [0, 1], got {}",
                self.overlay_alpha
            )));
        }
        if self.palette.is_empty() {
            return Err(VisionError::Config("palette must contain at least one color".to_string()));
        }
        Ok(())
    }

    /// The color for a team index or display id, cycling through the palette.
    pub fn color_for(&self, id: u64) -> Rgb {
        self.palette[(id % self.palette.len() as u64) as usize]
    }
}
