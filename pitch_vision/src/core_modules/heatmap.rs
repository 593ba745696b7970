// THEORY:
// The `HeatmapAccumulator` is the only component that remembers anything across
// frames. It owns a multi-channel occupancy grid with the same width and height
// as the layout image, one channel per team, and every frame each projected
// player adds a small filled disk ("stamp") to its team's channel.
//
// Key architectural principles:
// 1.  **Add, never overwrite**: a stamp adds 1.0 to every covered cell. Overlap
//     between players, and the same player standing still for many frames, both
//     make the region hotter. Cells never decrease and the grid is never reset
//     during a run, so stamping order does not matter.
// 2.  **Clipping, not failing**: stamps near the edge are cut off at the grid
//     boundary. A point entirely off the layout simply adds nothing.
// 3.  **Encapsulation**: the raw grid is private. Callers can only `stamp` into
//     it, take colorized `snapshot`s, or read values for diagnostics.
// 4.  **Display-time normalization**: counts grow without bound, so a snapshot
//     compresses each channel with `ln(1 + v) / ln(base)`, stretches the result to
//     0..=255 using that channel's own min and max *at snapshot time*, and maps it
//     through a jet color ramp. Contrast therefore keeps adapting as the match
//     goes on instead of being frozen by the first frames.

use crate::config::PipelineConfig;
use crate::core_modules::color_classifier::TeamIndex;
use crate::error::{Result, VisionError};
use image::{GrayImage, Rgb, RgbImage, imageops};
use nalgebra::Point2;
use ndarray::{Array2, Array3, ArrayView2, Axis};

/// Running per-team occupancy over the layout.
#[derive(Debug, Clone)]
pub struct HeatmapAccumulator {
    /// Occupancy counts, indexed `[y, x, team - 1]`.
    grid: Array3<f32>,
    radius: u32,
    log_base: f32,
}

impl HeatmapAccumulator {
    pub fn new(width: u32, height: u32, teams: usize, radius: u32, log_base: f32) -> Self {
        Self {
            grid: Array3::zeros((height as usize, width as usize, teams)),
            radius,
            log_base,
        }
    }

    pub fn from_config(width: u32, height: u32, teams: usize, config: &PipelineConfig) -> Self {
        Self::new(width, height, teams, config.stamp_radius, config.log_base)
    }

    pub fn width(&self) -> u32 {
        self.grid.dim().1 as u32
    }

    pub fn height(&self) -> u32 {
        self.grid.dim().0 as u32
    }

    pub fn team_count(&self) -> usize {
        self.grid.dim().2
    }

    fn channel_index(&self, team: TeamIndex) -> Result<usize> {
        if team == 0 || team > self.team_count() {
            return Err(VisionError::UnknownTeam { team, teams: self.team_count() });
        }
        Ok(team - 1)
    }

    /// Add a filled disk centered on the rounded `point` to `team`'s channel.
    pub fn stamp(&mut self, point: Point2<f64>, team: TeamIndex) -> Result<()> {
        let channel = self.channel_index(team)?;
        let radius = self.radius as f64;
        let (width, height) = (self.width() as f64, self.height() as f64);

        // Off-grid or non-finite points contribute nothing.
        if !point.x.is_finite()
            || !point.y.is_finite()
            || point.x < -radius - 1.0
            || point.y < -radius - 1.0
            || point.x > width + radius
            || point.y > height + radius
        {
            return Ok(());
        }

        let cx = point.x.round() as i64;
        let cy = point.y.round() as i64;
        let r = self.radius as i64;
        let x_start = (cx - r).max(0);
        let x_end = (cx + r).min(self.width() as i64 - 1);
        let y_start = (cy - r).max(0);
        let y_end = (cy + r).min(self.height() as i64 - 1);

        for y in y_start..=y_end {
            for x in x_start..=x_end {
                let (dx, dy) = (x - cx, y - cy);
                if dx * dx + dy * dy <= r * r {
                    self.grid[[y as usize, x as usize, channel]] += 1.0;
                }
            }
        }
        Ok(())
    }

    /// Read-only view of one team's occupancy, indexed `[y, x]`.
    pub fn channel(&self, team: TeamIndex) -> Result<ArrayView2<'_, f32>> {
        let channel = self.channel_index(team)?;
        Ok(self.grid.index_axis(Axis(2), channel))
    }

    /// Occupancy of one cell, `None` outside the grid or for an unknown team.
    pub fn value_at(&self, x: u32, y: u32, team: TeamIndex) -> Option<f32> {
        let channel = self.channel_index(team).ok()?;
        self.grid.get([y as usize, x as usize, channel]).copied()
    }

    /// One colorized image per team, in team order.
    pub fn snapshot(&self) -> Vec<RgbImage> {
        self.grid
            .axis_iter(Axis(2))
            .map(|channel| {
                let intensity = normalize_channel(channel, self.log_base);
                colorize(&intensity)
            })
            .collect()
    }
}

/// Log-compress a channel and min-max stretch it to 0..=255.
///
/// A constant channel (including an empty one) maps to all zeros.
pub fn normalize_channel(channel: ArrayView2<'_, f32>, log_base: f32) -> Array2<u8> {
    let log_divisor = log_base.ln();
    let compressed = channel.mapv(|v| v.max(0.0).ln_1p() / log_divisor);

    let min = compressed.iter().copied().fold(f32::INFINITY, f32::min);
    let max = compressed.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if !(range > f32::EPSILON) {
        return Array2::zeros(compressed.dim());
    }

    compressed.mapv(|v| ((v - min) / range * 255.0).clamp(0.0, 255.0) as u8)
}

/// Jet color ramp: dark blue at 0 through cyan, yellow, to dark red at 255.
pub fn jet(value: u8) -> Rgb<u8> {
    let v = value as f32 / 255.0;
    let ramp = |offset: f32| ((1.5 - (4.0 * v - offset).abs()).clamp(0.0, 1.0) * 255.0).round() as u8;
    Rgb([ramp(3.0), ramp(2.0), ramp(1.0)])
}

fn colorize(intensity: &Array2<u8>) -> RgbImage {
    let (rows, cols) = intensity.dim();
    RgbImage::from_fn(cols as u32, rows as u32, |x, y| jet(intensity[[y as usize, x as usize]]))
}

/// Blend a colorized heatmap over a grayscale copy of `base`.
///
/// `alpha` is the heatmap weight; the gray base gets `1 - alpha`. A heatmap of a
/// different size is resized to the base first.
pub fn overlay(base: &RgbImage, heatmap: &RgbImage, alpha: f32) -> RgbImage {
    let gray: GrayImage = imageops::grayscale(base);
    let resized;
    let heatmap = if heatmap.dimensions() == base.dimensions() {
        heatmap
    } else {
        resized = imageops::resize(heatmap, base.width(), base.height(), imageops::FilterType::Triangle);
        &resized
    };

    let alpha = alpha.clamp(0.0, 1.0);
    RgbImage::from_fn(base.width(), base.height(), |x, y| {
        let luma = gray.get_pixel(x, y).0[0] as f32;
        let heat = heatmap.get_pixel(x, y).0;
        let blend = |h: u8| (luma * (1.0 - alpha) + h as f32 * alpha).round().clamp(0.0, 255.0) as u8;
        Rgb([blend(heat[0]), blend(heat[1]), blend(heat[2])])
    })
}
