// THEORY:
// The `ColorClassifier` answers one question for an ambiguous detection: which
// team's jersey does this crop look like? Each team is described by one
// calibrated HSV box (`ColorRange`). A crop is scored against every box by
// counting the pixels that fall inside it on all three channels, and the box
// with the most hits wins.
//
// Key rules:
// 1.  **1-based result**: the winner is reported as `argmax + 1`. Team index 0 is
//     reserved for objects that never get a team (the ball).
// 2.  **First maximum wins**: when two ranges score the same, the lower index is
//     returned. This keeps classification deterministic for a given crop.
// 3.  **Empty crops**: a zero-area crop (degenerate or fully clipped box) scores
//     zero everywhere and therefore resolves to team 1, the documented default.
// 4.  **Stateless**: the classifier owns only its immutable ranges.

use crate::core_modules::hsv::hsv::Hsv;
use crate::error::{Result, VisionError};
use image::{GenericImageView, Rgb};
use serde::{Deserialize, Serialize};

/// 1-based team identity assigned by color classification.
pub type TeamIndex = usize;

/// Team returned when a crop carries no color evidence at all.
pub const DEFAULT_TEAM: TeamIndex = 1;

type RangePair = ([u8; 3], [u8; 3]);

/// Inclusive lower/upper HSV bounds for one team.
///
/// Serialized as a `[lower, upper]` pair, so a calibration file is a plain JSON
/// list like `[[[100, 80, 50], [130, 255, 255]], ...]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RangePair", into = "RangePair")]
pub struct ColorRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl ColorRange {
    pub fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    /// True when every channel of `hsv` lies within the bounds.
    #[inline]
    pub fn contains(&self, hsv: &Hsv) -> bool {
        hsv.as_array()
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .all(|(value, (lower, upper))| lower <= value && value <= upper)
    }
}

impl From<RangePair> for ColorRange {
    fn from((lower, upper): RangePair) -> Self {
        Self { lower, upper }
    }
}

impl From<ColorRange> for RangePair {
    fn from(range: ColorRange) -> Self {
        (range.lower, range.upper)
    }
}

/// Scores image crops against a fixed set of calibrated team color ranges.
#[derive(Debug, Clone)]
pub struct ColorClassifier {
    ranges: Vec<ColorRange>,
}

impl ColorClassifier {
    /// Build a classifier. At least one range is required, since every player
    /// detection must be assigned a team.
    pub fn new(ranges: Vec<ColorRange>) -> Result<Self> {
        if ranges.is_empty() {
            return Err(VisionError::CalibrationMissing(
                "at least one team color range is required".to_string(),
            ));
        }
        Ok(Self { ranges })
    }

    /// Number of calibrated teams.
    pub fn team_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn ranges(&self) -> &[ColorRange] {
        &self.ranges
    }

    /// Count of in-range pixels for every team, in calibration order.
    pub fn scores<I>(&self, crop: &I) -> Vec<u64>
    where
        I: GenericImageView<Pixel = Rgb<u8>>,
    {
        let mut scores = vec![0u64; self.ranges.len()];
        for (_, _, pixel) in crop.pixels() {
            let hsv = Hsv::from(pixel);
            for (score, range) in scores.iter_mut().zip(&self.ranges) {
                if range.contains(&hsv) {
                    *score += 1;
                }
            }
        }
        scores
    }

    /// The best-matching team for `crop`, always within `1..=team_count()`.
    pub fn classify<I>(&self, crop: &I) -> TeamIndex
    where
        I: GenericImageView<Pixel = Rgb<u8>>,
    {
        let (width, height) = crop.dimensions();
        if width == 0 || height == 0 {
            return DEFAULT_TEAM;
        }

        let scores = self.scores(crop);
        let mut best_index = 0;
        for (index, &score) in scores.iter().enumerate() {
            // Strictly greater: the first maximum is kept on ties.
            if score > scores[best_index] {
                best_index = index;
            }
        }
        best_index + 1
    }
}
