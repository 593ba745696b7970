// THEORY:
// This module is the boundary between the external detector/tracker and the
// rest of the engine. The detector speaks in `RawDetection`s (a box, a label and
// maybe a track id); everything downstream speaks in `DetectedObject`s, whose
// `ObjectKind` already says whether the object is the ball or a player of a
// known team.
//
// Key architectural principles:
// 1.  **Narrow collaborator interface**: `DetectionSource` is the only thing the
//     engine knows about the model. It is handed a frame and returns plain
//     records; no tensors or model-specific types leak through.
// 2.  **Untrusted boxes**: detector output is noisy. Boxes may be inverted or hang
//     off the frame edge. `BoundingBox::normalized` sorts the corners, and the
//     crop rectangle is clamped to the frame, so cropping can never read out of
//     bounds. A box that collapses to nothing yields an empty crop, which the
//     classifier resolves to its default team.
// 3.  **Order preserving**: the adapter emits one object per detection, in the
//     detector's order. It does not merge, drop or re-identify anything.

use crate::core_modules::color_classifier::{ColorClassifier, TeamIndex};
use image::RgbImage;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Axis-aligned box in camera pixels, corners as reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Integer pixel window `[x, x + width) x [y, y + height)` inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Corners sorted so that `x1 <= x2` and `y1 <= y2`. Non-finite coordinates
    /// are treated as 0.
    pub fn normalized(&self) -> Self {
        let finite = |v: f32| if v.is_finite() { v } else { 0.0 };
        let (x1, x2) = (finite(self.x1), finite(self.x2));
        let (y1, y2) = (finite(self.y1), finite(self.y2));
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Where the object touches the ground: the bottom-center of the box.
    pub fn ground_point(&self) -> Point2<f64> {
        Point2::new(((self.x1 + self.x2) / 2.0) as f64, self.y2 as f64)
    }

    /// The pixels of a `frame_width` x `frame_height` frame covered by this box.
    ///
    /// The window is clamped to the frame and may be empty (zero width or
    /// height) for degenerate boxes or boxes entirely off-frame.
    pub fn crop_window(&self, frame_width: u32, frame_height: u32) -> CropWindow {
        let bbox = self.normalized();
        let clamp_x = |v: f32| v.clamp(0.0, frame_width as f32);
        let clamp_y = |v: f32| v.clamp(0.0, frame_height as f32);

        let left = clamp_x(bbox.x1).floor() as u32;
        let right = clamp_x(bbox.x2).ceil() as u32;
        let top = clamp_y(bbox.y1).floor() as u32;
        let bottom = clamp_y(bbox.y2).ceil() as u32;

        CropWindow {
            x: left.min(frame_width),
            y: top.min(frame_height),
            width: right.saturating_sub(left),
            height: bottom.saturating_sub(top),
        }
    }
}

/// Class label as reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionLabel {
    Ball,
    Player,
}

impl From<u32> for DetectionLabel {
    /// Numeric class ids: 0 is the ball, every other class is treated as a
    /// player that needs team disambiguation.
    fn from(class_id: u32) -> Self {
        if class_id == 0 {
            DetectionLabel::Ball
        } else {
            DetectionLabel::Player
        }
    }
}

/// One detection for one frame, straight from the external detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub label: DetectionLabel,
    #[serde(default)]
    pub track_id: Option<u64>,
}

impl RawDetection {
    pub fn new(bbox: BoundingBox, label: DetectionLabel, track_id: Option<u64>) -> Self {
        Self { bbox, label, track_id }
    }
}

/// What an object is, once classification has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Ball,
    Player { team: TeamIndex, display_id: u64 },
}

/// A classified detection, optionally placed on the layout.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedObject {
    /// Normalized (sorted, not clamped) box in camera pixels.
    pub bbox: BoundingBox,
    pub kind: ObjectKind,
    /// Ground point in layout pixels; `None` until projected, or if projection
    /// is unavailable or degenerate for this object.
    pub layout_point: Option<Point2<f64>>,
}

impl DetectedObject {
    pub fn team(&self) -> Option<TeamIndex> {
        match self.kind {
            ObjectKind::Ball => None,
            ObjectKind::Player { team, .. } => Some(team),
        }
    }
}

/// The external detector/tracker.
///
/// Implementations return the detections for exactly the frame they are given,
/// in a stable order.
pub trait DetectionSource {
    /// Error type for detection failures.
    type Error: std::fmt::Display;

    fn detect(&mut self, frame_index: u64, frame: &RgbImage) -> Result<Vec<RawDetection>, Self::Error>;
}

/// Turns raw detections into classified `DetectedObject`s.
pub struct DetectionAdapter<'a> {
    classifier: &'a ColorClassifier,
}

impl<'a> DetectionAdapter<'a> {
    pub fn new(classifier: &'a ColorClassifier) -> Self {
        Self { classifier }
    }

    /// A copy of the frame region under `bbox`, clamped to the frame. Never
    /// reads out of bounds; may be empty.
    pub fn crop(frame: &RgbImage, bbox: &BoundingBox) -> RgbImage {
        let window = bbox.crop_window(frame.width(), frame.height());
        RgbImage::from_fn(window.width, window.height, |x, y| {
            *frame.get_pixel(window.x + x, window.y + y)
        })
    }

    pub fn adapt(&self, raw_detections: &[RawDetection], frame: &RgbImage) -> Vec<DetectedObject> {
        raw_detections
            .iter()
            .map(|detection| {
                let bbox = detection.bbox.normalized();
                let kind = match detection.label {
                    DetectionLabel::Ball => ObjectKind::Ball,
                    DetectionLabel::Player => {
                        let crop = Self::crop(frame, &bbox);
                        let team = self.classifier.classify(&crop);
                        ObjectKind::Player {
                            team,
                            display_id: detection.track_id.unwrap_or(team as u64),
                        }
                    }
                };
                DetectedObject { bbox, kind, layout_point: None }
            })
            .collect()
    }
}
