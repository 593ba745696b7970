// THEORY:
// The `FrameCompositor` turns numbers into pixels. It draws three kinds of
// panes and tiles them into one canvas per frame:
//
// 1.  **Camera pane**: the original frame with a marker per object. The marker
//     depends only on the object's kind, and the match on `ObjectKind` is
//     exhaustive:
//     - `Ball`: a circle inscribed in the box.
//     - `Player`: a team-colored half-ellipse "shadow" under the box plus a white
//       triangle above it carrying the display id. Both markers are always drawn
//       together.
// 2.  **Layout pane**: the top-down field with a bordered disk at each projected
//     ground point. Drawing a player's disk is also the moment its position is
//     stamped into the heatmap, so the layout pane and the occupancy grid can
//     never disagree about where a player was.
// 3.  **Heatmap panes**: one per team, the colorized occupancy blended over a
//     grayscale copy of the layout.
//
// Apart from that stamp, every function here is a pure function of its inputs.

use crate::config::PipelineConfig;
use crate::core_modules::detection::{BoundingBox, DetectedObject, ObjectKind};
use crate::core_modules::glyphs;
use crate::core_modules::heatmap::{self, HeatmapAccumulator};
use image::{Rgb, RgbImage, imageops};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_polygon_mut};
use imageproc::point::Point;
use tracing::debug;

const BALL_RING_THICKNESS: i32 = 2;
const SHADOW_THICKNESS: i32 = 4;
const LABEL_SCALE: u32 = 2;
const CANVAS_COLUMNS: u32 = 2;

const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

pub struct FrameCompositor<'a> {
    config: &'a PipelineConfig,
}

impl<'a> FrameCompositor<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// The camera frame with ball rings, player shadows and id labels.
    pub fn draw_camera_pane(&self, frame: &RgbImage, objects: &[DetectedObject]) -> RgbImage {
        let mut pane = frame.clone();
        let margin = self.camera_margin(frame);
        for object in objects {
            let Some(bbox) = drawable_box(&object.bbox, frame, margin) else {
                continue;
            };
            match object.kind {
                ObjectKind::Ball => self.draw_ball(&mut pane, &bbox),
                ObjectKind::Player { team, display_id } => {
                    let color = Rgb(self.config.color_for(team as u64));
                    self.draw_shadow(&mut pane, &bbox, color);
                    self.draw_label(&mut pane, &bbox, display_id, margin);
                }
            }
        }
        pane
    }

    /// How far outside its box a camera-pane marker may reach.
    fn camera_margin(&self, frame: &RgbImage) -> f32 {
        let extent = frame.width().max(frame.height()) as f32;
        let label = self.config.label_offset as f32 + self.config.label_triangle_height as f32;
        label.min(extent) + SHADOW_THICKNESS as f32
    }

    fn draw_ball(&self, pane: &mut RgbImage, bbox: &BoundingBox) {
        let (cx, cy) = bbox.center();
        let radius = (bbox.width().min(bbox.height()) / 2.0) as i32;
        let center = (cx.round() as i32, cy.round() as i32);
        let color = Rgb(self.config.ball_color);
        for ring in 0..BALL_RING_THICKNESS {
            let r = radius - ring;
            if r < 0 {
                break;
            }
            draw_hollow_circle_mut(pane, center, r, color);
        }
    }

    /// Lower half of an ellipse centered on the bottom edge of the box.
    fn draw_shadow(&self, pane: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
        let (cx, _) = bbox.center();
        let cy = bbox.y2;
        let semi_x = (bbox.width() / 2.0).trunc();
        let semi_y = (bbox.height() / 10.0).trunc();

        let samples = ((semi_x + semi_y) * 2.0).clamp(16.0, 720.0) as u32;
        for step in 0..=samples {
            let t = std::f32::consts::PI * step as f32 / samples as f32;
            let x = cx + semi_x * t.cos();
            let y = cy + semi_y * t.sin();
            draw_filled_circle_mut(pane, (x.round() as i32, y.round() as i32), SHADOW_THICKNESS / 2, color);
        }
    }

    /// Downward-pointing white triangle above the box with the id inside.
    fn draw_label(&self, pane: &mut RgbImage, bbox: &BoundingBox, display_id: u64, margin: f32) {
        let height = (self.config.label_triangle_height as f32).min(margin) as i32;
        let half_base = (self.config.label_triangle_half_base as f32).min(margin) as i32;
        if height == 0 || half_base == 0 {
            return;
        }

        let (cx, _) = bbox.center();
        let cx = cx.round() as i32;
        let top = (bbox.y1 - (self.config.label_offset as f32).min(margin)).round() as i32;
        let triangle = [
            Point::new(cx, top + height),
            Point::new(cx - half_base, top),
            Point::new(cx + half_base, top),
        ];
        draw_polygon_mut(pane, &triangle, WHITE);

        let text = display_id.to_string();
        let (text_width, _) = glyphs::text_size(&text, LABEL_SCALE);
        glyphs::draw_digits(
            pane,
            &text,
            cx - text_width as i32 / 2,
            top + LABEL_SCALE as i32,
            LABEL_SCALE,
            BLACK,
        );
    }

    /// The layout with a bordered disk per projected object. Every projected
    /// player is stamped into `heatmap`.
    pub fn draw_layout_pane(
        &self,
        layout: &RgbImage,
        objects: &[DetectedObject],
        heatmap: &mut HeatmapAccumulator,
    ) -> RgbImage {
        let mut pane = layout.clone();
        let radius = self.config.marker_radius.min(layout.width().max(layout.height())) as i32;
        let border = self.config.marker_border.min(layout.width().max(layout.height())) as i32;
        let reach = (radius + border) as f64;
        let (width, height) = (layout.width() as f64, layout.height() as f64);

        for object in objects {
            let Some(point) = object.layout_point else {
                continue;
            };
            let color = match object.kind {
                ObjectKind::Ball => WHITE,
                ObjectKind::Player { team, .. } => {
                    if let Err(err) = heatmap.stamp(point, team) {
                        debug!("skipping heatmap stamp: {}", err);
                    }
                    Rgb(self.config.color_for(team as u64))
                }
            };

            // Markers that cannot touch the layout are not drawn.
            let (x, y) = (point.x.round(), point.y.round());
            if !(x >= -reach && x <= width + reach && y >= -reach && y <= height + reach) {
                debug!("layout point ({:.1}, {:.1}) is off the layout", point.x, point.y);
                continue;
            }

            let center = (x as i32, y as i32);
            draw_filled_circle_mut(&mut pane, center, radius + border, BLACK);
            draw_filled_circle_mut(&mut pane, center, radius, color);
        }
        pane
    }

    /// One heatmap-over-layout pane per team, in team order.
    pub fn heatmap_overlays(&self, layout: &RgbImage, heatmap: &HeatmapAccumulator) -> Vec<RgbImage> {
        heatmap
            .snapshot()
            .iter()
            .map(|colored| heatmap::overlay(layout, colored, self.config.overlay_alpha))
            .collect()
    }
}

/// `bbox` clamped to the frame grown by `margin` on every side, or `None` when
/// nothing drawn for it could reach the frame.
fn drawable_box(bbox: &BoundingBox, frame: &RgbImage, margin: f32) -> Option<BoundingBox> {
    let (width, height) = (frame.width() as f32, frame.height() as f32);
    if bbox.x2 < -margin || bbox.x1 > width + margin || bbox.y2 < -margin || bbox.y1 > height + margin {
        return None;
    }
    let clamp_x = |v: f32| v.clamp(-margin, width + margin);
    let clamp_y = |v: f32| v.clamp(-margin, height + margin);
    Some(BoundingBox::new(clamp_x(bbox.x1), clamp_y(bbox.y1), clamp_x(bbox.x2), clamp_y(bbox.y2)))
}

/// Canvas size for `pane_count` panes of `pane_width` x `pane_height`.
pub fn canvas_size(pane_count: usize, pane_width: u32, pane_height: u32) -> (u32, u32) {
    let rows = (pane_count as u32).div_ceil(CANVAS_COLUMNS).max(1);
    (pane_width * CANVAS_COLUMNS, pane_height * rows)
}

/// Pane size used for a layout of the given dimensions: a quarter of its area.
pub fn pane_size(layout_width: u32, layout_height: u32) -> (u32, u32) {
    ((layout_width / 2).max(1), (layout_height / 2).max(1))
}

/// Tile panes row-major into a two-column canvas, resizing each to the pane size.
/// Unused cells stay black.
pub fn compose_canvas(panes: &[RgbImage], pane_width: u32, pane_height: u32) -> RgbImage {
    let (width, height) = canvas_size(panes.len(), pane_width, pane_height);
    let mut canvas = RgbImage::from_pixel(width, height, BLACK);

    for (index, pane) in panes.iter().enumerate() {
        let column = index as u32 % CANVAS_COLUMNS;
        let row = index as u32 / CANVAS_COLUMNS;
        let x = (column * pane_width) as i64;
        let y = (row * pane_height) as i64;

        if pane.dimensions() == (pane_width, pane_height) {
            imageops::replace(&mut canvas, pane, x, y);
        } else {
            let resized = imageops::resize(pane, pane_width, pane_height, imageops::FilterType::Triangle);
            imageops::replace(&mut canvas, &resized, x, y);
        }
    }
    canvas
}
