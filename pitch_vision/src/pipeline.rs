// THEORY:
// The `pipeline` module is the top-level API of the engine. It wires the core
// modules into the per-frame flow and then drives that flow over a whole stream:
//
//   frame -> detections -> classified objects -> projected objects
//         -> heatmap update -> panes -> composite -> sink
//
// `FrameProcessor` owns everything that outlives a single frame: the calibration
// values, the layout image and the heatmap accumulator. `VideoProcessor` owns the
// loop. It knows nothing about OpenCV or files. Frames come from a `FrameSource`,
// detections from a `DetectionSource`, and composites go to a `FrameSink`, so the
// whole run can be tested with in-memory fakes.
//
// The loop never loses work it has already done. However it stops (end of
// stream, interrupt, a failed read or write) the sink is finished and the latest
// heatmap overlays are written to disk before `run` returns.

use crate::calibration::HOMOGRAPHY_FILE;
use crate::config::PipelineConfig;
use crate::core_modules::color_classifier::ColorClassifier;
use crate::core_modules::compositor::{self, FrameCompositor};
use crate::core_modules::detection::{DetectedObject, DetectionAdapter, DetectionSource, RawDetection};
use crate::core_modules::heatmap::HeatmapAccumulator;
use crate::core_modules::projector::Homography;
use crate::error::Result;
use image::RgbImage;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

// Re-export the types consumers need to feed and read the pipeline.
pub use crate::core_modules::color_classifier::{ColorRange, TeamIndex};
pub use crate::core_modules::detection::{BoundingBox, DetectionLabel, ObjectKind};

/// Everything produced for one input frame.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub frame_index: u64,
    pub composite: RgbImage,
    pub objects: Vec<DetectedObject>,
}

/// Source of decoded frames, in stream order.
pub trait FrameSource {
    /// The next frame, or `None` at the end of the stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Destination of composite frames.
pub trait FrameSink {
    fn write(&mut self, output: &FrameOutput) -> Result<()>;

    /// Flush and close. Called exactly once, after the last `write`.
    fn finish(&mut self) -> Result<()>;
}

/// The per-frame engine: classification, projection, accumulation and drawing.
pub struct FrameProcessor {
    config: PipelineConfig,
    classifier: ColorClassifier,
    homography: Option<Homography>,
    layout: RgbImage,
    heatmap: HeatmapAccumulator,
    last_overlays: Vec<RgbImage>,
}

impl FrameProcessor {
    pub fn new(
        config: PipelineConfig,
        classifier: ColorClassifier,
        homography: Option<Homography>,
        layout: RgbImage,
    ) -> Result<Self> {
        config.validate()?;
        if homography.is_none() {
            warn!(
                "No homography available ({} not found); layout pane stays unannotated and no heat accumulates",
                HOMOGRAPHY_FILE
            );
        }

        let heatmap =
            HeatmapAccumulator::from_config(layout.width(), layout.height(), classifier.team_count(), &config);
        Ok(Self {
            config,
            classifier,
            homography,
            layout,
            heatmap,
            last_overlays: Vec::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn team_count(&self) -> usize {
        self.classifier.team_count()
    }

    pub fn is_projecting(&self) -> bool {
        self.homography.is_some()
    }

    pub fn heatmap(&self) -> &HeatmapAccumulator {
        &self.heatmap
    }

    pub fn pane_size(&self) -> (u32, u32) {
        compositor::pane_size(self.layout.width(), self.layout.height())
    }

    /// Size of every composite this processor produces.
    pub fn canvas_size(&self) -> (u32, u32) {
        let (pane_width, pane_height) = self.pane_size();
        compositor::canvas_size(2 + self.team_count(), pane_width, pane_height)
    }

    pub fn process_frame(&mut self, frame_index: u64, frame: &RgbImage, detections: &[RawDetection]) -> FrameOutput {
        // --- 1. Classify ---
        let mut objects = DetectionAdapter::new(&self.classifier).adapt(detections, frame);

        // --- 2. Project ---
        if let Some(homography) = &self.homography {
            for object in objects.iter_mut() {
                match homography.project(object.bbox.ground_point()) {
                    Ok(point) => object.layout_point = Some(point),
                    Err(err) => debug!("frame {}: {}", frame_index, err),
                }
            }
        }

        // --- 3. Draw and accumulate ---
        let renderer = FrameCompositor::new(&self.config);
        let camera_pane = renderer.draw_camera_pane(frame, &objects);
        let layout_pane = renderer.draw_layout_pane(&self.layout, &objects, &mut self.heatmap);
        self.last_overlays = renderer.heatmap_overlays(&self.layout, &self.heatmap);

        // --- 4. Compose ---
        let mut panes = Vec::with_capacity(2 + self.last_overlays.len());
        panes.push(camera_pane);
        panes.push(layout_pane);
        panes.extend(self.last_overlays.iter().cloned());
        let (pane_width, pane_height) = self.pane_size();
        let composite = compositor::compose_canvas(&panes, pane_width, pane_height);

        FrameOutput { frame_index, composite, objects }
    }

    /// The per-team overlays from the last processed frame, or fresh ones if no
    /// frame has been processed yet.
    pub fn heatmap_overlays(&self) -> Vec<RgbImage> {
        if self.last_overlays.is_empty() {
            FrameCompositor::new(&self.config).heatmap_overlays(&self.layout, &self.heatmap)
        } else {
            self.last_overlays.clone()
        }
    }

    /// Write `overlay_heatmap_team_{i}.png` (1-based) for every team into `dir`.
    pub fn save_overlays(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;
        let mut paths = Vec::new();
        for (index, overlay) in self.heatmap_overlays().iter().enumerate() {
            let path = dir.join(format!("overlay_heatmap_team_{}.png", index + 1));
            overlay.save(&path)?;
            paths.push(path);
        }
        Ok(paths)
    }
}

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    Interrupted,
    ReadFailure(String),
    WriteFailure(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EndOfStream => write!(f, "end of stream"),
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::ReadFailure(msg) => write!(f, "read failure: {}", msg),
            StopReason::WriteFailure(msg) => write!(f, "write failure: {}", msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub stop_reason: StopReason,
    pub overlay_paths: Vec<PathBuf>,
}

/// Drives a `FrameProcessor` over a whole stream.
pub struct VideoProcessor {
    processor: FrameProcessor,
    total_frames: Option<u64>,
}

impl VideoProcessor {
    pub fn new(processor: FrameProcessor) -> Self {
        Self { processor, total_frames: None }
    }

    /// Frame count reported by the container, used for progress logging only.
    pub fn with_total_frames(mut self, total_frames: Option<u64>) -> Self {
        self.total_frames = total_frames.filter(|&n| n > 0);
        self
    }

    pub fn processor(&self) -> &FrameProcessor {
        &self.processor
    }

    /// Process frames until the source ends, `stop` is set, or I/O fails.
    ///
    /// `stop` is checked once before each frame. A detection failure is logged
    /// and the frame is still processed, with no detections.
    pub fn run<S, D, K>(
        &mut self,
        source: &mut S,
        detector: &mut D,
        sink: &mut K,
        stop: &AtomicBool,
        overlay_dir: &Path,
    ) -> Result<RunSummary>
    where
        S: FrameSource,
        D: DetectionSource,
        K: FrameSink,
    {
        let progress_interval = self.processor.config().progress_interval;
        let mut frames_processed: u64 = 0;

        let mut stop_reason = loop {
            if stop.load(Ordering::SeqCst) {
                break StopReason::Interrupted;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break StopReason::EndOfStream,
                Err(err) => {
                    warn!("Failed to read frame {}: {}", frames_processed, err);
                    break StopReason::ReadFailure(err.to_string());
                }
            };

            let frame_index = frames_processed;
            let detections = detector.detect(frame_index, &frame).unwrap_or_else(|err| {
                warn!("Detection failed on frame {}: {}", frame_index, err);
                Vec::new()
            });

            let output = self.processor.process_frame(frame_index, &frame, &detections);
            if let Err(err) = sink.write(&output) {
                warn!("Failed to write frame {}: {}", frame_index, err);
                break StopReason::WriteFailure(err.to_string());
            }
            frames_processed += 1;

            if progress_interval > 0 && frames_processed % progress_interval == 0 {
                match self.total_frames {
                    Some(total) => info!(
                        "Processed {}/{} frames ({:.1}%)",
                        frames_processed,
                        total,
                        frames_processed as f64 * 100.0 / total as f64
                    ),
                    None => info!("Processed {} frames", frames_processed),
                }
            }
        };

        if let Err(err) = sink.finish() {
            warn!("Failed to finish output stream: {}", err);
            if stop_reason == StopReason::EndOfStream || stop_reason == StopReason::Interrupted {
                stop_reason = StopReason::WriteFailure(err.to_string());
            }
        }

        let overlay_paths = self.processor.save_overlays(overlay_dir)?;
        info!(
            "Run finished after {} frame(s): {}; {} overlay(s) saved to {}",
            frames_processed,
            stop_reason,
            overlay_paths.len(),
            overlay_dir.display()
        );

        Ok(RunSummary { frames_processed, stop_reason, overlay_paths })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn classifier() -> ColorClassifier {
        ColorClassifier::new(vec![
            ColorRange::new([0, 100, 100], [10, 255, 255]),
            ColorRange::new([110, 100, 100], [130, 255, 255]),
        ])
        .unwrap()
    }

    fn red_player_frame() -> (RgbImage, Vec<RawDetection>) {
        let frame = RgbImage::from_fn(200, 100, |x, y| {
            if (20..40).contains(&x) && (20..60).contains(&y) {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 128, 0])
            }
        });
        let detections = vec![RawDetection::new(
            BoundingBox::new(20.0, 20.0, 40.0, 60.0),
            DetectionLabel::Player,
            Some(9),
        )];
        (frame, detections)
    }

    #[test]
    fn test_identity_projection_stamps_ground_point() {
        let layout = RgbImage::from_pixel(200, 100, Rgb([0, 100, 0]));
        let mut processor =
            FrameProcessor::new(PipelineConfig::default(), classifier(), Some(Homography::identity()), layout).unwrap();
        let (frame, detections) = red_player_frame();

        let output = processor.process_frame(0, &frame, &detections);
        assert_eq!(output.objects.len(), 1);
        assert_eq!(output.objects[0].kind, ObjectKind::Player { team: 1, display_id: 9 });
        let point = output.objects[0].layout_point.unwrap();
        assert_eq!((point.x, point.y), (30.0, 60.0));

        assert_eq!(processor.heatmap().value_at(30, 60, 1), Some(1.0));
        assert_eq!(processor.heatmap().channel(2).unwrap().sum(), 0.0);
    }

    #[test]
    fn test_composite_has_canvas_size() {
        let layout = RgbImage::from_pixel(200, 100, Rgb([0, 100, 0]));
        let mut processor = FrameProcessor::new(PipelineConfig::default(), classifier(), None, layout).unwrap();
        let (frame, detections) = red_player_frame();

        let output = processor.process_frame(0, &frame, &detections);
        // Two teams: camera, layout and two overlays in a 2x2 grid of 100x50 panes.
        assert_eq!(processor.canvas_size(), (200, 100));
        assert_eq!(output.composite.dimensions(), (200, 100));
    }

    #[test]
    fn test_without_homography_nothing_accumulates() {
        let layout = RgbImage::from_pixel(200, 100, Rgb([0, 100, 0]));
        let mut processor = FrameProcessor::new(PipelineConfig::default(), classifier(), None, layout).unwrap();
        let (frame, detections) = red_player_frame();

        let output = processor.process_frame(0, &frame, &detections);
        assert!(!processor.is_projecting());
        assert!(output.objects[0].layout_point.is_none());
        assert_eq!(processor.heatmap().channel(1).unwrap().sum(), 0.0);
        // The layout pane (top-right quadrant) is the plain layout.
        assert_eq!(*output.composite.get_pixel(150, 25), Rgb([0, 100, 0]));
    }

    #[test]
    fn test_degenerate_projection_is_skipped() {
        let layout = RgbImage::from_pixel(200, 100, Rgb([0, 100, 0]));
        // Every point with x = 30 has a zero divisor.
        let h = Homography::from([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, -30.0]]);
        let mut processor = FrameProcessor::new(PipelineConfig::default(), classifier(), Some(h), layout).unwrap();
        let (frame, detections) = red_player_frame();

        let output = processor.process_frame(0, &frame, &detections);
        assert_eq!(output.objects.len(), 1);
        assert!(output.objects[0].layout_point.is_none());
        assert_eq!(processor.heatmap().channel(1).unwrap().sum(), 0.0);
    }

    #[test]
    fn test_point_near_horizon_renders_without_stamping() {
        let layout = RgbImage::from_pixel(200, 100, Rgb([0, 100, 0]));
        // The divisor at x = 30 is about 1e-11, so the ground point lands near (3e12, 6e12).
        let h = Homography::from([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0, -29.99999999999]]);
        let mut processor = FrameProcessor::new(PipelineConfig::default(), classifier(), Some(h), layout).unwrap();
        let (frame, detections) = red_player_frame();

        let output = processor.process_frame(0, &frame, &detections);
        let point = output.objects[0].layout_point.unwrap();
        assert!(point.x > 1.0e9);
        assert_eq!(output.composite.dimensions(), processor.canvas_size());
        assert_eq!(processor.heatmap().channel(1).unwrap().sum(), 0.0);
        assert_eq!(*output.composite.get_pixel(150, 25), Rgb([0, 100, 0]));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig { palette: Vec::new(), ..PipelineConfig::default() };
        let layout = RgbImage::new(10, 10);
        assert!(FrameProcessor::new(config, classifier(), None, layout).is_err());
    }

    #[test]
    fn test_stop_reason_display() {
        assert_eq!(StopReason::EndOfStream.to_string(), "end of stream");
        assert_eq!(StopReason::ReadFailure("eof".into()).to_string(), "read failure: eof");
    }
}
