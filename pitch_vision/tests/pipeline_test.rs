use image::{Rgb, RgbImage};
use pitch_vision::core_modules::color_classifier::ColorClassifier;
use pitch_vision::core_modules::detection::{DetectionSource, RawDetection};
use pitch_vision::core_modules::projector::Homography;
use pitch_vision::pipeline::{
    BoundingBox, ColorRange, DetectionLabel, FrameOutput, FrameProcessor, FrameSink, FrameSource, StopReason,
    VideoProcessor,
};
use pitch_vision::{PipelineConfig, Result, VisionError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

const FRAME_W: u32 = 160;
const FRAME_H: u32 = 120;

/// A red player standing at (40, 80) and a blue one at (120, 80).
fn two_player_frame() -> RgbImage {
    RgbImage::from_fn(FRAME_W, FRAME_H, |x, y| {
        if (30..50).contains(&x) && (40..80).contains(&y) {
            Rgb([255, 0, 0])
        } else if (110..130).contains(&x) && (40..80).contains(&y) {
            Rgb([0, 0, 255])
        } else {
            Rgb([0, 140, 0])
        }
    })
}

fn classifier() -> ColorClassifier {
    ColorClassifier::new(vec![
        ColorRange::new([0, 100, 100], [10, 255, 255]),
        ColorRange::new([110, 100, 100], [130, 255, 255]),
    ])
    .unwrap()
}

fn processor(homography: Option<Homography>) -> FrameProcessor {
    let layout = RgbImage::from_pixel(FRAME_W, FRAME_H, Rgb([30, 120, 30]));
    FrameProcessor::new(PipelineConfig::default(), classifier(), homography, layout).unwrap()
}

struct MemorySource {
    frames: VecDeque<RgbImage>,
    fail_after: Option<usize>,
    served: usize,
}

impl MemorySource {
    fn new(count: usize) -> Self {
        Self { frames: (0..count).map(|_| two_player_frame()).collect(), fail_after: None, served: 0 }
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.fail_after == Some(self.served) {
            return Err(VisionError::StreamIo("corrupt packet".to_string()));
        }
        self.served += 1;
        Ok(self.frames.pop_front())
    }
}

#[derive(Default)]
struct MemorySink {
    outputs: Vec<FrameOutput>,
    finished: usize,
    fail_on: Option<u64>,
}

impl FrameSink for MemorySink {
    fn write(&mut self, output: &FrameOutput) -> Result<()> {
        if self.fail_on == Some(output.frame_index) {
            return Err(VisionError::StreamIo("disk full".to_string()));
        }
        self.outputs.push(output.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished += 1;
        Ok(())
    }
}

/// Reports both players on every frame; fails on the frames listed in `fail_on`.
#[derive(Default)]
struct FixedDetector {
    seen: Vec<u64>,
    fail_on: Vec<u64>,
}

impl DetectionSource for FixedDetector {
    type Error = String;

    fn detect(&mut self, frame_index: u64, _frame: &RgbImage) -> std::result::Result<Vec<RawDetection>, String> {
        self.seen.push(frame_index);
        if self.fail_on.contains(&frame_index) {
            return Err("model crashed".to_string());
        }
        Ok(vec![
            RawDetection::new(BoundingBox::new(30.0, 40.0, 50.0, 80.0), DetectionLabel::Player, Some(4)),
            RawDetection::new(BoundingBox::new(110.0, 40.0, 130.0, 80.0), DetectionLabel::Player, Some(11)),
            RawDetection::new(BoundingBox::new(78.0, 70.0, 84.0, 76.0), DetectionLabel::Ball, None),
        ])
    }
}

#[test]
fn full_run_accumulates_per_team() {
    let dir = TempDir::new().unwrap();
    let mut video = VideoProcessor::new(processor(Some(Homography::identity())));
    let mut source = MemorySource::new(5);
    let mut detector = FixedDetector::default();
    let mut sink = MemorySink::default();
    let stop = AtomicBool::new(false);

    let summary = video.run(&mut source, &mut detector, &mut sink, &stop, dir.path()).unwrap();

    assert_eq!(summary.frames_processed, 5);
    assert_eq!(summary.stop_reason, StopReason::EndOfStream);
    assert_eq!(sink.outputs.len(), 5);
    assert_eq!(sink.finished, 1);
    assert_eq!(detector.seen, vec![0, 1, 2, 3, 4]);

    let heatmap = video.processor().heatmap();
    assert_eq!(heatmap.value_at(40, 80, 1), Some(5.0));
    assert_eq!(heatmap.value_at(120, 80, 2), Some(5.0));
    assert_eq!(heatmap.value_at(120, 80, 1), Some(0.0));
    // The ball is drawn but never accumulated.
    assert_eq!(heatmap.value_at(81, 76, 1), Some(0.0));
    assert_eq!(heatmap.value_at(81, 76, 2), Some(0.0));

    let teams: Vec<_> = sink.outputs[0].objects.iter().map(|o| o.team()).collect();
    assert_eq!(teams, vec![Some(1), Some(2), None]);

    assert_eq!(summary.overlay_paths.len(), 2);
    for (i, path) in summary.overlay_paths.iter().enumerate() {
        assert_eq!(path.file_name().unwrap().to_string_lossy(), format!("overlay_heatmap_team_{}.png", i + 1));
        let saved = image::open(path).unwrap();
        assert_eq!((saved.width(), saved.height()), (FRAME_W, FRAME_H));
    }
}

#[test]
fn composites_share_one_size() {
    let dir = TempDir::new().unwrap();
    let mut video = VideoProcessor::new(processor(None));
    let mut sink = MemorySink::default();

    video
        .run(&mut MemorySource::new(3), &mut FixedDetector::default(), &mut sink, &AtomicBool::new(false), dir.path())
        .unwrap();

    let expected = video.processor().canvas_size();
    assert_eq!(expected, (FRAME_W, FRAME_H));
    assert!(sink.outputs.iter().all(|o| o.composite.dimensions() == expected));
}

#[test]
fn stop_flag_interrupts_before_next_frame() {
    let dir = TempDir::new().unwrap();
    let mut video = VideoProcessor::new(processor(Some(Homography::identity())));
    let mut sink = MemorySink::default();
    let stop = AtomicBool::new(false);
    stop.store(true, Ordering::SeqCst);

    let summary = video
        .run(&mut MemorySource::new(10), &mut FixedDetector::default(), &mut sink, &stop, dir.path())
        .unwrap();

    assert_eq!(summary.stop_reason, StopReason::Interrupted);
    assert_eq!(summary.frames_processed, 0);
    assert_eq!(sink.finished, 1);
    // Overlays are written even for an empty run.
    assert!(summary.overlay_paths.iter().all(|p| p.exists()));
}

#[test]
fn read_failure_keeps_earlier_work() {
    let dir = TempDir::new().unwrap();
    let mut video = VideoProcessor::new(processor(Some(Homography::identity())));
    let mut source = MemorySource::new(10);
    source.fail_after = Some(3);
    let mut sink = MemorySink::default();

    let summary = video
        .run(&mut source, &mut FixedDetector::default(), &mut sink, &AtomicBool::new(false), dir.path())
        .unwrap();

    assert!(matches!(summary.stop_reason, StopReason::ReadFailure(_)));
    assert_eq!(summary.frames_processed, 3);
    assert_eq!(sink.outputs.len(), 3);
    assert_eq!(sink.finished, 1);
    assert_eq!(video.processor().heatmap().value_at(40, 80, 1), Some(3.0));
}

#[test]
fn write_failure_stops_the_run() {
    let dir = TempDir::new().unwrap();
    let mut video = VideoProcessor::new(processor(Some(Homography::identity())));
    let mut sink = MemorySink { fail_on: Some(2), ..Default::default() };

    let summary = video
        .run(&mut MemorySource::new(10), &mut FixedDetector::default(), &mut sink, &AtomicBool::new(false), dir.path())
        .unwrap();

    assert!(matches!(summary.stop_reason, StopReason::WriteFailure(_)));
    assert_eq!(summary.frames_processed, 2);
    assert_eq!(sink.finished, 1);
    assert_eq!(summary.overlay_paths.len(), 2);
}

#[test]
fn detector_failure_still_writes_the_frame() {
    let dir = TempDir::new().unwrap();
    let mut video = VideoProcessor::new(processor(Some(Homography::identity())));
    let mut detector = FixedDetector { fail_on: vec![1], ..Default::default() };
    let mut sink = MemorySink::default();

    let summary = video
        .run(&mut MemorySource::new(3), &mut detector, &mut sink, &AtomicBool::new(false), dir.path())
        .unwrap();

    assert_eq!(summary.frames_processed, 3);
    assert!(sink.outputs[1].objects.is_empty());
    assert_eq!(sink.outputs[2].objects.len(), 3);
    assert_eq!(video.processor().heatmap().value_at(40, 80, 1), Some(2.0));
}
