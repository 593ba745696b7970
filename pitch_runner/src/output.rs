// Everything a run leaves on disk, plus the sink that produces it.
//
// Outputs for `match.mp4` go to `<output_base>/match/`: the composite video, the
// per-frame detections CSV and, written by the engine at the end of the run, the
// heatmap overlays and any calibration files.

use crate::video_io::{Preview, VideoOutput};
use pitch_vision::core_modules::detection::ObjectKind;
use pitch_vision::pipeline::{FrameOutput, FrameSink};
use pitch_vision::{Result, VisionError};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

pub const COMPOSITE_VIDEO_FILE: &str = "composite_video.mp4";
pub const DETECTIONS_CSV_FILE: &str = "video_detections.csv";

const CSV_HEADER: &str = "frame,x1,y1,x2,y2,label,team,display_id,layout_x,layout_y";

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub dir: PathBuf,
    pub composite_video: PathBuf,
    pub detections_csv: PathBuf,
}

impl OutputPaths {
    /// Create `<base>/<video stem>/` and name the files inside it.
    pub fn create(base: &Path, input_video: &Path) -> Result<Self> {
        let stem = input_video
            .file_stem()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| VisionError::Config(format!("{} has no file name", input_video.display())))?;
        let dir = base.join(stem);
        fs::create_dir_all(&dir)?;
        info!("Writing outputs to {}", dir.display());

        Ok(Self {
            composite_video: dir.join(COMPOSITE_VIDEO_FILE),
            detections_csv: dir.join(DETECTIONS_CSV_FILE),
            dir,
        })
    }
}

/// One CSV row per classified object per frame.
pub struct DetectionCsv<W: Write> {
    writer: W,
}

impl DetectionCsv<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self> {
        Self::new(BufWriter::new(File::create(path)?))
    }
}

impl<W: Write> DetectionCsv<W> {
    pub fn new(mut writer: W) -> Result<Self> {
        writeln!(writer, "{}", CSV_HEADER)?;
        Ok(Self { writer })
    }

    pub fn write_frame(&mut self, output: &FrameOutput) -> Result<()> {
        for object in &output.objects {
            let b = &object.bbox;
            let (label, team, display_id) = match object.kind {
                ObjectKind::Ball => ("ball", String::new(), String::new()),
                ObjectKind::Player { team, display_id } => ("player", team.to_string(), display_id.to_string()),
            };
            let (layout_x, layout_y) = match object.layout_point {
                Some(p) => (format!("{:.2}", p.x), format!("{:.2}", p.y)),
                None => (String::new(), String::new()),
            };
            writeln!(
                self.writer,
                "{},{:.1},{:.1},{:.1},{:.1},{},{},{},{},{}",
                output.frame_index, b.x1, b.y1, b.x2, b.y2, label, team, display_id, layout_x, layout_y
            )?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.writer
    }
}

/// Fans each composite out to the video file, the CSV log and the preview window.
pub struct RunSink {
    video: VideoOutput,
    csv: DetectionCsv<BufWriter<File>>,
    preview: Option<Preview>,
    stop: Arc<AtomicBool>,
}

impl RunSink {
    pub fn new(
        video: VideoOutput,
        csv: DetectionCsv<BufWriter<File>>,
        preview: Option<Preview>,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self { video, csv, preview, stop }
    }
}

impl FrameSink for RunSink {
    fn write(&mut self, output: &FrameOutput) -> Result<()> {
        self.video.write(&output.composite)?;
        self.csv.write_frame(output)?;

        if let Some(preview) = self.preview.as_mut() {
            match preview.show(&output.composite) {
                Ok(true) => {
                    info!("Quit key pressed, stopping after frame {}", output.frame_index);
                    self.stop.store(true, Ordering::SeqCst);
                }
                Ok(false) => {}
                Err(err) => {
                    warn!("Preview failed, continuing without it: {}", err);
                    self.preview = None;
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut preview) = self.preview.take() {
            if let Err(err) = preview.close() {
                warn!("Failed to close preview window: {}", err);
            }
        }
        self.csv.flush()?;
        self.video.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use nalgebra::Point2;
    use pitch_vision::core_modules::detection::{BoundingBox, DetectedObject};
    use tempfile::TempDir;

    #[test]
    fn output_dir_is_named_after_video() {
        let base = TempDir::new().unwrap();
        let paths = OutputPaths::create(base.path(), Path::new("/videos/derby_2024.mp4")).unwrap();
        assert_eq!(paths.dir, base.path().join("derby_2024"));
        assert!(paths.dir.is_dir());
        assert_eq!(paths.composite_video, paths.dir.join(COMPOSITE_VIDEO_FILE));
        assert_eq!(paths.detections_csv, paths.dir.join(DETECTIONS_CSV_FILE));
    }

    #[test]
    fn csv_rows_per_object() {
        let output = FrameOutput {
            frame_index: 12,
            composite: RgbImage::new(1, 1),
            objects: vec![
                DetectedObject {
                    bbox: BoundingBox::new(10.0, 20.0, 30.0, 60.0),
                    kind: ObjectKind::Player { team: 2, display_id: 17 },
                    layout_point: Some(Point2::new(101.25, 48.5)),
                },
                DetectedObject {
                    bbox: BoundingBox::new(1.0, 2.0, 3.0, 4.0),
                    kind: ObjectKind::Ball,
                    layout_point: None,
                },
            ],
        };

        let mut csv = DetectionCsv::new(Vec::new()).unwrap();
        csv.write_frame(&output).unwrap();
        let text = String::from_utf8(csv.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "12,10.0,20.0,30.0,60.0,player,2,17,101.25,48.50");
        assert_eq!(lines[2], "12,1.0,2.0,3.0,4.0,ball,,,,");
        assert_eq!(lines.len(), 3);
    }
}
