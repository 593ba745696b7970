// Replays a recorded detector run.
//
// The log is JSON lines, one record per frame that had detections:
//
//   {"frame": 0, "detections": [{"bbox": {...}, "label": "player", "track_id": 7}]}
//
// Records must be in ascending frame order. Frames without a record have no
// detections. Several records for the same frame are concatenated. A label is
// either a name ("ball", "player") or the detector's numeric class id.

use image::RgbImage;
use pitch_vision::core_modules::detection::{BoundingBox, DetectionLabel, DetectionSource, RawDetection};
use pitch_vision::{Result, VisionError};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LoggedLabel {
    Name(DetectionLabel),
    ClassId(u32),
}

impl From<LoggedLabel> for DetectionLabel {
    fn from(label: LoggedLabel) -> Self {
        match label {
            LoggedLabel::Name(label) => label,
            LoggedLabel::ClassId(class_id) => DetectionLabel::from(class_id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoggedDetection {
    bbox: BoundingBox,
    label: LoggedLabel,
    #[serde(default)]
    track_id: Option<u64>,
}

impl From<LoggedDetection> for RawDetection {
    fn from(logged: LoggedDetection) -> Self {
        RawDetection::new(logged.bbox, logged.label.into(), logged.track_id)
    }
}

#[derive(Debug, Deserialize)]
struct FrameRecord {
    frame: u64,
    #[serde(default)]
    detections: Vec<LoggedDetection>,
}

pub struct DetectionLog<R> {
    lines: Lines<R>,
    pending: Option<FrameRecord>,
    line_number: usize,
}

impl DetectionLog<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            VisionError::StreamIo(format!("cannot open detection log {}: {}", path.display(), e))
        })?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> DetectionLog<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: reader.lines(), pending: None, line_number: 0 }
    }

    fn next_record(&mut self) -> Result<Option<FrameRecord>> {
        for line in self.lines.by_ref() {
            self.line_number += 1;
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str(&line).map_err(|e| {
                VisionError::StreamIo(format!("detection log line {}: {}", self.line_number, e))
            })?;
            return Ok(Some(record));
        }
        Ok(None)
    }
}

impl<R: BufRead> DetectionSource for DetectionLog<R> {
    type Error = VisionError;

    fn detect(&mut self, frame_index: u64, _frame: &RgbImage) -> Result<Vec<RawDetection>> {
        let mut detections = Vec::new();
        loop {
            if self.pending.is_none() {
                self.pending = self.next_record()?;
            }
            let Some(record) = self.pending.take() else {
                break;
            };
            if record.frame < frame_index {
                debug!("skipping detections for already processed frame {}", record.frame);
                continue;
            }
            if record.frame > frame_index {
                self.pending = Some(record);
                break;
            }
            detections.extend(record.detections.into_iter().map(RawDetection::from));
        }
        Ok(detections)
    }
}
