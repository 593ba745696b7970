// THEORY:
// This file is the main entry point for the `pitch_vision` library crate.
// It defines the public API exposed to the video-driving binary (`pitch_runner`)
// and to any other consumer that can supply frames and detections.
//
// The primary export is the `pipeline` module: `FrameProcessor` turns one frame
// plus its detections into a composite image, and `VideoProcessor` drives it over
// a whole stream. The per-stage components (`core_modules`) stay public so they
// can be reused and tested on their own, but consumers are expected to go through
// the pipeline.

pub mod calibration;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod pipeline;

pub use config::PipelineConfig;
pub use error::{Result, VisionError};
