// OpenCV-backed frame I/O.
//
// OpenCV hands out BGR `Mat`s; the engine works on RGB `RgbImage`s. The
// conversion happens here and nowhere else.

use image::RgbImage;
use opencv::{
    core::{self, Mat, Scalar},
    highgui, imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use pitch_vision::pipeline::FrameSource;
use pitch_vision::{Result, VisionError};
use std::path::Path;

const QUIT_KEY: i32 = 'q' as i32;

fn stream_error(context: &str) -> impl FnOnce(opencv::Error) -> VisionError + '_ {
    move |err| VisionError::StreamIo(format!("{}: {}", context, err))
}

pub struct VideoInput {
    capture: VideoCapture,
    frame: Mat,
    fps: f64,
    frame_count: Option<u64>,
}

impl VideoInput {
    pub fn open(path: &Path) -> Result<Self> {
        let name = path.to_string_lossy();
        let capture = VideoCapture::from_file(&name, videoio::CAP_ANY).map_err(stream_error("opening input video"))?;
        if !capture.is_opened().map_err(stream_error("opening input video"))? {
            return Err(VisionError::StreamIo(format!("cannot open input video {}", path.display())));
        }

        let fps = capture.get(videoio::CAP_PROP_FPS).map_err(stream_error("reading fps"))?;
        let frames = capture
            .get(videoio::CAP_PROP_FRAME_COUNT)
            .map_err(stream_error("reading frame count"))?;
        Ok(Self {
            capture,
            frame: Mat::default(),
            fps: if fps.is_finite() && fps > 0.0 { fps } else { 30.0 },
            frame_count: (frames.is_finite() && frames > 0.0).then_some(frames as u64),
        })
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frame_count(&self) -> Option<u64> {
        self.frame_count
    }
}

impl FrameSource for VideoInput {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let grabbed = self.capture.read(&mut self.frame).map_err(stream_error("reading frame"))?;
        if !grabbed || self.frame.empty() {
            return Ok(None);
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color(&self.frame, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(stream_error("converting frame"))?;
        let bytes = rgb.data_bytes().map_err(stream_error("reading frame buffer"))?.to_vec();
        let image = RgbImage::from_raw(rgb.cols() as u32, rgb.rows() as u32, bytes)
            .ok_or_else(|| VisionError::StreamIo("decoded frame has an unexpected layout".to_string()))?;
        Ok(Some(image))
    }
}

fn to_bgr_mat(image: &RgbImage) -> opencv::Result<Mat> {
    let mut rgb = Mat::new_rows_cols_with_default(
        image.height() as i32,
        image.width() as i32,
        core::CV_8UC3,
        Scalar::all(0.0),
    )?;
    rgb.data_bytes_mut()?.copy_from_slice(image.as_raw());
    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
    Ok(bgr)
}

/// mp4v-encoded output at a fixed frame size.
pub struct VideoOutput {
    writer: VideoWriter,
    size: (u32, u32),
}

impl VideoOutput {
    pub fn create(path: &Path, fps: f64, size: (u32, u32)) -> Result<Self> {
        let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v').map_err(stream_error("choosing codec"))?;
        let writer = VideoWriter::new(
            &path.to_string_lossy(),
            fourcc,
            fps,
            core::Size::new(size.0 as i32, size.1 as i32),
            true,
        )
        .map_err(stream_error("opening output video"))?;
        if !writer.is_opened().map_err(stream_error("opening output video"))? {
            return Err(VisionError::StreamIo(format!("cannot open output video {}", path.display())));
        }
        Ok(Self { writer, size })
    }

    pub fn write(&mut self, image: &RgbImage) -> Result<()> {
        if image.dimensions() != self.size {
            return Err(VisionError::StreamIo(format!(
                "frame is {:?}, output expects {:?}",
                image.dimensions(),
                self.size
            )));
        }
        let mat = to_bgr_mat(image).map_err(stream_error("converting composite"))?;
        self.writer.write(&mat).map_err(stream_error("writing frame"))
    }

    pub fn release(&mut self) -> Result<()> {
        self.writer.release().map_err(stream_error("closing output video"))
    }
}

/// Live preview window. Pressing `q` asks the run to stop.
pub struct Preview {
    window: String,
}

impl Preview {
    pub fn open(window: &str) -> Result<Self> {
        highgui::named_window(window, highgui::WINDOW_AUTOSIZE).map_err(stream_error("opening preview window"))?;
        Ok(Self { window: window.to_string() })
    }

    /// Show `image`; returns `true` when the quit key was pressed.
    pub fn show(&mut self, image: &RgbImage) -> Result<bool> {
        let mat = to_bgr_mat(image).map_err(stream_error("converting preview"))?;
        highgui::imshow(&self.window, &mat).map_err(stream_error("showing preview"))?;
        let key = highgui::wait_key(1).map_err(stream_error("polling keyboard"))?;
        Ok(key >= 0 && (key & 0xFF) == QUIT_KEY)
    }

    pub fn close(&mut self) -> Result<()> {
        highgui::destroy_window(&self.window).map_err(stream_error("closing preview window"))
    }
}
