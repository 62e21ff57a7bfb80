//! Frame source and sink seams, plus their OpenCV implementations.

use anyhow::{bail, Context, Result};
use opencv::{
    core::{Mat, Size},
    prelude::*,
    videoio::{self, VideoCapture, VideoWriter},
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::OutputConfig;
use crate::error::PipelineError;

/// Stream metadata read once when the source is opened.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoProperties {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

/// Decoded frames in arrival order. `Ok(None)` marks end of stream.
pub trait FrameSource {
    fn properties(&self) -> VideoProperties;
    fn next_frame(&mut self) -> Result<Option<Mat>>;
}

pub trait FrameSink {
    fn write(&mut self, frame: &Mat) -> Result<()>;

    /// Flush and close. Called once after the last frame of a successful run.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Output frame rate: the source rate clamped to `min_fps`.
pub fn output_fps(source_fps: f64, config: &OutputConfig) -> f64 {
    source_fps.max(config.min_fps)
}

/// OpenCV capture over a video file. Released on drop.
pub struct VideoSource {
    cap: VideoCapture,
    props: VideoProperties,
}

impl VideoSource {
    /// Open `path` and read its dimensions and frame rate. A missing or
    /// zero frame rate falls back to `default_fps`.
    pub fn open(path: &Path, default_fps: f64) -> Result<Self, PipelineError> {
        let unreadable = || PipelineError::SourceUnreadable {
            path: path.display().to_string(),
        };
        let cap = VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)
            .map_err(|_| unreadable())?;
        if !cap.is_opened().unwrap_or(false) {
            return Err(unreadable());
        }

        let prop = |id| cap.get(id).unwrap_or(0.0);
        let width = prop(videoio::CAP_PROP_FRAME_WIDTH);
        let height = prop(videoio::CAP_PROP_FRAME_HEIGHT);
        let fps = prop(videoio::CAP_PROP_FPS);

        let props = VideoProperties {
            width: dimension(width),
            height: dimension(height),
            fps: if fps.is_finite() && fps > 0.0 { fps } else { default_fps },
        };
        info!(
            path = %path.display(),
            width = props.width,
            height = props.height,
            fps = props.fps,
            "opened input video"
        );
        Ok(VideoSource { cap, props })
    }
}

fn dimension(raw: f64) -> u32 {
    if raw.is_finite() && raw >= 1.0 {
        raw as u32
    } else {
        0
    }
}

impl FrameSource for VideoSource {
    fn properties(&self) -> VideoProperties {
        self.props
    }

    fn next_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        if !self.cap.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        if let Err(e) = self.cap.release() {
            warn!(error = %e, "failed to release video capture");
        }
    }
}

/// OpenCV writer producing one encoded video. Released on drop; the file
/// is deleted on drop unless `finish` succeeded.
pub struct VideoSink {
    writer: VideoWriter,
    path: PathBuf,
    frames_written: u64,
    finished: bool,
}

impl VideoSink {
    pub fn create(path: &Path, props: &VideoProperties, config: &OutputConfig) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating output directory {}", parent.display()))?;
        }
        let code: Vec<char> = config.fourcc.chars().collect();
        let [a, b, c, d] = code.as_slice() else {
            bail!("invalid fourcc {:?}", config.fourcc);
        };
        let fourcc = VideoWriter::fourcc(*a, *b, *c, *d)?;
        let fps = output_fps(props.fps, config);
        let size = Size::new(i32::try_from(props.width)?, i32::try_from(props.height)?);
        let writer = VideoWriter::new(
            &path.to_string_lossy(),
            fourcc,
            fps,
            size,
            true,
        )?;
        if !writer.is_opened()? {
            bail!(
                "video writer for {} did not open (fourcc {}); is the codec available?",
                path.display(),
                config.fourcc
            );
        }
        debug!(path = %path.display(), fps, fourcc = %config.fourcc, "opened output video");
        Ok(VideoSink {
            writer,
            path: path.to_path_buf(),
            frames_written: 0,
            finished: false,
        })
    }
}

impl FrameSink for VideoSink {
    fn write(&mut self, frame: &Mat) -> Result<()> {
        self.writer.write(frame)?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.release()?;
        self.finished = true;
        debug!(frames = self.frames_written, "output video closed");
        Ok(())
    }
}

impl Drop for VideoSink {
    fn drop(&mut self) {
        // release is idempotent, so a finished writer is fine here
        if let Err(e) = self.writer.release() {
            warn!(error = %e, "failed to release video writer");
        }
        if self.finished {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed partial output"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "could not remove partial output"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_fps_clamped() {
        let config = OutputConfig::default();
        assert_eq!(output_fps(30.0, &config), 30.0);
        assert_eq!(output_fps(0.5, &config), 1.0);
    }

    #[test]
    fn test_dimension_rejects_garbage() {
        assert_eq!(dimension(640.0), 640);
        assert_eq!(dimension(0.0), 0);
        assert_eq!(dimension(-1.0), 0);
        assert_eq!(dimension(f64::NAN), 0);
    }

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pedtrack-{}-{}", std::process::id(), name))
    }

    fn mjpg_config() -> OutputConfig {
        OutputConfig {
            fourcc: "MJPG".to_string(),
            ..OutputConfig::default()
        }
    }

    fn write_blank_frames(sink: &mut VideoSink, n: usize) {
        let frame = Mat::new_size_with_default(
            Size::new(64, 48),
            opencv::core::CV_8UC3,
            opencv::core::Scalar::all(0.0),
        )
        .unwrap();
        for _ in 0..n {
            sink.write(&frame).unwrap();
        }
    }

    #[test]
    fn test_unfinished_sink_removes_its_file() {
        let path = scratch_path("unfinished.avi");
        let props = VideoProperties { width: 64, height: 48, fps: 10.0 };
        let mut sink = VideoSink::create(&path, &props, &mjpg_config()).unwrap();
        write_blank_frames(&mut sink, 3);
        drop(sink);
        assert!(!path.exists());
    }

    #[test]
    fn test_finished_sink_keeps_its_file() {
        let path = scratch_path("finished.avi");
        let props = VideoProperties { width: 64, height: 48, fps: 10.0 };
        let mut sink = VideoSink::create(&path, &props, &mjpg_config()).unwrap();
        write_blank_frames(&mut sink, 3);
        sink.finish().unwrap();
        drop(sink);
        assert!(path.exists());

        let source = VideoSource::open(&path, 24.0).ok().unwrap();
        assert_eq!(source.properties().width, 64);
        assert_eq!(source.properties().height, 48);
        drop(source);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let err = VideoSource::open(Path::new("/nonexistent/clip.mp4"), 24.0).err().unwrap();
        assert!(matches!(err, PipelineError::SourceUnreadable { .. }));
    }
}
