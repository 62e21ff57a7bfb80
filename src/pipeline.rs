//! Per-frame detect, associate, classify, annotate loop for one video.

use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::detection::{BoundingBox, Detector};
use crate::error::PipelineError;
use crate::motion::SpeedClassifier;
use crate::tracker::Tracker;
use crate::video::{FrameSink, FrameSource, VideoProperties, VideoSink, VideoSource};
use crate::visualization::{self, TrackOverlay};

/// Detections of one frame, kept for the first frames that had any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame_index: u64,
    pub count: usize,
    pub boxes: Vec<BoundingBox>,
}

/// Result of a completed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub total_frames: u64,
    pub frames_with_detections: u64,
    pub total_detections: u64,
    pub reported_frames: Vec<FrameReport>,
}

impl RunSummary {
    fn record(&mut self, boxes: Vec<BoundingBox>, max_reported: usize) {
        let frame_index = self.total_frames;
        self.total_frames += 1;
        if boxes.is_empty() {
            return;
        }
        self.frames_with_detections += 1;
        self.total_detections += boxes.len() as u64;
        if self.reported_frames.len() < max_reported {
            self.reported_frames.push(FrameReport {
                frame_index,
                count: boxes.len(),
                boxes,
            });
        }
    }
}

/// Runs one video at a time through a detector. Tracking state is created
/// fresh for every run; only the detector and config are reused.
pub struct Pipeline<D: Detector> {
    detector: D,
    config: Config,
}

impl<D: Detector> Pipeline<D> {
    pub fn new(detector: D, config: Config) -> Self {
        Self { detector, config }
    }

    /// Annotate `input` into `output`. A file at `output` is only touched
    /// once the writer has been opened; if the run fails after that, the
    /// partial file is removed when the writer is dropped.
    pub fn run(&mut self, input: &Path, output: &Path) -> Result<RunSummary, PipelineError> {
        info!(input = %input.display(), output = %output.display(), "processing video");
        let result = VideoSource::open(input, self.config.output.default_fps).and_then(|source| {
            let output_cfg = self.config.output.clone();
            self.process(source, |props| VideoSink::create(output, props, &output_cfg))
        });

        if let Err(e) = &result {
            warn!(error = %e, "run failed");
        }
        result
    }

    /// Drive `source` to completion, writing annotated frames to the sink
    /// built by `open_sink`. Source and sink are dropped, and so released,
    /// on every return path.
    pub fn process<S, K, F>(&mut self, mut source: S, open_sink: F) -> Result<RunSummary, PipelineError>
    where
        S: FrameSource,
        K: FrameSink,
        F: FnOnce(&VideoProperties) -> anyhow::Result<K>,
    {
        let props = source.properties();
        if props.width == 0 || props.height == 0 {
            return Err(PipelineError::InvalidDimensions {
                width: props.width,
                height: props.height,
            });
        }
        let mut sink = open_sink(&props).map_err(PipelineError::sink)?;

        let mut tracker = Tracker::new(&self.config.tracking);
        let classifier = SpeedClassifier::new(&self.config.speed);
        let max_reported = self.config.report.max_reported_frames;
        let mut summary = RunSummary::default();

        loop {
            let frame_index = summary.total_frames;
            let fail = |e: anyhow::Error| PipelineError::processing(frame_index, e);

            let Some(mut frame) = source.next_frame().map_err(fail)? else {
                break;
            };
            let detections = self.detector.detect(&frame).map_err(fail)?;
            let outcome = tracker.update(&detections);

            let overlays = TrackOverlay::collect(tracker.tracks(), &classifier);
            visualization::draw_tracks(&mut frame, &overlays)
                .map_err(|e| fail(e.into()))?;
            sink.write(&frame).map_err(fail)?;

            debug!(
                frame = frame_index,
                detections = detections.len(),
                new_tracks = outcome.created.len(),
                active = tracker.tracks().len(),
                "frame processed"
            );
            summary.record(detections.iter().map(|d| d.bbox).collect(), max_reported);
        }

        if summary.total_frames == 0 {
            return Err(PipelineError::NoUsableFrames);
        }
        sink.finish()
            .map_err(|e| PipelineError::processing(summary.total_frames, e))?;

        info!(
            frames = summary.total_frames,
            frames_with_detections = summary.frames_with_detections,
            detections = summary.total_detections,
            "video processed"
        );
        Ok(summary)
    }
}
