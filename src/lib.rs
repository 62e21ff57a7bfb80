pub mod config;
pub mod detection;
pub mod error;
pub mod motion;
pub mod pipeline;
pub mod tracker;
pub mod video;
pub mod visualization;

// Re-export main types
pub use crate::config::Config;
pub use crate::detection::{BoundingBox, Detection, Detector, HogDetector};
pub use crate::error::PipelineError;
pub use crate::motion::{SpeedClassifier, SpeedLabel};
pub use crate::pipeline::{FrameReport, Pipeline, RunSummary};
pub use crate::tracker::{Track, TrackId, TrackStore, Tracker};
