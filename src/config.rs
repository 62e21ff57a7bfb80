use anyhow::bail;
use serde::Deserialize;
use std::fs;

/// Run configuration. Every section falls back to the reference values,
/// so `{}` is a valid config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tracking: TrackingConfig,
    pub speed: SpeedConfig,
    pub detector: HogConfig,
    pub output: OutputConfig,
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Max centroid distance (pixels) for a detection to extend a track.
    pub distance_threshold: f64,
    /// A track is evicted once its consecutive misses exceed this.
    pub max_misses: u32,
    /// Ring-buffer capacity for displacement samples. `None` keeps every sample.
    pub velocity_window: Option<usize>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 80.0,
            max_misses: 10,
            velocity_window: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeedConfig {
    pub slow_threshold: f64,
    pub fast_threshold: f64,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            slow_threshold: 60.0,
            fast_threshold: 150.0,
        }
    }
}

/// Multi-scale search parameters for the HOG people detector.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HogConfig {
    pub win_stride: [i32; 2],
    pub padding: [i32; 2],
    pub scale: f64,
    pub hit_threshold: f64,
    pub group_threshold: f64,
}

impl Default for HogConfig {
    fn default() -> Self {
        Self {
            win_stride: [8, 8],
            padding: [8, 8],
            scale: 1.05,
            hit_threshold: 0.0,
            group_threshold: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Four-character codec code handed to the video writer.
    ///
    /// The OpenCV writer exposes no pixel-format or container flags, so the
    /// output is not forced to yuv420p and the MP4 index is not moved to the
    /// front (no faststart). Both follow the FFmpeg backend's defaults; remux
    /// the result if progressive web playback is needed.
    pub fourcc: String,
    /// Frame rate assumed when the source does not report one.
    pub default_fps: f64,
    /// Lower clamp for the output frame rate.
    pub min_fps: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            fourcc: "avc1".to_string(),
            default_fps: 24.0,
            min_fps: 1.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub max_reported_frames: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_reported_frames: 50,
        }
    }
}

impl Config {
    /// Load from a JSON file.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let cfg: Config = serde_json::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.tracking.distance_threshold > 0.0) {
            bail!(
                "tracking.distance_threshold must be positive, got {}",
                self.tracking.distance_threshold
            );
        }
        if self.tracking.velocity_window == Some(0) {
            bail!("tracking.velocity_window must be at least 1 when set");
        }
        if self.speed.slow_threshold > self.speed.fast_threshold {
            bail!(
                "speed.slow_threshold ({}) exceeds speed.fast_threshold ({})",
                self.speed.slow_threshold,
                self.speed.fast_threshold
            );
        }
        if !(self.detector.scale > 1.0) {
            bail!("detector.scale must be greater than 1.0, got {}", self.detector.scale);
        }
        if self.detector.win_stride.iter().any(|&s| s <= 0) {
            bail!("detector.win_stride must be positive, got {:?}", self.detector.win_stride);
        }
        if self.output.fourcc.len() != 4 || !self.output.fourcc.is_ascii() {
            bail!("output.fourcc must be four ASCII characters, got {:?}", self.output.fourcc);
        }
        if !(self.output.default_fps > 0.0) || !(self.output.min_fps > 0.0) {
            bail!("output frame rates must be positive");
        }
        Ok(())
    }
}
