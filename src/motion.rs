//! Speed estimation from per-frame centroid displacement.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

use crate::config::SpeedConfig;

/// Frame-to-frame displacement magnitudes for one track, oldest first.
///
/// Unbounded by default. With a capacity the oldest sample is dropped on
/// overflow and the mean becomes a windowed average.
#[derive(Debug, Clone, Default)]
pub struct VelocityHistory {
    samples: VecDeque<f64>,
    capacity: Option<usize>,
}

impl VelocityHistory {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            samples: VecDeque::new(),
            capacity,
        }
    }

    pub fn push(&mut self, displacement: f64) {
        if let Some(cap) = self.capacity {
            while self.samples.len() >= cap {
                self.samples.pop_front();
            }
        }
        self.samples.push_back(displacement);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean displacement, 0.0 when no samples exist.
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeedLabel {
    Slow,
    Normal,
    Fast,
}

impl SpeedLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeedLabel::Slow => "slow",
            SpeedLabel::Normal => "normal",
            SpeedLabel::Fast => "fast",
        }
    }
}

impl fmt::Display for SpeedLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps a mean displacement to a label. Both thresholds are inclusive,
/// `fast` is checked first.
#[derive(Debug, Clone, Copy)]
pub struct SpeedClassifier {
    slow_threshold: f64,
    fast_threshold: f64,
}

impl Default for SpeedClassifier {
    fn default() -> Self {
        Self::new(&SpeedConfig::default())
    }
}

impl SpeedClassifier {
    pub fn new(config: &SpeedConfig) -> Self {
        Self {
            slow_threshold: config.slow_threshold,
            fast_threshold: config.fast_threshold,
        }
    }

    pub fn label_for(&self, avg_speed: f64) -> SpeedLabel {
        if avg_speed >= self.fast_threshold {
            SpeedLabel::Fast
        } else if avg_speed <= self.slow_threshold {
            SpeedLabel::Slow
        } else {
            SpeedLabel::Normal
        }
    }

    /// A track with no samples yet has not moved and is always `normal`.
    pub fn classify(&self, history: &VelocityHistory) -> SpeedLabel {
        if history.is_empty() {
            return SpeedLabel::Normal;
        }
        self.label_for(history.mean())
    }
}
