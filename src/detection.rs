use anyhow::Result;
use nalgebra::Point2;
use opencv::{
    core::{Mat, Rect, Size, Vector},
    objdetect::HOGDescriptor,
    prelude::*,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::HogConfig;

/// Axis-aligned box in pixel coordinates. Width and height are always
/// positive, and both far edges fit in an `i32` so the box converts to an
/// OpenCV `Rect` losslessly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    #[serde(rename = "w")]
    pub width: u32,
    #[serde(rename = "h")]
    pub height: u32,
}

impl BoundingBox {
    /// Returns `None` for a zero-area box or one reaching past `i32::MAX`.
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        i32::try_from(x.checked_add(width)?).ok()?;
        i32::try_from(y.checked_add(height)?).ok()?;
        Some(Self { x, y, width, height })
    }

    /// Clip an OpenCV rect to a `frame_w` x `frame_h` image.
    pub fn from_rect_clipped(rect: Rect, frame_w: i32, frame_h: i32) -> Option<Self> {
        let x1 = rect.x.clamp(0, frame_w);
        let y1 = rect.y.clamp(0, frame_h);
        let x2 = rect.x.saturating_add(rect.width).clamp(0, frame_w);
        let y2 = rect.y.saturating_add(rect.height).clamp(0, frame_h);
        Self::new(x1 as u32, y1 as u32, (x2 - x1).max(0) as u32, (y2 - y1).max(0) as u32)
    }

    pub fn centroid(&self) -> Point2<f64> {
        Point2::new(
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Saturates at `i32::MAX` for boxes built directly from out-of-range fields.
    pub fn to_rect(&self) -> Rect {
        let px = |v: u32| i32::try_from(v).unwrap_or(i32::MAX);
        let (x, y) = (px(self.x), px(self.y));
        Rect::new(
            x,
            y,
            px(self.width).min(i32::MAX - x),
            px(self.height).min(i32::MAX - y),
        )
    }
}

/// A single detection result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Detector weight. Carried for completeness; tracking ignores it.
    pub confidence: f64,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f64) -> Self {
        Self { bbox, confidence }
    }

    pub fn centroid(&self) -> Point2<f64> {
        self.bbox.centroid()
    }
}

/// Per-frame pedestrian detector. Implementations must not carry state
/// between frames.
pub trait Detector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>>;
}

/// OpenCV HOG descriptor loaded with the default people SVM.
pub struct HogDetector {
    hog: HOGDescriptor,
    params: HogConfig,
}

impl HogDetector {
    pub fn new(params: HogConfig) -> Result<Self> {
        let mut hog = HOGDescriptor::default()?;
        let svm = HOGDescriptor::get_default_people_detector()?;
        hog.set_svm_detector(&svm)?;
        Ok(HogDetector { hog, params })
    }
}

impl Detector for HogDetector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<Detection>> {
        let mut found = Vector::<Rect>::new();
        let mut weights = Vector::<f64>::new();
        let p = &self.params;
        self.hog.detect_multi_scale_weights(
            frame,
            &mut found,
            &mut weights,
            p.hit_threshold,
            Size::new(p.win_stride[0], p.win_stride[1]),
            Size::new(p.padding[0], p.padding[1]),
            p.scale,
            p.group_threshold,
            false,
        )?;

        let (cols, rows) = (frame.cols(), frame.rows());
        let mut detections = Vec::with_capacity(found.len());
        for (i, rect) in found.iter().enumerate() {
            let confidence = weights.get(i).unwrap_or(0.0);
            match BoundingBox::from_rect_clipped(rect, cols, rows) {
                Some(bbox) => detections.push(Detection::new(bbox, confidence)),
                None => debug!(?rect, "dropping box outside the frame"),
            }
        }
        Ok(detections)
    }
}
