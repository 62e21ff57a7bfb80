use opencv::{
    core::{Point, Rect, Scalar, Size},
    imgproc,
    prelude::*,
};

use crate::detection::BoundingBox;
use crate::motion::{SpeedClassifier, SpeedLabel};
use crate::tracker::TrackStore;

const BOX_COLOR: Scalar = Scalar::new(0.0, 255.0, 0.0, 0.0); // Green (BGR)
const BADGE_COLOR: Scalar = Scalar::new(0.0, 0.0, 0.0, 0.0); // Black
const BOX_THICKNESS: i32 = 2;
const FONT: i32 = imgproc::FONT_HERSHEY_SIMPLEX;
const FONT_SCALE: f64 = 0.45;
const FONT_THICKNESS: i32 = 1;

/// What gets drawn for one track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackOverlay {
    pub bbox: BoundingBox,
    pub label: SpeedLabel,
}

impl TrackOverlay {
    /// One overlay per track that has a box, in store order.
    pub fn collect(tracks: &TrackStore, classifier: &SpeedClassifier) -> Vec<TrackOverlay> {
        tracks
            .iter()
            .filter_map(|track| {
                let bbox = *track.last_box()?;
                Some(TrackOverlay {
                    bbox,
                    label: classifier.classify(track.velocity()),
                })
            })
            .collect()
    }
}

/// Text origin and badge rectangle for a label of `text_size`, anchored
/// inside the top-right corner of `bbox`.
pub fn badge_layout(bbox: &BoundingBox, text_size: Size) -> (Point, Rect) {
    let Rect { x, y, width: w, .. } = bbox.to_rect();
    let (tw, th) = (text_size.width, text_size.height);
    let text_x = (x + w).saturating_sub(tw + 6);
    let text_y = y.saturating_add(20).max(th + 10);
    let badge = Rect::new(text_x - 4, text_y - th - 6, tw + 8, th + 10);
    (Point::new(text_x, text_y), badge)
}

pub fn draw_track(frame: &mut Mat, overlay: &TrackOverlay) -> opencv::Result<()> {
    let bbox = &overlay.bbox;
    let rect = bbox.to_rect();
    if rect.x >= frame.cols() || rect.y >= frame.rows() {
        // box and badge both lie outside the frame
        return Ok(());
    }
    let br = Point::new(rect.x + rect.width, rect.y + rect.height);
    imgproc::rectangle_points(frame, rect.tl(), br, BOX_COLOR, BOX_THICKNESS, imgproc::LINE_8, 0)?;

    let text = format!("speed: {}", overlay.label);
    let mut baseline = 0;
    let text_size = imgproc::get_text_size(&text, FONT, FONT_SCALE, FONT_THICKNESS, &mut baseline)?;
    let (origin, badge) = badge_layout(bbox, text_size);

    imgproc::rectangle(frame, badge, BADGE_COLOR, imgproc::FILLED, imgproc::LINE_8, 0)?;
    imgproc::put_text(
        frame,
        &text,
        origin,
        FONT,
        FONT_SCALE,
        BOX_COLOR,
        FONT_THICKNESS,
        imgproc::LINE_AA,
        false,
    )
}

pub fn draw_tracks(frame: &mut Mat, overlays: &[TrackOverlay]) -> opencv::Result<()> {
    for overlay in overlays {
        draw_track(frame, overlay)?;
    }
    Ok(())
}
