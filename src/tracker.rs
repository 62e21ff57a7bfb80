use nalgebra::{distance, Point2};
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::config::TrackingConfig;
use crate::detection::{BoundingBox, Detection};
use crate::motion::VelocityHistory;

/// Stable identity assigned at track creation. Ids grow monotonically
/// within a run, so creation order and id order agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One pedestrian followed across frames.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    /// Last matched centroid
    position: Point2<f64>,
    velocity: VelocityHistory,
    /// Consecutive frames without a match
    misses: u32,
    last_box: Option<BoundingBox>,
}

impl Track {
    fn new(id: TrackId, detection: &Detection, velocity_window: Option<usize>) -> Self {
        Track {
            id,
            position: detection.centroid(),
            velocity: VelocityHistory::new(velocity_window),
            misses: 0,
            last_box: Some(detection.bbox),
        }
    }

    /// Commit a match: move to the new centroid and record the displacement.
    fn update(&mut self, detection: &Detection, centroid: Point2<f64>) {
        let displacement = distance(&self.position, &centroid);
        self.position = centroid;
        self.velocity.push(displacement);
        self.misses = 0;
        self.last_box = Some(detection.bbox);
    }

    fn mark_missed(&mut self) {
        self.misses += 1;
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn position(&self) -> Point2<f64> {
        self.position
    }

    pub fn velocity(&self) -> &VelocityHistory {
        &self.velocity
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }

    pub fn last_box(&self) -> Option<&BoundingBox> {
        self.last_box.as_ref()
    }
}

/// Active tracks of one run, kept in creation order.
#[derive(Debug, Default)]
pub struct TrackStore {
    tracks: Vec<Track>,
    next_id: u64,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, detection: &Detection, velocity_window: Option<usize>) -> TrackId {
        let id = TrackId(self.next_id);
        self.next_id += 1;
        self.tracks.push(Track::new(id, detection, velocity_window));
        id
    }

    fn take(&mut self) -> Vec<Track> {
        std::mem::take(&mut self.tracks)
    }

    fn restore(&mut self, surviving: Vec<Track>) {
        debug_assert!(self.tracks.is_empty());
        self.tracks = surviving;
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks
            .binary_search_by_key(&id, |t| t.id)
            .ok()
            .map(|idx| &self.tracks[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Track> {
        self.tracks.iter()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

/// What one association step did to the store.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssociationOutcome {
    pub matched: Vec<TrackId>,
    pub created: Vec<TrackId>,
    pub evicted: Vec<TrackId>,
}

/// Greedy nearest-centroid multi-object tracker.
///
/// Tracks claim detections one at a time in creation order. Each takes the
/// closest unclaimed centroid if it lies within `distance_threshold`; a
/// later track cannot take back a detection even when it is closer to it.
/// Unclaimed detections start new tracks. A track whose consecutive misses
/// exceed `max_misses` is dropped.
#[derive(Debug)]
pub struct Tracker {
    store: TrackStore,
    distance_threshold: f64,
    max_misses: u32,
    velocity_window: Option<usize>,
}

impl Tracker {
    pub fn new(config: &TrackingConfig) -> Self {
        Tracker {
            store: TrackStore::new(),
            distance_threshold: config.distance_threshold,
            max_misses: config.max_misses,
            velocity_window: config.velocity_window,
        }
    }

    pub fn tracks(&self) -> &TrackStore {
        &self.store
    }

    /// Associate one frame's detections with the current tracks.
    pub fn update(&mut self, detections: &[Detection]) -> AssociationOutcome {
        let mut outcome = AssociationOutcome::default();
        let mut candidates: Vec<(&Detection, Point2<f64>)> =
            detections.iter().map(|d| (d, d.centroid())).collect();

        let previous = self.store.take();
        let mut surviving = Vec::with_capacity(previous.len() + candidates.len());

        for mut track in previous {
            match nearest(&track.position, &candidates) {
                Some((idx, dist)) if dist <= self.distance_threshold => {
                    let (det, centroid) = candidates.remove(idx);
                    track.update(det, centroid);
                    outcome.matched.push(track.id);
                    surviving.push(track);
                }
                _ => {
                    track.mark_missed();
                    if track.misses > self.max_misses {
                        debug!(track = %track.id, misses = track.misses, "evicting track");
                        outcome.evicted.push(track.id);
                    } else {
                        surviving.push(track);
                    }
                }
            }
        }

        self.store.restore(surviving);
        for (det, _) in candidates {
            let id = self.store.insert(det, self.velocity_window);
            outcome.created.push(id);
        }

        debug!(
            matched = outcome.matched.len(),
            created = outcome.created.len(),
            evicted = outcome.evicted.len(),
            active = self.store.len(),
            "association done"
        );
        outcome
    }
}

/// Index and distance of the closest candidate. Ties go to the earliest one.
fn nearest(from: &Point2<f64>, candidates: &[(&Detection, Point2<f64>)]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, (_, centroid)) in candidates.iter().enumerate() {
        let d = distance(from, centroid);
        if best.map_or(true, |(_, best_d)| d < best_d) {
            best = Some((idx, d));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Detection whose box is centred on (cx, cy), 40x80 px.
    fn det_at(cx: u32, cy: u32) -> Detection {
        Detection::new(BoundingBox::new(cx - 20, cy - 40, 40, 80).unwrap(), 1.0)
    }

    fn tracker() -> Tracker {
        Tracker::new(&TrackingConfig::default())
    }

    fn misses_by_id(tracker: &Tracker) -> Vec<(TrackId, u32)> {
        tracker.tracks().iter().map(|t| (t.id(), t.misses())).collect()
    }

    #[test]
    fn test_three_frame_sequence() {
        let mut tracker = tracker();

        let out = tracker.update(&[det_at(100, 100)]);
        assert_eq!(out.created.len(), 1);
        let id = out.created[0];
        let track = tracker.tracks().get(id).unwrap();
        assert_eq!(track.velocity().len(), 0);
        assert_eq!(track.misses(), 0);

        let out = tracker.update(&[det_at(110, 100)]);
        assert_eq!(out.matched, vec![id]);
        assert!(out.created.is_empty());
        let track = tracker.tracks().get(id).unwrap();
        assert_eq!(track.velocity().samples().collect::<Vec<_>>(), vec![10.0]);
        assert_eq!(track.misses(), 0);
        assert_relative_eq!(track.position().x, 110.0);

        let out = tracker.update(&[]);
        assert!(out.evicted.is_empty());
        assert_eq!(tracker.tracks().len(), 1);
        let track = tracker.tracks().get(id).unwrap();
        assert_eq!(track.misses(), 1);
        assert_eq!(track.last_box(), Some(&det_at(110, 100).bbox));
    }

    #[test]
    fn test_empty_frame_only_ages_tracks() {
        let mut tracker = tracker();
        tracker.update(&[det_at(100, 100), det_at(400, 100)]);
        // age the first track only
        tracker.update(&[det_at(400, 100)]);
        let before = misses_by_id(&tracker);

        tracker.update(&[]);
        let after = misses_by_id(&tracker);
        assert_eq!(before.len(), after.len());
        for ((id_b, m_b), (id_a, m_a)) in before.iter().zip(&after) {
            assert_eq!(id_b, id_a);
            assert_eq!(*m_a, m_b + 1);
        }
    }

    #[test]
    fn test_matched_every_frame_accumulates_samples() {
        let mut tracker = tracker();
        let k = 6;
        for i in 0..k {
            tracker.update(&[det_at(100 + i * 5, 200)]);
        }
        assert_eq!(tracker.tracks().len(), 1);
        let track = tracker.tracks().iter().next().unwrap();
        assert_eq!(track.misses(), 0);
        assert_eq!(track.velocity().len(), (k - 1) as usize);
        assert_relative_eq!(track.velocity().mean(), 5.0);
    }

    #[test]
    fn test_eviction_boundary() {
        let mut tracker = tracker();
        tracker.update(&[det_at(100, 100)]);
        for _ in 0..10 {
            let out = tracker.update(&[]);
            assert!(out.evicted.is_empty());
        }
        assert_eq!(tracker.tracks().iter().next().unwrap().misses(), 10);

        let out = tracker.update(&[]);
        assert_eq!(out.evicted.len(), 1);
        assert!(tracker.tracks().is_empty());
    }

    #[test]
    fn test_match_resets_misses() {
        let mut tracker = tracker();
        tracker.update(&[det_at(100, 100)]);
        for _ in 0..5 {
            tracker.update(&[]);
        }
        tracker.update(&[det_at(120, 100)]);
        let track = tracker.tracks().iter().next().unwrap();
        assert_eq!(track.misses(), 0);
        assert_eq!(track.velocity().samples().collect::<Vec<_>>(), vec![20.0]);
    }

    #[test]
    fn test_far_detections_spawn_new_tracks() {
        let mut tracker = tracker();
        let first = tracker.update(&[det_at(100, 100)]).created[0];

        let out = tracker.update(&[det_at(300, 100), det_at(100, 300)]);
        assert!(out.matched.is_empty());
        assert_eq!(out.created.len(), 2);
        assert_eq!(tracker.tracks().len(), 3);
        assert_eq!(tracker.tracks().get(first).unwrap().misses(), 1);
    }

    #[test]
    fn test_close_detection_extends_track() {
        let mut tracker = tracker();
        let first = tracker.update(&[det_at(100, 100)]).created[0];

        // 50 px away is within threshold, 250 px is not.
        let out = tracker.update(&[det_at(350, 100), det_at(150, 100)]);
        assert_eq!(out.matched, vec![first]);
        assert_eq!(out.created.len(), 1);
        let track = tracker.tracks().get(first).unwrap();
        assert_relative_eq!(track.position().x, 150.0);
    }

    #[test]
    fn test_distance_threshold_is_inclusive() {
        let mut tracker = tracker();
        let first = tracker.update(&[det_at(100, 100)]).created[0];
        let out = tracker.update(&[det_at(180, 100)]);
        assert_eq!(out.matched, vec![first]);

        let out = tracker.update(&[det_at(261, 100)]);
        assert!(out.matched.is_empty());
        assert_eq!(out.created.len(), 1);
    }

    #[test]
    fn test_greedy_first_track_claims_detection() {
        let mut tracker = tracker();
        let out = tracker.update(&[det_at(100, 100), det_at(160, 100)]);
        let (older, younger) = (out.created[0], out.created[1]);

        // Single detection at 150: 50 px from the older track, 10 px from the
        // younger one. The older track is visited first and keeps it.
        let out = tracker.update(&[det_at(150, 100)]);
        assert_eq!(out.matched, vec![older]);
        assert!(out.created.is_empty());
        assert_eq!(tracker.tracks().get(younger).unwrap().misses(), 1);
    }

    #[test]
    fn test_one_detection_per_track() {
        let mut tracker = tracker();
        let out = tracker.update(&[det_at(100, 100), det_at(110, 100)]);
        assert_eq!(out.created.len(), 2);

        let out = tracker.update(&[det_at(105, 100)]);
        assert_eq!(out.matched.len(), 1);
        let missed: Vec<_> = tracker.tracks().iter().filter(|t| t.misses() == 1).collect();
        assert_eq!(missed.len(), 1);
    }

    #[test]
    fn test_ids_follow_creation_order() {
        let mut tracker = tracker();
        tracker.update(&[det_at(100, 100), det_at(300, 100)]);
        tracker.update(&[det_at(100, 100), det_at(300, 100), det_at(500, 100)]);
        let ids: Vec<u64> = tracker.tracks().iter().map(|t| t.id().0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_velocity_window_caps_history() {
        let config = TrackingConfig {
            velocity_window: Some(3),
            ..TrackingConfig::default()
        };
        let mut tracker = Tracker::new(&config);
        for i in 0..10 {
            tracker.update(&[det_at(100 + i * 10, 100)]);
        }
        let track = tracker.tracks().iter().next().unwrap();
        assert_eq!(track.velocity().len(), 3);
    }
}
