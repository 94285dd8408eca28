//! Per-source track correlator.
//!
//! Grounded in the reference `detections.py`'s module-level `TRACKS` dict,
//! but re-architected as an explicit struct owned by the dispatch
//! coordinator rather than a process-global singleton, so tests can run
//! several independent correlators side by side.

use crate::models::{Track, TrackPosition};
use dashmap::DashMap;
use uuid::Uuid;

/// Oldest positions are dropped once a track exceeds this many entries.
pub const MAX_POSITIONS_PER_TRACK: usize = 1000;

#[derive(Default)]
pub struct TrackStore {
    tracks: DashMap<String, Track>,
}

impl TrackStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a position to the track for `source_id`, creating one if
    /// this is the first observation from that source. Drops the oldest
    /// position once the track exceeds [`MAX_POSITIONS_PER_TRACK`].
    pub fn record(&self, source_id: &str, position: TrackPosition) -> Uuid {
        let mut entry = self.tracks.entry(source_id.to_string()).or_insert_with(|| Track {
            track_id: Uuid::new_v4(),
            source_id: source_id.to_string(),
            positions: Vec::new(),
            classification: None,
            confidence: None,
        });

        entry.positions.push(position);
        if entry.positions.len() > MAX_POSITIONS_PER_TRACK {
            entry.positions.remove(0);
        }

        entry.track_id
    }

    pub fn get(&self, source_id: &str) -> Option<Track> {
        self.tracks.get(source_id).map(|t| t.clone())
    }

    /// Returns every track currently held, classification defaulted to
    /// `"fire"` / confidence `0.8` to match the reference listing
    /// endpoint's placeholder values when none has been set explicitly.
    pub fn snapshot(&self) -> Vec<Track> {
        self.tracks
            .iter()
            .map(|entry| {
                let mut track = entry.value().clone();
                if track.classification.is_none() {
                    track.classification = Some("fire".to_string());
                }
                if track.confidence.is_none() {
                    track.confidence = Some(0.8);
                }
                track
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn position(lat: f64, lon: f64) -> TrackPosition {
        TrackPosition {
            lat,
            lon,
            alt: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn first_observation_creates_a_track() {
        let store = TrackStore::new();
        let id = store.record("drone-1", position(1.0, 2.0));
        let track = store.get("drone-1").unwrap();
        assert_eq!(track.track_id, id);
        assert_eq!(track.positions.len(), 1);
    }

    #[test]
    fn repeated_observations_append_to_the_same_track() {
        let store = TrackStore::new();
        let id1 = store.record("drone-1", position(1.0, 2.0));
        let id2 = store.record("drone-1", position(1.1, 2.1));
        assert_eq!(id1, id2);
        assert_eq!(store.get("drone-1").unwrap().positions.len(), 2);
    }

    #[test]
    fn track_caps_at_max_positions_dropping_oldest() {
        let store = TrackStore::new();
        for i in 0..(MAX_POSITIONS_PER_TRACK + 10) {
            store.record("drone-1", position(i as f64, 0.0));
        }
        let track = store.get("drone-1").unwrap();
        assert_eq!(track.positions.len(), MAX_POSITIONS_PER_TRACK);
        // The oldest 10 positions (lat 0.0..10.0) should have been dropped.
        assert_eq!(track.positions[0].lat, 10.0);
    }

    #[test]
    fn snapshot_defaults_classification_and_confidence() {
        let store = TrackStore::new();
        store.record("drone-1", position(1.0, 2.0));
        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].classification.as_deref(), Some("fire"));
        assert_eq!(snapshot[0].confidence, Some(0.8));
    }
}
