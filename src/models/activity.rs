// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Activity summary model for the index.
//!
//! Field names are shortened on disk; the Rust names stay descriptive.

use serde::{Deserialize, Serialize};

/// A geographic point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl From<[f64; 2]> for LatLng {
    fn from([lat, lng]: [f64; 2]) -> Self {
        Self { lat, lng }
    }
}

impl From<LatLng> for [f64; 2] {
    fn from(p: LatLng) -> Self {
        [p.lat, p.lng]
    }
}

/// Axis-aligned bounding box given by its south-west and north-east corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(rename = "SW")]
    pub sw: LatLng,
    #[serde(rename = "NE")]
    pub ne: LatLng,
}

impl BoundingBox {
    pub fn new(sw: LatLng, ne: LatLng) -> Self {
        Self { sw, ne }
    }

    /// Two boxes overlap when each pair of opposite edges strictly crosses.
    /// Boxes that only touch along an edge do not overlap.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        let (left1, right1, bottom1, top1) = (self.sw.lng, self.ne.lng, self.sw.lat, self.ne.lat);
        let (left2, right2, bottom2, top2) =
            (other.sw.lng, other.ne.lng, other.sw.lat, other.ne.lat);

        left1 < right2 && right1 > left2 && top1 > bottom2 && bottom1 < top2
    }
}

/// Who may see an activity upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Everyone,
    FollowersOnly,
    OnlyMe,
}

/// Stored activity summary (one per activity id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    /// Strava activity ID (also used as document ID)
    #[serde(rename = "_id")]
    pub id: u64,
    /// Owning Strava athlete ID
    #[serde(rename = "U")]
    pub user_id: u64,
    #[serde(rename = "N")]
    pub name: String,
    /// Sport type (Ride, Run, Hike, etc.)
    #[serde(rename = "T")]
    pub sport_type: String,
    /// Start time, UTC epoch seconds
    #[serde(rename = "s")]
    pub start: i64,
    /// Local offset of the start time in hours
    #[serde(rename = "o")]
    pub utc_offset: i8,
    /// Distance in meters
    #[serde(rename = "D")]
    pub distance: f64,
    /// Elapsed time in seconds
    #[serde(rename = "e")]
    pub elapsed_time: u32,
    /// Total elevation gain in meters
    #[serde(rename = "x")]
    pub elevation_gain: f64,
    #[serde(rename = "B")]
    pub bounds: BoundingBox,
    #[serde(rename = "p")]
    pub private: bool,
    #[serde(rename = "v")]
    pub visibility: Visibility,
    #[serde(rename = "c")]
    pub commute: bool,
}

/// Metadata-only changes pushed by the upstream webhook.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityUpdates {
    pub name: Option<String>,
    pub sport_type: Option<String>,
    pub private: Option<bool>,
    pub visibility: Option<Visibility>,
}

impl ActivityUpdates {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.sport_type.is_none()
            && self.private.is_none()
            && self.visibility.is_none()
    }

    pub fn apply(&self, summary: &mut ActivitySummary) {
        if let Some(name) = &self.name {
            summary.name = name.clone();
        }
        if let Some(sport_type) = &self.sport_type {
            summary.sport_type = sport_type.clone();
        }
        if let Some(private) = self.private {
            summary.private = private;
        }
        if let Some(visibility) = self.visibility {
            summary.visibility = visibility;
        }
    }
}

/// Per-user access record driving index retention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexAccess {
    #[serde(rename = "_id")]
    pub user_id: u64,
    /// Last query or import, UTC epoch seconds
    #[serde(rename = "ts")]
    pub last_access: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(sw: (f64, f64), ne: (f64, f64)) -> BoundingBox {
        BoundingBox::new(
            LatLng { lat: sw.0, lng: sw.1 },
            LatLng { lat: ne.0, lng: ne.1 },
        )
    }

    #[test]
    fn test_overlapping_boxes() {
        let a = bbox((0.0, 0.0), (10.0, 10.0));
        let b = bbox((5.0, 5.0), (15.0, 15.0));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
    }

    #[test]
    fn test_disjoint_boxes() {
        let a = bbox((0.0, 0.0), (10.0, 10.0));
        let c = bbox((20.0, 20.0), (30.0, 30.0));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_edge_touching_boxes_do_not_overlap() {
        let a = bbox((0.0, 0.0), (10.0, 10.0));
        let d = bbox((0.0, 10.0), (10.0, 20.0));
        assert!(!a.overlaps(&d));
    }

    #[test]
    fn test_short_keys_on_disk() {
        let summary = ActivitySummary {
            id: 1,
            user_id: 2,
            name: "Morning Ride".to_string(),
            sport_type: "Ride".to_string(),
            start: 1_700_000_000,
            utc_offset: -8,
            distance: 1000.0,
            elapsed_time: 600,
            elevation_gain: 12.0,
            bounds: bbox((1.0, 2.0), (3.0, 4.0)),
            private: false,
            visibility: Visibility::FollowersOnly,
            commute: true,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["_id"], 1);
        assert_eq!(json["U"], 2);
        assert_eq!(json["B"]["SW"], serde_json::json!([1.0, 2.0]));
        assert_eq!(json["v"], "followers_only");

        let back: ActivitySummary = serde_json::from_value(json).unwrap();
        assert_eq!(back, summary);
    }

    #[test]
    fn test_updates_apply() {
        let mut summary = ActivitySummary {
            id: 1,
            user_id: 2,
            name: "Old".to_string(),
            sport_type: "Run".to_string(),
            start: 0,
            utc_offset: 0,
            distance: 0.0,
            elapsed_time: 0,
            elevation_gain: 0.0,
            bounds: bbox((0.0, 0.0), (1.0, 1.0)),
            private: false,
            visibility: Visibility::Everyone,
            commute: false,
        };
        let updates = ActivityUpdates {
            name: Some("New".to_string()),
            private: Some(true),
            ..Default::default()
        };
        assert!(!updates.is_empty());
        updates.apply(&mut summary);
        assert_eq!(summary.name, "New");
        assert_eq!(summary.sport_type, "Run");
        assert!(summary.private);
    }
}
