// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Telemetry records: raw upstream channels and the cached compressed form.

use chrono::{DateTime, Utc};

use super::LatLng;

/// Uncompressed telemetry channels as fetched from upstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawStreams {
    /// Seconds since activity start
    pub time: Vec<i64>,
    /// Altitude in meters
    pub altitude: Vec<f64>,
    pub latlng: Vec<LatLng>,
}

/// Channels recovered from a compressed blob.
///
/// Altitude comes back rounded to whole meters and the path to the polyline
/// precision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedStreams {
    pub time: Vec<i64>,
    pub altitude: Vec<i64>,
    pub latlng: Vec<LatLng>,
}

/// Compressed telemetry of one activity as held by the warm tier.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamsDocument {
    pub activity_id: u64,
    pub blob: Vec<u8>,
    /// Last write or touch; TTL eviction is measured from here
    pub written_at: DateTime<Utc>,
}

impl StreamsDocument {
    pub fn new(activity_id: u64, blob: Vec<u8>) -> Self {
        Self {
            activity_id,
            blob,
            written_at: Utc::now(),
        }
    }
}
