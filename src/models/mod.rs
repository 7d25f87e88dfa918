// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod import;
pub mod streams;

pub use activity::{
    ActivitySummary, ActivityUpdates, BoundingBox, IndexAccess, LatLng, Visibility,
};
pub use import::{ImportProgress, ImportStats, TriageStats};
pub use streams::{DecodedStreams, RawStreams, StreamsDocument};
