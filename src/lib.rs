// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Trackcache: tiered cache for per-activity fitness telemetry.
//!
//! Telemetry fetched from Strava is compressed with a differential
//! run-length codec and served through a hot (Valkey) / warm (Firestore) /
//! cold (Strava) cache, alongside a queryable index of activity summaries.

pub mod cache;
pub mod codec;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod index;
pub mod models;
pub mod routes;
pub mod streams;
pub mod strava;
pub mod time_utils;

pub use context::Context;
