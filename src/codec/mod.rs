// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Compact binary encoding of activity telemetry.
//!
//! - [`rle`]: differential run-length codec for integer/float channels
//! - [`path`]: fixed-precision polyline for the geographic path
//! - [`blob`]: the combined per-activity blob stored in the cache tiers
//!
//! Everything here is pure and synchronous.

pub mod blob;
pub mod path;
pub mod rle;

pub use blob::{compress, decompress};

/// Errors from encoding or decoding telemetry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("Encoded data truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error("Unknown sign mode {0}")]
    InvalidSignMode(u8),

    #[error("Malformed run token at byte {offset}")]
    InvalidRunToken { offset: usize },

    #[error("Value {value} at index {index} does not fit the encoding width")]
    OutOfRange { index: usize, value: i64 },

    #[error("Sample at index {index} has no integer value")]
    Unrepresentable { index: usize },

    #[error("Invalid streams record: {0}")]
    InvalidStreams(String),

    #[error("Path encoding error: {0}")]
    Path(String),

    #[error("Blob framing error: {0}")]
    Blob(String),
}
