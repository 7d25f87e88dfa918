// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Combined streams blob: time, altitude and path channels of one activity.

use serde::{Deserialize, Serialize};

use super::{path, rle, CodecError};
use crate::models::{DecodedStreams, RawStreams};

/// Leading format byte of every blob.
pub const BLOB_VERSION: u8 = 1;

/// Fewest samples a streams record must carry to be stored.
pub const MIN_STREAM_POINTS: usize = 3;

#[derive(Serialize, Deserialize)]
struct BlobFrame {
    t: Vec<u8>,
    a: Vec<u8>,
    p: String,
}

/// Check that a raw record has all three channels with matching lengths.
pub fn validate(raw: &RawStreams) -> Result<(), CodecError> {
    let n = raw.time.len();
    if n < MIN_STREAM_POINTS {
        return Err(CodecError::InvalidStreams(format!(
            "{} time samples, need at least {}",
            n, MIN_STREAM_POINTS
        )));
    }
    if raw.altitude.len() != n || raw.latlng.len() != n {
        return Err(CodecError::InvalidStreams(format!(
            "channel lengths differ: time={} altitude={} latlng={}",
            n,
            raw.altitude.len(),
            raw.latlng.len()
        )));
    }
    Ok(())
}

/// Validate and compress a raw streams record into a blob.
pub fn compress(raw: &RawStreams) -> Result<Vec<u8>, CodecError> {
    validate(raw)?;

    let frame = BlobFrame {
        t: rle::encode(&raw.time)?,
        a: rle::encode(&raw.altitude)?,
        p: path::encode_path(&raw.latlng)?,
    };

    let body = bincode::serialize(&frame).map_err(|e| CodecError::Blob(e.to_string()))?;
    let mut out = Vec::with_capacity(body.len() + 1);
    out.push(BLOB_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a blob produced by [`compress`].
pub fn decompress(blob: &[u8]) -> Result<DecodedStreams, CodecError> {
    let (version, body) = blob
        .split_first()
        .ok_or(CodecError::Truncated { offset: 0 })?;
    if *version != BLOB_VERSION {
        return Err(CodecError::Blob(format!("unknown blob version {}", version)));
    }

    let frame: BlobFrame =
        bincode::deserialize(body).map_err(|e| CodecError::Blob(e.to_string()))?;

    Ok(DecodedStreams {
        time: rle::decode(&frame.t)?,
        altitude: rle::decode(&frame.a)?,
        latlng: path::decode_path(&frame.p)?,
    })
}
