// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Differential run-length codec for numeric sample channels.
//!
//! Layout:
//!
//! ```text
//! [mode: u8][first: i16 LE][body ...]
//! ```
//!
//! `mode` is `1` when every first difference is non-negative (unsigned body,
//! sentinel `255`) and `0` otherwise (signed body, sentinel `-128`). The body
//! is a sequence of one-byte literal differences and three-byte run tokens
//! `[sentinel, delta, count]`, where `count` is the number of times `delta`
//! repeats.
//!
//! Floating inputs are rounded half-up before encoding, so
//! `decode(encode(x)) == round(x)`.

use super::CodecError;

const HEADER_LEN: usize = 3;

/// Sentinel opening a run token in unsigned mode.
pub const UNSIGNED_SENTINEL: u8 = 255;
/// Sentinel opening a run token in signed mode.
pub const SIGNED_SENTINEL: i8 = -128;
/// Longest run a single unsigned token may carry.
pub const UNSIGNED_RUN_CAP: usize = 254;
/// Longest run a single signed token may carry.
pub const SIGNED_RUN_CAP: usize = 126;

/// A token costs three bytes, so only runs longer than that are folded.
const MIN_ENCODED_RUN: usize = 4;
/// Shortest run a decoder accepts.
const MIN_DECODED_RUN: u8 = 3;

/// Body interpretation selected by the header's first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignMode {
    Signed = 0,
    Unsigned = 1,
}

impl SignMode {
    fn from_byte(b: u8) -> Result<Self, CodecError> {
        match b {
            0 => Ok(SignMode::Signed),
            1 => Ok(SignMode::Unsigned),
            other => Err(CodecError::InvalidSignMode(other)),
        }
    }

    fn sentinel(self) -> u8 {
        match self {
            SignMode::Signed => SIGNED_SENTINEL as u8,
            SignMode::Unsigned => UNSIGNED_SENTINEL,
        }
    }

    fn run_cap(self) -> usize {
        match self {
            SignMode::Signed => SIGNED_RUN_CAP,
            SignMode::Unsigned => UNSIGNED_RUN_CAP,
        }
    }

    /// Byte for a literal difference. The sentinel value is never a literal.
    fn literal(self, index: usize, delta: i64) -> Result<u8, CodecError> {
        let fits = match self {
            SignMode::Signed => (-127..=127).contains(&delta),
            SignMode::Unsigned => (0..=254).contains(&delta),
        };
        if !fits {
            return Err(CodecError::OutOfRange {
                index,
                value: delta,
            });
        }
        Ok(match self {
            SignMode::Signed => (delta as i8) as u8,
            SignMode::Unsigned => delta as u8,
        })
    }

    fn delta(self, byte: u8) -> i64 {
        match self {
            SignMode::Signed => i64::from(byte as i8),
            SignMode::Unsigned => i64::from(byte),
        }
    }
}

/// A value that can be fed to the encoder.
pub trait Sample: Copy {
    /// Integer sample, or `None` when the value has no integer rendering.
    fn to_sample(self) -> Option<i64>;
}

macro_rules! int_sample {
    ($($t:ty),*) => {
        $(impl Sample for $t {
            fn to_sample(self) -> Option<i64> {
                Some(i64::from(self))
            }
        })*
    };
}

int_sample!(i8, i16, i32, i64, u8, u16, u32);

impl Sample for f64 {
    /// Round half-up: `2.5 -> 3`, `-2.5 -> -2`. NaN and infinities have no
    /// sample, and neither does anything past the `i64` range.
    fn to_sample(self) -> Option<i64> {
        let rounded = (self + 0.5).floor();
        if !rounded.is_finite() || rounded < i64::MIN as f64 || rounded >= i64::MAX as f64 {
            return None;
        }
        Some(rounded as i64)
    }
}

impl Sample for f32 {
    fn to_sample(self) -> Option<i64> {
        f64::from(self).to_sample()
    }
}

/// Encode a sample sequence.
///
/// The first sample must fit in 16 bits and every first difference must fit
/// the byte width of the selected mode; anything else is `OutOfRange`.
/// Floats that are NaN, infinite or past the `i64` range are
/// `Unrepresentable`.
pub fn encode<T: Sample>(values: &[T]) -> Result<Vec<u8>, CodecError> {
    if values.is_empty() {
        return Ok(Vec::new());
    }

    let samples = values
        .iter()
        .enumerate()
        .map(|(index, v)| v.to_sample().ok_or(CodecError::Unrepresentable { index }))
        .collect::<Result<Vec<i64>, _>>()?;

    let first = i16::try_from(samples[0]).map_err(|_| CodecError::OutOfRange {
        index: 0,
        value: samples[0],
    })?;

    let diffs = samples
        .windows(2)
        .enumerate()
        .map(|(i, w)| {
            w[1].checked_sub(w[0]).ok_or(CodecError::OutOfRange {
                index: i + 1,
                value: w[1],
            })
        })
        .collect::<Result<Vec<i64>, _>>()?;

    let mode = if diffs.iter().all(|d| *d >= 0) {
        SignMode::Unsigned
    } else {
        SignMode::Signed
    };

    let mut out = Vec::with_capacity(HEADER_LEN + diffs.len());
    out.push(mode as u8);
    out.extend_from_slice(&first.to_le_bytes());

    let mut i = 0;
    while i < diffs.len() {
        let delta = diffs[i];
        let byte = mode.literal(i + 1, delta)?;

        let mut run = 1;
        while i + run < diffs.len() && diffs[i + run] == delta {
            run += 1;
        }
        i += run;

        let mut remaining = run;
        while remaining >= MIN_ENCODED_RUN {
            let count = remaining.min(mode.run_cap());
            out.extend_from_slice(&[mode.sentinel(), byte, count as u8]);
            remaining -= count;
        }
        out.extend(std::iter::repeat(byte).take(remaining));
    }

    Ok(out)
}

/// Decode bytes produced by [`encode`].
///
/// Truncated headers, unknown modes and malformed run tokens are rejected
/// rather than partially decoded.
pub fn decode(bytes: &[u8]) -> Result<Vec<i64>, CodecError> {
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated { offset: 0 });
    }

    let mode = SignMode::from_byte(bytes[0])?;
    let mut acc = i64::from(i16::from_le_bytes([bytes[1], bytes[2]]));

    let mut out = Vec::with_capacity(bytes.len());
    out.push(acc);

    let mut i = HEADER_LEN;
    while i < bytes.len() {
        let b = bytes[i];
        if b != mode.sentinel() {
            acc += mode.delta(b);
            out.push(acc);
            i += 1;
            continue;
        }

        if i + 2 >= bytes.len() {
            return Err(CodecError::Truncated { offset: i });
        }
        let value = bytes[i + 1];
        let count = bytes[i + 2];
        if value == mode.sentinel()
            || count < MIN_DECODED_RUN
            || usize::from(count) > mode.run_cap()
        {
            return Err(CodecError::InvalidRunToken { offset: i });
        }

        let delta = mode.delta(value);
        for _ in 0..count {
            acc += delta;
            out.push(acc);
        }
        i += 3;
    }

    Ok(out)
}

/// Number of run tokens in an encoded body. Used by tests and diagnostics.
pub fn run_token_count(bytes: &[u8]) -> usize {
    if bytes.len() < HEADER_LEN {
        return 0;
    }
    let Ok(mode) = SignMode::from_byte(bytes[0]) else {
        return 0;
    };

    let mut count = 0;
    let mut i = HEADER_LEN;
    while i < bytes.len() {
        if bytes[i] == mode.sentinel() {
            count += 1;
            i += 3;
        } else {
            i += 1;
        }
    }
    count
}
