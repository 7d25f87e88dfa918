// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Path channel encoding.
//!
//! Consecutive deltas of a 2-D track rarely repeat, so the path is stored as
//! a Google polyline at a fixed decimal precision instead of run-length
//! encoded. The encoding is lossy to `PATH_PRECISION` decimals.

use geo::{BoundingRect, Coord, LineString};

use super::CodecError;
use crate::models::{BoundingBox, LatLng};

/// Decimal digits kept for each coordinate (Strava polyline precision).
pub const PATH_PRECISION: u32 = 5;

/// Encode a lat/lng path as a polyline string.
pub fn encode_path(points: &[LatLng]) -> Result<String, CodecError> {
    let coords = points.iter().map(|p| Coord { x: p.lng, y: p.lat });
    polyline::encode_coordinates(coords, PATH_PRECISION)
        .map_err(|e| CodecError::Path(e.to_string()))
}

/// Decode a polyline string back into lat/lng points.
pub fn decode_path(encoded: &str) -> Result<Vec<LatLng>, CodecError> {
    let line = decode_line(encoded)?;
    Ok(line
        .coords()
        .map(|c| LatLng { lat: c.y, lng: c.x })
        .collect())
}

/// Bounding box of an encoded polyline, `None` for an empty path.
pub fn polyline_bounds(encoded: &str) -> Result<Option<BoundingBox>, CodecError> {
    let line = decode_line(encoded)?;
    Ok(line.bounding_rect().map(|rect| BoundingBox {
        sw: LatLng {
            lat: rect.min().y,
            lng: rect.min().x,
        },
        ne: LatLng {
            lat: rect.max().y,
            lng: rect.max().x,
        },
    }))
}

fn decode_line(encoded: &str) -> Result<LineString<f64>, CodecError> {
    polyline::decode_polyline(encoded, PATH_PRECISION)
        .map_err(|e| CodecError::Path(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_polyline() {
        // Reference example from the polyline format documentation
        let points = vec![
            LatLng { lat: 38.5, lng: -120.2 },
            LatLng { lat: 40.7, lng: -120.95 },
            LatLng { lat: 43.252, lng: -126.453 },
        ];
        let encoded = encode_path(&points).unwrap();
        assert_eq!(encoded, "_p~iF~ps|U_ulLnnqC_mqNvxq`@");
    }

    #[test]
    fn test_path_is_lossy_to_precision() {
        let points = vec![
            LatLng { lat: 37.123456789, lng: -122.987654321 },
            LatLng { lat: 37.2, lng: -122.9 },
        ];
        let decoded = decode_path(&encode_path(&points).unwrap()).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!((decoded[0].lat - 37.12346).abs() < 1e-9);
        assert!((decoded[0].lng + 122.98765).abs() < 1e-9);
    }

    #[test]
    fn test_polyline_bounds() {
        let points = vec![
            LatLng { lat: 1.0, lng: 5.0 },
            LatLng { lat: 3.0, lng: 2.0 },
            LatLng { lat: 2.0, lng: 4.0 },
        ];
        let bounds = polyline_bounds(&encode_path(&points).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(bounds.sw, LatLng { lat: 1.0, lng: 2.0 });
        assert_eq!(bounds.ne, LatLng { lat: 3.0, lng: 5.0 });

        assert!(polyline_bounds("").unwrap().is_none());
    }
}
