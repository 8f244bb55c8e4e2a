//! Fixed-point coordinates and node records.

use crate::constants::COORD_MULTIPLIER;
use crate::errors::{GeoRefError, GeoRefResult};
use crate::paged::narrow;

/// Converts degrees to the stored fixed-point integer (`round(deg * 1e7)`).
pub fn coord_to_fixed(coord: f64) -> GeoRefResult<i32> {
    let scaled = (coord * COORD_MULTIPLIER).round();
    if !scaled.is_finite() || scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
        return Err(GeoRefError::EncodingOverflow {
            value: scaled as i128,
        });
    }
    narrow(scaled as i64)
}

/// Converts a stored fixed-point integer back to degrees.
#[inline]
pub fn fixed_to_coord(value: i32) -> f64 {
    f64::from(value) / COORD_MULTIPLIER
}

/// What the node table holds for one node id.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NodeTuple {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    /// First way (positive) or relation (negative) referencing the node
    pub inline_ref: Option<i64>,
}

impl NodeTuple {
    pub fn new(lat: Option<f64>, lon: Option<f64>, inline_ref: Option<i64>) -> Self {
        Self {
            lat,
            lon,
            inline_ref,
        }
    }

    /// Both coordinates, if the node has been located
    #[inline]
    pub fn coords(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}
