//! Cell encoding for optional 32-bit values.
//!
//! A raw zero means the cell was never written. The logical value zero is
//! stored as [`ZERO_SENTINEL`], which in turn can never be stored as itself.

use crate::constants::ZERO_SENTINEL;
use crate::errors::{GeoRefError, GeoRefResult};

/// Encodes a logical cell value into its little-endian on-disk form.
#[inline]
pub fn encode_cell(value: Option<i32>) -> GeoRefResult<[u8; 4]> {
    let raw = match value {
        None => 0,
        Some(0) => ZERO_SENTINEL,
        Some(ZERO_SENTINEL) => return Err(GeoRefError::overflow(ZERO_SENTINEL)),
        Some(v) => v,
    };
    Ok(raw.to_le_bytes())
}

/// Decodes the on-disk form of a cell.
#[inline]
pub fn decode_cell(bytes: [u8; 4]) -> Option<i32> {
    match i32::from_le_bytes(bytes) {
        0 => None,
        ZERO_SENTINEL => Some(0),
        v => Some(v),
    }
}

/// Narrows a 64-bit id or fixed-point value to a storable cell value.
#[inline]
pub fn narrow(value: i64) -> GeoRefResult<i32> {
    match i32::try_from(value) {
        Ok(ZERO_SENTINEL) | Err(_) => Err(GeoRefError::overflow(value)),
        Ok(v) => Ok(v),
    }
}
