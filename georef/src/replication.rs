//! Persisted replication cursor.
//!
//! The enrichment pipeline consumes two numbered replication streams (raw
//! changes and changeset metadata). The last sequence of each that has been
//! fully applied is saved through the auxiliary store at every checkpoint.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::MIN_REPLICATION_SEQUENCE;
use crate::errors::{GeoRefError, GeoRefResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReplicationState {
    /// Last applied changeset replication sequence
    pub changeset: u64,
    /// Last applied minutely data replication sequence
    pub replication: u64,
}

impl ReplicationState {
    pub fn new(changeset: u64, replication: u64) -> Self {
        Self {
            changeset,
            replication,
        }
    }

    /// Rejects sequences too old to be served by the replication mirrors.
    pub fn validate(&self) -> GeoRefResult<()> {
        if self.changeset < MIN_REPLICATION_SEQUENCE || self.replication < MIN_REPLICATION_SEQUENCE
        {
            return Err(GeoRefError::InvalidConfig(format!(
                "too old replication values: {} {}",
                self.changeset, self.replication
            )));
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> GeoRefResult<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::legacy())
            .map_err(|e| GeoRefError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> GeoRefResult<Self> {
        bincode::serde::decode_from_slice(bytes, bincode::config::legacy())
            .map(|(state, _)| state)
            .map_err(|e| GeoRefError::Serialization(e.to_string()))
    }
}

fn sequence_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"replication.*/(\d{3})/(\d{3})/(\d{3})\.").expect("valid sequence pattern")
    })
}

/// Parses a sequence number given either as digits or as a replication
/// file URL such as `.../replication/minute/002/345/678.osc.gz`.
pub fn parse_sequence(text: &str) -> Option<u64> {
    let text = text.trim();
    if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse().ok();
    }
    let captures = sequence_url_pattern().captures(text)?;
    format!("{}{}{}", &captures[1], &captures[2], &captures[3])
        .parse()
        .ok()
}

/// Relative path of a replication file: `AAA/BBB/CCC`.
pub fn sequence_path(sequence: u64) -> String {
    format!(
        "{:03}/{:03}/{:03}",
        sequence / 1_000_000,
        (sequence / 1000) % 1000,
        sequence % 1000
    )
}
