//! Typed relation members and the comma-separated text stored for
//! member lists and back-reference lists.

use std::fmt;
use std::str::FromStr;

use crate::errors::{GeoRefError, GeoRefResult};

/// One member of a relation.
///
/// Serialized as a type tag followed by the id: `n123`, `w45`, `r9`.
/// Relation ids are kept positive here; their back-reference key is the
/// negated id, so `r-9` parses to the same member as `r9`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Member {
    Node(i64),
    Way(i64),
    Relation(i64),
}

impl Member {
    /// Normalizes the sign of relation ids.
    pub fn relation(id: i64) -> Member {
        Member::Relation(id.abs())
    }

    pub fn tag(&self) -> char {
        match self {
            Member::Node(_) => 'n',
            Member::Way(_) => 'w',
            Member::Relation(_) => 'r',
        }
    }

    /// The id under which this member's back-references are kept: the node
    /// id, the way id, or the negated relation id.
    pub fn ref_key(&self) -> i64 {
        match *self {
            Member::Node(id) | Member::Way(id) => id,
            Member::Relation(id) => -id.abs(),
        }
    }

    pub(crate) fn normalized(self) -> Member {
        match self {
            Member::Relation(id) => Member::relation(id),
            other => other,
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Member::Node(id) | Member::Way(id) => write!(f, "{}{}", self.tag(), id),
            Member::Relation(id) => write!(f, "r{}", id.abs()),
        }
    }
}

impl FromStr for Member {
    type Err = GeoRefError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let token = token.trim();
        let mut chars = token.chars();
        let tag = chars
            .next()
            .ok_or_else(|| GeoRefError::InvalidMember("empty token".to_string()))?;
        let id: i64 = chars
            .as_str()
            .parse()
            .map_err(|_| GeoRefError::InvalidMember(token.to_string()))?;
        match tag.to_ascii_lowercase() {
            'n' => Ok(Member::Node(id)),
            'w' => Ok(Member::Way(id)),
            'r' => Ok(Member::relation(id)),
            _ => Err(GeoRefError::InvalidMember(token.to_string())),
        }
    }
}

/// Joins members as `n1,w2,r3`.
pub fn encode_members(members: &[Member]) -> String {
    members
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn decode_members(text: &str) -> GeoRefResult<Vec<Member>> {
    split_comma(text).map(str::parse).collect()
}

/// Joins ids as `1,-2,3`.
pub fn encode_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn decode_ids(text: &str) -> GeoRefResult<Vec<i64>> {
    split_comma(text)
        .map(|part| {
            part.trim()
                .parse::<i64>()
                .map_err(|_| GeoRefError::Serialization(format!("bad id {:?} in {:?}", part, text)))
        })
        .collect()
}

fn split_comma(text: &str) -> impl Iterator<Item = &str> {
    text.split(',').filter(|part| !part.trim().is_empty())
}
