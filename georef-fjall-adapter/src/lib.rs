//! Fjall-backed [`georef::AuxStore`].
//!
//! Holds the overflow back-references, member lists and replication cursor
//! of a [`georef::ReferenceIndex`] in an LSM-tree keyspace, one partition
//! per table.

mod builder;
mod config;
mod errors;
mod store;

pub use builder::*;
pub use config::*;
pub use store::*;
