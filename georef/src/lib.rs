//! # GeoRef - Geometry and Back-Reference Index for OSM Updates
//!
//! This crate keeps the state needed to enrich an incremental OpenStreetMap
//! change stream with geometry: node coordinates, way bounding boxes, way and
//! relation member lists, and the reverse links from members to the ways and
//! relations that use them.
//!
//! ## Features
//!
//! - **Paged mmap Storage**: Huge preallocated files addressed as flat arrays
//!   of optional 32-bit cells, with a cap on mapped pages
//! - **Fixed-Point Coordinates**: Degrees stored as `round(deg * 1e7)`
//! - **Back-References**: Inline slot for the common single-reference case,
//!   overflow rows in an auxiliary key-value store for the rest
//! - **Bounding Boxes**: Re-derived whenever a way or one of its nodes changes
//! - **Pluggable Auxiliary Store**: In-memory for tests, fjall on disk via
//!   `georef-fjall-adapter`
//! - **Replication Cursor**: Changeset and replication sequence saved at
//!   every checkpoint
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use georef::{GeoRefConfig, InMemoryAuxStore, Member, ReferenceIndex, ReplicationState};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut index = ReferenceIndex::create(
//!     "/var/lib/georef",
//!     1_000_000,
//!     100_000,
//!     InMemoryAuxStore::new(),
//!     GeoRefConfig::default(),
//! )?;
//!
//! index.store_node_coords(1, 52.52, 13.40)?;
//! index.store_node_coords(2, 52.53, 13.41)?;
//! index.update_way_nodes(10, &[1, 2])?;
//! index.update_relation_members(-5, &[Member::Way(10), Member::Node(1)])?;
//!
//! let bbox = index.fetch_way_bbox(10)?;
//! println!("{:?}", bbox);
//!
//! index.checkpoint(&ReplicationState::new(2_000_000, 4_100_000))?;
//! # Ok(())
//! # }
//! ```

// Storage layers
pub mod aux_store;
pub mod geometry_store;
pub mod paged;

// Index
pub mod reference_index;

// Data types
pub mod bounding_box;
pub mod geometry;
pub mod member;
pub mod replication;

// Support
pub mod config;
pub mod constants;
pub mod errors;

pub use aux_store::{AuxStore, AuxTable, InMemoryAuxStore};
pub use bounding_box::BoundingBox;
pub use config::{GeoRefConfig, PageConfig};
pub use errors::{GeoRefError, GeoRefResult};
pub use geometry::{coord_to_fixed, fixed_to_coord, NodeTuple};
pub use geometry_store::GeometryStore;
pub use member::{decode_ids, decode_members, encode_ids, encode_members, Member};
pub use paged::{PagedArray, PagedArrayStats};
pub use reference_index::ReferenceIndex;
pub use replication::{parse_sequence, sequence_path, ReplicationState};
