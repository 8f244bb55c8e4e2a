//! Paged memory-mapped storage of optional 32-bit cells.
//!
//! This module turns a huge preallocated flat file into a randomly
//! addressable array:
//! - Fixed-size pages mapped lazily on first touch
//! - A cap on simultaneously mapped pages with history-based eviction
//! - Sentinel encoding that tells "never written" apart from zero
//!
//! File format: little-endian `i32` cells, no header, zero-filled at creation.

pub mod array;
pub mod codec;
pub mod history;

pub use array::{PageId, PagedArray, PagedArrayStats};
pub use codec::{decode_cell, encode_cell, narrow};
pub use history::AccessHistory;
