//! Constants for the paged index files and caches.

/// Raw cell value that stands for the logical value zero (raw zero means "absent").
pub const ZERO_SENTINEL: i32 = 0x7FFF_FFFE;

/// Width of a storage cell in bytes
pub const CELL_SIZE: u64 = 4;

/// Default page size in cells (256 MiB of file per page)
pub const DEFAULT_PAGE_CELLS: u64 = 64 * 1024 * 1024;

/// Page sizes must be a multiple of this many cells (16 KiB) so page offsets stay mmap-aligned
pub const PAGE_CELL_ALIGNMENT: u64 = 4096;

/// Default number of simultaneously mapped pages per file
pub const DEFAULT_MAPPED_PAGES: usize = 2;

/// Default length of the page access history used for eviction
pub const DEFAULT_HISTORY_LEN: usize = 1000;

/// Fixed-point multiplier between degrees and stored integers
pub const COORD_MULTIPLIER: f64 = 1e7;

/// Cells per node record: lat, lon, inline reference
pub const NODE_FIELDS: u64 = 3;

/// Cells per way bbox record: min lat, min lon, max lat, max lon
pub const BBOX_FIELDS: u64 = 4;

/// Default node tuple cache capacity
pub const NODE_CACHE_MAX_SIZE: usize = 100_000;

/// Default way bbox cache capacity
pub const BBOX_CACHE_MAX_SIZE: usize = 10_000;

/// Node table file name inside the storage directory
pub const NODE_FILE_NAME: &str = "nodes.bin";

/// Way bbox table file name inside the storage directory
pub const BBOX_FILE_NAME: &str = "ways.bin";

/// Replication sequences below this value are considered stale
pub const MIN_REPLICATION_SEQUENCE: u64 = 1_800_000;
