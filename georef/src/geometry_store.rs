//! Node coordinates and way bounding boxes over two paged files.
//!
//! Layout (cells are optional `i32`):
//! - node table: `[lat * 1e7, lon * 1e7, inline_ref]` at `id * 3`
//! - way table: `[min_lat, min_lon, max_lat, max_lon]` (all `* 1e7`) at `id * 4`
//!
//! Two bounded caches sit in front of the files. Entries are kept in
//! insertion order and trimmed only by [`GeometryStore::purge_caches`];
//! every write goes to the file and updates a cached entry in place.

use std::path::Path;

use lru::LruCache;

use crate::bounding_box::BoundingBox;
use crate::config::GeoRefConfig;
use crate::constants::{BBOX_FIELDS, BBOX_FILE_NAME, NODE_FIELDS, NODE_FILE_NAME};
use crate::errors::{GeoRefError, GeoRefResult};
use crate::geometry::{coord_to_fixed, fixed_to_coord, NodeTuple};
use crate::paged::{narrow, PagedArray};

pub struct GeometryStore {
    nodes: PagedArray,
    bboxes: PagedArray,
    node_cache: LruCache<i64, NodeTuple>,
    bbox_cache: LruCache<i64, BoundingBox>,
    config: GeoRefConfig,
}

impl GeometryStore {
    pub fn new(nodes: PagedArray, bboxes: PagedArray, config: GeoRefConfig) -> Self {
        Self {
            nodes,
            bboxes,
            node_cache: LruCache::unbounded(),
            bbox_cache: LruCache::unbounded(),
            config,
        }
    }

    /// Opens `nodes.bin` and `ways.bin` inside `dir`.
    pub fn open(dir: impl AsRef<Path>, config: GeoRefConfig) -> GeoRefResult<Self> {
        config.validate()?;
        let dir = dir.as_ref();
        let nodes = PagedArray::open(dir.join(NODE_FILE_NAME), config.node_pages)?;
        let bboxes = PagedArray::open(dir.join(BBOX_FILE_NAME), config.bbox_pages)?;
        Ok(Self::new(nodes, bboxes, config))
    }

    /// Preallocates both files inside `dir` for the given id capacities.
    pub fn create(
        dir: impl AsRef<Path>,
        node_capacity: u64,
        way_capacity: u64,
        config: GeoRefConfig,
    ) -> GeoRefResult<Self> {
        config.validate()?;
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let node_cells = node_capacity
            .checked_mul(NODE_FIELDS)
            .ok_or_else(|| GeoRefError::InvalidConfig("node capacity too large".to_string()))?;
        let bbox_cells = way_capacity
            .checked_mul(BBOX_FIELDS)
            .ok_or_else(|| GeoRefError::InvalidConfig("way capacity too large".to_string()))?;
        let nodes = PagedArray::create(dir.join(NODE_FILE_NAME), node_cells, config.node_pages)?;
        let bboxes = PagedArray::create(dir.join(BBOX_FILE_NAME), bbox_cells, config.bbox_pages)?;
        Ok(Self::new(nodes, bboxes, config))
    }

    /// Highest node id + 1 the node table can hold
    pub fn node_capacity(&self) -> u64 {
        self.nodes.len() / NODE_FIELDS
    }

    /// Highest way id + 1 the way table can hold
    pub fn way_capacity(&self) -> u64 {
        self.bboxes.len() / BBOX_FIELDS
    }

    pub fn node_pages(&self) -> &PagedArray {
        &self.nodes
    }

    pub fn bbox_pages(&self) -> &PagedArray {
        &self.bboxes
    }

    pub fn cached_nodes(&self) -> usize {
        self.node_cache.len()
    }

    pub fn cached_bboxes(&self) -> usize {
        self.bbox_cache.len()
    }

    fn node_base(&self, node_id: i64) -> GeoRefResult<u64> {
        record_base(node_id, NODE_FIELDS, self.node_capacity())
    }

    fn bbox_base(&self, way_id: i64) -> GeoRefResult<u64> {
        record_base(way_id, BBOX_FIELDS, self.way_capacity())
    }

    pub fn get_node(&mut self, node_id: i64) -> GeoRefResult<NodeTuple> {
        if let Some(tuple) = self.node_cache.peek(&node_id) {
            return Ok(*tuple);
        }
        let base = self.node_base(node_id)?;
        let lat = self.nodes.read(base)?.map(fixed_to_coord);
        let lon = self.nodes.read(base + 1)?.map(fixed_to_coord);
        let inline_ref = self.nodes.read(base + 2)?.map(i64::from);
        let tuple = NodeTuple::new(lat, lon, inline_ref);
        if self.config.cache_enabled {
            self.node_cache.put(node_id, tuple);
        }
        Ok(tuple)
    }

    /// Stores new coordinates. Returns false, without touching the file,
    /// when the fixed-point values are already stored.
    pub fn set_node_coords(&mut self, node_id: i64, lat: f64, lon: f64) -> GeoRefResult<bool> {
        let fixed_lat = coord_to_fixed(lat)?;
        let fixed_lon = coord_to_fixed(lon)?;
        let (lat, lon) = (fixed_to_coord(fixed_lat), fixed_to_coord(fixed_lon));

        let current = self.get_node(node_id)?;
        if current.lat == Some(lat) && current.lon == Some(lon) {
            return Ok(false);
        }

        let base = self.node_base(node_id)?;
        self.nodes.write(base, Some(fixed_lat))?;
        self.nodes.write(base + 1, Some(fixed_lon))?;
        if let Some(tuple) = self.node_cache.peek_mut(&node_id) {
            tuple.lat = Some(lat);
            tuple.lon = Some(lon);
        }
        Ok(true)
    }

    /// Writes the inline back-reference slot directly.
    pub fn set_inline_ref(&mut self, node_id: i64, ref_id: Option<i64>) -> GeoRefResult<()> {
        let raw = ref_id.map(narrow).transpose()?;
        let base = self.node_base(node_id)?;
        self.nodes.write(base + 2, raw)?;
        if let Some(tuple) = self.node_cache.peek_mut(&node_id) {
            tuple.inline_ref = ref_id;
        }
        Ok(())
    }

    /// The stored bbox of a way, if all four fields have been written.
    pub fn get_bbox(&mut self, way_id: i64) -> GeoRefResult<Option<BoundingBox>> {
        if let Some(bbox) = self.bbox_cache.peek(&way_id) {
            return Ok(Some(*bbox));
        }
        let base = self.bbox_base(way_id)?;
        let mut fields = [None; 4];
        for (offset, field) in (0u64..).zip(fields.iter_mut()) {
            *field = self.bboxes.read(base + offset)?;
        }
        let bbox = match fields {
            [Some(a), Some(b), Some(c), Some(d)] => {
                BoundingBox::from([a, b, c, d].map(fixed_to_coord))
            }
            _ => return Ok(None),
        };
        if self.config.cache_enabled {
            self.bbox_cache.put(way_id, bbox);
        }
        Ok(Some(bbox))
    }

    /// Stores a bbox. `None` leaves whatever is stored untouched.
    pub fn set_bbox(&mut self, way_id: i64, bbox: Option<&BoundingBox>) -> GeoRefResult<()> {
        let Some(bbox) = bbox else {
            return Ok(());
        };
        let base = self.bbox_base(way_id)?;
        let mut fixed = [0i32; 4];
        for (slot, coord) in fixed.iter_mut().zip(bbox.to_array()) {
            *slot = coord_to_fixed(coord)?;
        }
        for (offset, value) in (0u64..).zip(fixed) {
            self.bboxes.write(base + offset, Some(value))?;
        }

        let stored = BoundingBox::from(fixed.map(fixed_to_coord));
        log::trace!("Stored {} for way {}", stored, way_id);
        if let Some(cached) = self.bbox_cache.peek_mut(&way_id) {
            *cached = stored;
        } else if self.config.cache_enabled {
            self.bbox_cache.put(way_id, stored);
        }
        Ok(())
    }

    /// Drops the oldest cache entries until both caches are within their
    /// capacities. Returns how many node and bbox entries were dropped.
    pub fn purge_caches(&mut self) -> (usize, usize) {
        let nodes = trim(&mut self.node_cache, self.config.node_cache_capacity);
        let bboxes = trim(&mut self.bbox_cache, self.config.bbox_cache_capacity);
        if nodes + bboxes > 0 {
            log::debug!("Purged {} node and {} bbox cache entries", nodes, bboxes);
        }
        (nodes, bboxes)
    }

    pub fn flush(&mut self) -> GeoRefResult<()> {
        self.nodes.flush(None)?;
        self.bboxes.flush(None)
    }

    pub fn close(&mut self) -> GeoRefResult<()> {
        self.node_cache.clear();
        self.bbox_cache.clear();
        self.nodes.close()?;
        self.bboxes.close()
    }
}

fn record_base(id: i64, fields: u64, capacity: u64) -> GeoRefResult<u64> {
    match u64::try_from(id) {
        Ok(index) if index < capacity => Ok(index * fields),
        _ => Err(GeoRefError::out_of_range(id, capacity)),
    }
}

fn trim<V>(cache: &mut LruCache<i64, V>, capacity: usize) -> usize {
    let mut dropped = 0;
    while cache.len() > capacity {
        if cache.pop_lru().is_none() {
            break;
        }
        dropped += 1;
    }
    dropped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PageConfig;
    use tempfile::{tempdir, TempDir};

    fn small_config() -> GeoRefConfig {
        GeoRefConfig::default().with_pages(PageConfig::default().with_page_cells(4096))
    }

    fn create_store(config: GeoRefConfig) -> (TempDir, GeometryStore) {
        let dir = tempdir().unwrap();
        let store = GeometryStore::create(dir.path(), 10, 10, config).unwrap();
        (dir, store)
    }

    #[test]
    fn test_create_sizes_files() {
        let (dir, store) = create_store(small_config());
        assert_eq!(store.node_capacity(), 10);
        assert_eq!(store.way_capacity(), 10);
        assert_eq!(std::fs::metadata(dir.path().join("nodes.bin")).unwrap().len(), 120);
        assert_eq!(std::fs::metadata(dir.path().join("ways.bin")).unwrap().len(), 160);
    }

    #[test]
    fn test_unset_node_is_absent() {
        let (_dir, mut store) = create_store(small_config());
        assert_eq!(store.get_node(4).unwrap(), NodeTuple::default());
    }

    #[test]
    fn test_node_coords_round_trip() {
        let (_dir, mut store) = create_store(small_config());
        assert!(store.set_node_coords(3, 12.345, -6.789).unwrap());
        let tuple = store.get_node(3).unwrap();
        assert!((tuple.lat.unwrap() - 12.345).abs() <= 1e-7);
        assert!((tuple.lon.unwrap() + 6.789).abs() <= 1e-7);
        assert_eq!(tuple.inline_ref, None);
    }

    #[test]
    fn test_zero_coords_are_not_absent() {
        let (_dir, mut store) = create_store(small_config().with_cache_enabled(false));
        store.set_node_coords(0, 0.0, 0.0).unwrap();
        assert_eq!(store.get_node(0).unwrap().coords(), Some((0.0, 0.0)));
    }

    #[test]
    fn test_unchanged_coords_are_not_rewritten() {
        let (_dir, mut store) = create_store(small_config());
        assert!(store.set_node_coords(1, 1.5, 2.5).unwrap());
        assert!(!store.set_node_coords(1, 1.5, 2.5).unwrap());
        assert!(!store.set_node_coords(1, 1.500000001, 2.5).unwrap());
        assert!(store.set_node_coords(1, 1.6, 2.5).unwrap());
    }

    #[test]
    fn test_cache_tracks_writes() {
        let (_dir, mut store) = create_store(small_config());
        store.get_node(2).unwrap();
        assert_eq!(store.cached_nodes(), 1);
        store.set_node_coords(2, 3.0, 4.0).unwrap();
        store.set_inline_ref(2, Some(-8)).unwrap();
        assert_eq!(
            store.get_node(2).unwrap(),
            NodeTuple::new(Some(3.0), Some(4.0), Some(-8))
        );
        assert_eq!(store.cached_nodes(), 1);
    }

    #[test]
    fn test_cache_disabled_reads_file() {
        let (_dir, mut store) = create_store(small_config().with_cache_enabled(false));
        store.set_node_coords(2, 3.0, 4.0).unwrap();
        store.set_inline_ref(2, Some(5)).unwrap();
        store
            .set_bbox(1, Some(&BoundingBox::new(1.0, 1.0, 2.0, 2.0)))
            .unwrap();
        assert_eq!(store.cached_nodes(), 0);
        assert_eq!(store.cached_bboxes(), 0);
        assert_eq!(store.get_node(2).unwrap().inline_ref, Some(5));
        assert!(store.get_bbox(1).unwrap().is_some());
    }

    #[test]
    fn test_inline_ref_overflow_rejected() {
        let (_dir, mut store) = create_store(small_config());
        let result = store.set_inline_ref(1, Some(i64::from(i32::MAX) + 1));
        assert!(matches!(result, Err(GeoRefError::EncodingOverflow { .. })));
        assert_eq!(store.get_node(1).unwrap().inline_ref, None);
    }

    #[test]
    fn test_out_of_range_ids() {
        let (_dir, mut store) = create_store(small_config());
        assert!(matches!(
            store.get_node(10),
            Err(GeoRefError::OutOfRange { index: 10, len: 10 })
        ));
        assert!(matches!(
            store.get_node(-1),
            Err(GeoRefError::OutOfRange { index: -1, .. })
        ));
        assert!(store.get_bbox(10).is_err());
        assert!(store.set_node_coords(11, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_bbox_round_trip_and_none_is_noop() {
        let (_dir, mut store) = create_store(small_config());
        assert_eq!(store.get_bbox(7).unwrap(), None);
        let bbox = BoundingBox::new(-1.0, -2.0, 3.0, 4.0);
        store.set_bbox(7, Some(&bbox)).unwrap();
        store.set_bbox(7, None).unwrap();
        assert_eq!(store.get_bbox(7).unwrap(), Some(bbox));
    }

    #[test]
    fn test_bbox_with_missing_field_is_undefined() {
        let (dir, mut store) = create_store(small_config());
        store
            .set_bbox(2, Some(&BoundingBox::new(1.0, 1.0, 2.0, 2.0)))
            .unwrap();
        store.close().unwrap();

        let mut raw = PagedArray::open(dir.path().join("ways.bin"), small_config().bbox_pages).unwrap();
        raw.write(2 * 4 + 3, None).unwrap();
        raw.close().unwrap();

        let mut store = GeometryStore::open(dir.path(), small_config()).unwrap();
        assert_eq!(store.get_bbox(2).unwrap(), None);
    }

    #[test]
    fn test_purge_keeps_newest_entries() {
        let config = small_config()
            .with_node_cache_capacity(3)
            .with_bbox_cache_capacity(1);
        let (_dir, mut store) = create_store(config);
        for id in 0..6 {
            store.get_node(id).unwrap();
        }
        store
            .set_bbox(1, Some(&BoundingBox::from_point(1.0, 1.0)))
            .unwrap();
        store
            .set_bbox(2, Some(&BoundingBox::from_point(2.0, 2.0)))
            .unwrap();

        assert_eq!(store.purge_caches(), (3, 1));
        assert_eq!(store.cached_nodes(), 3);
        assert_eq!(store.cached_bboxes(), 1);
        assert_eq!(store.purge_caches(), (0, 0));
        assert_eq!(
            store.get_bbox(1).unwrap(),
            Some(BoundingBox::from_point(1.0, 1.0))
        );
    }

    #[test]
    fn test_values_survive_reopen() {
        let (dir, mut store) = create_store(small_config());
        store.set_node_coords(9, -45.0, 170.0).unwrap();
        store.set_inline_ref(9, Some(3)).unwrap();
        store
            .set_bbox(9, Some(&BoundingBox::new(0.0, 0.0, 1.0, 1.0)))
            .unwrap();
        store.flush().unwrap();
        store.close().unwrap();

        let mut store = GeometryStore::open(dir.path(), small_config()).unwrap();
        assert_eq!(
            store.get_node(9).unwrap(),
            NodeTuple::new(Some(-45.0), Some(170.0), Some(3))
        );
        assert_eq!(
            store.get_bbox(9).unwrap(),
            Some(BoundingBox::new(0.0, 0.0, 1.0, 1.0))
        );
    }
}
