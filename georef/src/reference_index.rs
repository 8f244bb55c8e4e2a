//! Back-reference bookkeeping and bbox maintenance on top of the
//! [`GeometryStore`] and an [`AuxStore`].
//!
//! A node's referencing ways/relations move through three states:
//! none, one (held in the node record's inline slot), and many (inline slot
//! plus an overflow row in the auxiliary store). Removal walks back the same
//! way and deletes the overflow row once it is empty. Ways and relations
//! referenced by relations keep all their back-references in the auxiliary
//! store. Relation ids are negated wherever they share an id space with ways.

use std::collections::BTreeSet;
use std::path::Path;

use crate::aux_store::{AuxStore, AuxTable};
use crate::bounding_box::BoundingBox;
use crate::config::GeoRefConfig;
use crate::errors::{GeoRefError, GeoRefResult};
use crate::geometry::NodeTuple;
use crate::geometry_store::GeometryStore;
use crate::member::{decode_ids, decode_members, encode_ids, encode_members, Member};
use crate::paged::narrow;
use crate::replication::ReplicationState;

/// The enrichment index: node coordinates, way bboxes, member lists and
/// back-references, kept consistent under incremental updates.
///
/// ```rust,no_run
/// use georef::{GeoRefConfig, InMemoryAuxStore, ReferenceIndex};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut index = ReferenceIndex::create(
///     "/var/lib/georef",
///     10,
///     10,
///     InMemoryAuxStore::new(),
///     GeoRefConfig::default(),
/// )?;
/// index.store_node_coords(3, 12.345, 6.789)?;
/// index.update_way_nodes(7, &[3])?;
/// assert_eq!(index.fetch_node_refs(3)?, vec![7]);
/// index.flush()?;
/// # Ok(())
/// # }
/// ```
pub struct ReferenceIndex<S: AuxStore> {
    geometry: GeometryStore,
    store: S,
}

impl<S: AuxStore> ReferenceIndex<S> {
    pub fn new(geometry: GeometryStore, store: S) -> Self {
        Self { geometry, store }
    }

    /// Opens the preallocated files in `path` with default settings.
    pub fn open(path: impl AsRef<Path>, store: S) -> GeoRefResult<Self> {
        Self::open_with_config(path, store, GeoRefConfig::default())
    }

    pub fn open_with_config(
        path: impl AsRef<Path>,
        store: S,
        config: GeoRefConfig,
    ) -> GeoRefResult<Self> {
        let path = path.as_ref();
        log::debug!("Opening reference index at {:?}", path);
        let geometry = GeometryStore::open(path, config)?;
        Ok(Self::new(geometry, store))
    }

    /// Preallocates zero-filled node and way tables in `path` and opens them.
    pub fn create(
        path: impl AsRef<Path>,
        node_capacity: u64,
        way_capacity: u64,
        store: S,
        config: GeoRefConfig,
    ) -> GeoRefResult<Self> {
        let path = path.as_ref();
        log::debug!(
            "Creating reference index at {:?} for {} nodes and {} ways",
            path,
            node_capacity,
            way_capacity
        );
        let geometry = GeometryStore::create(path, node_capacity, way_capacity, config)?;
        Ok(Self::new(geometry, store))
    }

    pub fn geometry(&self) -> &GeometryStore {
        &self.geometry
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Flushes every mapped page, then commits the auxiliary store.
    ///
    /// The two layers are not committed atomically. Pages evicted during a
    /// batch reach the files before the auxiliary store commits, and a crash
    /// between the page flush and the commit leaves geometry ahead of the
    /// reference rows. Replaying the batch reconciles them, since every
    /// update compares against the stored state.
    pub fn flush(&mut self) -> GeoRefResult<()> {
        self.geometry.flush()?;
        self.store.commit()
    }

    pub fn close(mut self) -> GeoRefResult<()> {
        self.geometry.close()?;
        self.store.close()
    }

    /// Ends a batch: trims the caches, records the cursor and makes both
    /// layers durable. Carries the same consistency gap as
    /// [`ReferenceIndex::flush`].
    pub fn checkpoint(&mut self, state: &ReplicationState) -> GeoRefResult<()> {
        self.purge_node_cache();
        self.store.save_state(state)?;
        self.flush()?;
        log::info!(
            "Checkpoint at changeset {} replication {}",
            state.changeset,
            state.replication
        );
        Ok(())
    }

    /// Aborts the current batch after an error such as
    /// [`GeoRefError::OutOfRange`] by discarding the staged auxiliary rows.
    ///
    /// Page writes already made are kept; the caller replays the batch
    /// (after growing the files if needed) to bring both layers back in line.
    pub fn rollback(&mut self) -> GeoRefResult<()> {
        log::warn!("Rolling back the current batch");
        self.store.rollback()
    }

    pub fn load_state(&self) -> GeoRefResult<Option<ReplicationState>> {
        self.store.load_state()
    }

    pub fn save_state(&self, state: &ReplicationState) -> GeoRefResult<()> {
        self.store.save_state(state)
    }

    /// Trims the node and bbox caches to their configured capacities.
    pub fn purge_node_cache(&mut self) -> (usize, usize) {
        self.geometry.purge_caches()
    }

    pub fn fetch_node_tuple(&mut self, node_id: i64) -> GeoRefResult<NodeTuple> {
        self.geometry.get_node(node_id)
    }

    pub fn fetch_way_bbox(&mut self, way_id: i64) -> GeoRefResult<Option<BoundingBox>> {
        self.geometry.get_bbox(way_id)
    }

    /// Updates a node's coordinates and re-derives the bbox of every way
    /// referencing it. Relations have no bbox and are left alone.
    pub fn store_node_coords(&mut self, node_id: i64, lat: f64, lon: f64) -> GeoRefResult<()> {
        if !self.geometry.set_node_coords(node_id, lat, lon)? {
            return Ok(());
        }
        for way_id in self.fetch_node_refs(node_id)? {
            if way_id > 0 {
                self.update_way_bbox(way_id)?;
            }
        }
        Ok(())
    }

    fn update_way_bbox(&mut self, way_id: i64) -> GeoRefResult<()> {
        let nodes = self.fetch_way_nodes(way_id)?;
        if nodes.is_empty() {
            log::warn!("Way {} is referenced by a node but has no members", way_id);
        }
        let bbox = self.calc_bbox(&nodes)?;
        self.geometry.set_bbox(way_id, bbox.as_ref())
    }

    /// Bounding box of the located nodes among `node_ids`, or `None` when
    /// none of them has coordinates.
    pub fn calc_bbox(&mut self, node_ids: &[i64]) -> GeoRefResult<Option<BoundingBox>> {
        let mut bbox: Option<BoundingBox> = None;
        for &node_id in node_ids {
            if let Some((lat, lon)) = self.geometry.get_node(node_id)?.coords() {
                match bbox.as_mut() {
                    Some(b) => b.expand(lat, lon),
                    None => bbox = Some(BoundingBox::from_point(lat, lon)),
                }
            }
        }
        Ok(bbox)
    }

    fn read_ids(&self, table: AuxTable, key: i64) -> GeoRefResult<Vec<i64>> {
        match self.store.get(table, key)? {
            Some(text) => decode_ids(&text),
            None => Ok(Vec::new()),
        }
    }

    fn write_ids(&self, table: AuxTable, key: i64, ids: &[i64]) -> GeoRefResult<()> {
        if ids.is_empty() {
            self.store.remove(table, key)
        } else {
            self.store.put(table, key, &encode_ids(ids))
        }
    }

    /// Ways (positive) and relations (negative) referencing the node, inline
    /// reference first.
    pub fn fetch_node_refs(&mut self, node_id: i64) -> GeoRefResult<Vec<i64>> {
        let tuple = self.geometry.get_node(node_id)?;
        let mut refs = Vec::new();
        if let Some(inline) = tuple.inline_ref {
            refs.push(inline);
            refs.extend(self.read_ids(AuxTable::NodeRefs, node_id)?);
        }
        Ok(refs)
    }

    /// Records that way `wr_id` (or relation, when negative) references the
    /// node. Fills the inline slot first, then appends to the overflow row.
    /// Adding an id that is already present is a no-op.
    pub fn add_node_ref(&mut self, node_id: i64, wr_id: i64) -> GeoRefResult<()> {
        match self.geometry.get_node(node_id)?.inline_ref {
            None => self.geometry.set_inline_ref(node_id, Some(wr_id)),
            Some(inline) if inline == wr_id => Ok(()),
            Some(_) => {
                let mut overflow = self.read_ids(AuxTable::NodeRefs, node_id)?;
                if overflow.contains(&wr_id) {
                    return Ok(());
                }
                overflow.push(wr_id);
                self.write_ids(AuxTable::NodeRefs, node_id, &overflow)
            }
        }
    }

    /// Drops one back-reference from the node. Removing the inline id
    /// promotes the first overflow id into the slot; the overflow row is
    /// deleted once empty.
    pub fn remove_node_ref(&mut self, node_id: i64, wr_id: i64) -> GeoRefResult<()> {
        let Some(inline) = self.geometry.get_node(node_id)?.inline_ref else {
            return Ok(());
        };
        let mut overflow = self.read_ids(AuxTable::NodeRefs, node_id)?;

        if inline == wr_id {
            if overflow.is_empty() {
                return self.geometry.set_inline_ref(node_id, None);
            }
            let promoted = overflow.remove(0);
            self.geometry.set_inline_ref(node_id, Some(promoted))?;
            return self.write_ids(AuxTable::NodeRefs, node_id, &overflow);
        }

        match overflow.iter().position(|&r| r == wr_id) {
            Some(pos) => {
                overflow.remove(pos);
                self.write_ids(AuxTable::NodeRefs, node_id, &overflow)
            }
            None => Ok(()),
        }
    }

    /// Relations (as negative ids) referencing a way or relation.
    pub fn fetch_wr_refs(&self, wr_id: i64) -> GeoRefResult<Vec<i64>> {
        Ok(self
            .read_ids(AuxTable::WayRelRefs, wr_id)?
            .into_iter()
            .map(|id| -id)
            .collect())
    }

    /// Records that relation `ref_id` (negative) has the way or relation
    /// `wr_id` as a member.
    pub fn add_wr_ref(&mut self, wr_id: i64, ref_id: i64) -> GeoRefResult<()> {
        let mut refs = self.read_ids(AuxTable::WayRelRefs, wr_id)?;
        if refs.contains(&-ref_id) {
            return Ok(());
        }
        refs.push(-ref_id);
        self.write_ids(AuxTable::WayRelRefs, wr_id, &refs)
    }

    /// Reverse of [`ReferenceIndex::add_wr_ref`]; deletes the row once empty.
    pub fn remove_wr_ref(&mut self, wr_id: i64, ref_id: i64) -> GeoRefResult<()> {
        let mut refs = self.read_ids(AuxTable::WayRelRefs, wr_id)?;
        match refs.iter().position(|&r| r == -ref_id) {
            Some(pos) => {
                refs.remove(pos);
                self.write_ids(AuxTable::WayRelRefs, wr_id, &refs)
            }
            None => Ok(()),
        }
    }

    /// Node ids of a way in stored order, empty for an unknown way.
    pub fn fetch_way_nodes(&self, way_id: i64) -> GeoRefResult<Vec<i64>> {
        self.read_ids(AuxTable::Members, way_id)
    }

    /// Members of a relation, given its id in either sign.
    pub fn fetch_relation_members(&self, rel_id: i64) -> GeoRefResult<Vec<Member>> {
        match self.store.get(AuxTable::Members, relation_key(rel_id))? {
            Some(text) => decode_members(&text),
            None => Ok(Vec::new()),
        }
    }

    /// Replaces a way's node list, re-derives its bbox and moves the
    /// node back-references to match. An unchanged list is a no-op.
    pub fn update_way_nodes(&mut self, way_id: i64, nodes: &[i64]) -> GeoRefResult<()> {
        self.check_way_id(way_id)?;
        narrow(way_id)?;
        for &node_id in nodes {
            self.check_node_id(node_id)?;
        }
        let old_text = self.store.get(AuxTable::Members, way_id)?.unwrap_or_default();
        let new_text = encode_ids(nodes);
        if old_text == new_text {
            return Ok(());
        }
        let old_nodes = decode_ids(&old_text)?;
        self.write_ids(AuxTable::Members, way_id, nodes)?;

        let bbox = self.calc_bbox(nodes)?;
        self.geometry.set_bbox(way_id, bbox.as_ref())?;

        for &node_id in nodes {
            self.add_node_ref(node_id, way_id)?;
        }
        let kept: BTreeSet<i64> = nodes.iter().copied().collect();
        let dropped: BTreeSet<i64> = old_nodes
            .into_iter()
            .filter(|id| !kept.contains(id))
            .collect();
        for node_id in dropped {
            self.remove_node_ref(node_id, way_id)?;
        }
        Ok(())
    }

    /// Replaces a relation's member list and moves the back-references of
    /// its members to match. `rel_id` may be given in either sign; it is
    /// stored negated.
    pub fn update_relation_members(&mut self, rel_id: i64, members: &[Member]) -> GeoRefResult<()> {
        let rel_key = relation_key(rel_id);
        narrow(rel_key)?;
        let members: Vec<Member> = members.iter().map(|m| m.normalized()).collect();
        for member in &members {
            if let Member::Node(node_id) = *member {
                self.check_node_id(node_id)?;
            }
        }
        let old_text = self.store.get(AuxTable::Members, rel_key)?.unwrap_or_default();
        let new_text = encode_members(&members);
        if old_text == new_text {
            return Ok(());
        }
        let old_members = decode_members(&old_text)?;
        if members.is_empty() {
            self.store.remove(AuxTable::Members, rel_key)?;
        } else {
            self.store.put(AuxTable::Members, rel_key, &new_text)?;
        }

        for &member in &members {
            match member {
                Member::Node(node_id) => self.add_node_ref(node_id, rel_key)?,
                _ => self.add_wr_ref(member.ref_key(), rel_key)?,
            }
        }
        let kept: BTreeSet<Member> = members.iter().copied().collect();
        let dropped: BTreeSet<Member> = old_members
            .into_iter()
            .filter(|m| !kept.contains(m))
            .collect();
        for member in dropped {
            match member {
                Member::Node(node_id) => self.remove_node_ref(node_id, rel_key)?,
                _ => self.remove_wr_ref(member.ref_key(), rel_key)?,
            }
        }
        Ok(())
    }

    /// Clears a way (positive id) or relation (negative id). A deleted way
    /// keeps its last bbox.
    pub fn delete_wr(&mut self, wr_id: i64) -> GeoRefResult<()> {
        if wr_id > 0 {
            self.update_way_nodes(wr_id, &[])
        } else {
            self.update_relation_members(wr_id, &[])
        }
    }
}

impl<S: AuxStore> ReferenceIndex<S> {
    fn check_node_id(&self, node_id: i64) -> GeoRefResult<()> {
        check_capacity(node_id, self.geometry.node_capacity())
    }

    fn check_way_id(&self, way_id: i64) -> GeoRefResult<()> {
        check_capacity(way_id, self.geometry.way_capacity())
    }
}

fn check_capacity(id: i64, capacity: u64) -> GeoRefResult<()> {
    match u64::try_from(id) {
        Ok(index) if index < capacity => Ok(()),
        _ => Err(GeoRefError::out_of_range(id, capacity)),
    }
}

#[inline]
fn relation_key(rel_id: i64) -> i64 {
    -rel_id.abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aux_store::InMemoryAuxStore;
    use crate::config::PageConfig;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;
    use tempfile::{tempdir, TempDir};

    fn create_index() -> (TempDir, ReferenceIndex<InMemoryAuxStore>, InMemoryAuxStore) {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = tempdir().unwrap();
        let store = InMemoryAuxStore::new();
        let config = GeoRefConfig::default().with_pages(PageConfig::default().with_page_cells(4096));
        let index = ReferenceIndex::create(dir.path(), 100, 100, store.clone(), config).unwrap();
        (dir, index, store)
    }

    fn ref_set(index: &mut ReferenceIndex<InMemoryAuxStore>, node_id: i64) -> HashSet<i64> {
        index.fetch_node_refs(node_id).unwrap().into_iter().collect()
    }

    #[test]
    fn test_way_scenario() {
        let (_dir, mut index, _store) = create_index();
        index.store_node_coords(3, 12.345, 6.789).unwrap();
        index.update_way_nodes(7, &[3]).unwrap();
        assert_eq!(
            index.fetch_way_bbox(7).unwrap().unwrap().to_array(),
            [12.345, 6.789, 12.345, 6.789]
        );
        assert_eq!(index.fetch_node_refs(3).unwrap(), vec![7]);

        index.update_way_nodes(7, &[]).unwrap();
        assert!(index.fetch_node_refs(3).unwrap().is_empty());
        assert_eq!(
            index.fetch_way_bbox(7).unwrap().unwrap().to_array(),
            [12.345, 6.789, 12.345, 6.789]
        );
    }

    #[test]
    fn test_calc_bbox_uses_running_max() {
        let (_dir, mut index, _store) = create_index();
        index.store_node_coords(1, 1.0, 1.0).unwrap();
        index.store_node_coords(2, 2.0, 2.0).unwrap();
        index.store_node_coords(3, -1.0, -1.0).unwrap();
        let bbox = index.calc_bbox(&[1, 2, 3]).unwrap().unwrap();
        assert_eq!(bbox.to_array(), [-1.0, -1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_calc_bbox_skips_unlocated_nodes() {
        let (_dir, mut index, _store) = create_index();
        assert_eq!(index.calc_bbox(&[]).unwrap(), None);
        assert_eq!(index.calc_bbox(&[4, 5]).unwrap(), None);
        index.store_node_coords(5, 3.0, -3.0).unwrap();
        assert_eq!(
            index.calc_bbox(&[4, 5]).unwrap(),
            Some(BoundingBox::from_point(3.0, -3.0))
        );
        assert!(index.calc_bbox(&[1000]).is_err());
    }

    #[test]
    fn test_node_ref_states() {
        let (_dir, mut index, store) = create_index();
        index.add_node_ref(1, 10).unwrap();
        assert_eq!(index.fetch_node_tuple(1).unwrap().inline_ref, Some(10));
        assert_eq!(store.row_count(AuxTable::NodeRefs), 0);

        index.add_node_ref(1, 10).unwrap();
        assert_eq!(store.row_count(AuxTable::NodeRefs), 0);

        index.add_node_ref(1, -20).unwrap();
        index.add_node_ref(1, 30).unwrap();
        index.add_node_ref(1, 30).unwrap();
        assert_eq!(index.fetch_node_refs(1).unwrap(), vec![10, -20, 30]);
        assert_eq!(
            store.get(AuxTable::NodeRefs, 1).unwrap().as_deref(),
            Some("-20,30")
        );

        index.remove_node_ref(1, 10).unwrap();
        assert_eq!(index.fetch_node_refs(1).unwrap(), vec![-20, 30]);
        index.remove_node_ref(1, 30).unwrap();
        assert_eq!(index.fetch_node_refs(1).unwrap(), vec![-20]);
        assert_eq!(store.row_count(AuxTable::NodeRefs), 0);

        index.remove_node_ref(1, 99).unwrap();
        index.remove_node_ref(1, -20).unwrap();
        assert!(index.fetch_node_refs(1).unwrap().is_empty());
        assert_eq!(index.fetch_node_tuple(1).unwrap().inline_ref, None);
    }

    #[test]
    fn test_remove_overflow_ref_when_inline_differs() {
        let (_dir, mut index, _store) = create_index();
        index.add_node_ref(2, 1).unwrap();
        index.add_node_ref(2, 2).unwrap();
        index.add_node_ref(2, 3).unwrap();
        index.remove_node_ref(2, 2).unwrap();
        assert_eq!(index.fetch_node_refs(2).unwrap(), vec![1, 3]);
    }

    #[test]
    fn test_add_then_remove_restores_refs() {
        let (_dir, mut index, _store) = create_index();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..300 {
            let node_id = rng.gen_range(0..5);
            let existing = ref_set(&mut index, node_id);
            let wr_id = loop {
                let candidate = rng.gen_range(-40..40i64);
                if candidate != 0 && !existing.contains(&candidate) {
                    break candidate;
                }
            };
            if rng.gen_bool(0.6) {
                index.add_node_ref(node_id, wr_id).unwrap();
                assert!(ref_set(&mut index, node_id).contains(&wr_id));
                index.remove_node_ref(node_id, wr_id).unwrap();
                assert_eq!(ref_set(&mut index, node_id), existing);
            }
            index.add_node_ref(node_id, wr_id).unwrap();
            if rng.gen_bool(0.3) {
                if let Some(&victim) = existing.iter().next() {
                    index.remove_node_ref(node_id, victim).unwrap();
                }
            }
        }
    }

    #[test]
    fn test_way_node_list_changes_move_refs() {
        let (_dir, mut index, _store) = create_index();
        index.update_way_nodes(5, &[1, 2, 3]).unwrap();
        index.update_way_nodes(6, &[2]).unwrap();
        index.update_way_nodes(5, &[3, 4]).unwrap();

        assert!(!index.fetch_node_refs(1).unwrap().contains(&5));
        assert_eq!(index.fetch_node_refs(2).unwrap(), vec![6]);
        assert_eq!(index.fetch_node_refs(3).unwrap(), vec![5]);
        assert_eq!(index.fetch_node_refs(4).unwrap(), vec![5]);
        assert_eq!(index.fetch_way_nodes(5).unwrap(), vec![3, 4]);
    }

    #[test]
    fn test_unchanged_way_is_noop() {
        let (_dir, mut index, store) = create_index();
        index.update_way_nodes(5, &[1, 2]).unwrap();
        index.remove_node_ref(1, 5).unwrap();
        index.update_way_nodes(5, &[1, 2]).unwrap();
        assert!(index.fetch_node_refs(1).unwrap().is_empty());
        assert_eq!(store.row_count(AuxTable::Members), 1);
    }

    #[test]
    fn test_closed_way_repeats_node() {
        let (_dir, mut index, _store) = create_index();
        index.update_way_nodes(8, &[1, 2, 3, 1]).unwrap();
        index.update_way_nodes(8, &[2, 3]).unwrap();
        assert!(index.fetch_node_refs(1).unwrap().is_empty());
        assert_eq!(index.fetch_node_refs(2).unwrap(), vec![8]);
    }

    #[test]
    fn test_node_move_updates_way_bbox_only() {
        let (_dir, mut index, _store) = create_index();
        index.store_node_coords(1, 0.0, 0.0).unwrap();
        index.store_node_coords(2, 1.0, 1.0).unwrap();
        index.update_way_nodes(3, &[1, 2]).unwrap();
        index
            .update_relation_members(-4, &[Member::Node(2), Member::Way(3)])
            .unwrap();
        assert_eq!(index.fetch_node_refs(2).unwrap(), vec![3, -4]);

        index.store_node_coords(2, 5.0, -2.0).unwrap();
        assert_eq!(
            index.fetch_way_bbox(3).unwrap(),
            Some(BoundingBox::new(0.0, -2.0, 5.0, 0.0))
        );
        assert_eq!(index.fetch_way_bbox(4).unwrap(), None);
    }

    #[test]
    fn test_relation_members() {
        let (_dir, mut index, store) = create_index();
        let members = [Member::Node(1), Member::Way(2), Member::Relation(3)];
        index.update_relation_members(9, &members).unwrap();

        assert_eq!(store.get(AuxTable::Members, -9).unwrap().as_deref(), Some("n1,w2,r3"));
        assert_eq!(index.fetch_relation_members(9).unwrap(), members.to_vec());
        assert_eq!(index.fetch_relation_members(-9).unwrap(), members.to_vec());
        assert_eq!(index.fetch_node_refs(1).unwrap(), vec![-9]);
        assert_eq!(index.fetch_wr_refs(2).unwrap(), vec![-9]);
        assert_eq!(index.fetch_wr_refs(-3).unwrap(), vec![-9]);
        assert_eq!(store.get(AuxTable::WayRelRefs, 2).unwrap().as_deref(), Some("9"));

        index
            .update_relation_members(-9, &[Member::Way(2), Member::Relation(-3)])
            .unwrap();
        assert!(index.fetch_node_refs(1).unwrap().is_empty());
        assert_eq!(index.fetch_wr_refs(-3).unwrap(), vec![-9]);

        index.delete_wr(-9).unwrap();
        assert!(index.fetch_wr_refs(2).unwrap().is_empty());
        assert!(index.fetch_wr_refs(-3).unwrap().is_empty());
        assert!(index.fetch_relation_members(9).unwrap().is_empty());
        assert_eq!(store.row_count(AuxTable::WayRelRefs), 0);
        assert_eq!(store.row_count(AuxTable::Members), 0);
    }

    #[test]
    fn test_wr_refs_from_several_relations() {
        let (_dir, mut index, _store) = create_index();
        index.add_wr_ref(2, -5).unwrap();
        index.add_wr_ref(2, -6).unwrap();
        index.add_wr_ref(2, -5).unwrap();
        assert_eq!(index.fetch_wr_refs(2).unwrap(), vec![-5, -6]);
        index.remove_wr_ref(2, -5).unwrap();
        index.remove_wr_ref(2, -7).unwrap();
        assert_eq!(index.fetch_wr_refs(2).unwrap(), vec![-6]);
    }

    #[test]
    fn test_delete_way_keeps_bbox() {
        let (_dir, mut index, _store) = create_index();
        index.store_node_coords(1, 1.0, 2.0).unwrap();
        index.update_way_nodes(2, &[1]).unwrap();
        index.delete_wr(2).unwrap();
        assert!(index.fetch_way_nodes(2).unwrap().is_empty());
        assert_eq!(
            index.fetch_way_bbox(2).unwrap(),
            Some(BoundingBox::from_point(1.0, 2.0))
        );
    }

    #[test]
    fn test_out_of_range_way_rejected_before_writes() {
        let (_dir, mut index, store) = create_index();
        assert!(matches!(
            index.update_way_nodes(100, &[1]),
            Err(GeoRefError::OutOfRange { index: 100, len: 100 })
        ));
        assert_eq!(store.row_count(AuxTable::Members), 0);
        assert!(index.fetch_node_refs(1).unwrap().is_empty());
    }

    #[test]
    fn test_out_of_range_member_rejected_before_writes() {
        let (_dir, mut index, store) = create_index();
        index.update_way_nodes(5, &[1, 2]).unwrap();

        assert!(matches!(
            index.update_way_nodes(5, &[1, 1000]),
            Err(GeoRefError::OutOfRange { index: 1000, len: 100 })
        ));
        assert!(index.update_way_nodes(5, &[-1]).is_err());
        assert_eq!(index.fetch_way_nodes(5).unwrap(), vec![1, 2]);
        assert_eq!(index.fetch_node_refs(1).unwrap(), vec![5]);
        assert_eq!(index.fetch_node_refs(2).unwrap(), vec![5]);

        index.update_way_nodes(5, &[1]).unwrap();
        assert!(index.fetch_node_refs(2).unwrap().is_empty());

        assert!(matches!(
            index.update_relation_members(-3, &[Member::Node(1), Member::Node(1000)]),
            Err(GeoRefError::OutOfRange { index: 1000, .. })
        ));
        assert!(index.fetch_relation_members(3).unwrap().is_empty());
        assert_eq!(index.fetch_node_refs(1).unwrap(), vec![5]);
        assert_eq!(store.row_count(AuxTable::NodeRefs), 0);

        index.update_relation_members(-3, &[Member::Node(1)]).unwrap();
        index.delete_wr(-3).unwrap();
        assert_eq!(index.fetch_node_refs(1).unwrap(), vec![5]);
        assert!(index.fetch_relation_members(3).unwrap().is_empty());
    }

    #[test]
    fn test_rollback_discards_aborted_batch() {
        let (_dir, mut index, store) = create_index();
        index.update_way_nodes(5, &[1]).unwrap();
        index.flush().unwrap();

        index.update_way_nodes(6, &[1]).unwrap();
        index.update_relation_members(-2, &[Member::Way(5)]).unwrap();
        assert!(index.update_way_nodes(7, &[1000]).unwrap_err().aborts_batch());
        index.rollback().unwrap();

        assert_eq!(store.pending_count(), 0);
        assert!(index.fetch_way_nodes(6).unwrap().is_empty());
        assert!(index.fetch_wr_refs(5).unwrap().is_empty());
        assert_eq!(index.fetch_node_refs(1).unwrap(), vec![5]);

        index.update_way_nodes(6, &[1]).unwrap();
        assert_eq!(index.fetch_node_refs(1).unwrap(), vec![5, 6]);
    }

    #[test]
    fn test_checkpoint_persists_state() {
        let (_dir, mut index, store) = create_index();
        let state = ReplicationState::new(2_000_000, 4_000_000);
        index.update_way_nodes(1, &[1]).unwrap();
        index.checkpoint(&state).unwrap();
        assert_eq!(index.load_state().unwrap(), Some(state));
        assert_eq!(store.commit_count(), 1);
        index.close().unwrap();
        assert!(store.is_closed());
    }
}
