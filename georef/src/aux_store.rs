//! The auxiliary keyed store behind overflow references, member lists and
//! the replication cursor.
//!
//! The index only needs get/put/remove by `(table, id)` plus a commit
//! boundary, so any durable backend can sit behind [`AuxStore`]. Values are
//! the comma-separated text produced by [`crate::member`].

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::errors::{GeoRefError, GeoRefResult};
use crate::replication::ReplicationState;

/// The three variable-length row kinds, each unique on its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AuxTable {
    /// node id -> 2nd..Nth referencing way/relation ids
    NodeRefs,
    /// way id or negated relation id -> referencing relation ids
    WayRelRefs,
    /// way id -> node ids, negated relation id -> member tokens
    Members,
}

impl AuxTable {
    pub const ALL: [AuxTable; 3] = [AuxTable::NodeRefs, AuxTable::WayRelRefs, AuxTable::Members];

    pub fn name(&self) -> &'static str {
        match self {
            AuxTable::NodeRefs => "node_refs",
            AuxTable::WayRelRefs => "wr_refs",
            AuxTable::Members => "members",
        }
    }
}

/// Keyed persistent store used by the reference index.
///
/// A missing row is `Ok(None)`, never an error. Writes form a batch: they
/// are visible to reads right away, become durable together on
/// [`AuxStore::commit`] and are discarded by [`AuxStore::rollback`].
pub trait AuxStore {
    fn get(&self, table: AuxTable, key: i64) -> GeoRefResult<Option<String>>;

    /// Creates or replaces the row.
    fn put(&self, table: AuxTable, key: i64, value: &str) -> GeoRefResult<()>;

    /// Deletes the row if it exists.
    fn remove(&self, table: AuxTable, key: i64) -> GeoRefResult<()>;

    fn load_state(&self) -> GeoRefResult<Option<ReplicationState>>;

    fn save_state(&self, state: &ReplicationState) -> GeoRefResult<()>;

    /// Applies the current batch atomically and makes it durable.
    fn commit(&self) -> GeoRefResult<()>;

    /// Drops every write since the last commit.
    fn rollback(&self) -> GeoRefResult<()>;

    fn close(&self) -> GeoRefResult<()> {
        self.commit()
    }
}

type RowKey = (AuxTable, i64);

/// Volatile [`AuxStore`] for tests and throwaway runs.
///
/// Cheap to clone; clones share the same rows and the same open batch.
#[derive(Clone, Default)]
pub struct InMemoryAuxStore {
    inner: Arc<InMemoryAuxStoreInner>,
}

#[derive(Default)]
struct InMemoryAuxStoreInner {
    rows: RwLock<BTreeMap<RowKey, String>>,
    // `None` marks a staged delete
    pending: RwLock<BTreeMap<RowKey, Option<String>>>,
    state: RwLock<Option<Vec<u8>>>,
    pending_state: RwLock<Option<Vec<u8>>>,
    commits: AtomicU64,
    closed: AtomicBool,
}

impl InMemoryAuxStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows in a table, counting staged writes
    pub fn row_count(&self, table: AuxTable) -> usize {
        let rows = self.inner.rows.read();
        let pending = self.inner.pending.read();
        let committed = rows
            .keys()
            .filter(|(t, _)| *t == table)
            .filter(|key| !pending.contains_key(key))
            .count();
        let staged = pending
            .iter()
            .filter(|((t, _), value)| *t == table && value.is_some())
            .count();
        committed + staged
    }

    /// Number of staged writes in the open batch
    pub fn pending_count(&self) -> usize {
        self.inner.pending.read().len()
    }

    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }

    fn check_opened(&self) -> GeoRefResult<()> {
        if self.is_closed() {
            return Err(GeoRefError::Closed);
        }
        Ok(())
    }
}

impl AuxStore for InMemoryAuxStore {
    fn get(&self, table: AuxTable, key: i64) -> GeoRefResult<Option<String>> {
        self.check_opened()?;
        if let Some(staged) = self.inner.pending.read().get(&(table, key)) {
            return Ok(staged.clone());
        }
        Ok(self.inner.rows.read().get(&(table, key)).cloned())
    }

    fn put(&self, table: AuxTable, key: i64, value: &str) -> GeoRefResult<()> {
        self.check_opened()?;
        self.inner
            .pending
            .write()
            .insert((table, key), Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, table: AuxTable, key: i64) -> GeoRefResult<()> {
        self.check_opened()?;
        self.inner.pending.write().insert((table, key), None);
        Ok(())
    }

    fn load_state(&self) -> GeoRefResult<Option<ReplicationState>> {
        self.check_opened()?;
        if let Some(bytes) = self.inner.pending_state.read().as_deref() {
            return ReplicationState::from_bytes(bytes).map(Some);
        }
        self.inner
            .state
            .read()
            .as_deref()
            .map(ReplicationState::from_bytes)
            .transpose()
    }

    fn save_state(&self, state: &ReplicationState) -> GeoRefResult<()> {
        self.check_opened()?;
        *self.inner.pending_state.write() = Some(state.to_bytes()?);
        Ok(())
    }

    fn commit(&self) -> GeoRefResult<()> {
        self.check_opened()?;
        let staged = std::mem::take(&mut *self.inner.pending.write());
        let mut rows = self.inner.rows.write();
        for (key, value) in staged {
            match value {
                Some(value) => rows.insert(key, value),
                None => rows.remove(&key),
            };
        }
        if let Some(state) = self.inner.pending_state.write().take() {
            *self.inner.state.write() = Some(state);
        }
        self.inner.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn rollback(&self) -> GeoRefResult<()> {
        self.check_opened()?;
        let discarded = std::mem::take(&mut *self.inner.pending.write()).len();
        self.inner.pending_state.write().take();
        if discarded > 0 {
            log::debug!("Rolled back {} staged writes", discarded);
        }
        Ok(())
    }

    fn close(&self) -> GeoRefResult<()> {
        self.commit()?;
        self.inner.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}
