use crate::config::FjallAuxConfig;
use crate::errors::to_georef_error;
use fjall::{Keyspace, PartitionHandle, PersistMode};
use georef::{AuxStore, AuxTable, GeoRefError, GeoRefResult, ReplicationState};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const STATE_PARTITION: &str = "state";
const STATE_KEY: &[u8] = b"replication";

type RowKey = (AuxTable, i64);

/// Persistent [`AuxStore`] on a fjall keyspace.
///
/// Each [`AuxTable`] lives in its own partition keyed by the big-endian
/// bytes of the id; values are the UTF-8 row text. The replication cursor
/// sits in a separate `state` partition.
///
/// Writes are staged in memory and visible to reads right away. On
/// [`AuxStore::commit`] they are written as one fjall batch and the journal
/// is persisted with `SyncAll`; [`AuxStore::rollback`] drops them. A store
/// dropped with staged writes discards them.
///
/// Cheap to clone; clones share the same keyspace and the same open batch.
#[derive(Clone)]
pub struct FjallAuxStore {
    inner: Arc<FjallAuxStoreInner>,
}

impl FjallAuxStore {
    pub fn open(config: FjallAuxConfig) -> GeoRefResult<FjallAuxStore> {
        let inner = FjallAuxStoreInner::open(config)?;
        Ok(FjallAuxStore {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &FjallAuxConfig {
        &self.inner.store_config
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Relaxed)
    }

    /// Number of rows in a table, counting staged writes. Scans the partition.
    pub fn row_count(&self, table: AuxTable) -> GeoRefResult<usize> {
        self.inner.check_opened()?;
        self.inner.row_count(table)
    }

    /// Number of staged row writes in the open batch
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }
}

impl AuxStore for FjallAuxStore {
    fn get(&self, table: AuxTable, key: i64) -> GeoRefResult<Option<String>> {
        self.inner.get(table, key)
    }

    fn put(&self, table: AuxTable, key: i64, value: &str) -> GeoRefResult<()> {
        self.inner.check_opened()?;
        self.inner
            .pending
            .lock()
            .insert((table, key), Some(value.to_string()));
        Ok(())
    }

    fn remove(&self, table: AuxTable, key: i64) -> GeoRefResult<()> {
        self.inner.check_opened()?;
        self.inner.pending.lock().insert((table, key), None);
        Ok(())
    }

    fn load_state(&self) -> GeoRefResult<Option<ReplicationState>> {
        self.inner.load_state()
    }

    fn save_state(&self, state: &ReplicationState) -> GeoRefResult<()> {
        self.inner.check_opened()?;
        *self.inner.pending_state.lock() = Some(state.to_bytes()?);
        Ok(())
    }

    fn commit(&self) -> GeoRefResult<()> {
        self.inner.check_opened()?;
        self.inner.commit()
    }

    fn rollback(&self) -> GeoRefResult<()> {
        self.inner.check_opened()?;
        self.inner.discard_pending();
        Ok(())
    }

    fn close(&self) -> GeoRefResult<()> {
        self.inner.close()
    }
}

struct FjallAuxStoreInner {
    keyspace: Keyspace,
    node_refs: PartitionHandle,
    wr_refs: PartitionHandle,
    members: PartitionHandle,
    state: PartitionHandle,
    // `None` marks a staged delete
    pending: Mutex<BTreeMap<RowKey, Option<String>>>,
    pending_state: Mutex<Option<Vec<u8>>>,
    closed: AtomicBool,
    store_config: FjallAuxConfig,
}

impl FjallAuxStoreInner {
    fn open(config: FjallAuxConfig) -> GeoRefResult<FjallAuxStoreInner> {
        if config.db_path().is_empty() {
            return Err(GeoRefError::InvalidConfig(
                "fjall db path is not set".to_string(),
            ));
        }
        log::debug!("Opening fjall keyspace at {}", config.db_path());
        let keyspace = Keyspace::open(config.keyspace_config()).map_err(to_georef_error)?;

        let open_partition = |name: &str| {
            keyspace
                .open_partition(name, config.partition_config())
                .map_err(to_georef_error)
        };
        let node_refs = open_partition(AuxTable::NodeRefs.name())?;
        let wr_refs = open_partition(AuxTable::WayRelRefs.name())?;
        let members = open_partition(AuxTable::Members.name())?;
        let state = open_partition(STATE_PARTITION)?;

        Ok(FjallAuxStoreInner {
            keyspace,
            node_refs,
            wr_refs,
            members,
            state,
            pending: Mutex::new(BTreeMap::new()),
            pending_state: Mutex::new(None),
            closed: AtomicBool::new(false),
            store_config: config,
        })
    }

    #[inline]
    fn partition(&self, table: AuxTable) -> &PartitionHandle {
        match table {
            AuxTable::NodeRefs => &self.node_refs,
            AuxTable::WayRelRefs => &self.wr_refs,
            AuxTable::Members => &self.members,
        }
    }

    #[inline]
    fn check_opened(&self) -> GeoRefResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(GeoRefError::Closed);
        }
        Ok(())
    }

    fn get(&self, table: AuxTable, key: i64) -> GeoRefResult<Option<String>> {
        self.check_opened()?;
        if let Some(staged) = self.pending.lock().get(&(table, key)) {
            return Ok(staged.clone());
        }
        let value = self
            .partition(table)
            .get(key.to_be_bytes())
            .map_err(to_georef_error)?;
        match value {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|err| {
                    GeoRefError::Serialization(format!(
                        "row {} in {} is not UTF-8: {}",
                        key,
                        table.name(),
                        err
                    ))
                }),
            None => Ok(None),
        }
    }

    fn row_count(&self, table: AuxTable) -> GeoRefResult<usize> {
        let partition = self.partition(table);
        let mut count = partition.len().map_err(to_georef_error)?;
        for ((t, key), value) in self.pending.lock().iter() {
            if *t != table {
                continue;
            }
            let exists = partition
                .contains_key(key.to_be_bytes())
                .map_err(to_georef_error)?;
            match (exists, value.is_some()) {
                (false, true) => count += 1,
                (true, false) => count -= 1,
                _ => {}
            }
        }
        Ok(count)
    }

    fn load_state(&self) -> GeoRefResult<Option<ReplicationState>> {
        self.check_opened()?;
        if let Some(bytes) = self.pending_state.lock().as_deref() {
            return ReplicationState::from_bytes(bytes).map(Some);
        }
        match self.state.get(STATE_KEY).map_err(to_georef_error)? {
            Some(bytes) => ReplicationState::from_bytes(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Writes the staged rows and state as one batch, then syncs the journal.
    fn commit(&self) -> GeoRefResult<()> {
        let staged = std::mem::take(&mut *self.pending.lock());
        let state = self.pending_state.lock().take();

        if !staged.is_empty() || state.is_some() {
            let mut batch = self.keyspace.batch();
            for ((table, key), value) in &staged {
                let partition = self.partition(*table);
                match value {
                    Some(value) => {
                        batch.insert(partition, &key.to_be_bytes()[..], value.as_bytes())
                    }
                    None => batch.remove(partition, &key.to_be_bytes()[..]),
                }
            }
            if let Some(bytes) = &state {
                batch.insert(&self.state, STATE_KEY, bytes.as_slice());
            }
            batch.commit().map_err(to_georef_error)?;
            log::debug!("Committed {} staged rows", staged.len());
        }
        self.persist()
    }

    fn persist(&self) -> GeoRefResult<()> {
        self.keyspace
            .persist(PersistMode::SyncAll)
            .map_err(to_georef_error)
    }

    fn discard_pending(&self) -> usize {
        let discarded = std::mem::take(&mut *self.pending.lock()).len();
        self.pending_state.lock().take();
        if discarded > 0 {
            log::debug!("Rolled back {} staged rows", discarded);
        }
        discarded
    }

    fn close(&self) -> GeoRefResult<()> {
        if self.closed.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.commit()?;
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

impl Drop for FjallAuxStoreInner {
    fn drop(&mut self) {
        if self.closed.load(Ordering::Relaxed) {
            return;
        }
        let discarded = self.discard_pending();
        if discarded > 0 {
            log::warn!("Dropped fjall store with {} uncommitted rows", discarded);
        }
        if !self.store_config.commit_before_close() {
            return;
        }
        match self.persist() {
            Ok(_) => log::debug!("Persisted keyspace during drop"),
            Err(e) => log::error!("Failed to persist keyspace: {}", e),
        }
    }
}
