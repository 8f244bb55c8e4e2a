use crate::config::FjallAuxConfig;
use crate::store::FjallAuxStore;
use fjall::CompressionType;
use georef::GeoRefResult;

/// Fluent configuration for a [`FjallAuxStore`].
///
/// ```rust,no_run
/// use georef_fjall_adapter::FjallAuxStoreBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = FjallAuxStoreBuilder::new()
///     .db_path("/var/lib/georef/aux")
///     .bulk_import_preset()
///     .open()?;
/// # Ok(())
/// # }
/// ```
pub struct FjallAuxStoreBuilder {
    store_config: FjallAuxConfig,
}

impl FjallAuxStoreBuilder {
    #[inline]
    pub fn new() -> FjallAuxStoreBuilder {
        FjallAuxStoreBuilder {
            store_config: FjallAuxConfig::new(),
        }
    }

    /// Settings for minutely replication: periodic fsync on top of the
    /// checkpoint commits.
    #[inline]
    pub fn replication_preset(self) -> Self {
        let cpus = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(4);

        self
            .cache_capacity(256 * 1024 * 1024)
            .max_write_buffer_size(128 * 1024 * 1024)
            .max_memtable_size(32 * 1024 * 1024)
            .flush_workers(cpus)
            .compaction_workers((cpus / 2).max(1))
            .bloom_filter_bits(10)
            .fsync_frequency(100)
            .compression_type(CompressionType::Lz4)
    }

    /// Settings for the initial planet import, where the store is only
    /// committed at the end of the run.
    #[inline]
    pub fn bulk_import_preset(self) -> Self {
        let cpus = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(4);

        self
            .cache_capacity(512 * 1024 * 1024)
            .max_write_buffer_size(256 * 1024 * 1024)
            .max_memtable_size(64 * 1024 * 1024)
            .flush_workers(cpus)
            .compaction_workers(cpus)
            .manual_journal_persist(true)
            .fsync_frequency(0)
    }

    #[inline]
    pub fn low_memory_preset(self) -> Self {
        self
            .cache_capacity(16 * 1024 * 1024)
            .max_write_buffer_size(32 * 1024 * 1024)
            .max_memtable_size(8 * 1024 * 1024)
            .flush_workers(1)
            .compaction_workers(1)
            .bloom_filter_bits(10)
    }

    #[inline]
    pub fn db_path(self, db_path: &str) -> Self {
        self.store_config.set_db_path(db_path);
        self
    }

    #[inline]
    pub fn manual_journal_persist(self, manual_journal_persist: bool) -> Self {
        self.store_config
            .set_manual_journal_persist(manual_journal_persist);
        self
    }

    #[inline]
    pub fn flush_workers(self, flush_workers: usize) -> Self {
        self.store_config.set_flush_workers(flush_workers);
        self
    }

    #[inline]
    pub fn compaction_workers(self, compaction_workers: usize) -> Self {
        self.store_config.set_compaction_workers(compaction_workers);
        self
    }

    #[inline]
    pub fn cache_capacity(self, cache_capacity: u64) -> Self {
        self.store_config.set_cache_capacity(cache_capacity);
        self
    }

    #[inline]
    pub fn max_journaling_size(self, max_journaling_size: u64) -> Self {
        self.store_config.set_max_journaling_size(max_journaling_size);
        self
    }

    #[inline]
    pub fn max_write_buffer_size(self, max_write_buffer_size: u64) -> Self {
        self.store_config
            .set_max_write_buffer_size(max_write_buffer_size);
        self
    }

    #[inline]
    pub fn fsync_frequency(self, fsync_frequency: u16) -> Self {
        self.store_config.set_fsync_frequency(fsync_frequency);
        self
    }

    #[inline]
    pub fn commit_before_close(self, commit_before_close: bool) -> Self {
        self.store_config.set_commit_before_close(commit_before_close);
        self
    }

    #[inline]
    pub fn bloom_filter_bits(self, bloom_filter_bits: u8) -> Self {
        self.store_config
            .set_bloom_filter_bits(bloom_filter_bits as i8);
        self
    }

    #[inline]
    pub fn compression_type(self, compression_type: CompressionType) -> Self {
        self.store_config.set_compression_type(compression_type);
        self
    }

    #[inline]
    pub fn max_memtable_size(self, max_memtable_size: u32) -> Self {
        self.store_config.set_max_memtable_size(max_memtable_size);
        self
    }

    #[inline]
    pub fn block_size(self, block_size: u32) -> Self {
        self.store_config.set_block_size(block_size);
        self
    }

    #[inline]
    pub fn config(&self) -> &FjallAuxConfig {
        &self.store_config
    }

    /// Opens (or creates) the keyspace at the configured path.
    pub fn open(self) -> GeoRefResult<FjallAuxStore> {
        FjallAuxStore::open(self.store_config)
    }
}

impl Default for FjallAuxStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
