use fjall::{CompressionType, Config, PartitionCreateOptions};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI8, AtomicU16, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Fjall keyspace settings for the auxiliary store.
///
/// Cheap to clone; clones share the same settings. Mutation goes through
/// [`crate::FjallAuxStoreBuilder`], reads are lock-free except for the
/// compression type.
#[derive(Clone)]
pub struct FjallAuxConfig {
    inner: Arc<FjallAuxConfigInner>,
}

impl FjallAuxConfig {
    #[inline]
    pub fn new() -> FjallAuxConfig {
        FjallAuxConfig {
            inner: Arc::new(FjallAuxConfigInner::new()),
        }
    }

    /// Translates the settings to fjall's keyspace config.
    pub(crate) fn keyspace_config(&self) -> Config {
        let mut config = Config::new(self.db_path());
        config = config
            .manual_journal_persist(self.manual_journal_persist())
            .flush_workers(self.flush_workers())
            .compaction_workers(self.compaction_workers())
            .cache_size(self.cache_capacity())
            .max_journaling_size(self.max_journaling_size())
            .max_write_buffer_size(self.max_write_buffer_size());

        if self.fsync_frequency() > 0 {
            config = config.fsync_ms(Some(self.fsync_frequency()));
        }
        config
    }

    /// Options shared by every partition of the store.
    pub(crate) fn partition_config(&self) -> PartitionCreateOptions {
        PartitionCreateOptions::default()
            .bloom_filter_bits(if self.bloom_filter_bits() < 0 {
                None
            } else {
                Some(self.bloom_filter_bits() as u8)
            })
            .compression(self.compression_type())
            .max_memtable_size(self.max_memtable_size())
            .block_size(self.block_size())
    }

    #[inline]
    pub fn db_path(&self) -> &str {
        self.inner.db_path.get_or_init(String::new).as_str()
    }

    /// The path can only be set once.
    #[inline]
    pub(crate) fn set_db_path(&self, db_path: &str) {
        self.inner.db_path.get_or_init(|| db_path.to_string());
    }

    #[inline]
    pub fn manual_journal_persist(&self) -> bool {
        self.inner.manual_journal_persist.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_manual_journal_persist(&self, v: bool) {
        self.inner.manual_journal_persist.store(v, Ordering::Relaxed)
    }

    #[inline]
    pub fn flush_workers(&self) -> usize {
        self.inner.flush_workers.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_flush_workers(&self, c: usize) {
        self.inner.flush_workers.store(c, Ordering::Relaxed)
    }

    #[inline]
    pub fn compaction_workers(&self) -> usize {
        self.inner.compaction_workers.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_compaction_workers(&self, c: usize) {
        self.inner.compaction_workers.store(c, Ordering::Relaxed)
    }

    /// Block cache size in bytes
    #[inline]
    pub fn cache_capacity(&self) -> u64 {
        self.inner.cache_capacity.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_cache_capacity(&self, c: u64) {
        self.inner.cache_capacity.store(c, Ordering::Relaxed)
    }

    #[inline]
    pub fn max_journaling_size(&self) -> u64 {
        self.inner.max_journaling_size.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_max_journaling_size(&self, s: u64) {
        self.inner.max_journaling_size.store(s, Ordering::Relaxed)
    }

    #[inline]
    pub fn max_write_buffer_size(&self) -> u64 {
        self.inner.max_write_buffer_size.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_max_write_buffer_size(&self, s: u64) {
        self.inner.max_write_buffer_size.store(s, Ordering::Relaxed)
    }

    /// Background fsync interval in milliseconds, 0 to disable
    #[inline]
    pub fn fsync_frequency(&self) -> u16 {
        self.inner.fsync_frequency.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_fsync_frequency(&self, f: u16) {
        self.inner.fsync_frequency.store(f, Ordering::Relaxed)
    }

    #[inline]
    pub fn commit_before_close(&self) -> bool {
        self.inner.commit_before_close.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_commit_before_close(&self, v: bool) {
        self.inner.commit_before_close.store(v, Ordering::Relaxed)
    }

    /// Bloom filter bits per key, negative to disable
    #[inline]
    pub fn bloom_filter_bits(&self) -> i8 {
        self.inner.bloom_filter_bits.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_bloom_filter_bits(&self, b: i8) {
        self.inner.bloom_filter_bits.store(b, Ordering::Relaxed)
    }

    #[inline]
    pub fn compression_type(&self) -> CompressionType {
        *self.inner.compression_type.read()
    }

    #[inline]
    pub(crate) fn set_compression_type(&self, ct: CompressionType) {
        *self.inner.compression_type.write() = ct;
    }

    #[inline]
    pub fn max_memtable_size(&self) -> u32 {
        self.inner.max_memtable_size.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_max_memtable_size(&self, s: u32) {
        self.inner.max_memtable_size.store(s, Ordering::Relaxed)
    }

    #[inline]
    pub fn block_size(&self) -> u32 {
        self.inner.block_size.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_block_size(&self, s: u32) {
        self.inner.block_size.store(s, Ordering::Relaxed)
    }
}

impl Default for FjallAuxConfig {
    fn default() -> Self {
        Self::new()
    }
}

struct FjallAuxConfigInner {
    db_path: OnceLock<String>,
    manual_journal_persist: AtomicBool,
    flush_workers: AtomicUsize,
    compaction_workers: AtomicUsize,
    cache_capacity: AtomicU64,
    max_journaling_size: AtomicU64,
    max_write_buffer_size: AtomicU64,
    fsync_frequency: AtomicU16,
    commit_before_close: AtomicBool,
    bloom_filter_bits: AtomicI8,
    compression_type: RwLock<CompressionType>,
    max_memtable_size: AtomicU32,
    block_size: AtomicU32,
}

impl FjallAuxConfigInner {
    const DEFAULT_CACHE_MB: u64 = 64;
    const DEFAULT_WRITE_BUFFER_MB: u64 = 128;
    const DEFAULT_MAX_JOURNALING_MB: u64 = 512;
    const DEFAULT_MEMTABLE_MB: u32 = 32;

    fn new() -> FjallAuxConfigInner {
        let cpus = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(4);

        FjallAuxConfigInner {
            db_path: OnceLock::new(),
            // Durability is driven by the index checkpoints.
            manual_journal_persist: AtomicBool::new(true),
            flush_workers: AtomicUsize::new(cpus.max(1)),
            compaction_workers: AtomicUsize::new((cpus / 2).max(1)),
            cache_capacity: AtomicU64::new(Self::DEFAULT_CACHE_MB * 1_024 * 1_024),
            max_journaling_size: AtomicU64::new(Self::DEFAULT_MAX_JOURNALING_MB * 1_024 * 1_024),
            max_write_buffer_size: AtomicU64::new(Self::DEFAULT_WRITE_BUFFER_MB * 1_024 * 1_024),
            fsync_frequency: AtomicU16::new(0),
            commit_before_close: AtomicBool::new(true),
            bloom_filter_bits: AtomicI8::new(10),
            compression_type: RwLock::new(CompressionType::Lz4),
            max_memtable_size: AtomicU32::new(Self::DEFAULT_MEMTABLE_MB * 1_024 * 1_024),
            block_size: AtomicU32::new(4 * 1_024),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[ctor::ctor]
    fn init() {
        colog::init();
    }

    #[test]
    fn test_defaults() {
        let config = FjallAuxConfig::new();
        assert_eq!(config.db_path(), "");
        assert!(config.manual_journal_persist());
        assert!(config.commit_before_close());
        assert_eq!(config.cache_capacity(), 64 * 1_024 * 1_024);
        assert_eq!(config.fsync_frequency(), 0);
        assert_eq!(config.bloom_filter_bits(), 10);
        assert_eq!(config.compression_type(), CompressionType::Lz4);
        assert!(config.flush_workers() >= 1);
        assert!(config.compaction_workers() >= 1);
    }

    #[test]
    fn test_db_path_set_once() {
        let config = FjallAuxConfig::new();
        config.set_db_path("/tmp/a");
        config.set_db_path("/tmp/b");
        assert_eq!(config.db_path(), "/tmp/a");
    }

    #[test]
    fn test_clones_share_settings() {
        let config = FjallAuxConfig::new();
        let clone = config.clone();
        clone.set_fsync_frequency(250);
        clone.set_compression_type(CompressionType::None);
        assert_eq!(config.fsync_frequency(), 250);
        assert_eq!(config.compression_type(), CompressionType::None);
    }

    #[test]
    fn test_fjall_configs_build() {
        let config = FjallAuxConfig::new();
        config.set_db_path("/tmp/georef-config");
        config.set_fsync_frequency(100);
        config.set_bloom_filter_bits(-1);
        let _ = config.keyspace_config();
        let _ = config.partition_config();
    }
}
