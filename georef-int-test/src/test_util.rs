use georef::{GeoRefConfig, GeoRefResult, PageConfig, ReferenceIndex};
use georef_fjall_adapter::{FjallAuxStore, FjallAuxStoreBuilder};
use std::backtrace::Backtrace;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use std::{env, fs, thread};

pub type FjallIndex = ReferenceIndex<FjallAuxStore>;

/// Runs a test with retry logic and error handling.
pub fn run_test<T, B, A>(before: B, test: T, after: A)
where
    T: Fn(TestContext) -> GeoRefResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    B: Fn() -> GeoRefResult<TestContext> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
    A: Fn(TestContext) -> GeoRefResult<()> + std::panic::UnwindSafe + std::panic::RefUnwindSafe,
{
    const MAX_RETRIES: u32 = 3;
    let mut last_error: Option<String> = None;
    let mut last_backtrace: Option<String> = None;

    for attempt in 1..=MAX_RETRIES {
        let start_time = Instant::now();

        let result = std::panic::catch_unwind(|| {
            let backtrace = Backtrace::capture();
            match before() {
                Ok(ctx) => match test(ctx.clone()) {
                    Ok(_) => after(ctx)
                        .map_err(|e| (format!("After run failed: {:?}", e), backtrace.to_string())),
                    Err(e) => {
                        let _ = after(ctx);
                        Err((format!("Test failed: {:?}", e), backtrace.to_string()))
                    }
                },
                Err(e) => Err((format!("Before run failed: {:?}", e), backtrace.to_string())),
            }
        });

        let elapsed = start_time.elapsed();
        let (error, backtrace) = match result {
            Ok(Ok(_)) => return,
            Ok(Err((e, bt))) => (e, bt),
            Err(panic_err) => {
                let err_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_err.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic".to_string()
                };
                (
                    format!("Panic: {}", err_msg),
                    Backtrace::capture().to_string(),
                )
            }
        };

        if attempt < MAX_RETRIES {
            eprintln!(
                "\n========== Test Attempt {}/{} Failed (took {:?}) ==========",
                attempt, MAX_RETRIES, elapsed
            );
            eprintln!("Error: {}", error);
            eprintln!("Retrying in {}ms...\n", 100 * attempt);
            thread::sleep(Duration::from_millis(100 * attempt as u64));
        }
        last_error = Some(error);
        last_backtrace = Some(backtrace);
    }

    eprintln!("\n==================== TEST FAILED ====================");
    eprintln!("Failed after {} attempts", MAX_RETRIES);
    eprintln!("Last error: {}", last_error.as_deref().unwrap_or("Unknown"));
    if let Some(bt) = &last_backtrace {
        if !bt.is_empty() && !bt.contains("disabled") {
            eprintln!("\nBacktrace:\n{}", bt);
        }
    }
    eprintln!("=====================================================\n");

    panic!(
        "Test failed after {} attempts. Last error: {}",
        MAX_RETRIES,
        last_error.unwrap_or_default()
    );
}

/// A scratch directory holding the paged files and the fjall keyspace.
#[derive(Clone)]
pub struct TestContext {
    path: PathBuf,
    node_capacity: u64,
    way_capacity: u64,
}

impl TestContext {
    pub fn new(path: PathBuf, node_capacity: u64, way_capacity: u64) -> Self {
        Self {
            path,
            node_capacity,
            way_capacity,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn node_capacity(&self) -> u64 {
        self.node_capacity
    }

    pub fn way_capacity(&self) -> u64 {
        self.way_capacity
    }

    fn aux_path(&self) -> String {
        self.path.join("aux").to_string_lossy().to_string()
    }

    fn open_store(&self) -> GeoRefResult<FjallAuxStore> {
        FjallAuxStoreBuilder::new()
            .db_path(&self.aux_path())
            .low_memory_preset()
            .open()
    }

    /// Preallocates the paged files and opens a fresh index over them.
    pub fn create_index(&self) -> GeoRefResult<FjallIndex> {
        ReferenceIndex::create(
            &self.path,
            self.node_capacity,
            self.way_capacity,
            self.open_store()?,
            test_config(),
        )
    }

    /// Reopens an index created earlier by [`TestContext::create_index`].
    pub fn open_index(&self) -> GeoRefResult<FjallIndex> {
        ReferenceIndex::open_with_config(&self.path, self.open_store()?, test_config())
    }
}

/// Small pages and a tight mapping cap, so tests cross page boundaries and
/// exercise eviction.
pub fn test_config() -> GeoRefConfig {
    GeoRefConfig::default()
        .with_pages(
            PageConfig::default()
                .with_page_cells(4096)
                .with_max_mapped_pages(2),
        )
        .with_node_cache_capacity(64)
        .with_bbox_cache_capacity(16)
}

pub fn random_path() -> PathBuf {
    let id = uuid::Uuid::new_v4();
    env::temp_dir().join(format!("georef-{}", id))
}

pub fn create_test_context(node_capacity: u64, way_capacity: u64) -> GeoRefResult<TestContext> {
    let path = random_path();
    if path.exists() {
        let _ = fs::remove_dir_all(&path);
    }
    Ok(TestContext::new(path, node_capacity, way_capacity))
}

pub fn cleanup(ctx: TestContext) -> GeoRefResult<()> {
    let mut retry = 0;
    while ctx.path().exists() && retry < 3 {
        if let Err(e) = fs::remove_dir_all(ctx.path()) {
            log::warn!("Failed to remove {:?}: {}", ctx.path(), e);
            thread::sleep(Duration::from_millis(100));
        }
        retry += 1;
    }
    Ok(())
}
