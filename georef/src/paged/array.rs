//! PagedArray implementation.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

use super::codec::{decode_cell, encode_cell};
use super::history::AccessHistory;
use crate::config::PageConfig;
use crate::constants::CELL_SIZE;
use crate::errors::{GeoRefError, GeoRefResult};

/// Page ID - `cell index / page_cells`
pub type PageId = u64;

/// A mapped page with its dirty flag
struct MappedPage {
    map: MmapMut,
    dirty: bool,
}

/// Counters describing paging activity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PagedArrayStats {
    pub pages_mapped: u64,
    pub evictions: u64,
    pub page_flushes: u64,
    pub mapped_now: usize,
}

/// A fixed-width array of optional `i32` cells over a preallocated file.
///
/// Pages are mapped on first touch and at most
/// [`PageConfig::max_mapped_pages`] are mapped at once; the least-used page
/// within the recent access window is flushed and unmapped to make room.
/// The file is never resized after it has been opened.
///
/// ```rust,no_run
/// use georef::paged::PagedArray;
/// use georef::PageConfig;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut cells = PagedArray::create("nodes.bin", 30, PageConfig::default())?;
/// cells.write(4, Some(0))?;
/// assert_eq!(cells.read(4)?, Some(0));
/// assert_eq!(cells.read(5)?, None);
/// cells.close()?;
/// # Ok(())
/// # }
/// ```
pub struct PagedArray {
    file: Option<File>,
    path: PathBuf,
    len_bytes: u64,
    config: PageConfig,
    pages: BTreeMap<PageId, MappedPage>,
    history: AccessHistory,
    stats: PagedArrayStats,
}

impl PagedArray {
    /// Opens an existing preallocated file.
    pub fn open(path: impl AsRef<Path>, config: PageConfig) -> GeoRefResult<Self> {
        config.validate()?;
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len_bytes = file.metadata()?.len();
        log::debug!(
            "Opened paged array {:?} with {} cells in pages of {} cells",
            path,
            len_bytes / CELL_SIZE,
            config.page_cells
        );

        Ok(Self {
            file: Some(file),
            path: path.to_path_buf(),
            len_bytes,
            config,
            pages: BTreeMap::new(),
            history: AccessHistory::new(config.history_len),
            stats: PagedArrayStats::default(),
        })
    }

    /// Creates (or truncates) a zero-filled file holding `cells` absent cells and opens it.
    pub fn create(path: impl AsRef<Path>, cells: u64, config: PageConfig) -> GeoRefResult<Self> {
        config.validate()?;
        let path = path.as_ref();
        let len_bytes = cells
            .checked_mul(CELL_SIZE)
            .ok_or_else(|| GeoRefError::InvalidConfig(format!("{} cells overflow a file", cells)))?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(len_bytes)?;
        file.sync_all()?;
        drop(file);
        log::debug!("Preallocated {:?} with {} cells", path, cells);

        Self::open(path, config)
    }

    /// Number of cells in the file
    #[inline]
    pub fn len(&self) -> u64 {
        self.len_bytes / CELL_SIZE
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &PageConfig {
        &self.config
    }

    /// Number of pages the file spans, counting a truncated last page
    pub fn page_count(&self) -> u64 {
        self.len_bytes.div_ceil(self.config.page_bytes())
    }

    pub fn mapped_page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn is_mapped(&self, page: PageId) -> bool {
        self.pages.contains_key(&page)
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    pub fn stats(&self) -> PagedArrayStats {
        PagedArrayStats {
            mapped_now: self.pages.len(),
            ..self.stats.clone()
        }
    }

    /// Reads one cell. `None` means the cell was never written.
    pub fn read(&mut self, index: u64) -> GeoRefResult<Option<i32>> {
        let (page, offset) = self.resolve(index)?;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&page.map[offset..offset + 4]);
        Ok(decode_cell(raw))
    }

    /// Writes one cell. Rejects the reserved sentinel before touching the page.
    pub fn write(&mut self, index: u64, value: Option<i32>) -> GeoRefResult<()> {
        let raw = encode_cell(value)?;
        let (page, offset) = self.resolve(index)?;
        page.map[offset..offset + 4].copy_from_slice(&raw);
        page.dirty = true;
        Ok(())
    }

    /// Flushes one mapped page, or every mapped page when `page` is `None`.
    /// Pages that are not mapped are ignored.
    pub fn flush(&mut self, page: Option<PageId>) -> GeoRefResult<()> {
        match page {
            Some(id) => {
                if let Some(mapped) = self.pages.get_mut(&id) {
                    Self::flush_page(mapped, &mut self.stats)?;
                }
            }
            None => {
                for mapped in self.pages.values_mut() {
                    Self::flush_page(mapped, &mut self.stats)?;
                }
            }
        }
        Ok(())
    }

    /// Flushes and unmaps a single page.
    pub fn close_page(&mut self, page: PageId) -> GeoRefResult<()> {
        self.flush(Some(page))?;
        if self.pages.remove(&page).is_some() {
            log::trace!("Unmapped page {} of {:?}", page, self.path);
        }
        Ok(())
    }

    /// Flushes and unmaps every page, then releases the file handle.
    /// Any further read or write fails with [`GeoRefError::Closed`].
    pub fn close(&mut self) -> GeoRefResult<()> {
        if self.file.is_none() {
            return Ok(());
        }
        self.flush(None)?;
        self.pages.clear();
        self.file = None;
        log::debug!("Closed paged array {:?}", self.path);
        Ok(())
    }

    fn flush_page(page: &mut MappedPage, stats: &mut PagedArrayStats) -> GeoRefResult<()> {
        if page.dirty {
            page.map.flush()?;
            page.dirty = false;
            stats.page_flushes += 1;
        }
        Ok(())
    }

    /// Maps the page holding `index` if needed and returns it with the
    /// byte offset of the cell inside it.
    fn resolve(&mut self, index: u64) -> GeoRefResult<(&mut MappedPage, usize)> {
        if self.file.is_none() {
            return Err(GeoRefError::Closed);
        }
        let end = index
            .checked_add(1)
            .and_then(|cells| cells.checked_mul(CELL_SIZE));
        match end {
            Some(end) if end <= self.len_bytes => {}
            _ => return Err(GeoRefError::out_of_range(index, self.len())),
        }

        let page_id = index / self.config.page_cells;
        if !self.pages.contains_key(&page_id) {
            if self.pages.len() >= self.config.max_mapped_pages {
                if let Some(victim) = self.history.coldest(self.pages.keys().copied()) {
                    log::trace!(
                        "Evicting page {} of {:?} (used {} times recently)",
                        victim,
                        self.path,
                        self.history.count(victim)
                    );
                    self.close_page(victim)?;
                    self.stats.evictions += 1;
                }
            }
            let mapped = self.map_page(page_id)?;
            self.pages.insert(page_id, mapped);
            self.stats.pages_mapped += 1;
        }
        self.history.record(page_id);

        let offset = ((index - page_id * self.config.page_cells) * CELL_SIZE) as usize;
        let page = self.pages.get_mut(&page_id).ok_or(GeoRefError::Closed)?;
        Ok((page, offset))
    }

    fn map_page(&self, page_id: PageId) -> GeoRefResult<MappedPage> {
        let file = self.file.as_ref().ok_or(GeoRefError::Closed)?;
        let offset = page_id * self.config.page_bytes();
        let len = self.config.page_bytes().min(self.len_bytes - offset);

        // SAFETY: the mapping is tied to this array, which holds the only
        // writable handle the process uses for the file; the range lies
        // inside the file because `resolve` bounds-checked the cell and the
        // file is never resized while open.
        let map = unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(len as usize)
                .map_mut(file)?
        };
        log::trace!(
            "Mapped page {} of {:?} ({} bytes at {})",
            page_id,
            self.path,
            len,
            offset
        );
        Ok(MappedPage { map, dirty: false })
    }
}

impl Drop for PagedArray {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::error!("Failed to close paged array {:?}: {}", self.path, e);
        }
    }
}
