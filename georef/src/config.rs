//! Tunables for the paged files and the in-process caches.

use crate::constants::{
    BBOX_CACHE_MAX_SIZE, DEFAULT_HISTORY_LEN, DEFAULT_MAPPED_PAGES, DEFAULT_PAGE_CELLS,
    NODE_CACHE_MAX_SIZE, PAGE_CELL_ALIGNMENT,
};
use crate::errors::{GeoRefError, GeoRefResult};

/// Paging parameters of a single [`PagedArray`](crate::paged::PagedArray).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageConfig {
    /// Cells per page; one page is `page_cells * 4` bytes of file
    pub page_cells: u64,
    /// Upper bound on simultaneously mapped pages
    pub max_mapped_pages: usize,
    /// Number of recent page accesses remembered for eviction
    pub history_len: usize,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            page_cells: DEFAULT_PAGE_CELLS,
            max_mapped_pages: DEFAULT_MAPPED_PAGES,
            history_len: DEFAULT_HISTORY_LEN,
        }
    }
}

impl PageConfig {
    pub fn with_page_cells(mut self, page_cells: u64) -> Self {
        self.page_cells = page_cells;
        self
    }

    pub fn with_max_mapped_pages(mut self, max_mapped_pages: usize) -> Self {
        self.max_mapped_pages = max_mapped_pages;
        self
    }

    pub fn with_history_len(mut self, history_len: usize) -> Self {
        self.history_len = history_len;
        self
    }

    /// Page size in bytes
    #[inline]
    pub fn page_bytes(&self) -> u64 {
        self.page_cells * crate::constants::CELL_SIZE
    }

    pub fn validate(&self) -> GeoRefResult<()> {
        if self.page_cells == 0 || self.page_cells % PAGE_CELL_ALIGNMENT != 0 {
            return Err(GeoRefError::InvalidConfig(format!(
                "page size of {} cells is not a positive multiple of {}",
                self.page_cells, PAGE_CELL_ALIGNMENT
            )));
        }
        if self.max_mapped_pages == 0 {
            return Err(GeoRefError::InvalidConfig(
                "at least one page must be mappable".to_string(),
            ));
        }
        if self.history_len == 0 {
            return Err(GeoRefError::InvalidConfig(
                "access history must hold at least one entry".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration of a [`ReferenceIndex`](crate::ReferenceIndex) and its
/// [`GeometryStore`](crate::GeometryStore).
///
/// ```rust
/// use georef::{GeoRefConfig, PageConfig};
///
/// let config = GeoRefConfig::default()
///     .with_node_pages(PageConfig::default().with_max_mapped_pages(4))
///     .with_node_cache_capacity(50_000)
///     .with_cache_enabled(false);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoRefConfig {
    pub node_pages: PageConfig,
    pub bbox_pages: PageConfig,
    pub node_cache_capacity: usize,
    pub bbox_cache_capacity: usize,
    /// Disabled during bulk imports, where every id is touched once
    pub cache_enabled: bool,
}

impl Default for GeoRefConfig {
    fn default() -> Self {
        Self {
            node_pages: PageConfig::default(),
            bbox_pages: PageConfig::default(),
            node_cache_capacity: NODE_CACHE_MAX_SIZE,
            bbox_cache_capacity: BBOX_CACHE_MAX_SIZE,
            cache_enabled: true,
        }
    }
}

impl GeoRefConfig {
    pub fn with_node_pages(mut self, pages: PageConfig) -> Self {
        self.node_pages = pages;
        self
    }

    pub fn with_bbox_pages(mut self, pages: PageConfig) -> Self {
        self.bbox_pages = pages;
        self
    }

    /// Applies the same paging parameters to both files.
    pub fn with_pages(self, pages: PageConfig) -> Self {
        self.with_node_pages(pages).with_bbox_pages(pages)
    }

    pub fn with_node_cache_capacity(mut self, capacity: usize) -> Self {
        self.node_cache_capacity = capacity;
        self
    }

    pub fn with_bbox_cache_capacity(mut self, capacity: usize) -> Self {
        self.bbox_cache_capacity = capacity;
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn validate(&self) -> GeoRefResult<()> {
        self.node_pages.validate()?;
        self.bbox_pages.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_page_config() {
        let config = PageConfig::default();
        assert_eq!(config.page_cells, 64 * 1024 * 1024);
        assert_eq!(config.max_mapped_pages, 2);
        assert_eq!(config.history_len, 1000);
        assert_eq!(config.page_bytes(), 256 * 1024 * 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unaligned_page_rejected() {
        let config = PageConfig::default().with_page_cells(1000);
        assert!(matches!(
            config.validate(),
            Err(GeoRefError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_zero_mapped_pages_rejected() {
        let config = PageConfig::default().with_max_mapped_pages(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_history_rejected() {
        let config = PageConfig::default().with_history_len(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_pages_sets_both_files() {
        let pages = PageConfig::default().with_page_cells(4096);
        let config = GeoRefConfig::default().with_pages(pages);
        assert_eq!(config.node_pages.page_cells, 4096);
        assert_eq!(config.bbox_pages.page_cells, 4096);
        assert_eq!(config.node_cache_capacity, 100_000);
        assert_eq!(config.bbox_cache_capacity, 10_000);
        assert!(config.cache_enabled);
    }
}
