//! Page cache in front of another layer.
//!
//! Walkers re-read the same parent nodes many times (a trie ascent touches
//! every ancestor again), so whole pages are kept in an LRU keyed by page
//! number. Pages that cannot be read in full are never cached; such reads go
//! straight to the inner layer so its own error or short-read policy applies.

use crate::memory::error::LayerResult;
use crate::memory::traits::MemoryLayer;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const PAGE_SIZE: u64 = 0x1000;

/// Default number of cached pages.
pub const DEFAULT_CACHE_PAGES: usize = 1024;

pub struct CachedLayer {
    name: String,
    inner: Arc<dyn MemoryLayer>,
    pages: Mutex<LruCache<u64, Arc<Vec<u8>>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedLayer {
    pub fn new(inner: Arc<dyn MemoryLayer>, cache_pages: usize) -> Self {
        let capacity = NonZeroUsize::new(cache_pages).unwrap_or(NonZeroUsize::MIN);
        CachedLayer {
            name: format!("{}_cached", inner.name()),
            inner,
            pages: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &Arc<dyn MemoryLayer> {
        &self.inner
    }

    /// `(hits, misses)` counted per page lookup.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }

    fn page(&self, page: u64) -> Option<Arc<Vec<u8>>> {
        if let Some(bytes) = self.pages.lock().get(&page) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(Arc::clone(bytes));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let base = page.checked_mul(PAGE_SIZE)?;
        if !self.inner.is_valid(base, PAGE_SIZE) {
            return None;
        }
        let bytes = Arc::new(self.inner.read(base, PAGE_SIZE as usize).ok()?);
        self.pages.lock().put(page, Arc::clone(&bytes));
        Some(bytes)
    }
}

impl MemoryLayer for CachedLayer {
    fn read(&self, offset: u64, length: usize) -> LayerResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut cursor = offset;
        while out.len() < length {
            let Some(page) = self.page(cursor / PAGE_SIZE) else {
                return self.inner.read(offset, length);
            };
            let start = (cursor % PAGE_SIZE) as usize;
            let take = (page.len() - start).min(length - out.len());
            out.extend_from_slice(&page[start..start + take]);
            cursor = cursor.wrapping_add(take as u64);
        }
        Ok(out)
    }

    fn is_valid(&self, offset: u64, length: u64) -> bool {
        self.inner.is_valid(offset, length)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn maximum_address(&self) -> u64 {
        self.inner.maximum_address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::layers::BufferLayer;
    use crate::memory::error::LayerError;

    fn cached(pages: usize) -> CachedLayer {
        let data: Vec<u8> = (0..0x3000u32).map(|i| (i % 251) as u8).collect();
        let inner = BufferLayer::new("physical").with_segment(0x1000, data).unwrap();
        CachedLayer::new(Arc::new(inner), pages)
    }

    #[test]
    fn test_reads_match_inner() {
        let layer = cached(4);
        for (offset, len) in [(0x1000u64, 16usize), (0x1ff8, 16), (0x2500, 0x1200)] {
            assert_eq!(
                layer.read(offset, len).unwrap(),
                layer.inner().read(offset, len).unwrap()
            );
        }
    }

    #[test]
    fn test_pages_are_reused() {
        let layer = cached(4);
        layer.read(0x1010, 8).unwrap();
        layer.read(0x1020, 8).unwrap();
        layer.read(0x1ff0, 0x20).unwrap();
        assert_eq!(layer.stats(), (2, 2));
    }

    #[test]
    fn test_lru_eviction() {
        let layer = cached(1);
        layer.read(0x1000, 1).unwrap();
        layer.read(0x2000, 1).unwrap();
        layer.read(0x1000, 1).unwrap();
        assert_eq!(layer.stats(), (0, 3));
    }

    #[test]
    fn test_unmapped_falls_through() {
        let layer = cached(4);
        assert!(layer.read(0x3ff0, 0x20).is_err());
        assert!(matches!(
            layer.read(0x1000, usize::MAX),
            Err(LayerError::InvalidAddress { invalid_address: 0x4000, .. })
        ));
        assert_eq!(layer.name(), "physical_cached");
    }
}
