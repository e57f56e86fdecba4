//! Memory image: a layer stack exposed as a `vtype` address space.

use crate::config::ScopeConfig;
use crate::memory::error::LayerResult;
use crate::memory::layers::{CachedLayer, MmapFileLayer};
use crate::memory::traits::MemoryLayer;
use std::sync::Arc;
use tracing::info;
use vtype::AddressSpace;

/// The top of a layer stack, readable by object views.
#[derive(Clone)]
pub struct MemoryImage {
    layer: Arc<dyn MemoryLayer>,
}

impl MemoryImage {
    /// Open an image file with the configured short-read policy and page cache.
    pub fn open(path: &str, config: &ScopeConfig) -> LayerResult<Self> {
        let file = MmapFileLayer::open("physical", path, config.short_read)?;
        info!(
            "Opened memory image {} ({} bytes)",
            file.path().display(),
            file.size()
        );
        let file: Arc<dyn MemoryLayer> = Arc::new(file);
        let layer = if config.page_cache_pages > 0 {
            Arc::new(CachedLayer::new(file, config.page_cache_pages)) as Arc<dyn MemoryLayer>
        } else {
            file
        };
        Ok(MemoryImage { layer })
    }

    pub fn from_layer(layer: Arc<dyn MemoryLayer>) -> Self {
        MemoryImage { layer }
    }

    /// Size of the image in bytes.
    pub fn size(&self) -> u64 {
        self.layer.maximum_address() + 1
    }

    pub fn read(&self, offset: u64, length: usize) -> LayerResult<Vec<u8>> {
        self.layer.read(offset, length)
    }

    pub fn is_valid(&self, offset: u64, length: u64) -> bool {
        self.layer.is_valid(offset, length)
    }

    pub fn layer(&self) -> Arc<dyn MemoryLayer> {
        Arc::clone(&self.layer)
    }
}

impl AddressSpace for MemoryImage {
    fn read(
        &self,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        self.layer
            .read(offset, length)
            .map_err(|e| Box::new(e) as Box<dyn std::error::Error + Send + Sync>)
    }

    fn is_valid(&self, offset: u64, length: u64) -> bool {
        self.layer.is_valid(offset, length)
    }
}
