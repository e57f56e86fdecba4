//! Core traits for abstracting memory access.
//!
//! The [`MemoryLayer`] trait lets images, caches and synthetic buffers be
//! stacked on top of each other and handed to object views through
//! [`MemoryImage`](crate::memory::image::MemoryImage).

use crate::memory::error::LayerResult;
use serde::{Deserialize, Serialize};

/// What a layer does with a read that runs past mapped data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortRead {
    /// Fail with `InvalidAddress` at the first unmapped byte.
    #[default]
    Fail,
    /// Return zeros for the unmapped bytes.
    ZeroFill,
}

impl ShortRead {
    pub fn pads(self) -> bool {
        self == ShortRead::ZeroFill
    }
}

/// Trait for reading from a memory layer.
pub trait MemoryLayer: Send + Sync {
    /// Read `length` bytes starting at `offset`.
    fn read(&self, offset: u64, length: usize) -> LayerResult<Vec<u8>>;

    /// Check if the address range `[offset, offset+length)` is valid.
    fn is_valid(&self, offset: u64, length: u64) -> bool;

    /// The name of this layer.
    fn name(&self) -> &str;

    /// Maximum valid address in this layer.
    fn maximum_address(&self) -> u64;
}
