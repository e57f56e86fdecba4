//! Layer implementations.
//!
//! File-backed images, in-memory segment buffers, and a page cache that can
//! sit on top of either.

pub mod buffer;
pub mod cached;
pub mod mmap_file;

pub use buffer::BufferLayer;
pub use cached::CachedLayer;
pub use mmap_file::MmapFileLayer;
