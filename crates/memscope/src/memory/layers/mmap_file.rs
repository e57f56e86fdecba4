//! Memory-mapped image file layer.
//!
//! Raw images (`.raw`, `.mem`, `.dmp` payloads) are mapped read-only; reads
//! copy out of the mapping, and offsets are file offsets.

use crate::memory::error::{LayerError, LayerResult};
use crate::memory::traits::{MemoryLayer, ShortRead};
use memmap2::{Mmap, MmapOptions};
use parking_lot::RwLock;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

struct MmapState {
    /// `None` for an empty file, which cannot be mapped.
    mmap: Option<Mmap>,
    size: u64,
}

impl MmapState {
    fn as_slice(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }
}

/// A read-only memory-mapped file layer.
///
/// # Example
///
/// ```rust,ignore
/// use memscope::memory::layers::MmapFileLayer;
/// use memscope::memory::traits::ShortRead;
///
/// let layer = MmapFileLayer::open("physical", "file:///cases/host1.raw", ShortRead::Fail)?;
/// let header = layer.read_bytes(0, 4096, false)?;
/// ```
pub struct MmapFileLayer {
    name: String,
    /// As given to `open` (file:// URL or path).
    location: String,
    path: PathBuf,
    short_read: ShortRead,
    /// None once the layer has been destroyed.
    state: Option<Arc<RwLock<MmapState>>>,
}

impl MmapFileLayer {
    /// Open `location` (a plain path or a `file://` URL).
    pub fn open(
        name: impl Into<String>,
        location: impl Into<String>,
        short_read: ShortRead,
    ) -> LayerResult<Self> {
        let name = name.into();
        let location = location.into();
        let path = parse_location(&location);
        let state = map_file(&path)?;
        debug!(
            "Opened layer '{}' on {} ({} bytes, short reads: {:?})",
            name,
            path.display(),
            state.size,
            short_read
        );

        Ok(MmapFileLayer {
            name,
            location,
            path,
            short_read,
            state: Some(Arc::new(RwLock::new(state))),
        })
    }

    fn get_state(&self) -> LayerResult<&Arc<RwLock<MmapState>>> {
        self.state
            .as_ref()
            .ok_or_else(|| LayerError::layer_destroyed(&self.name))
    }

    /// Read bytes; `pad` zero-fills whatever lies past the end of the file.
    pub fn read_bytes(&self, offset: u64, length: usize, pad: bool) -> LayerResult<Vec<u8>> {
        let state = self.get_state()?.read();
        let data = state.as_slice();
        let size = state.size;

        if offset > size || (offset == size && length > 0) {
            if pad {
                return Ok(vec![0u8; length]);
            }
            return Err(LayerError::invalid_address(
                &self.name,
                offset,
                "Offset outside of the file",
            ));
        }

        let start = offset as usize;
        let available = (size - offset) as usize;
        if length <= available {
            return Ok(data[start..start + length].to_vec());
        }
        if !pad {
            return Err(LayerError::invalid_address(
                &self.name,
                offset + available as u64,
                format!("Short read: {} of {} bytes available", available, length),
            ));
        }
        let mut result = Vec::with_capacity(length);
        result.extend_from_slice(&data[start..]);
        result.resize(length, 0);
        Ok(result)
    }

    /// Release the mapping; later reads fail with `LayerDestroyed`.
    pub fn destroy(&mut self) {
        self.state = None;
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn short_read(&self) -> ShortRead {
        self.short_read
    }

    pub fn size(&self) -> u64 {
        self.get_state().map(|s| s.read().size).unwrap_or(0)
    }
}

impl MemoryLayer for MmapFileLayer {
    fn read(&self, offset: u64, length: usize) -> LayerResult<Vec<u8>> {
        self.read_bytes(offset, length, self.short_read.pads())
    }

    fn is_valid(&self, offset: u64, length: u64) -> bool {
        if length == 0 {
            return false;
        }
        match offset.checked_add(length) {
            Some(end) => end <= self.size(),
            None => false,
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn maximum_address(&self) -> u64 {
        self.size().saturating_sub(1)
    }
}

fn map_file(path: &Path) -> LayerResult<MmapState> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    if size == 0 {
        return Ok(MmapState { mmap: None, size: 0 });
    }
    // Safety: the mapping is read-only and images are not modified while open.
    let mmap = unsafe { MmapOptions::new().map(&file) }
        .map_err(|e| LayerError::Mmap(format!("{}: {}", path.display(), e)))?;
    Ok(MmapState {
        mmap: Some(mmap),
        size,
    })
}

/// `file:///tmp/a%20b.raw` → `/tmp/a b.raw`; plain paths pass through.
fn parse_location(location: &str) -> PathBuf {
    let Some(url_path) = location.strip_prefix("file://") else {
        return PathBuf::from(location);
    };
    // file:///C:/path
    let url_path = match url_path.as_bytes() {
        [b'/', _, b':', ..] => &url_path[1..],
        _ => url_path,
    };
    PathBuf::from(percent_decode(url_path))
}

fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn image(contents: &[u8]) -> NamedTempFile {
        let mut tmpfile = NamedTempFile::new().unwrap();
        tmpfile.write_all(contents).unwrap();
        tmpfile.flush().unwrap();
        tmpfile
    }

    fn open(file: &NamedTempFile, short_read: ShortRead) -> MmapFileLayer {
        MmapFileLayer::open("test", file.path().to_str().unwrap(), short_read).unwrap()
    }

    #[test]
    fn test_parse_location() {
        assert_eq!(parse_location("file:///tmp/test.raw"), PathBuf::from("/tmp/test.raw"));
        assert_eq!(parse_location("/tmp/test.raw"), PathBuf::from("/tmp/test.raw"));
        assert_eq!(
            parse_location("file:///tmp/test%20file.raw"),
            PathBuf::from("/tmp/test file.raw")
        );
        assert_eq!(parse_location("file:///C:/cases/a.raw"), PathBuf::from("C:/cases/a.raw"));
        assert_eq!(percent_decode("100%"), "100%");
    }

    #[test]
    fn test_open_and_read() {
        let file = image(b"Hello, World!");
        let layer = open(&file, ShortRead::Fail);
        assert_eq!(layer.read(0, 5).unwrap(), b"Hello");
        assert_eq!(layer.read(7, 5).unwrap(), b"World");
        assert_eq!(layer.maximum_address(), 12);
    }

    #[test]
    fn test_short_read_policy() {
        let file = image(b"Hello");

        let strict = open(&file, ShortRead::Fail);
        match strict.read(3, 5) {
            Err(LayerError::InvalidAddress { invalid_address, .. }) => assert_eq!(invalid_address, 5),
            other => panic!("Expected InvalidAddress, got: {:?}", other),
        }
        assert!(strict.read(100, 3).is_err());

        let padded = open(&file, ShortRead::ZeroFill);
        assert_eq!(padded.read(3, 5).unwrap(), b"lo\0\0\0");
        assert_eq!(padded.read(100, 3).unwrap(), b"\0\0\0");
    }

    #[test]
    fn test_is_valid() {
        let file = image(b"0123456789");
        let layer = open(&file, ShortRead::Fail);
        assert!(layer.is_valid(0, 1));
        assert!(layer.is_valid(0, 10));
        assert!(layer.is_valid(9, 1));
        assert!(!layer.is_valid(10, 1));
        assert!(!layer.is_valid(0, 11));
        assert!(!layer.is_valid(u64::MAX, 2));
    }

    #[test]
    fn test_empty_file() {
        let file = image(b"");
        let layer = open(&file, ShortRead::Fail);
        assert_eq!(layer.size(), 0);
        assert!(!layer.is_valid(0, 1));
        assert!(layer.read(0, 1).is_err());
    }

    #[test]
    fn test_destroy() {
        let file = image(b"data");
        let mut layer = open(&file, ShortRead::Fail);
        assert!(layer.read(0, 4).is_ok());
        layer.destroy();
        assert!(matches!(layer.read(0, 4), Err(LayerError::LayerDestroyed(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            MmapFileLayer::open("test", "/nonexistent/image.raw", ShortRead::Fail),
            Err(LayerError::Io(_))
        ));
    }
}
