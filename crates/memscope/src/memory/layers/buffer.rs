//! In-memory layer made of address-tagged segments.
//!
//! Used for synthetic images, carved fragments and tests. Segments never
//! overlap; a read that crosses from one segment into a directly adjacent
//! one is served from both.

use crate::memory::error::{LayerError, LayerResult};
use crate::memory::traits::{MemoryLayer, ShortRead};
use std::collections::BTreeMap;

pub struct BufferLayer {
    name: String,
    /// Segment start → bytes.
    segments: BTreeMap<u64, Vec<u8>>,
    short_read: ShortRead,
}

impl BufferLayer {
    pub fn new(name: impl Into<String>) -> Self {
        BufferLayer {
            name: name.into(),
            segments: BTreeMap::new(),
            short_read: ShortRead::Fail,
        }
    }

    /// A layer holding `data` at address 0.
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        let mut layer = Self::new(name);
        layer.segments.insert(0, data);
        layer
    }

    pub fn with_short_read(mut self, short_read: ShortRead) -> Self {
        self.short_read = short_read;
        self
    }

    /// Map `data` at `base`. Fails if it would overlap an existing segment.
    pub fn add_segment(&mut self, base: u64, data: Vec<u8>) -> LayerResult<()> {
        if data.is_empty() {
            return Err(LayerError::InvalidParameter(format!("empty segment at {:#x}", base)));
        }
        let end = base
            .checked_add(data.len() as u64)
            .ok_or_else(|| LayerError::InvalidParameter(format!("segment at {:#x} wraps", base)))?;
        let overlapping = self
            .segments
            .range(..end)
            .next_back()
            .filter(|(start, bytes)| **start + bytes.len() as u64 > base)
            .map(|(&start, _)| start);
        if let Some(existing) = overlapping {
            return Err(LayerError::SegmentOverlap { base, end, existing });
        }
        self.segments.insert(base, data);
        Ok(())
    }

    pub fn with_segment(mut self, base: u64, data: Vec<u8>) -> LayerResult<Self> {
        self.add_segment(base, data)?;
        Ok(self)
    }

    /// The segment bytes available at `offset`, if mapped.
    fn slice_at(&self, offset: u64) -> Option<&[u8]> {
        let (&start, bytes) = self.segments.range(..=offset).next_back()?;
        let rel = (offset - start) as usize;
        if rel < bytes.len() {
            Some(&bytes[rel..])
        } else {
            None
        }
    }

    pub fn read_bytes(&self, offset: u64, length: usize, pad: bool) -> LayerResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut cursor = offset;
        while out.len() < length {
            match self.slice_at(cursor) {
                Some(bytes) => {
                    let take = bytes.len().min(length - out.len());
                    out.extend_from_slice(&bytes[..take]);
                    cursor = cursor.wrapping_add(take as u64);
                }
                None if pad => {
                    out.resize(length, 0);
                }
                None => {
                    return Err(LayerError::invalid_address(
                        &self.name,
                        cursor,
                        "Address is not mapped",
                    ))
                }
            }
        }
        Ok(out)
    }
}

impl MemoryLayer for BufferLayer {
    fn read(&self, offset: u64, length: usize) -> LayerResult<Vec<u8>> {
        self.read_bytes(offset, length, self.short_read.pads())
    }

    fn is_valid(&self, offset: u64, length: u64) -> bool {
        if length == 0 {
            return false;
        }
        let mut cursor = offset;
        let Some(end) = offset.checked_add(length) else {
            return false;
        };
        while cursor < end {
            match self.slice_at(cursor) {
                Some(bytes) => cursor += bytes.len() as u64,
                None => return false,
            }
        }
        true
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn maximum_address(&self) -> u64 {
        self.segments
            .iter()
            .next_back()
            .map(|(&start, bytes)| (start + bytes.len() as u64).saturating_sub(1))
            .unwrap_or(0)
    }
}
