//! Test helpers: sparse mock memory and small writers.

use crate::space::AddressSpace;
use std::collections::HashMap;
use std::sync::RwLock;

/// Mock memory made of independent blocks keyed by start address.
pub struct SparseMemory {
    data: RwLock<HashMap<u64, Vec<u8>>>,
}

impl SparseMemory {
    pub fn new() -> Self {
        SparseMemory {
            data: RwLock::new(HashMap::new()),
        }
    }

    pub fn write(&self, addr: u64, bytes: &[u8]) {
        let mut data = self.data.write().unwrap();
        data.insert(addr, bytes.to_vec());
    }

    /// Patch bytes inside an existing block.
    pub fn patch(&self, addr: u64, bytes: &[u8]) {
        let mut data = self.data.write().unwrap();
        for (&block_addr, block) in data.iter_mut() {
            if addr >= block_addr && addr + bytes.len() as u64 <= block_addr + block.len() as u64 {
                let start = (addr - block_addr) as usize;
                block[start..start + bytes.len()].copy_from_slice(bytes);
                return;
            }
        }
        panic!("no block covers {:#x}", addr);
    }

    pub fn patch_u64(&self, addr: u64, value: u64) {
        self.patch(addr, &value.to_le_bytes());
    }
}

impl AddressSpace for SparseMemory {
    fn read(
        &self,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        let data = self.data.read().unwrap();
        for (&block_addr, block) in data.iter() {
            if offset >= block_addr && offset < block_addr + block.len() as u64 {
                let start = (offset - block_addr) as usize;
                let end = start + length;
                if end <= block.len() {
                    return Ok(block[start..end].to_vec());
                }
            }
        }
        Err(format!("no data at offset {:#x}", offset).into())
    }

    fn is_valid(&self, offset: u64, length: u64) -> bool {
        let data = self.data.read().unwrap();
        data.iter().any(|(&block_addr, block)| {
            offset >= block_addr && offset + length <= block_addr + block.len() as u64
        })
    }
}
