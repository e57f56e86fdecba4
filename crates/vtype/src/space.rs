//! The address-space capability consumed by object views.
//!
//! Implementations live outside this crate (file-backed images, translated
//! virtual memory, in-memory buffers). Whether an unmapped or partially
//! mapped read fails or is zero-filled is a policy of the implementation;
//! this crate only ever sees the bytes it is handed.

use crate::error::{VtypeError, VtypeResult};

/// Reads raw bytes from memory (physical or virtual).
pub trait AddressSpace: Send + Sync {
    fn read(
        &self,
        offset: u64,
        length: usize,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;

    fn is_valid(&self, offset: u64, length: u64) -> bool;
}

/// Read exactly `length` bytes or fail with `InvalidAddress`.
///
/// A buffer shorter than requested is a short read and is reported as a
/// failure of the first missing byte.
pub fn read_exact(space: &dyn AddressSpace, address: u64, length: usize) -> VtypeResult<Vec<u8>> {
    let bytes = space
        .read(address, length)
        .map_err(|e| VtypeError::invalid_address(address, e.to_string()))?;
    if bytes.len() < length {
        return Err(VtypeError::invalid_address(
            address.wrapping_add(bytes.len() as u64),
            format!("short read: wanted {} bytes, got {}", length, bytes.len()),
        ));
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::SparseMemory;

    #[test]
    fn test_read_exact_ok() {
        let mem = SparseMemory::new();
        mem.write(0x100, &[1, 2, 3, 4]);
        assert_eq!(read_exact(&mem, 0x101, 2).unwrap(), vec![2, 3]);
    }

    #[test]
    fn test_read_exact_unmapped() {
        let mem = SparseMemory::new();
        match read_exact(&mem, 0x5000, 4) {
            Err(VtypeError::InvalidAddress { address, .. }) => assert_eq!(address, 0x5000),
            other => panic!("Expected InvalidAddress, got: {:?}", other),
        }
    }

    #[test]
    fn test_read_exact_short() {
        struct Short;
        impl AddressSpace for Short {
            fn read(
                &self,
                _offset: u64,
                length: usize,
            ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
                Ok(vec![0u8; length / 2])
            }
            fn is_valid(&self, _offset: u64, _length: u64) -> bool {
                true
            }
        }

        match read_exact(&Short, 0x10, 8) {
            Err(VtypeError::InvalidAddress { address, msg }) => {
                assert_eq!(address, 0x14);
                assert!(msg.contains("short read"));
            }
            other => panic!("Expected InvalidAddress, got: {:?}", other),
        }
    }
}
