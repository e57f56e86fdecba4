//! Error types for memory layers.

use thiserror::Error;

/// Errors that can occur while reading a memory layer.
#[derive(Error, Debug)]
pub enum LayerError {
    /// An address is not valid in the layer.
    #[error("Invalid address {invalid_address:#x} in layer '{layer_name}': {message}")]
    InvalidAddress {
        layer_name: String,
        invalid_address: u64,
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The layer has been destroyed and cannot be used.
    #[error("Layer '{0}' has been destroyed")]
    LayerDestroyed(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A buffer segment would cover bytes another segment already maps.
    #[error("Segment [{base:#x}, {end:#x}) overlaps the segment at {existing:#x}")]
    SegmentOverlap { base: u64, end: u64, existing: u64 },

    #[error("Memory mapping error: {0}")]
    Mmap(String),
}

impl LayerError {
    pub fn invalid_address(layer_name: impl Into<String>, addr: u64, msg: impl Into<String>) -> Self {
        LayerError::InvalidAddress {
            layer_name: layer_name.into(),
            invalid_address: addr,
            message: msg.into(),
        }
    }

    pub fn layer_destroyed(name: impl Into<String>) -> Self {
        LayerError::LayerDestroyed(name.into())
    }

    /// The failing address, for errors that carry one.
    pub fn address(&self) -> Option<u64> {
        match self {
            LayerError::InvalidAddress { invalid_address, .. } => Some(*invalid_address),
            _ => None,
        }
    }
}

/// Result type for layer operations.
pub type LayerResult<T> = Result<T, LayerError>;
