//! Error types for the vtype crate.

use thiserror::Error;

/// Profile, object-view and traversal errors.
///
/// Field-level failures (`UnknownField`, `InvalidAddress`) are local to the
/// access that raised them: the parent object and its other fields stay usable.
#[derive(Debug, Error)]
pub enum VtypeError {
    #[error("Profile file not found: {0}")]
    FileNotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("XZ/LZMA decompression error: {0}")]
    Decompression(String),

    #[error("Profile parse error: {0}")]
    Parse(String),

    #[error("Invalid layout: {0}")]
    InvalidLayout(String),

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Unknown field: {field} in type {type_name}")]
    UnknownField { type_name: String, field: String },

    #[error("Invalid address {address:#x}: {msg}")]
    InvalidAddress { address: u64, msg: String },

    #[error("Unknown constant: {0}")]
    UnknownConstant(String),

    #[error("Traversal error at {address:#x}: {msg}")]
    Traversal { address: u64, msg: String },

    #[error("Overlay conflict on {type_name}.{field}: {msg}")]
    OverlayConflict {
        type_name: String,
        field: String,
        msg: String,
    },

    #[error("Index {index} out of bounds for array of {count} elements")]
    IndexOutOfBounds { index: u64, count: u64 },

    #[error("Operation '{op}' is not applicable to {type_name}")]
    NotApplicable { type_name: String, op: &'static str },
}

impl VtypeError {
    pub fn invalid_address(address: u64, msg: impl Into<String>) -> Self {
        VtypeError::InvalidAddress {
            address,
            msg: msg.into(),
        }
    }

    pub fn traversal(address: u64, msg: impl Into<String>) -> Self {
        VtypeError::Traversal {
            address,
            msg: msg.into(),
        }
    }

    pub fn unknown_field(type_name: impl Into<String>, field: impl Into<String>) -> Self {
        VtypeError::UnknownField {
            type_name: type_name.into(),
            field: field.into(),
        }
    }

    pub fn not_applicable(type_name: impl Into<String>, op: &'static str) -> Self {
        VtypeError::NotApplicable {
            type_name: type_name.into(),
            op,
        }
    }
}

pub type VtypeResult<T> = Result<T, VtypeError>;
