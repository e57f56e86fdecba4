//! Crate-level error type.

use crate::memory::error::LayerError;
use thiserror::Error;
use vtype::VtypeError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Layer error: {0}")]
    Layer(#[from] LayerError),

    #[error("Profile error: {0}")]
    Profile(#[from] VtypeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Profile transform '{transform}' failed: {source}")]
    Transform {
        transform: String,
        #[source]
        source: VtypeError,
    },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;
