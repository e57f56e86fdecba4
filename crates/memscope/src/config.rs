//! Runtime configuration, loaded from JSON.
//!
//! ```json
//! {
//!   "data_model": "LLP64",
//!   "short_read": "zero_fill",
//!   "page_cache_pages": 2048,
//!   "profile": { "strict_overlays": true },
//!   "walk": { "max_list_entries": 4096 },
//!   "log_filter": "memscope=debug,vtype=info"
//! }
//! ```
//!
//! Every key is optional.

use crate::error::{Error, Result};
use crate::memory::layers::cached::DEFAULT_CACHE_PAGES;
use crate::memory::traits::ShortRead;
use serde::{Deserialize, Serialize};
use std::path::Path;
use vtype::{DataModel, ProfileOptions, WalkLimits};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    pub data_model: DataModel,
    /// What image layers do with reads past mapped data.
    pub short_read: ShortRead,
    /// Pages held by the LRU page cache; 0 disables it.
    pub page_cache_pages: usize,
    pub profile: ProfileOptions,
    pub walk: WalkLimits,
    /// Used when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        ScopeConfig {
            data_model: DataModel::Lp64,
            short_read: ShortRead::Fail,
            page_cache_pages: DEFAULT_CACHE_PAGES,
            profile: ProfileOptions::default(),
            walk: WalkLimits::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl ScopeConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }
}
