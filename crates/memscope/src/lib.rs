//! memscope: memory images and profile composition for `vtype` object views.
//!
//! `vtype` knows how to interpret bytes; this crate supplies the bytes and
//! the profile:
//!
//! - [`memory`]: file-backed and in-memory layers, an LRU page cache, and
//!   [`MemoryImage`], which exposes a layer stack as a `vtype::AddressSpace`
//! - [`profile`]: overlay bundles keyed by OS/version/arch and the ordered
//!   transform pipeline that builds a [`vtype::Profile`]
//! - [`config`]: JSON configuration for both
//! - [`logging`]: tracing subscriber setup
//!
//! ```rust,ignore
//! let config = ScopeConfig::from_file("memscope.json")?;
//! memscope::logging::init_tracing(&config.log_filter);
//!
//! let image = MemoryImage::open("mem.raw", &config)?;
//! let profile = ProfilePipeline::from_config(&config)
//!     .then(AddLayouts::from_file("darwin-x64.json.xz"))
//!     .build()?;
//! let top = profile.object("radix_node_head", head_addr, &image)?.field("rnh_treetop")?;
//! for leaf in vtype::walk_radix(&top).with_limits(config.walk) {
//!     println!("{}", leaf?.describe()?);
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod profile;

pub use config::ScopeConfig;
pub use error::{Error, Result};
pub use memory::{LayerError, LayerResult, MemoryImage, MemoryLayer, ShortRead};
pub use profile::{OverlayRegistry, ProfilePipeline, ProfileTransform};
