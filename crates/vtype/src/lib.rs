//! Profile-driven typed views over raw memory.
//!
//! This crate turns `(profile, type name, offset)` into navigable typed
//! objects read from an address space. It provides:
//!
//! - Native type tables for the LP64, LLP64 and ILP32 data models
//! - A profile registry of struct layouts, field-level overlays, constants,
//!   metadata and per-type behaviors
//! - Parsing of `.json` and `.json.xz` vtype layout and overlay files
//! - `Object`, a lazy typed view with pointers, arrays with deferred counts,
//!   enumerations and bit fields
//! - Walkers for linked lists and BSD radix tries that terminate on corrupt data
//!
//! # Example
//!
//! ```rust,ignore
//! use vtype::{parse_layouts_file, walk_list, DataModel, Profile, Resolvers, TypeRef};
//!
//! let mut profile = Profile::new(DataModel::Lp64);
//! profile.add_layouts(parse_layouts_file("darwin-x64.json.xz", &Resolvers::new())?)?;
//! let ifnet = profile.constant_object("_dlil_ifnet_head", &TypeRef::pointer_to("ifnet"), &image)?;
//! for iface in walk_list(&ifnet, "if_link.tqe_next")? {
//!     println!("{}", iface?.field("if_name")?.as_string()?);
//! }
//! ```

pub mod behavior;
pub mod error;
pub mod native;
pub mod object;
pub mod parser;
pub mod profile;
pub mod space;
pub mod types;
pub mod walk;

#[cfg(test)]
mod testutil;

// Re-export key types at crate root.
pub use behavior::{Attribute, Behavior};
pub use error::{VtypeError, VtypeResult};
pub use native::{ByteOrder, DataModel, NativeType, NativeTypeTable, Scalar, WireFormat};
pub use object::{ArrayIter, EnumLabel, Object};
pub use parser::{
    parse_layouts_bytes, parse_layouts_file, parse_layouts_str, parse_overlays_bytes,
    parse_overlays_file, parse_overlays_str,
};
pub use profile::{Profile, ProfileOptions, IMAGE_BASE_KEY};
pub use space::{read_exact, AddressSpace};
pub use types::{
    FieldOverlay, FieldSpec, IntSpec, LayoutBatch, OverlayBatch, Resolver, Resolvers,
    StructLayout, StructOverlay, TypeRef, TypeResolver,
};
pub use walk::{walk_list, walk_list_entry, walk_radix, RadixFields, WalkLimits};
