//! Profile composition: version-specific overlay bundles and the ordered
//! transform pipeline that builds a profile from them.

pub mod bundles;
pub mod pipeline;

pub use bundles::{BundleKey, OsVersion, OverlayBundle, OverlayRegistry, VersionRange};
pub use pipeline::{
    AddConstants, AddLayouts, AddOverlays, ApplyBundles, BindBehavior, FnTransform, ImageBase,
    ProfilePipeline, ProfileTransform, SetMetadata,
};
