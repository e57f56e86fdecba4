//! Ordered profile composition.
//!
//! A profile is built by running a list of transforms, each taking the
//! profile by value and handing it back: add layouts, set metadata, apply the
//! version bundles chosen from that metadata, fix the image base. The caller
//! decides the order; the built profile is then shared read-only.
//!
//! ```rust,ignore
//! let profile = ProfilePipeline::new(DataModel::Llp64)
//!     .then(SetMetadata::new("os", "windows"))
//!     .then(AddLayouts::from_file("ntkrnlmp.json.xz"))
//!     .then(ApplyBundles::new(registry.clone()))
//!     .then(ImageBase::new(kernel_base))
//!     .build()?;
//! ```

use crate::config::ScopeConfig;
use crate::error::{Error, Result};
use crate::profile::bundles::OverlayRegistry;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use vtype::{
    parse_layouts_file, parse_overlays_file, Behavior, DataModel, LayoutBatch, OverlayBatch,
    Profile, ProfileOptions, Resolvers, VtypeResult, IMAGE_BASE_KEY,
};

/// One step of profile construction.
pub trait ProfileTransform: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, profile: Profile) -> VtypeResult<Profile>;
}

/// Struct layouts, given inline or read from a layout file.
pub struct AddLayouts {
    source: LayoutSource<LayoutBatch>,
}

enum LayoutSource<T> {
    Inline(T),
    File { path: PathBuf, resolvers: Resolvers },
}

impl AddLayouts {
    pub fn new(batch: LayoutBatch) -> Self {
        AddLayouts {
            source: LayoutSource::Inline(batch),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self::from_file_with(path, Resolvers::new())
    }

    pub fn from_file_with(path: impl Into<PathBuf>, resolvers: Resolvers) -> Self {
        AddLayouts {
            source: LayoutSource::File {
                path: path.into(),
                resolvers,
            },
        }
    }
}

impl ProfileTransform for AddLayouts {
    fn name(&self) -> &str {
        "add_layouts"
    }

    fn apply(&self, mut profile: Profile) -> VtypeResult<Profile> {
        match &self.source {
            LayoutSource::Inline(batch) => profile.add_layouts(batch.iter().cloned())?,
            LayoutSource::File { path, resolvers } => {
                profile.add_layouts(parse_layouts_file(path, resolvers)?)?
            }
        }
        Ok(profile)
    }
}

/// Overlays, given inline or read from an overlay file.
pub struct AddOverlays {
    source: LayoutSource<OverlayBatch>,
}

impl AddOverlays {
    pub fn new(batch: OverlayBatch) -> Self {
        AddOverlays {
            source: LayoutSource::Inline(batch),
        }
    }

    pub fn from_file(path: impl Into<PathBuf>, resolvers: Resolvers) -> Self {
        AddOverlays {
            source: LayoutSource::File {
                path: path.into(),
                resolvers,
            },
        }
    }
}

impl ProfileTransform for AddOverlays {
    fn name(&self) -> &str {
        "add_overlays"
    }

    fn apply(&self, mut profile: Profile) -> VtypeResult<Profile> {
        match &self.source {
            LayoutSource::Inline(batch) => profile.add_overlay(batch.iter().cloned())?,
            LayoutSource::File { path, resolvers } => {
                profile.add_overlay(parse_overlays_file(path, resolvers)?)?
            }
        }
        Ok(profile)
    }
}

/// Record a metadata fact (os, major, minor, arch, ...).
pub struct SetMetadata {
    key: String,
    value: Value,
}

impl SetMetadata {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        SetMetadata {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl ProfileTransform for SetMetadata {
    fn name(&self) -> &str {
        "set_metadata"
    }

    fn apply(&self, mut profile: Profile) -> VtypeResult<Profile> {
        profile.set_metadata(self.key.clone(), self.value.clone());
        Ok(profile)
    }
}

pub struct AddConstants {
    constants: Vec<(String, u64)>,
}

impl AddConstants {
    pub fn new<I, S>(constants: I) -> Self
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        AddConstants {
            constants: constants.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

impl ProfileTransform for AddConstants {
    fn name(&self) -> &str {
        "add_constants"
    }

    fn apply(&self, mut profile: Profile) -> VtypeResult<Profile> {
        profile.add_constants(self.constants.iter().cloned());
        Ok(profile)
    }
}

pub struct BindBehavior {
    type_name: String,
    behavior: Arc<dyn Behavior>,
}

impl BindBehavior {
    pub fn new(type_name: impl Into<String>, behavior: Arc<dyn Behavior>) -> Self {
        BindBehavior {
            type_name: type_name.into(),
            behavior,
        }
    }
}

impl ProfileTransform for BindBehavior {
    fn name(&self) -> &str {
        "bind_behavior"
    }

    fn apply(&self, mut profile: Profile) -> VtypeResult<Profile> {
        profile.bind_behavior(self.type_name.clone(), Arc::clone(&self.behavior));
        Ok(profile)
    }
}

/// Apply every bundle the registry selects from the profile's metadata, in
/// registration order. Must run after the metadata it depends on is set.
pub struct ApplyBundles {
    registry: Arc<OverlayRegistry>,
}

impl ApplyBundles {
    pub fn new(registry: Arc<OverlayRegistry>) -> Self {
        ApplyBundles { registry }
    }
}

impl ProfileTransform for ApplyBundles {
    fn name(&self) -> &str {
        "apply_bundles"
    }

    fn apply(&self, mut profile: Profile) -> VtypeResult<Profile> {
        for bundle in self.registry.select_for(&profile) {
            debug!(
                "Applying bundle '{}' ({} layouts, {} overlays)",
                bundle.name,
                bundle.layouts.len(),
                bundle.overlays.len()
            );
            profile.add_layouts(bundle.layouts.iter().cloned())?;
            profile.add_overlay(bundle.overlays.iter().cloned())?;
            profile.add_constants(bundle.constants.iter().cloned());
        }
        Ok(profile)
    }
}

/// Make constants relative to a load address (position-independent images).
pub struct ImageBase {
    base: u64,
}

impl ImageBase {
    pub fn new(base: u64) -> Self {
        ImageBase { base }
    }
}

impl ProfileTransform for ImageBase {
    fn name(&self) -> &str {
        "image_base"
    }

    fn apply(&self, mut profile: Profile) -> VtypeResult<Profile> {
        profile.set_metadata(IMAGE_BASE_KEY, format!("{:#x}", self.base));
        Ok(profile)
    }
}

/// An ad-hoc transform from a closure.
pub struct FnTransform<F> {
    name: String,
    func: F,
}

impl<F> FnTransform<F>
where
    F: Fn(Profile) -> VtypeResult<Profile> + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        FnTransform {
            name: name.into(),
            func,
        }
    }
}

impl<F> ProfileTransform for FnTransform<F>
where
    F: Fn(Profile) -> VtypeResult<Profile> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn apply(&self, profile: Profile) -> VtypeResult<Profile> {
        (self.func)(profile)
    }
}

/// Data model and options plus an ordered list of transforms.
pub struct ProfilePipeline {
    model: DataModel,
    options: ProfileOptions,
    transforms: Vec<Box<dyn ProfileTransform>>,
}

impl ProfilePipeline {
    /// Start a pipeline whose profile uses the native types of `model`.
    pub fn new(model: DataModel) -> Self {
        ProfilePipeline {
            model,
            options: ProfileOptions::default(),
            transforms: Vec::new(),
        }
    }

    /// Start a pipeline with the configured data model and profile options.
    pub fn from_config(config: &ScopeConfig) -> Self {
        Self::new(config.data_model).with_options(config.profile.clone())
    }

    pub fn with_options(mut self, options: ProfileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn then(mut self, transform: impl ProfileTransform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    pub fn transform_names(&self) -> Vec<&str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    /// Run every transform in order on a fresh profile.
    pub fn build(&self) -> Result<Profile> {
        self.apply_to(Profile::with_options(self.model, self.options.clone()))
    }

    /// Run the transforms on an existing profile.
    pub fn apply_to(&self, mut profile: Profile) -> Result<Profile> {
        for transform in &self.transforms {
            profile = transform.apply(profile).map_err(|source| Error::Transform {
                transform: transform.name().to_string(),
                source,
            })?;
        }
        info!(
            "Built {} profile with {} types after {} transform(s)",
            profile.data_model(),
            profile.type_names().count(),
            self.transforms.len()
        );
        Ok(profile)
    }
}
