//! Profile registry: struct layouts, overlays, constants, metadata and
//! behavior bindings for one memory image.
//!
//! A profile is built incrementally with `&mut self` calls and then shared
//! read-only (typically behind an `Arc`) while objects borrow it. Overlays
//! are kept as an ordered list and re-applied on top of the base layout
//! whenever either changes, so a later `add_layouts` that replaces a struct
//! still carries the corrections that were registered for it.

use crate::behavior::Behavior;
use crate::error::{VtypeError, VtypeResult};
use crate::native::{DataModel, NativeTypeTable};
use crate::object::Object;
use crate::space::AddressSpace;
use crate::types::{FieldSpec, StructLayout, StructOverlay, TypeRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Metadata key holding the image base that relative constants are shifted by.
pub const IMAGE_BASE_KEY: &str = "image_base";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileOptions {
    /// Reject overlays that change a field to an incompatible kind of type.
    pub strict_overlays: bool,
    /// Upper bound applied to array counts read from memory.
    pub max_array_count: u64,
    /// Upper bound in bytes applied to string lengths read from memory.
    pub max_string_length: u64,
}

impl Default for ProfileOptions {
    fn default() -> Self {
        ProfileOptions {
            strict_overlays: false,
            max_array_count: 100_000,
            max_string_length: 0x10000,
        }
    }
}

pub struct Profile {
    native: &'static NativeTypeTable,
    base: HashMap<String, StructLayout>,
    overlays: Vec<StructOverlay>,
    /// Base layouts with every overlay applied, rebuilt on change.
    resolved: HashMap<String, Arc<StructLayout>>,
    constants: HashMap<String, u64>,
    metadata: HashMap<String, Value>,
    behaviors: HashMap<String, Arc<dyn Behavior>>,
    options: ProfileOptions,
}

impl Profile {
    pub fn new(model: DataModel) -> Self {
        Self::with_options(model, ProfileOptions::default())
    }

    pub fn with_options(model: DataModel, options: ProfileOptions) -> Self {
        Profile {
            native: NativeTypeTable::for_model(model),
            base: HashMap::new(),
            overlays: Vec::new(),
            resolved: HashMap::new(),
            constants: HashMap::new(),
            metadata: HashMap::new(),
            behaviors: HashMap::new(),
            options,
        }
    }

    pub fn data_model(&self) -> DataModel {
        self.native.model()
    }

    pub fn native_types(&self) -> &'static NativeTypeTable {
        self.native
    }

    pub fn pointer_size(&self) -> usize {
        self.native.pointer_size()
    }

    pub fn options(&self) -> &ProfileOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: ProfileOptions) {
        self.options = options;
    }

    // ── Layouts and overlays ───────────────────────────────────────

    /// Insert or fully replace struct definitions.
    ///
    /// The batch is applied as a whole: if any merged layout is rejected the
    /// profile is left as it was.
    pub fn add_layouts(&mut self, batch: impl IntoIterator<Item = StructLayout>) -> VtypeResult<()> {
        let mut previous = Vec::new();
        for layout in batch {
            if self.base.contains_key(&layout.name) {
                debug!("Replacing layout {}", layout.name);
            }
            let name = layout.name.clone();
            let old = self.base.insert(name.clone(), layout);
            previous.push((name, old));
        }
        let names: Vec<String> = previous.iter().map(|(name, _)| name.clone()).collect();
        match self.merge_all(&names) {
            Ok(merged) => {
                self.commit(merged);
                Ok(())
            }
            Err(e) => {
                for (name, old) in previous.into_iter().rev() {
                    match old {
                        Some(layout) => self.base.insert(name, layout),
                        None => self.base.remove(&name),
                    };
                }
                Err(e)
            }
        }
    }

    /// Register field-level corrections on top of the base layouts.
    ///
    /// Later overlays win for the same field; overlays never delete fields.
    /// Registering an overlay equal to one already recorded moves it to the
    /// end instead of recording it twice. A rejected batch leaves the profile
    /// unchanged.
    pub fn add_overlay(&mut self, batch: impl IntoIterator<Item = StructOverlay>) -> VtypeResult<()> {
        let saved = self.overlays.clone();
        let mut names = Vec::new();
        for overlay in batch {
            if self.options.strict_overlays {
                if let Some(current) = self.resolved.get(&overlay.name) {
                    if let Err(e) = check_overlay(self, current, &overlay) {
                        self.overlays = saved;
                        return Err(e);
                    }
                }
            }
            if !names.contains(&overlay.name) {
                names.push(overlay.name.clone());
            }
            self.overlays.retain(|existing| *existing != overlay);
            self.overlays.push(overlay);
        }
        match self.merge_all(&names) {
            Ok(merged) => {
                self.commit(merged);
                Ok(())
            }
            Err(e) => {
                self.overlays = saved;
                Err(e)
            }
        }
    }

    fn merge_all(&self, names: &[String]) -> VtypeResult<Vec<(String, Option<StructLayout>)>> {
        names
            .iter()
            .map(|name| Ok((name.clone(), self.merge(name)?)))
            .collect()
    }

    /// Base layout of `name` with its overlays applied, checked in strict mode.
    fn merge(&self, name: &str) -> VtypeResult<Option<StructLayout>> {
        let mut layout = self.base.get(name).cloned();
        for overlay in self.overlays.iter().filter(|o| o.name == name) {
            layout = apply_overlay(layout, overlay);
        }
        if let (Some(merged), Some(base)) = (&layout, self.base.get(name)) {
            if self.options.strict_overlays {
                check_layout_against_base(self, base, merged)?;
            }
        }
        Ok(layout)
    }

    fn commit(&mut self, merged: Vec<(String, Option<StructLayout>)>) {
        for (name, layout) in merged {
            match layout {
                Some(layout) => {
                    self.resolved.insert(name, Arc::new(layout));
                }
                None => {
                    debug!("Overlay for {} is pending a base layout", name);
                    self.resolved.remove(&name);
                }
            }
        }
    }

    /// The effective layout of a struct (base plus overlays).
    pub fn layout(&self, name: &str) -> Option<&Arc<StructLayout>> {
        self.resolved.get(name)
    }

    pub fn get_layout(&self, name: &str) -> VtypeResult<Arc<StructLayout>> {
        self.layout(name)
            .cloned()
            .ok_or_else(|| VtypeError::UnknownType(name.to_string()))
    }

    /// The layout as originally added, before overlays.
    pub fn base_layout(&self, name: &str) -> Option<&StructLayout> {
        self.base.get(name)
    }

    pub fn overlays(&self) -> &[StructOverlay] {
        &self.overlays
    }

    pub fn has_type(&self, name: &str) -> bool {
        name == "void" || self.resolved.contains_key(name) || self.native.get(name).is_some()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.resolved.keys().map(|s| s.as_str())
    }

    /// Byte size of a type when it does not depend on memory contents.
    pub fn static_size(&self, type_ref: &TypeRef) -> VtypeResult<Option<u64>> {
        Ok(match type_ref {
            TypeRef::Named(name) if name == "void" => Some(0),
            TypeRef::Named(name) => {
                if let Some(layout) = self.layout(name) {
                    Some(layout.size)
                } else {
                    Some(self.native.lookup(name)?.size as u64)
                }
            }
            TypeRef::Void => Some(0),
            TypeRef::Pointer(_) => Some(self.pointer_size() as u64),
            TypeRef::Array { target, count } => match (count.fixed(), self.static_size(target)?) {
                (Some(n), Some(elem)) => Some(n.saturating_mul(elem)),
                _ => None,
            },
            TypeRef::Enumeration { base, .. } | TypeRef::BitField { base, .. } => {
                Some(self.native.lookup(base)?.size as u64)
            }
            TypeRef::String { length } => length.fixed(),
            TypeRef::Deferred(_) => None,
        })
    }

    // ── Behaviors ──────────────────────────────────────────────────

    pub fn bind_behavior(&mut self, type_name: impl Into<String>, behavior: Arc<dyn Behavior>) {
        self.behaviors.insert(type_name.into(), behavior);
    }

    pub fn behavior(&self, type_name: &str) -> Option<&Arc<dyn Behavior>> {
        self.behaviors.get(type_name)
    }

    // ── Constants ──────────────────────────────────────────────────

    pub fn add_constants<I, S>(&mut self, constants: I)
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        for (name, value) in constants {
            self.constants.insert(name.into(), value);
        }
    }

    pub fn set_constant(&mut self, name: impl Into<String>, value: u64) {
        self.constants.insert(name.into(), value);
    }

    /// Image base derived from the `image_base` metadata entry (0 if unset).
    ///
    /// Accepts a JSON number or a hex string such as `"0xfffff80002a00000"`.
    pub fn image_base(&self) -> u64 {
        match self.metadata.get(IMAGE_BASE_KEY) {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(Value::String(s)) => parse_u64(s).unwrap_or(0),
            _ => 0,
        }
    }

    /// Look up a named constant, optionally shifted by the image base.
    pub fn get_constant(&self, name: &str, relative_to_image_base: bool) -> VtypeResult<u64> {
        let value = *self
            .constants
            .get(name)
            .ok_or_else(|| VtypeError::UnknownConstant(name.to_string()))?;
        if relative_to_image_base {
            Ok(value.wrapping_add(self.image_base()))
        } else {
            Ok(value)
        }
    }

    /// The closest constant at or below `address`, as `(address, name)`.
    ///
    /// Constants are treated as image-base relative; addresses below the image
    /// base have no nearest constant.
    pub fn nearest_constant(&self, address: u64) -> Option<(u64, &str)> {
        let base = self.image_base();
        let relative = address.checked_sub(base)?;
        self.constants
            .iter()
            .filter(|(_, value)| **value <= relative)
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(name, &value)| (value + base, name.as_str()))
    }

    /// An object of `type_ref` at the (image-base relative) address of a constant.
    pub fn constant_object<'a>(
        &'a self,
        name: &str,
        type_ref: &TypeRef,
        space: &'a dyn AddressSpace,
    ) -> VtypeResult<Object<'a>> {
        let address = self.get_constant(name, true)?;
        Object::from_type(self, space, type_ref, address)
    }

    /// An object of the named type at `offset`.
    pub fn object<'a>(
        &'a self,
        type_name: &str,
        offset: u64,
        space: &'a dyn AddressSpace,
    ) -> VtypeResult<Object<'a>> {
        Object::from_type(self, space, &TypeRef::named(type_name), offset)
    }

    // ── Metadata ───────────────────────────────────────────────────

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }
}

impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("model", &self.data_model())
            .field("layouts", &self.resolved.len())
            .field("overlays", &self.overlays.len())
            .field("constants", &self.constants.len())
            .field("behaviors", &self.behaviors.keys().collect::<Vec<_>>())
            .field("metadata", &self.metadata)
            .finish()
    }
}

fn parse_u64(s: &str) -> Option<u64> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// Merge one overlay into an optional base layout.
fn apply_overlay(layout: Option<StructLayout>, overlay: &StructOverlay) -> Option<StructLayout> {
    let mut layout = match (layout, overlay.size) {
        (Some(layout), _) => layout,
        // An overlay with an explicit size may define a struct on its own.
        (None, Some(size)) => StructLayout::new(overlay.name.clone(), size),
        (None, None) => return None,
    };
    if let Some(size) = overlay.size {
        layout.size = size;
    }
    for (name, patch) in &overlay.fields {
        let Some(patch) = patch else { continue };
        match layout.fields.get_mut(name) {
            Some(existing) => {
                if let Some(offset) = &patch.offset {
                    existing.offset = offset.clone();
                }
                if let Some(type_ref) = &patch.type_ref {
                    existing.type_ref = type_ref.clone();
                }
            }
            None => match (&patch.offset, &patch.type_ref) {
                (Some(offset), Some(type_ref)) => {
                    layout
                        .fields
                        .insert(name.clone(), FieldSpec::new(offset.clone(), type_ref.clone()));
                }
                _ => {
                    warn!(
                        "Overlay field {}.{} has no base definition and is incomplete, ignoring",
                        overlay.name, name
                    );
                }
            },
        }
    }
    Some(layout)
}

/// Broad storage class used to judge whether an override is compatible.
#[derive(Debug, PartialEq, Eq)]
enum StorageClass {
    Integer,
    Pointer,
    Sequence,
    Struct,
    Opaque,
}

fn storage_class(profile: &Profile, type_ref: &TypeRef) -> StorageClass {
    match type_ref {
        TypeRef::Named(name) if name == "address" => StorageClass::Pointer,
        TypeRef::Named(name) if profile.base.contains_key(name) || profile.resolved.contains_key(name) => {
            StorageClass::Struct
        }
        TypeRef::Named(_) | TypeRef::Enumeration { .. } | TypeRef::BitField { .. } => StorageClass::Integer,
        TypeRef::Pointer(_) => StorageClass::Pointer,
        TypeRef::Array { .. } | TypeRef::String { .. } => StorageClass::Sequence,
        TypeRef::Void | TypeRef::Deferred(_) => StorageClass::Opaque,
    }
}

fn check_field(profile: &Profile, struct_name: &str, field: &str, old: &TypeRef, new: &TypeRef) -> VtypeResult<()> {
    let (old_class, new_class) = (storage_class(profile, old), storage_class(profile, new));
    if old_class == StorageClass::Opaque || new_class == StorageClass::Opaque {
        return Ok(());
    }
    if old_class != new_class {
        return Err(VtypeError::OverlayConflict {
            type_name: struct_name.to_string(),
            field: field.to_string(),
            msg: format!(
                "{} ({:?}) cannot be replaced by {} ({:?})",
                old.display_name(),
                old_class,
                new.display_name(),
                new_class
            ),
        });
    }
    if old_class == StorageClass::Integer {
        if let (Ok(Some(a)), Ok(Some(b))) = (profile.static_size(old), profile.static_size(new)) {
            if a != b {
                return Err(VtypeError::OverlayConflict {
                    type_name: struct_name.to_string(),
                    field: field.to_string(),
                    msg: format!("width changes from {} to {} bytes", a, b),
                });
            }
        }
    }
    Ok(())
}

fn check_overlay(profile: &Profile, current: &StructLayout, overlay: &StructOverlay) -> VtypeResult<()> {
    for (name, patch) in &overlay.fields {
        let (Some(patch), Some(existing)) = (patch, current.fields.get(name)) else {
            continue;
        };
        if let Some(new) = &patch.type_ref {
            check_field(profile, &current.name, name, &existing.type_ref, new)?;
        }
    }
    Ok(())
}

fn check_layout_against_base(profile: &Profile, base: &StructLayout, merged: &StructLayout) -> VtypeResult<()> {
    for (name, spec) in &base.fields {
        if let Some(merged_spec) = merged.fields.get(name) {
            if merged_spec.type_ref != spec.type_ref {
                check_field(profile, &base.name, name, &spec.type_ref, &merged_spec.type_ref)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_layout() -> StructLayout {
        StructLayout::new("node", 16)
            .field("tag", 0u64, TypeRef::named("int"))
            .field("flags", 4u64, TypeRef::named("unsigned int"))
            .field("next", 8u64, TypeRef::pointer_to("node"))
    }

    #[test]
    fn test_add_and_replace_layouts() {
        let mut profile = Profile::new(DataModel::Lp64);
        profile.add_layouts([node_layout()]).unwrap();
        assert_eq!(profile.get_layout("node").unwrap().size, 16);

        profile
            .add_layouts([StructLayout::new("node", 24).field("tag", 0u64, TypeRef::named("long"))])
            .unwrap();
        let layout = profile.get_layout("node").unwrap();
        assert_eq!(layout.size, 24);
        assert_eq!(layout.fields.len(), 1);

        assert!(matches!(profile.get_layout("missing"), Err(VtypeError::UnknownType(_))));
    }

    #[test]
    fn test_overlay_only_touches_named_field() {
        let mut profile = Profile::new(DataModel::Lp64);
        profile.add_layouts([node_layout()]).unwrap();
        let before = profile.get_layout("node").unwrap();

        let overlay = StructOverlay::new("node")
            .retype("flags", TypeRef::enumeration("unsigned int", [(1, "ACTIVE")]))
            .inherit("tag");
        profile.add_overlay([overlay.clone()]).unwrap();
        let after = profile.get_layout("node").unwrap();

        assert_eq!(after.fields["tag"], before.fields["tag"]);
        assert_eq!(after.fields["next"], before.fields["next"]);
        assert_eq!(after.fields["flags"].offset, before.fields["flags"].offset);
        assert_ne!(after.fields["flags"].type_ref, before.fields["flags"].type_ref);

        // Re-applying the same overlay is a no-op.
        profile.add_overlay([overlay.clone(), overlay]).unwrap();
        assert_eq!(*profile.get_layout("node").unwrap(), *after);
        assert_eq!(profile.overlays().len(), 1);
    }

    #[test]
    fn test_reapplied_overlay_moves_to_end() {
        let mut profile = Profile::new(DataModel::Lp64);
        profile.add_layouts([node_layout()]).unwrap();
        let signed = StructOverlay::new("node").retype("flags", TypeRef::named("int"));
        let bits = StructOverlay::new("node").retype("flags", TypeRef::bitfield("unsigned int", 0, 4));

        profile.add_overlay([signed.clone(), bits]).unwrap();
        profile.add_overlay([signed]).unwrap();
        assert_eq!(profile.overlays().len(), 2);
        assert_eq!(
            profile.get_layout("node").unwrap().fields["flags"].type_ref,
            TypeRef::named("int")
        );
    }

    #[test]
    fn test_overlay_last_writer_wins_and_survives_replacement() {
        let mut profile = Profile::new(DataModel::Lp64);
        profile.add_layouts([node_layout()]).unwrap();
        profile
            .add_overlay([StructOverlay::new("node").retype("flags", TypeRef::named("int"))])
            .unwrap();
        profile
            .add_overlay([StructOverlay::new("node").retype("flags", TypeRef::bitfield("unsigned int", 0, 4))])
            .unwrap();
        assert_eq!(
            profile.get_layout("node").unwrap().fields["flags"].type_ref,
            TypeRef::bitfield("unsigned int", 0, 4)
        );

        // A newer generator output replaces the base; the overlay still applies.
        profile.add_layouts([node_layout().field("extra", 12u64, TypeRef::named("int"))]).unwrap();
        let layout = profile.get_layout("node").unwrap();
        assert!(layout.fields.contains_key("extra"));
        assert_eq!(layout.fields["flags"].type_ref, TypeRef::bitfield("unsigned int", 0, 4));
    }

    #[test]
    fn test_overlay_pending_until_base_arrives() {
        let mut profile = Profile::new(DataModel::Lp64);
        profile
            .add_overlay([StructOverlay::new("node").retype("tag", TypeRef::named("unsigned int"))])
            .unwrap();
        assert!(profile.layout("node").is_none());

        profile.add_layouts([node_layout()]).unwrap();
        assert_eq!(
            profile.get_layout("node").unwrap().fields["tag"].type_ref,
            TypeRef::named("unsigned int")
        );
    }

    #[test]
    fn test_overlay_adds_field_and_defines_struct() {
        let mut profile = Profile::new(DataModel::Lp64);
        profile.add_layouts([node_layout()]).unwrap();
        profile
            .add_overlay([
                StructOverlay::new("node").field("tail", 12u64, TypeRef::named("unsigned int")),
                StructOverlay::new("header").with_size(4).field("magic", 0u64, TypeRef::string(4u64)),
            ])
            .unwrap();
        assert_eq!(profile.get_layout("node").unwrap().fields.len(), 4);
        assert_eq!(profile.get_layout("header").unwrap().size, 4);
    }

    #[test]
    fn test_strict_overlay_conflict() {
        let options = ProfileOptions {
            strict_overlays: true,
            ..ProfileOptions::default()
        };
        let mut profile = Profile::with_options(DataModel::Lp64, options);
        profile.add_layouts([node_layout()]).unwrap();

        // Same width integer: fine.
        profile
            .add_overlay([StructOverlay::new("node").retype("flags", TypeRef::enumeration("unsigned int", [(0, "NONE")]))])
            .unwrap();

        // Integer to pointer: rejected.
        let err = profile
            .add_overlay([StructOverlay::new("node").retype("tag", TypeRef::pointer_to("node"))])
            .unwrap_err();
        assert!(matches!(err, VtypeError::OverlayConflict { .. }));

        // Width change: rejected.
        let err = profile
            .add_overlay([StructOverlay::new("node").retype("tag", TypeRef::named("long long"))])
            .unwrap_err();
        assert!(matches!(err, VtypeError::OverlayConflict { .. }));
    }

    #[test]
    fn test_rejected_overlay_batch_leaves_profile_unchanged() {
        let options = ProfileOptions {
            strict_overlays: true,
            ..ProfileOptions::default()
        };
        let mut profile = Profile::with_options(DataModel::Lp64, options);
        profile.add_layouts([node_layout()]).unwrap();
        let before = profile.get_layout("node").unwrap();

        let err = profile
            .add_overlay([
                StructOverlay::new("node").retype("flags", TypeRef::enumeration("unsigned int", [(1, "ACTIVE")])),
                StructOverlay::new("node").retype("tag", TypeRef::pointer_to("node")),
            ])
            .unwrap_err();
        assert!(matches!(err, VtypeError::OverlayConflict { .. }));
        assert!(profile.overlays().is_empty());
        assert_eq!(*profile.get_layout("node").unwrap(), *before);

        // An unrelated overlay later does not resurrect the rejected one.
        profile.add_overlay([StructOverlay::new("node").inherit("next")]).unwrap();
        assert_eq!(
            profile.get_layout("node").unwrap().fields["flags"].type_ref,
            TypeRef::named("unsigned int")
        );
    }

    #[test]
    fn test_rejected_layout_batch_leaves_profile_unchanged() {
        let options = ProfileOptions {
            strict_overlays: true,
            ..ProfileOptions::default()
        };
        let mut profile = Profile::with_options(DataModel::Lp64, options);
        profile.add_layouts([node_layout()]).unwrap();
        profile
            .add_overlay([StructOverlay::new("node").retype("tag", TypeRef::bitfield("int", 0, 4))])
            .unwrap();
        let before = profile.get_layout("node").unwrap();

        // The new base turns `tag` into a pointer, which the overlay cannot patch.
        let replacement = StructLayout::new("node", 16)
            .field("tag", 0u64, TypeRef::pointer_to("node"))
            .field("next", 8u64, TypeRef::pointer_to("node"));
        let err = profile
            .add_layouts([StructLayout::new("leaf", 8), replacement])
            .unwrap_err();
        assert!(matches!(err, VtypeError::OverlayConflict { .. }));

        assert!(!profile.has_type("leaf"));
        assert!(profile.base_layout("leaf").is_none());
        assert_eq!(*profile.base_layout("node").unwrap(), node_layout());
        assert_eq!(*profile.get_layout("node").unwrap(), *before);
    }

    #[test]
    fn test_constants_and_image_base() {
        let mut profile = Profile::new(DataModel::Llp64);
        profile.add_constants([("PsActiveProcessHead", 0x100u64), ("KiInitialProcess", 0x400u64)]);

        assert_eq!(profile.get_constant("PsActiveProcessHead", true).unwrap(), 0x100);
        profile.set_metadata(IMAGE_BASE_KEY, "0xfffff80000000000");
        assert_eq!(
            profile.get_constant("PsActiveProcessHead", true).unwrap(),
            0xfffff80000000100
        );
        assert_eq!(profile.get_constant("PsActiveProcessHead", false).unwrap(), 0x100);
        assert!(matches!(
            profile.get_constant("Missing", false),
            Err(VtypeError::UnknownConstant(_))
        ));

        assert_eq!(
            profile.nearest_constant(0xfffff80000000410),
            Some((0xfffff80000000400, "KiInitialProcess"))
        );
        assert_eq!(
            profile.nearest_constant(0xfffff80000000200),
            Some((0xfffff80000000100, "PsActiveProcessHead"))
        );
        assert_eq!(profile.nearest_constant(0x1000), None);
    }

    #[test]
    fn test_metadata() {
        let mut profile = Profile::new(DataModel::Lp64);
        profile.set_metadata("arch", "AMD64");
        profile.set_metadata("major", 6);
        assert_eq!(profile.metadata_str("arch"), Some("AMD64"));
        assert_eq!(profile.metadata("major").and_then(|v| v.as_u64()), Some(6));
        assert!(profile.metadata("minor").is_none());
    }

    #[test]
    fn test_static_size() {
        let mut profile = Profile::new(DataModel::Ilp32);
        profile.add_layouts([node_layout()]).unwrap();
        assert_eq!(profile.static_size(&TypeRef::pointer_to("node")).unwrap(), Some(4));
        assert_eq!(
            profile.static_size(&TypeRef::array(TypeRef::named("node"), 3u64)).unwrap(),
            Some(48)
        );
        assert_eq!(
            profile
                .static_size(&TypeRef::array(TypeRef::named("int"), crate::types::Resolver::field("tag")))
                .unwrap(),
            None
        );
        assert!(profile.static_size(&TypeRef::named("nope")).is_err());
    }
}
