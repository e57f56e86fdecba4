//! Typed, read-only views into an address space.
//!
//! An [`Object`] is `(profile, type, offset, address space)`. Constructing one
//! never reads memory; bytes are read only when a value is asked for. Field
//! access, dereference and array indexing each build a new object, so a
//! failed access leaves the parent and its siblings untouched.
//!
//! Deferred counts, offsets and target types are evaluated against the
//! owning struct: the nearest struct object up the chain of parents.

use crate::behavior::{Attribute, Behavior};
use crate::error::{VtypeError, VtypeResult};
use crate::native::{NativeType, Scalar, WireFormat};
use crate::profile::Profile;
use crate::space::{read_exact, AddressSpace};
use crate::types::{IntSpec, StructLayout, TypeRef};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Resolved shape of an object.
#[derive(Debug, Clone)]
enum Kind {
    /// The null object: what a zero pointer dereferences to.
    Null(&'static str),
    Void,
    Native(NativeType),
    Struct(Arc<StructLayout>),
    Pointer(TypeRef),
    Array { target: TypeRef, count: IntSpec },
    Enumeration {
        base: NativeType,
        choices: Arc<BTreeMap<i64, String>>,
    },
    BitField {
        base: NativeType,
        start_bit: u32,
        end_bit: u32,
    },
    String { length: IntSpec },
}

/// Label of an enumeration value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumLabel {
    Known(String),
    /// A value missing from the choices table.
    Unknown(i64),
}

impl fmt::Display for EnumLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnumLabel::Known(name) => f.write_str(name),
            EnumLabel::Unknown(value) => write!(f, "UNKNOWN ({})", value),
        }
    }
}

#[derive(Clone)]
pub struct Object<'a> {
    profile: &'a Profile,
    space: &'a dyn AddressSpace,
    kind: Kind,
    type_name: String,
    offset: u64,
    parent: Option<Arc<Object<'a>>>,
    behavior: Option<Arc<dyn Behavior>>,
}

impl<'a> Object<'a> {
    /// Build an object of `type_ref` at `offset` with no parent.
    pub fn from_type(
        profile: &'a Profile,
        space: &'a dyn AddressSpace,
        type_ref: &TypeRef,
        offset: u64,
    ) -> VtypeResult<Self> {
        Self::build(profile, space, type_ref, offset, None)
    }

    /// The null object, standing in for the target of a zero pointer.
    pub fn null(profile: &'a Profile, space: &'a dyn AddressSpace, type_name: impl Into<String>) -> Self {
        Object {
            profile,
            space,
            kind: Kind::Null("NULL pointer"),
            type_name: type_name.into(),
            offset: 0,
            parent: None,
            behavior: None,
        }
    }

    fn build(
        profile: &'a Profile,
        space: &'a dyn AddressSpace,
        type_ref: &TypeRef,
        offset: u64,
        parent: Option<Arc<Object<'a>>>,
    ) -> VtypeResult<Self> {
        let kind = match type_ref {
            TypeRef::Deferred(resolver) => {
                let owner = owning_struct(parent.as_deref()).ok_or_else(|| {
                    VtypeError::InvalidLayout(format!(
                        "deferred type '{}' has no owning struct",
                        resolver.name()
                    ))
                })?;
                let concrete = resolver.resolve(owner)?;
                return Self::build(profile, space, &concrete, offset, parent);
            }
            TypeRef::Named(name) if name == "void" => Kind::Void,
            TypeRef::Named(name) => match profile.layout(name) {
                Some(layout) => Kind::Struct(Arc::clone(layout)),
                None => Kind::Native(profile.native_types().lookup(name)?),
            },
            TypeRef::Void => Kind::Void,
            TypeRef::Pointer(target) => Kind::Pointer((**target).clone()),
            TypeRef::Array { target, count } => Kind::Array {
                target: (**target).clone(),
                count: count.clone(),
            },
            TypeRef::Enumeration { base, choices } => Kind::Enumeration {
                base: profile.native_types().lookup(base)?,
                choices: Arc::clone(choices),
            },
            TypeRef::BitField {
                base,
                start_bit,
                end_bit,
            } => {
                let base = profile.native_types().lookup(base)?;
                if start_bit >= end_bit || *end_bit as usize > base.size * 8 {
                    return Err(VtypeError::InvalidLayout(format!(
                        "bit range [{}, {}) does not fit {}",
                        start_bit, end_bit, base.name
                    )));
                }
                Kind::BitField {
                    base,
                    start_bit: *start_bit,
                    end_bit: *end_bit,
                }
            }
            TypeRef::String { length } => Kind::String {
                length: length.clone(),
            },
        };
        let type_name = type_ref.display_name();
        let behavior = profile.behavior(&type_name).cloned();
        Ok(Object {
            profile,
            space,
            kind,
            type_name,
            offset,
            parent,
            behavior,
        })
    }

    fn null_like(&self, type_name: impl Into<String>) -> Self {
        Object::null(self.profile, self.space, type_name)
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn profile(&self) -> &'a Profile {
        self.profile
    }

    pub fn space(&self) -> &'a dyn AddressSpace {
        self.space
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Absolute address of this object.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn parent(&self) -> Option<&Object<'a>> {
        self.parent.as_deref()
    }

    /// The struct that deferred parameters of this object are resolved against.
    pub fn owner(&self) -> Option<&Object<'a>> {
        owning_struct(self.parent.as_deref())
    }

    pub fn is_null(&self) -> bool {
        matches!(self.kind, Kind::Null(_))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, Kind::Struct(_))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, Kind::Pointer(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, Kind::Array { .. })
    }

    /// The struct layout behind this object, if it is a struct.
    pub fn layout(&self) -> Option<&StructLayout> {
        match &self.kind {
            Kind::Struct(layout) => Some(layout),
            _ => None,
        }
    }

    /// Whether the object's first byte is readable.
    pub fn is_valid(&self) -> bool {
        !self.is_null() && self.space.is_valid(self.offset, 1)
    }

    /// Size in bytes; arrays and strings evaluate deferred lengths.
    pub fn size(&self) -> VtypeResult<u64> {
        match &self.kind {
            Kind::Null(_) | Kind::Void => Ok(0),
            Kind::Native(nt) => Ok(nt.size as u64),
            Kind::Struct(layout) => Ok(layout.size),
            Kind::Pointer(_) => Ok(self.profile.pointer_size() as u64),
            Kind::Array { .. } => {
                let count = self.count()?;
                if count == 0 {
                    return Ok(0);
                }
                Ok(count.saturating_mul(self.element(0)?.size()?))
            }
            Kind::Enumeration { base, .. } | Kind::BitField { base, .. } => Ok(base.size as u64),
            Kind::String { .. } => self.string_length(),
        }
    }

    /// Length of a string, clamped to the profile's `max_string_length`.
    fn string_length(&self) -> VtypeResult<u64> {
        let Kind::String { length } = &self.kind else {
            return Err(VtypeError::not_applicable(&self.type_name, "string_length"));
        };
        let length = self.resolve_int(length)?;
        let max = self.profile.options().max_string_length;
        if length > max {
            warn!(
                "String {} at {:#x} claims {} bytes, clamping to {}",
                self.type_name, self.offset, length, max
            );
            return Ok(max);
        }
        Ok(length)
    }

    fn resolve_int(&self, spec: &IntSpec) -> VtypeResult<u64> {
        match spec {
            IntSpec::Fixed(n) => Ok(*n),
            IntSpec::Deferred(resolver) => {
                let owner = self.owner().ok_or_else(|| {
                    VtypeError::InvalidLayout(format!(
                        "deferred value '{}' on {} has no owning struct",
                        resolver.name(),
                        self.type_name
                    ))
                })?;
                resolver.resolve(owner)
            }
        }
    }

    fn read(&self, length: usize) -> VtypeResult<Vec<u8>> {
        read_exact(self.space, self.offset, length)
    }

    /// Raw bytes covering this object.
    pub fn bytes(&self) -> VtypeResult<Vec<u8>> {
        let size = self.size()?;
        let length = usize::try_from(size).map_err(|_| {
            VtypeError::InvalidLayout(format!("{} is too large to read ({} bytes)", self.type_name, size))
        })?;
        self.read(length)
    }

    // ── Scalars ────────────────────────────────────────────────────

    /// Decoded scalar value. The null object reads as 0.
    pub fn value(&self) -> VtypeResult<Scalar> {
        match &self.kind {
            Kind::Null(_) => Ok(Scalar::Unsigned(0)),
            Kind::Native(nt) => nt.decode(&self.read(nt.size)?),
            Kind::Pointer(_) => Ok(Scalar::Unsigned(self.pointer_value()?)),
            Kind::Enumeration { base, .. } => base.decode(&self.read(base.size)?),
            Kind::BitField {
                base,
                start_bit,
                end_bit,
            } => {
                let raw = base.raw_integer(&self.read(base.size)?)?;
                let width = end_bit - start_bit;
                let mask = if width >= 64 { u64::MAX } else { (1u64 << width) - 1 };
                Ok(Scalar::Unsigned((raw >> start_bit) & mask))
            }
            _ => Err(VtypeError::not_applicable(&self.type_name, "value")),
        }
    }

    /// The address stored in a pointer.
    pub fn pointer_value(&self) -> VtypeResult<u64> {
        match &self.kind {
            Kind::Null(_) => Ok(0),
            Kind::Pointer(_) => {
                let address = self.profile.native_types().address();
                Ok(address.decode(&self.read(address.size)?)?.as_u64())
            }
            _ => Err(VtypeError::not_applicable(&self.type_name, "pointer_value")),
        }
    }

    /// Label of an enumeration value; unmapped values are `Unknown`.
    pub fn enum_label(&self) -> VtypeResult<EnumLabel> {
        match &self.kind {
            Kind::Enumeration { choices, .. } => {
                let value = self.value()?.as_i64();
                Ok(match choices.get(&value) {
                    Some(name) => EnumLabel::Known(name.clone()),
                    None => EnumLabel::Unknown(value),
                })
            }
            _ => Err(VtypeError::not_applicable(&self.type_name, "enum_label")),
        }
    }

    /// Text of a string, a byte array, or whatever a pointer points to.
    pub fn as_string(&self) -> VtypeResult<String> {
        match &self.kind {
            Kind::Null(_) => Ok(String::new()),
            Kind::String { .. } => {
                let length = self.string_length()?;
                Ok(c_string(&self.read(length as usize)?))
            }
            Kind::Array { target, .. } if is_byte_type(self.profile, target) => {
                let count = self.count()?;
                Ok(c_string(&self.read(count as usize)?))
            }
            Kind::Pointer(_) => self.deref()?.as_string(),
            _ => Err(VtypeError::not_applicable(&self.type_name, "as_string")),
        }
    }

    // ── Navigation ─────────────────────────────────────────────────

    /// Child field of a struct. Pointers are followed transparently and the
    /// null object yields further null objects.
    pub fn field(&self, name: &str) -> VtypeResult<Object<'a>> {
        match &self.kind {
            Kind::Null(_) => Ok(self.null_like(name)),
            Kind::Struct(layout) => {
                let spec = layout
                    .get(name)
                    .ok_or_else(|| VtypeError::unknown_field(&self.type_name, name))?;
                let relative = match &spec.offset {
                    IntSpec::Fixed(n) => *n,
                    IntSpec::Deferred(resolver) => resolver.resolve(self)?,
                };
                Object::build(
                    self.profile,
                    self.space,
                    &spec.type_ref,
                    self.offset.wrapping_add(relative),
                    Some(Arc::new(self.clone())),
                )
            }
            Kind::Pointer(_) => self.deref()?.field(name),
            _ => Err(VtypeError::not_applicable(&self.type_name, "field")),
        }
    }

    /// Follow a dotted field path such as `if_link.tqe_next`.
    pub fn path(&self, path: &str) -> VtypeResult<Object<'a>> {
        let mut current = self.clone();
        for part in path.split('.').filter(|p| !p.is_empty()) {
            current = current.field(part)?;
        }
        Ok(current)
    }

    /// A behavior-provided attribute, or else the layout field of that name.
    pub fn attribute(&self, name: &str) -> VtypeResult<Attribute<'a>> {
        if let Some(behavior) = &self.behavior {
            if let Some(result) = behavior.attribute(self, name) {
                return result;
            }
        }
        self.field(name).map(Attribute::Object)
    }

    /// The pointer's target, or the null object for a zero pointer.
    pub fn deref(&self) -> VtypeResult<Object<'a>> {
        match &self.kind {
            Kind::Pointer(target) => {
                let target = target.clone();
                self.deref_to(&target)
            }
            Kind::Null(_) => Ok(self.clone()),
            _ => Err(VtypeError::not_applicable(&self.type_name, "deref")),
        }
    }

    /// Dereference as a different target type than the declared one.
    pub fn deref_as(&self, type_name: &str) -> VtypeResult<Object<'a>> {
        match &self.kind {
            Kind::Pointer(_) => self.deref_to(&TypeRef::named(type_name)),
            Kind::Null(_) => Ok(self.null_like(type_name)),
            _ => Err(VtypeError::not_applicable(&self.type_name, "deref_as")),
        }
    }

    fn deref_to(&self, target: &TypeRef) -> VtypeResult<Object<'a>> {
        let address = self.pointer_value()?;
        if address == 0 {
            return Ok(self.null_like(target.display_name()));
        }
        Object::build(
            self.profile,
            self.space,
            target,
            address,
            Some(Arc::new(self.clone())),
        )
    }

    /// Reinterpret the same address as another type.
    pub fn cast(&self, type_name: &str) -> VtypeResult<Object<'a>> {
        if self.is_null() {
            return Ok(self.null_like(type_name));
        }
        Object::build(
            self.profile,
            self.space,
            &TypeRef::named(type_name),
            self.offset,
            self.parent.clone(),
        )
    }

    // ── Arrays ─────────────────────────────────────────────────────

    /// Number of array elements, clamped to the profile's `max_array_count`.
    pub fn count(&self) -> VtypeResult<u64> {
        match &self.kind {
            Kind::Null(_) => Ok(0),
            Kind::Array { count, .. } => {
                let count = self.resolve_int(count)?;
                let max = self.profile.options().max_array_count;
                if count > max {
                    warn!(
                        "Array {} at {:#x} claims {} elements, clamping to {}",
                        self.type_name, self.offset, count, max
                    );
                    return Ok(max);
                }
                Ok(count)
            }
            _ => Err(VtypeError::not_applicable(&self.type_name, "count")),
        }
    }

    fn element(&self, index: u64) -> VtypeResult<Object<'a>> {
        let Kind::Array { target, .. } = &self.kind else {
            return Err(VtypeError::not_applicable(&self.type_name, "index"));
        };
        let parent = Arc::new(self.clone());
        let first = Object::build(self.profile, self.space, target, self.offset, Some(Arc::clone(&parent)))?;
        if index == 0 {
            return Ok(first);
        }
        let stride = first.size()?;
        Object::build(
            self.profile,
            self.space,
            target,
            self.offset.wrapping_add(index.wrapping_mul(stride)),
            Some(parent),
        )
    }

    /// Element `index`, bounds-checked against the current count.
    pub fn at(&self, index: u64) -> VtypeResult<Object<'a>> {
        let count = self.count()?;
        if index >= count {
            return Err(VtypeError::IndexOutOfBounds { index, count });
        }
        self.element(index)
    }

    /// Lazily iterate the elements. The count is evaluated now, so iterating
    /// again re-evaluates it.
    pub fn iter(&self) -> VtypeResult<ArrayIter<'a>> {
        let count = self.count()?;
        let (target, stride) = match &self.kind {
            Kind::Array { target, .. } if count > 0 => (target.clone(), self.element(0)?.size()?),
            _ => (TypeRef::Void, 0),
        };
        Ok(ArrayIter {
            array: Arc::new(self.clone()),
            target,
            stride,
            index: 0,
            count,
        })
    }

    // ── Rendering ──────────────────────────────────────────────────

    /// Short textual rendering of the object.
    pub fn describe(&self) -> VtypeResult<String> {
        if let Some(behavior) = &self.behavior {
            if let Some(result) = behavior.describe(self) {
                return result;
            }
        }
        match &self.kind {
            Kind::Null(_) => Ok("-".to_string()),
            Kind::Void => Ok(format!("[void @ {:#x}]", self.offset)),
            Kind::Native(_) | Kind::BitField { .. } => Ok(self.value()?.to_string()),
            Kind::Enumeration { .. } => Ok(self.enum_label()?.to_string()),
            Kind::Pointer(target) => Ok(format!(
                "<{} pointer to {:#x}>",
                target.display_name(),
                self.pointer_value()?
            )),
            Kind::String { .. } => self.as_string(),
            Kind::Array { target, .. } if is_byte_type(self.profile, target) => self.as_string(),
            Kind::Array { .. } => Ok(format!("[{} count={} @ {:#x}]", self.type_name, self.count()?, self.offset)),
            Kind::Struct(_) => Ok(format!("[{} @ {:#x}]", self.type_name, self.offset)),
        }
    }
}

impl fmt::Debug for Object<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Kind::Null(reason) = self.kind {
            return write!(f, "Object(null {}: {})", self.type_name, reason);
        }
        write!(f, "Object({} @ {:#x})", self.type_name, self.offset)
    }
}

/// Lazy iterator over array elements.
pub struct ArrayIter<'a> {
    array: Arc<Object<'a>>,
    target: TypeRef,
    stride: u64,
    index: u64,
    count: u64,
}

impl<'a> Iterator for ArrayIter<'a> {
    type Item = VtypeResult<Object<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.count {
            return None;
        }
        let offset = self
            .array
            .offset
            .wrapping_add(self.index.wrapping_mul(self.stride));
        self.index += 1;
        Some(Object::build(
            self.array.profile,
            self.array.space,
            &self.target,
            offset,
            Some(Arc::clone(&self.array)),
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.count - self.index) as usize;
        (remaining, Some(remaining))
    }
}

fn owning_struct<'o, 'a>(mut current: Option<&'o Object<'a>>) -> Option<&'o Object<'a>> {
    while let Some(obj) = current {
        if obj.is_struct() {
            return Some(obj);
        }
        current = obj.parent.as_deref();
    }
    None
}

fn is_byte_type(profile: &Profile, target: &TypeRef) -> bool {
    match target {
        TypeRef::Named(name) => profile.layout(name).is_none()
            && profile
                .native_types()
                .get(name)
                .map(|nt| nt.size == 1 && nt.format != WireFormat::Bool)
                .unwrap_or(false),
        _ => false,
    }
}

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
