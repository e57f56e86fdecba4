//! Type references, struct layouts and overlays.
//!
//! A [`StructLayout`] is the generator's view of a struct: a size plus
//! `field name → (offset, type)`. A [`StructOverlay`] is a partial patch of
//! the same shape where anything left as `None` inherits the base definition.
//! Counts, offsets and target types may be deferred: a resolver is stored in
//! the layout and evaluated against the owning struct object at read time.

use crate::error::VtypeResult;
use crate::object::Object;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

type IntFn = dyn for<'a> Fn(&Object<'a>) -> VtypeResult<u64> + Send + Sync;
type TypeFn = dyn for<'a> Fn(&Object<'a>) -> VtypeResult<TypeRef> + Send + Sync;

/// Deferred integer: computed from the owning struct each time it is needed.
#[derive(Clone)]
pub enum Resolver {
    /// Value of a (dotted) field path in the owning struct.
    Field(String),
    /// Caller-supplied function.
    Custom { name: Arc<str>, func: Arc<IntFn> },
}

impl Resolver {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: for<'a> Fn(&Object<'a>) -> VtypeResult<u64> + Send + Sync + 'static,
    {
        Resolver::Custom {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    pub fn field(path: impl Into<String>) -> Self {
        Resolver::Field(path.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Resolver::Field(path) => path,
            Resolver::Custom { name, .. } => name,
        }
    }

    pub fn resolve(&self, owner: &Object<'_>) -> VtypeResult<u64> {
        match self {
            Resolver::Field(path) => Ok(owner.path(path)?.value()?.as_u64()),
            Resolver::Custom { func, .. } => func(owner),
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolver::Field(path) => write!(f, "Resolver::Field({})", path),
            Resolver::Custom { name, .. } => write!(f, "Resolver::Custom({})", name),
        }
    }
}

impl PartialEq for Resolver {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Resolver::Field(a), Resolver::Field(b)) => a == b,
            (Resolver::Custom { name: a, func: fa }, Resolver::Custom { name: b, func: fb }) => {
                a == b && Arc::ptr_eq(fa, fb)
            }
            _ => false,
        }
    }
}

/// Deferred target type, chosen from the owning struct at read time.
#[derive(Clone)]
pub struct TypeResolver {
    name: Arc<str>,
    func: Arc<TypeFn>,
}

impl TypeResolver {
    pub fn new<F>(name: &str, func: F) -> Self
    where
        F: for<'a> Fn(&Object<'a>) -> VtypeResult<TypeRef> + Send + Sync + 'static,
    {
        TypeResolver {
            name: Arc::from(name),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolve(&self, owner: &Object<'_>) -> VtypeResult<TypeRef> {
        (self.func)(owner)
    }
}

impl fmt::Debug for TypeResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeResolver({})", self.name)
    }
}

impl PartialEq for TypeResolver {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.func, &other.func)
    }
}

/// An integer that is either known up front or deferred.
#[derive(Debug, Clone, PartialEq)]
pub enum IntSpec {
    Fixed(u64),
    Deferred(Resolver),
}

impl IntSpec {
    pub fn fixed(&self) -> Option<u64> {
        match self {
            IntSpec::Fixed(n) => Some(*n),
            IntSpec::Deferred(_) => None,
        }
    }
}

impl From<u64> for IntSpec {
    fn from(n: u64) -> Self {
        IntSpec::Fixed(n)
    }
}

impl From<Resolver> for IntSpec {
    fn from(r: Resolver) -> Self {
        IntSpec::Deferred(r)
    }
}

/// What a field (or pointer/array target) is.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    /// A struct layout or a native primitive, looked up in that order.
    Named(String),
    Void,
    Pointer(Box<TypeRef>),
    Array { target: Box<TypeRef>, count: IntSpec },
    Enumeration {
        base: String,
        choices: Arc<BTreeMap<i64, String>>,
    },
    /// Bits `[start_bit, end_bit)` of the base integer.
    BitField {
        base: String,
        start_bit: u32,
        end_bit: u32,
    },
    /// NUL-terminated byte string of at most `length` bytes.
    String { length: IntSpec },
    Deferred(TypeResolver),
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named(name.into())
    }

    pub fn pointer(target: TypeRef) -> Self {
        TypeRef::Pointer(Box::new(target))
    }

    pub fn pointer_to(name: impl Into<String>) -> Self {
        TypeRef::pointer(TypeRef::named(name))
    }

    pub fn array(target: TypeRef, count: impl Into<IntSpec>) -> Self {
        TypeRef::Array {
            target: Box::new(target),
            count: count.into(),
        }
    }

    pub fn enumeration<I, S>(base: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = (i64, S)>,
        S: Into<String>,
    {
        TypeRef::Enumeration {
            base: base.into(),
            choices: Arc::new(choices.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }

    pub fn bitfield(base: impl Into<String>, start_bit: u32, end_bit: u32) -> Self {
        TypeRef::BitField {
            base: base.into(),
            start_bit,
            end_bit,
        }
    }

    pub fn string(length: impl Into<IntSpec>) -> Self {
        TypeRef::String {
            length: length.into(),
        }
    }

    pub fn deferred(resolver: TypeResolver) -> Self {
        TypeRef::Deferred(resolver)
    }

    /// Human-readable name, e.g. `Pointer<_LIST_ENTRY>`.
    pub fn display_name(&self) -> String {
        match self {
            TypeRef::Named(name) => name.clone(),
            TypeRef::Void => "void".to_string(),
            TypeRef::Pointer(target) => format!("Pointer<{}>", target.display_name()),
            TypeRef::Array { target, .. } => format!("Array<{}>", target.display_name()),
            TypeRef::Enumeration { base, .. } => format!("Enumeration<{}>", base),
            TypeRef::BitField {
                base,
                start_bit,
                end_bit,
            } => format!("BitField<{}, {}, {}>", base, start_bit, end_bit),
            TypeRef::String { .. } => "String".to_string(),
            TypeRef::Deferred(r) => format!("Deferred<{}>", r.name()),
        }
    }
}

/// Placement of one field within its struct.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    /// Offset relative to the owning struct's start.
    pub offset: IntSpec,
    pub type_ref: TypeRef,
}

impl FieldSpec {
    pub fn new(offset: impl Into<IntSpec>, type_ref: TypeRef) -> Self {
        FieldSpec {
            offset: offset.into(),
            type_ref,
        }
    }
}

/// A struct definition as produced by a layout generator.
#[derive(Debug, Clone, PartialEq)]
pub struct StructLayout {
    pub name: String,
    pub size: u64,
    pub fields: HashMap<String, FieldSpec>,
}

impl StructLayout {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        StructLayout {
            name: name.into(),
            size,
            fields: HashMap::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, offset: impl Into<IntSpec>, type_ref: TypeRef) -> Self {
        self.fields.insert(name.into(), FieldSpec::new(offset, type_ref));
        self
    }

    pub fn get(&self, field: &str) -> Option<&FieldSpec> {
        self.fields.get(field)
    }
}

/// Partial replacement for one field; `None` parts inherit the base.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldOverlay {
    pub offset: Option<IntSpec>,
    pub type_ref: Option<TypeRef>,
}

/// Field-level patch for one struct.
///
/// A field mapped to `None` is an explicit "inherit unchanged" and is a no-op,
/// exactly like a field that is not mentioned at all.
#[derive(Debug, Clone, PartialEq)]
pub struct StructOverlay {
    pub name: String,
    pub size: Option<u64>,
    pub fields: HashMap<String, Option<FieldOverlay>>,
}

impl StructOverlay {
    pub fn new(name: impl Into<String>) -> Self {
        StructOverlay {
            name: name.into(),
            size: None,
            fields: HashMap::new(),
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Replace a field's type, keeping its offset.
    pub fn retype(mut self, field: impl Into<String>, type_ref: TypeRef) -> Self {
        self.fields.insert(
            field.into(),
            Some(FieldOverlay {
                offset: None,
                type_ref: Some(type_ref),
            }),
        );
        self
    }

    /// Replace (or add) a field with both offset and type.
    pub fn field(mut self, field: impl Into<String>, offset: impl Into<IntSpec>, type_ref: TypeRef) -> Self {
        self.fields.insert(
            field.into(),
            Some(FieldOverlay {
                offset: Some(offset.into()),
                type_ref: Some(type_ref),
            }),
        );
        self
    }

    pub fn inherit(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into(), None);
        self
    }
}

pub type LayoutBatch = Vec<StructLayout>;
pub type OverlayBatch = Vec<StructOverlay>;

/// Named resolvers that ingested layouts may refer to with `{"resolver": name}`.
#[derive(Debug, Clone, Default)]
pub struct Resolvers {
    counts: HashMap<String, Resolver>,
    types: HashMap<String, TypeResolver>,
}

impl Resolvers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_count<F>(&mut self, name: &str, func: F) -> &mut Self
    where
        F: for<'a> Fn(&Object<'a>) -> VtypeResult<u64> + Send + Sync + 'static,
    {
        self.counts.insert(name.to_string(), Resolver::new(name, func));
        self
    }

    pub fn register_type<F>(&mut self, name: &str, func: F) -> &mut Self
    where
        F: for<'a> Fn(&Object<'a>) -> VtypeResult<TypeRef> + Send + Sync + 'static,
    {
        self.types.insert(name.to_string(), TypeResolver::new(name, func));
        self
    }

    pub fn count(&self, name: &str) -> Option<&Resolver> {
        self.counts.get(name)
    }

    pub fn target(&self, name: &str) -> Option<&TypeResolver> {
        self.types.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names() {
        let t = TypeRef::array(TypeRef::pointer_to("radix_node_head"), 32u64);
        assert_eq!(t.display_name(), "Array<Pointer<radix_node_head>>");
        assert_eq!(TypeRef::bitfield("unsigned int", 0, 3).display_name(), "BitField<unsigned int, 0, 3>");
    }

    #[test]
    fn test_resolver_equality() {
        assert_eq!(Resolver::field("count"), Resolver::field("count"));
        assert_ne!(Resolver::field("count"), Resolver::field("NumberOfRuns"));

        let custom = Resolver::new("three", |_obj| Ok(3));
        assert_eq!(custom, custom.clone());
        assert_ne!(custom, Resolver::new("three", |_obj| Ok(3)));
    }

    #[test]
    fn test_overlay_builder() {
        let overlay = StructOverlay::new("_DMP_HEADER")
            .retype("DumpType", TypeRef::enumeration("unsigned int", [(1, "Full Dump")]))
            .inherit("Signature");
        assert_eq!(overlay.fields.len(), 2);
        assert!(overlay.fields["Signature"].is_none());
        assert!(overlay.fields["DumpType"].as_ref().unwrap().offset.is_none());
    }
}
