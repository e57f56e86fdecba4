//! Layout parser: handles both plain JSON and .json.xz compressed files.
//!
//! Layouts use the tagged-tuple vtype format:
//!
//! ```text
//! { "_LIST_ENTRY": [16, {
//!     "Flink": [0, ["Pointer", {"target": "_LIST_ENTRY"}]],
//!     "Blink": [8, ["Pointer", {"target": "_LIST_ENTRY"}]]
//! }]}
//! ```
//!
//! Overlays have the same shape, with `null` meaning "inherit" for the size,
//! a whole field, or either half of a field.

use crate::error::{VtypeError, VtypeResult};
use crate::types::{
    FieldOverlay, FieldSpec, IntSpec, LayoutBatch, OverlayBatch, Resolver, Resolvers,
    StructLayout, StructOverlay, TypeRef,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use xz2::read::XzDecoder;

/// Length given to `String` fields that declare none.
const DEFAULT_STRING_LENGTH: u64 = 1024;

#[derive(Debug, Deserialize)]
struct RawStruct(Option<u64>, BTreeMap<String, Option<RawField>>);

#[derive(Debug, Deserialize)]
struct RawField(Option<Value>, Option<Value>);

/// Read a layout file, decompressing `.xz` files first.
fn read_file(path: &Path) -> VtypeResult<Vec<u8>> {
    if !path.exists() {
        return Err(VtypeError::FileNotFound(path.display().to_string()));
    }

    let file = File::open(path)
        .map_err(|e| VtypeError::Io(format!("opening {}: {}", path.display(), e)))?;
    let mut buf = Vec::new();
    if path.to_string_lossy().to_lowercase().ends_with(".xz") {
        XzDecoder::new(BufReader::new(file))
            .read_to_end(&mut buf)
            .map_err(|e| VtypeError::Decompression(format!("{}: {}", path.display(), e)))?;
    } else {
        BufReader::new(file)
            .read_to_end(&mut buf)
            .map_err(|e| VtypeError::Io(format!("reading {}: {}", path.display(), e)))?;
    }
    Ok(buf)
}

fn decode(json_bytes: &[u8]) -> VtypeResult<BTreeMap<String, RawStruct>> {
    serde_json::from_slice(json_bytes).map_err(|e| VtypeError::Parse(e.to_string()))
}

// ── Layouts ────────────────────────────────────────────────────────

/// Parse a layout batch from a filesystem path (`.json` or `.json.xz`).
pub fn parse_layouts_file(path: impl AsRef<Path>, resolvers: &Resolvers) -> VtypeResult<LayoutBatch> {
    parse_layouts_bytes(&read_file(path.as_ref())?, resolvers)
}

/// Parse a layout batch from raw JSON bytes (already decompressed).
pub fn parse_layouts_bytes(json_bytes: &[u8], resolvers: &Resolvers) -> VtypeResult<LayoutBatch> {
    decode(json_bytes)?
        .into_iter()
        .map(|(name, raw)| convert_layout(name, raw, resolvers))
        .collect()
}

pub fn parse_layouts_str(json_str: &str, resolvers: &Resolvers) -> VtypeResult<LayoutBatch> {
    parse_layouts_bytes(json_str.as_bytes(), resolvers)
}

fn convert_layout(name: String, raw: RawStruct, resolvers: &Resolvers) -> VtypeResult<StructLayout> {
    let RawStruct(size, raw_fields) = raw;
    let size = size.ok_or_else(|| VtypeError::Parse(format!("{}: layout has no size", name)))?;

    let mut fields = HashMap::with_capacity(raw_fields.len());
    for (field, raw_field) in raw_fields {
        let (offset, typedef) = match raw_field {
            Some(RawField(Some(offset), Some(typedef))) => (offset, typedef),
            _ => {
                return Err(VtypeError::Parse(format!(
                    "{}.{}: layout fields need both offset and type",
                    name, field
                )))
            }
        };
        let offset = parse_int(&offset, resolvers)
            .map_err(|e| VtypeError::Parse(format!("{}.{}: {}", name, field, e)))?;
        let type_ref = parse_typedef(&typedef, resolvers)
            .map_err(|e| VtypeError::Parse(format!("{}.{}: {}", name, field, e)))?;
        fields.insert(field, FieldSpec { offset, type_ref });
    }

    Ok(StructLayout { name, size, fields })
}

// ── Overlays ───────────────────────────────────────────────────────

pub fn parse_overlays_file(path: impl AsRef<Path>, resolvers: &Resolvers) -> VtypeResult<OverlayBatch> {
    parse_overlays_bytes(&read_file(path.as_ref())?, resolvers)
}

pub fn parse_overlays_bytes(json_bytes: &[u8], resolvers: &Resolvers) -> VtypeResult<OverlayBatch> {
    decode(json_bytes)?
        .into_iter()
        .map(|(name, raw)| convert_overlay(name, raw, resolvers))
        .collect()
}

pub fn parse_overlays_str(json_str: &str, resolvers: &Resolvers) -> VtypeResult<OverlayBatch> {
    parse_overlays_bytes(json_str.as_bytes(), resolvers)
}

fn convert_overlay(name: String, raw: RawStruct, resolvers: &Resolvers) -> VtypeResult<StructOverlay> {
    let RawStruct(size, raw_fields) = raw;
    let mut fields = HashMap::with_capacity(raw_fields.len());
    for (field, raw_field) in raw_fields {
        let patch = match raw_field {
            None => None,
            Some(RawField(offset, typedef)) => {
                let context = |e: String| VtypeError::Parse(format!("{}.{}: {}", name, field, e));
                let offset = match offset {
                    Some(v) => Some(parse_int(&v, resolvers).map_err(context)?),
                    None => None,
                };
                let type_ref = match typedef {
                    Some(v) => Some(parse_typedef(&v, resolvers).map_err(context)?),
                    None => None,
                };
                Some(FieldOverlay { offset, type_ref })
            }
        };
        fields.insert(field, patch);
    }
    Ok(StructOverlay { name, size, fields })
}

// ── Type descriptors ───────────────────────────────────────────────

/// `12`, `{"field": "path"}` or `{"resolver": "name"}`.
fn parse_int(value: &Value, resolvers: &Resolvers) -> Result<IntSpec, String> {
    if let Some(n) = value.as_u64() {
        return Ok(IntSpec::Fixed(n));
    }
    let obj = value
        .as_object()
        .ok_or_else(|| format!("expected integer or object, got {}", value))?;
    if let Some(path) = obj.get("field").and_then(Value::as_str) {
        return Ok(IntSpec::Deferred(Resolver::field(path)));
    }
    if let Some(name) = obj.get("resolver").and_then(Value::as_str) {
        return resolvers
            .count(name)
            .cloned()
            .map(IntSpec::Deferred)
            .ok_or_else(|| format!("unknown resolver '{}'", name));
    }
    Err(format!("cannot interpret {} as an integer", value))
}

/// `["Kind", {kwargs}]`, or a bare type name.
fn parse_typedef(value: &Value, resolvers: &Resolvers) -> Result<TypeRef, String> {
    match value {
        Value::String(name) => Ok(named(name)),
        Value::Array(items) => {
            let kind = items
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| "type descriptor must start with a name".to_string())?;
            let empty = Map::new();
            let kwargs = match items.get(1) {
                Some(Value::Object(map)) => map,
                Some(Value::Null) | None => &empty,
                Some(other) => return Err(format!("bad arguments for {}: {}", kind, other)),
            };
            parse_kind(kind, kwargs, resolvers)
        }
        _ => Err(format!("bad type descriptor: {}", value)),
    }
}

fn parse_kind(kind: &str, kwargs: &Map<String, Value>, resolvers: &Resolvers) -> Result<TypeRef, String> {
    match kind {
        "Pointer" => Ok(TypeRef::pointer(parse_target(kwargs, resolvers)?)),
        "Array" => {
            let count = kwargs
                .get("count")
                .ok_or_else(|| "Array needs a count".to_string())
                .and_then(|v| parse_int(v, resolvers))?;
            Ok(TypeRef::array(parse_target(kwargs, resolvers)?, count))
        }
        "Enumeration" => {
            let base = str_arg(kwargs, "target").unwrap_or("unsigned int");
            let mut choices = BTreeMap::new();
            if let Some(map) = kwargs.get("choices").and_then(Value::as_object) {
                for (key, label) in map {
                    let key: i64 = key
                        .parse()
                        .map_err(|_| format!("enumeration key '{}' is not an integer", key))?;
                    let label = label
                        .as_str()
                        .ok_or_else(|| format!("enumeration label for {} is not a string", key))?;
                    choices.insert(key, label.to_string());
                }
            }
            Ok(TypeRef::enumeration(base, choices))
        }
        "BitField" => {
            let start_bit = u32_arg(kwargs, "start_bit")?;
            let end_bit = u32_arg(kwargs, "end_bit")?;
            let base = str_arg(kwargs, "target").unwrap_or("unsigned int");
            Ok(TypeRef::bitfield(base, start_bit, end_bit))
        }
        "String" => {
            let length = match kwargs.get("length") {
                Some(v) => parse_int(v, resolvers)?,
                None => IntSpec::Fixed(DEFAULT_STRING_LENGTH),
            };
            Ok(TypeRef::string(length))
        }
        other => Ok(named(other)),
    }
}

/// `target` plus optional `target_args`, or a deferred `{"resolver": name}`.
fn parse_target(kwargs: &Map<String, Value>, resolvers: &Resolvers) -> Result<TypeRef, String> {
    match kwargs.get("target") {
        None => Ok(TypeRef::Void),
        Some(Value::String(name)) => match kwargs.get("target_args") {
            Some(Value::Object(args)) => parse_kind(name, args, resolvers),
            _ => Ok(named(name)),
        },
        Some(Value::Object(obj)) => {
            let name = obj
                .get("resolver")
                .and_then(Value::as_str)
                .ok_or_else(|| "target object must name a resolver".to_string())?;
            resolvers
                .target(name)
                .cloned()
                .map(TypeRef::Deferred)
                .ok_or_else(|| format!("unknown type resolver '{}'", name))
        }
        Some(other) => Err(format!("bad target: {}", other)),
    }
}

fn named(name: &str) -> TypeRef {
    if name == "void" {
        TypeRef::Void
    } else {
        TypeRef::named(name)
    }
}

fn str_arg<'m>(kwargs: &'m Map<String, Value>, key: &str) -> Option<&'m str> {
    kwargs.get(key).and_then(Value::as_str)
}

fn u32_arg(kwargs: &Map<String, Value>, key: &str) -> Result<u32, String> {
    kwargs
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| format!("missing or invalid '{}'", key))
}
