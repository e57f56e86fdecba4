//! Primitive type tables for the three supported data models.
//!
//! The tables differ only in the width of `long` and `address`:
//!
//! | model | `long` | `address` |
//! |-------|--------|-----------|
//! | LP64  | 8      | 8         |
//! | LLP64 | 4      | 8         |
//! | ILP32 | 4      | 4         |

use crate::error::{VtypeError, VtypeResult};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A named combination of primitive sizes and pointer width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataModel {
    /// 64-bit unix-like systems.
    Lp64,
    /// 64-bit Windows.
    Llp64,
    /// 32-bit systems.
    Ilp32,
}

impl DataModel {
    pub fn pointer_size(self) -> usize {
        match self {
            DataModel::Lp64 | DataModel::Llp64 => 8,
            DataModel::Ilp32 => 4,
        }
    }

    pub fn long_size(self) -> usize {
        match self {
            DataModel::Lp64 => 8,
            DataModel::Llp64 | DataModel::Ilp32 => 4,
        }
    }
}

impl fmt::Display for DataModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataModel::Lp64 => "LP64",
            DataModel::Llp64 => "LLP64",
            DataModel::Ilp32 => "ILP32",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireFormat {
    SignedInt,
    UnsignedInt,
    Char,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
}

/// A decoded primitive value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scalar {
    Signed(i64),
    Unsigned(u64),
    Char(u8),
    Bool(bool),
}

impl Scalar {
    /// The value reinterpreted as an unsigned 64-bit integer.
    pub fn as_u64(self) -> u64 {
        match self {
            Scalar::Signed(v) => v as u64,
            Scalar::Unsigned(v) => v,
            Scalar::Char(c) => c as u64,
            Scalar::Bool(b) => b as u64,
        }
    }

    /// The value reinterpreted as a signed 64-bit integer.
    pub fn as_i64(self) -> i64 {
        match self {
            Scalar::Signed(v) => v,
            Scalar::Unsigned(v) => v as i64,
            Scalar::Char(c) => c as i64,
            Scalar::Bool(b) => b as i64,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Signed(v) => write!(f, "{}", v),
            Scalar::Unsigned(v) => write!(f, "{}", v),
            Scalar::Char(c) => write!(f, "{}", (*c as char).escape_default()),
            Scalar::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Encoding of one primitive: `(wire format, size, byte order)`.
///
/// Aliases resolve to the canonical descriptor, so `name` is always the
/// canonical primitive name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeType {
    pub name: &'static str,
    pub size: usize,
    pub format: WireFormat,
    pub order: ByteOrder,
}

impl NativeType {
    pub fn is_signed(&self) -> bool {
        self.format == WireFormat::SignedInt
    }

    /// Assemble the raw (unsigned, unextended) integer from `bytes`.
    pub fn raw_integer(&self, bytes: &[u8]) -> VtypeResult<u64> {
        if bytes.len() < self.size || self.size == 0 || self.size > 8 {
            return Err(VtypeError::InvalidLayout(format!(
                "cannot decode {} ({} bytes) from {} bytes",
                self.name,
                self.size,
                bytes.len()
            )));
        }
        let bytes = &bytes[..self.size];
        let mut raw = 0u64;
        match self.order {
            ByteOrder::Little => {
                for &b in bytes.iter().rev() {
                    raw = (raw << 8) | b as u64;
                }
            }
            ByteOrder::Big => {
                for &b in bytes {
                    raw = (raw << 8) | b as u64;
                }
            }
        }
        Ok(raw)
    }

    /// Decode a value of this type from the start of `bytes`.
    pub fn decode(&self, bytes: &[u8]) -> VtypeResult<Scalar> {
        let raw = self.raw_integer(bytes)?;
        Ok(match self.format {
            WireFormat::SignedInt => Scalar::Signed(sign_extend(raw, self.size)),
            WireFormat::UnsignedInt => Scalar::Unsigned(raw),
            WireFormat::Char => Scalar::Char(raw as u8),
            WireFormat::Bool => Scalar::Bool(raw != 0),
        })
    }
}

fn sign_extend(raw: u64, size: usize) -> i64 {
    let shift = 64 - (size as u32 * 8);
    ((raw << shift) as i64) >> shift
}

/// `(existing name, alias)` pairs applied identically to every table.
pub const ALIASES: &[(&str, &str)] = &[
    ("char", "signed char"),
    ("unsigned char", "byte"),
    ("short", "short int"),
    ("unsigned short", "unsigned short int"),
    ("long", "long int"),
    ("unsigned long", "unsigned long int"),
    ("unsigned long", "long unsigned int"),
    ("long long", "long long int"),
    ("unsigned long long", "unsigned long long int"),
    ("unsigned long long", "long long unsigned int"),
    ("unsigned short", "short unsigned int"),
];

/// Width of a primitive: fixed, or taken from the data model.
#[derive(Clone, Copy)]
enum Width {
    Fixed(usize),
    Long,
    Pointer,
}

const PRIMITIVES: &[(&str, Width, WireFormat, ByteOrder)] = &[
    ("bool", Width::Fixed(1), WireFormat::Bool, ByteOrder::Little),
    ("char", Width::Fixed(1), WireFormat::Char, ByteOrder::Little),
    ("unsigned char", Width::Fixed(1), WireFormat::UnsignedInt, ByteOrder::Little),
    ("short", Width::Fixed(2), WireFormat::SignedInt, ByteOrder::Little),
    ("unsigned short", Width::Fixed(2), WireFormat::UnsignedInt, ByteOrder::Little),
    ("int", Width::Fixed(4), WireFormat::SignedInt, ByteOrder::Little),
    ("unsigned int", Width::Fixed(4), WireFormat::UnsignedInt, ByteOrder::Little),
    ("long", Width::Long, WireFormat::SignedInt, ByteOrder::Little),
    ("unsigned long", Width::Long, WireFormat::UnsignedInt, ByteOrder::Little),
    ("long long", Width::Fixed(8), WireFormat::SignedInt, ByteOrder::Little),
    ("unsigned long long", Width::Fixed(8), WireFormat::UnsignedInt, ByteOrder::Little),
    ("address", Width::Pointer, WireFormat::UnsignedInt, ByteOrder::Little),
    ("unsigned be short", Width::Fixed(2), WireFormat::UnsignedInt, ByteOrder::Big),
    ("unsigned be int", Width::Fixed(4), WireFormat::UnsignedInt, ByteOrder::Big),
];

static LP64: Lazy<NativeTypeTable> = Lazy::new(|| NativeTypeTable::build(DataModel::Lp64));
static LLP64: Lazy<NativeTypeTable> = Lazy::new(|| NativeTypeTable::build(DataModel::Llp64));
static ILP32: Lazy<NativeTypeTable> = Lazy::new(|| NativeTypeTable::build(DataModel::Ilp32));

/// Primitive name → encoding table for one data model.
#[derive(Debug)]
pub struct NativeTypeTable {
    model: DataModel,
    types: HashMap<&'static str, NativeType>,
}

impl NativeTypeTable {
    /// The shared, immutable table for `model`.
    pub fn for_model(model: DataModel) -> &'static NativeTypeTable {
        match model {
            DataModel::Lp64 => &LP64,
            DataModel::Llp64 => &LLP64,
            DataModel::Ilp32 => &ILP32,
        }
    }

    fn build(model: DataModel) -> Self {
        let mut types = HashMap::with_capacity(PRIMITIVES.len() + ALIASES.len());
        for &(name, width, format, order) in PRIMITIVES {
            let size = match width {
                Width::Fixed(n) => n,
                Width::Long => model.long_size(),
                Width::Pointer => model.pointer_size(),
            };
            types.insert(
                name,
                NativeType {
                    name,
                    size,
                    format,
                    order,
                },
            );
        }
        for &(existing, alias) in ALIASES {
            if let Some(descriptor) = types.get(existing).copied() {
                types.insert(alias, descriptor);
            }
        }
        NativeTypeTable { model, types }
    }

    pub fn model(&self) -> DataModel {
        self.model
    }

    pub fn pointer_size(&self) -> usize {
        self.model.pointer_size()
    }

    pub fn get(&self, name: &str) -> Option<NativeType> {
        self.types.get(name).copied()
    }

    /// Look up a primitive (or alias) by name.
    pub fn lookup(&self, name: &str) -> VtypeResult<NativeType> {
        self.get(name)
            .ok_or_else(|| VtypeError::UnknownType(name.to_string()))
    }

    /// The pointer-sized unsigned primitive.
    pub fn address(&self) -> NativeType {
        NativeType {
            name: "address",
            size: self.pointer_size(),
            format: WireFormat::UnsignedInt,
            order: ByteOrder::Little,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.types.keys().copied()
    }
}
