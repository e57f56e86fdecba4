//! Per-type behaviors bound to struct names.
//!
//! A behavior adds derived accessors and custom rendering to every object of
//! the type name it is bound to. Objects look their behavior up by name when
//! they are constructed; types without a binding use the plain layout view.

use crate::error::VtypeResult;
use crate::native::Scalar;
use crate::object::Object;
use std::fmt;

/// Result of an attribute lookup on an object.
pub enum Attribute<'a> {
    Object(Object<'a>),
    Scalar(Scalar),
    Text(String),
}

impl<'a> Attribute<'a> {
    /// The attribute as an object, if it is one.
    pub fn into_object(self) -> Option<Object<'a>> {
        match self {
            Attribute::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Render the attribute for display.
    pub fn describe(&self) -> VtypeResult<String> {
        match self {
            Attribute::Object(obj) => obj.describe(),
            Attribute::Scalar(s) => Ok(s.to_string()),
            Attribute::Text(t) => Ok(t.clone()),
        }
    }
}

impl fmt::Debug for Attribute<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attribute::Object(obj) => f.debug_tuple("Object").field(obj).finish(),
            Attribute::Scalar(s) => f.debug_tuple("Scalar").field(s).finish(),
            Attribute::Text(t) => f.debug_tuple("Text").field(t).finish(),
        }
    }
}

pub trait Behavior: Send + Sync {
    /// Derived accessor `name`, or `None` to fall back to the layout field.
    fn attribute<'a>(&self, obj: &Object<'a>, name: &str) -> Option<VtypeResult<Attribute<'a>>> {
        let _ = (obj, name);
        None
    }

    /// Custom rendering, or `None` for the generic one.
    fn describe(&self, obj: &Object<'_>) -> Option<VtypeResult<String>> {
        let _ = obj;
        None
    }
}
