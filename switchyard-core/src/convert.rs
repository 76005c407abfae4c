//! Scalar type conversion.
//!
//! [`TypeConverter`] is the binder's fast path: it turns one loosely-typed
//! value (usually a string pulled from the query, form or headers) into the
//! scalar a parameter declares. Aggregates and collections are not handled
//! here; the binder falls back to the serialization service for those.
//!
//! Conversion rules, in order:
//!
//! 1. a null input into a nullable target stays null
//! 2. a null input into a value type yields that type's default, computed once
//!    per type and memoized in a concurrent cache
//! 3. `Option<T>` targets are unwrapped one level
//! 4. enums match member names case-insensitively
//! 5. `Uuid` accepts its canonical text form or 16 raw bytes
//! 6. everything else goes through general scalar parsing

use crate::error::ConversionError;
use crate::logging::trace;
use crate::types::{Primitive, TypeInfo};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// A single converted (or convertible) value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Char(char),
    Int(i64),
    UInt(u64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
    Uuid(Uuid),
    /// Declared spelling of an enum member
    Enum(String),
    Bytes(Vec<u8>),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// JSON form of the value, as handed to typed extraction.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Char(c) => Value::String(c.to_string()),
            Scalar::Int(i) => Value::from(*i),
            Scalar::UInt(u) => Value::from(*u),
            Scalar::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Scalar::String(s) | Scalar::Enum(s) => Value::String(s.clone()),
            Scalar::DateTime(dt) => Value::String(dt.to_rfc3339()),
            Scalar::Uuid(id) => Value::String(id.hyphenated().to_string()),
            Scalar::Bytes(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Char(c) => write!(f, "{}", c),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::UInt(u) => write!(f, "{}", u),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::String(s) | Scalar::Enum(s) => f.write_str(s),
            Scalar::DateTime(dt) => f.write_str(&dt.to_rfc3339()),
            Scalar::Uuid(id) => write!(f, "{}", id.hyphenated()),
            Scalar::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::String(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Scalar::String(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i64> for Scalar {
    fn from(v: i64) -> Self {
        Scalar::Int(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Float(v)
    }
}

impl From<Vec<u8>> for Scalar {
    fn from(v: Vec<u8>) -> Self {
        Scalar::Bytes(v)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// Produces the default value of a value type.
///
/// The converter memoizes whatever the factory returns, so a factory is
/// consulted at most once per type.
pub trait DefaultFactory: Send + Sync {
    fn create(&self, ty: &TypeInfo) -> Scalar;
}

/// Zero, `false`, the empty string, the Unix epoch, the nil UUID, or an enum's
/// first member.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroDefaults;

impl DefaultFactory for ZeroDefaults {
    fn create(&self, ty: &TypeInfo) -> Scalar {
        match ty {
            TypeInfo::Primitive(p) => match p {
                Primitive::Bool => Scalar::Bool(false),
                Primitive::Char => Scalar::Char('\0'),
                Primitive::I8 | Primitive::I16 | Primitive::I32 | Primitive::I64 => Scalar::Int(0),
                Primitive::U8 | Primitive::U16 | Primitive::U32 | Primitive::U64 => {
                    Scalar::UInt(0)
                }
                Primitive::F32 | Primitive::F64 => Scalar::Float(0.0),
                Primitive::String => Scalar::String(String::new()),
                Primitive::DateTime => Scalar::DateTime(DateTime::<Utc>::UNIX_EPOCH),
                Primitive::Uuid => Scalar::Uuid(Uuid::nil()),
            },
            TypeInfo::Enum(info) => info
                .variants
                .first()
                .map(|v| Scalar::Enum(v.clone()))
                .unwrap_or(Scalar::Null),
            _ => Scalar::Null,
        }
    }
}

/// Converts single values to declared scalar types.
///
/// Cheap to share: wrap it in an `Arc` and hand it to every binder. The
/// default-value cache tolerates concurrent first-use races.
pub struct TypeConverter {
    defaults: DashMap<String, Scalar>,
    factory: Arc<dyn DefaultFactory>,
}

impl TypeConverter {
    pub fn new() -> Self {
        Self::with_factory(ZeroDefaults)
    }

    /// Use a custom source of default values.
    pub fn with_factory(factory: impl DefaultFactory + 'static) -> Self {
        Self {
            defaults: DashMap::new(),
            factory: Arc::new(factory),
        }
    }

    /// Default value of `ty`; `Null` for anything that is not a value type.
    pub fn default_value(&self, ty: &TypeInfo) -> Scalar {
        if !ty.is_value_type() {
            return Scalar::Null;
        }

        let key = cache_key(ty);
        if let Some(cached) = self.defaults.get(&key) {
            return cached.value().clone();
        }

        // entry() holds the shard lock, so racing callers wait for one factory call
        self.defaults
            .entry(key)
            .or_insert_with(|| {
                trace!(target_type = %ty, "Computing default value");
                self.factory.create(ty)
            })
            .value()
            .clone()
    }

    /// Number of types with a memoized default.
    pub fn cached_defaults(&self) -> usize {
        self.defaults.len()
    }

    /// Convert `value` to `target`.
    pub fn convert(&self, value: impl Into<Scalar>, target: &TypeInfo) -> Result<Scalar, ConversionError> {
        let value = value.into();

        if value.is_null() {
            return Ok(if target.is_nullable() {
                Scalar::Null
            } else {
                self.default_value(target)
            });
        }

        let effective = target.unwrap_nullable();
        let fail = |cause: String| ConversionError::new(value.to_string(), target.name(), cause);

        match effective {
            TypeInfo::Enum(info) => {
                let name = match &value {
                    Scalar::String(s) | Scalar::Enum(s) => s.as_str(),
                    other => return Err(fail(format!("expected a member name, found {:?}", other))),
                };
                info.variant(name)
                    .map(|variant| Scalar::Enum(variant.to_string()))
                    .ok_or_else(|| fail(format!("'{}' is not a member of {}", name, info.name)))
            }
            TypeInfo::Primitive(Primitive::Uuid) => match &value {
                Scalar::Uuid(id) => Ok(Scalar::Uuid(*id)),
                Scalar::String(s) => Uuid::parse_str(s.trim())
                    .map(Scalar::Uuid)
                    .map_err(|e| fail(e.to_string())),
                Scalar::Bytes(bytes) => Uuid::from_slice(bytes)
                    .map(Scalar::Uuid)
                    .map_err(|e| fail(e.to_string())),
                other => Err(fail(format!("cannot read a UUID from {:?}", other))),
            },
            TypeInfo::Primitive(primitive) => convert_primitive(&value, *primitive).map_err(fail),
            other => Err(fail(format!("{} is not a scalar type", other.name()))),
        }
    }
}

impl Default for TypeConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeConverter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeConverter")
            .field("cached_defaults", &self.defaults.len())
            .finish()
    }
}

fn cache_key(ty: &TypeInfo) -> String {
    match ty {
        TypeInfo::Enum(info) => format!("{}::{}", info.module, info.name),
        other => other.name(),
    }
}

fn convert_primitive(value: &Scalar, target: Primitive) -> Result<Scalar, String> {
    match target {
        Primitive::String => Ok(Scalar::String(value.to_string())),
        Primitive::Bool => to_bool(value).map(Scalar::Bool),
        Primitive::Char => match value {
            Scalar::Char(c) => Ok(Scalar::Char(*c)),
            Scalar::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Scalar::Char(c)),
                    _ => Err("expected exactly one character".to_string()),
                }
            }
            other => Err(format!("cannot read a character from {:?}", other)),
        },
        Primitive::F32 | Primitive::F64 => {
            let v = to_f64(value)?;
            if target == Primitive::F32 && v.abs() > f32::MAX as f64 {
                return Err("value is out of range for f32".to_string());
            }
            Ok(Scalar::Float(v))
        }
        Primitive::DateTime => to_datetime(value).map(Scalar::DateTime),
        Primitive::Uuid => Err("UUIDs are converted separately".to_string()),
        integer => {
            let v = to_i128(value)?;
            let (min, max) = integer
                .integer_range()
                .ok_or_else(|| format!("{} is not an integer type", integer.name()))?;
            if v < min || v > max {
                return Err(format!("value is out of range for {}", integer.name()));
            }
            if min < 0 {
                Ok(Scalar::Int(v as i64))
            } else {
                Ok(Scalar::UInt(v as u64))
            }
        }
    }
}

fn to_bool(value: &Scalar) -> Result<bool, String> {
    match value {
        Scalar::Bool(b) => Ok(*b),
        Scalar::Int(i) => Ok(*i != 0),
        Scalar::UInt(u) => Ok(*u != 0),
        Scalar::String(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("true") {
                Ok(true)
            } else if s.eq_ignore_ascii_case("false") {
                Ok(false)
            } else {
                Err("expected 'true' or 'false'".to_string())
            }
        }
        other => Err(format!("cannot read a boolean from {:?}", other)),
    }
}

fn to_i128(value: &Scalar) -> Result<i128, String> {
    match value {
        Scalar::Int(i) => Ok(i128::from(*i)),
        Scalar::UInt(u) => Ok(i128::from(*u)),
        Scalar::Bool(b) => Ok(i128::from(*b)),
        Scalar::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(*f as i128),
        Scalar::Float(_) => Err("value has a fractional part".to_string()),
        Scalar::String(s) => s.trim().parse::<i128>().map_err(|e| e.to_string()),
        other => Err(format!("cannot read an integer from {:?}", other)),
    }
}

fn to_f64(value: &Scalar) -> Result<f64, String> {
    let v = match value {
        Scalar::Float(f) => *f,
        Scalar::Int(i) => *i as f64,
        Scalar::UInt(u) => *u as f64,
        Scalar::String(s) => s.trim().parse::<f64>().map_err(|e| e.to_string())?,
        other => return Err(format!("cannot read a number from {:?}", other)),
    };
    // JSON has no representation for these
    if v.is_finite() {
        Ok(v)
    } else {
        Err(format!("{} is not a finite number", v))
    }
}

fn to_datetime(value: &Scalar) -> Result<DateTime<Utc>, String> {
    let text = match value {
        Scalar::DateTime(dt) => return Ok(*dt),
        Scalar::String(s) => s.trim(),
        other => return Err(format!("cannot read a date from {:?}", other)),
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Ok(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("'{}' is not a recognized date", text))
}
