//! Structural encode/decode of payloads.
//!
//! The binder only reaches for the [`SerializationService`] when the scalar
//! converter cannot handle a parameter: aggregates, collections and dynamic
//! payloads. Decoding is lenient. Text that does not look like a JSON object
//! or array is taken as a bare string token, and the decoded tree is then
//! conformed to the declared [`TypeInfo`]: field names are matched
//! case-insensitively and rewritten to their declared spelling, enum members
//! are canonicalized, and string-encoded scalars are converted.

use crate::bag::{BagValue, keys_equal};
use crate::convert::{Scalar, TypeConverter};
use crate::error::Error;
use crate::types::{Reflect, TypeInfo};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Pluggable structural serializer.
pub trait SerializationService: Send + Sync {
    /// Encode a value for the wire.
    fn serialize(&self, value: &Value) -> Result<String, Error>;

    /// Leniently decode `raw` and conform it to `target`.
    fn deserialize(&self, raw: &str, target: &TypeInfo) -> Result<Value, Error>;

    /// Leniently decode `raw` into a loosely-typed tree whose objects are
    /// property bags.
    fn deserialize_dynamic(&self, raw: &str) -> Result<BagValue, Error>;

    /// Wire content type of [`serialize`](SerializationService::serialize) output.
    fn content_type(&self) -> &str {
        "application/json"
    }
}

impl dyn SerializationService {
    /// Encode any serde-serializable value.
    pub fn serialize_as<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, Error> {
        let value = serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.serialize(&value)
    }

    /// Decode straight into a reflected Rust type.
    pub fn deserialize_into<T: DeserializeOwned + Reflect>(&self, raw: &str) -> Result<T, Error> {
        let value = self.deserialize(raw, &T::type_info())?;
        serde_json::from_value(value).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Parse `raw` as JSON when it looks structured, else as a string token.
pub fn lenient_parse(raw: &str) -> Result<Value, Error> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        serde_json::from_str(raw).map_err(|e| Error::Deserialization(e.to_string()))
    } else {
        Ok(Value::String(raw.to_string()))
    }
}

/// [`SerializationService`] backed by `serde_json`.
#[derive(Debug, Clone)]
pub struct JsonSerializer {
    converter: Arc<TypeConverter>,
    pretty: bool,
}

impl JsonSerializer {
    pub fn new() -> Self {
        Self::with_converter(Arc::new(TypeConverter::new()))
    }

    /// Share a converter (and its default-value cache) with the binder.
    pub fn with_converter(converter: Arc<TypeConverter>) -> Self {
        Self {
            converter,
            pretty: false,
        }
    }

    /// Indent serialized output.
    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn conform(&self, value: Value, target: &TypeInfo, path: &str) -> Result<Value, Error> {
        let fail = |reason: String| Error::Deserialization(format!("{}: {}", path, reason));

        match target {
            TypeInfo::Unit => Ok(Value::Null),
            TypeInfo::Context => Err(fail("the request context cannot be deserialized".into())),
            TypeInfo::Dynamic => Ok(value),
            TypeInfo::Nullable(inner) => {
                if value.is_null() {
                    Ok(Value::Null)
                } else {
                    self.conform(value, inner, path)
                }
            }
            TypeInfo::Primitive(_) | TypeInfo::Enum(_) => {
                let scalar = match value {
                    Value::Null => Scalar::Null,
                    Value::Bool(b) => Scalar::Bool(b),
                    Value::String(s) => Scalar::String(s),
                    Value::Number(n) => {
                        if let Some(i) = n.as_i64() {
                            Scalar::Int(i)
                        } else if let Some(u) = n.as_u64() {
                            Scalar::UInt(u)
                        } else {
                            Scalar::Float(n.as_f64().unwrap_or(f64::NAN))
                        }
                    }
                    other => return Err(fail(format!("expected {}, found {}", target, json_kind(&other)))),
                };
                self.converter
                    .convert(scalar, target)
                    .map(|s| s.to_json())
                    .map_err(|e| fail(e.to_string()))
            }
            TypeInfo::List(element) => match value {
                Value::Array(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| self.conform(item, element, &format!("{}[{}]", path, i)))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                other => Err(fail(format!("expected an array, found {}", json_kind(&other)))),
            },
            TypeInfo::Map(element) => match value {
                Value::Object(entries) => {
                    let mut out = Map::with_capacity(entries.len());
                    for (key, item) in entries {
                        let conformed = self.conform(item, element, &format!("{}.{}", path, key))?;
                        out.insert(key, conformed);
                    }
                    Ok(Value::Object(out))
                }
                other => Err(fail(format!("expected an object, found {}", json_kind(&other)))),
            },
            TypeInfo::Object(info) => {
                let mut entries = match value {
                    Value::Object(entries) => entries,
                    other => {
                        return Err(fail(format!("expected {}, found {}", info.name, json_kind(&other))));
                    }
                };

                let mut out = Map::with_capacity(info.fields.len());
                for field in &info.fields {
                    let field_type = field.ty.resolve();
                    let key = entries.keys().find(|k| keys_equal(k, &field.name)).cloned();
                    match key.and_then(|k| entries.remove(&k)) {
                        Some(item) => {
                            let conformed =
                                self.conform(item, &field_type, &format!("{}.{}", path, field.name))?;
                            out.insert(field.name.clone(), conformed);
                        }
                        None if field_type.is_nullable() => {
                            out.insert(field.name.clone(), Value::Null);
                        }
                        None if field.optional => {}
                        None => return Err(fail(format!("missing field '{}'", field.name))),
                    }
                }
                Ok(Value::Object(out))
            }
        }
    }
}

impl Default for JsonSerializer {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializationService for JsonSerializer {
    fn serialize(&self, value: &Value) -> Result<String, Error> {
        let result = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        result.map_err(|e| Error::Serialization(e.to_string()))
    }

    fn deserialize(&self, raw: &str, target: &TypeInfo) -> Result<Value, Error> {
        let value = lenient_parse(raw)?;
        self.conform(value, target, "$")
    }

    fn deserialize_dynamic(&self, raw: &str) -> Result<BagValue, Error> {
        lenient_parse(raw).map(BagValue::from)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Customer {
        id: i64,
        name: String,
        tier: Tier,
        email: Option<String>,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    enum Tier {
        Standard,
        Gold,
    }

    crate::reflect_object!(Customer {
        id: i64,
        name: String,
        tier: Tier,
        email: Option<String>,
    });
    crate::reflect_enum!(Tier { Standard, Gold });

    fn service() -> Arc<dyn SerializationService> {
        Arc::new(JsonSerializer::new())
    }

    #[test]
    fn test_lenient_parse() {
        assert_eq!(lenient_parse(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert_eq!(lenient_parse("  [1, 2]").unwrap(), json!([1, 2]));
        assert_eq!(lenient_parse("hello").unwrap(), json!("hello"));
        assert_eq!(lenient_parse("42").unwrap(), json!("42"));
        assert!(lenient_parse("{broken").is_err());
    }

    #[test]
    fn test_fields_match_case_insensitively() {
        let customer: Customer = service()
            .deserialize_into(r#"{"ID": 5, "Name": "X", "TIER": "gold", "Unknown": true}"#)
            .unwrap();
        assert_eq!(
            customer,
            Customer {
                id: 5,
                name: "X".into(),
                tier: Tier::Gold,
                email: None,
            }
        );
    }

    #[test]
    fn test_string_encoded_scalars_are_converted() {
        let value = service()
            .deserialize(r#"{"id": "7", "name": "Y", "tier": "Standard"}"#, &Customer::type_info())
            .unwrap();
        assert_eq!(value["id"], json!(7));
        assert_eq!(value["email"], Value::Null);
    }

    #[test]
    fn test_missing_required_field() {
        let err = service()
            .deserialize(r#"{"name": "Y", "tier": "Gold"}"#, &Customer::type_info())
            .unwrap_err();
        assert!(err.to_string().contains("missing field 'id'"));
    }

    #[test]
    fn test_error_path_points_into_list() {
        let err = service()
            .deserialize(r#"[1, 2, "three"]"#, &<Vec<i32>>::type_info())
            .unwrap_err();
        assert!(err.to_string().contains("$[2]"));
    }

    #[test]
    fn test_bare_token_satisfies_scalar_target() {
        let value = service().deserialize("Gold", &Tier::type_info()).unwrap();
        assert_eq!(value, json!("Gold"));
    }

    #[test]
    fn test_dynamic_lands_in_property_bag() {
        let value = service().deserialize_dynamic(r#"{"Id": 5, "Name": "X"}"#).unwrap();
        assert_eq!(value["id"], 5);
        assert_eq!(value["ID"], 5);
        assert_eq!(value["name"], "X");
    }

    #[test]
    fn test_serialize_as() {
        let service = service();
        let text = service.serialize_as(&vec![1, 2, 3]).unwrap();
        assert_eq!(text, "[1,2,3]");
    }
}
