//! Case-insensitive dynamic property bag.
//!
//! [`PropertyBag`] is the loosely-typed landing structure used wherever the
//! shape of a payload is not known statically: the per-request item bag,
//! dynamically-typed operation parameters, and diagnostic dumps of a request.
//!
//! Keys are compared case-insensitively (culture-invariant lower-case folding)
//! while the casing first seen for a key is kept for iteration and
//! serialization. Reading a missing key yields [`BagValue::Null`] instead of
//! failing.
//!
//! # Example
//!
//! ```
//! use switchyard_core::bag::{BagValue, PropertyBag};
//!
//! let mut bag = PropertyBag::new();
//! bag.set("FirstName", "Ada");
//! bag["Age"] = BagValue::from(36);
//!
//! assert_eq!(bag["firstname"], "Ada");
//! assert_eq!(bag["AGE"], 36);
//! assert!(bag["missing"].is_null());
//! assert_eq!(bag.keys().collect::<Vec<_>>(), vec!["FirstName", "Age"]);
//! ```

use crate::Error;
use indexmap::IndexMap;
use serde::de::{self, Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::any::Any;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

/// Callback stored in a bag and invoked by name.
pub type Callback = Arc<dyn Fn(&[BagValue]) -> Result<BagValue, Error> + Send + Sync>;

static NULL: BagValue = BagValue::Null;

/// Fold a key for case-insensitive comparison.
pub(crate) fn fold_key(key: &str) -> String {
    if key.is_ascii() {
        key.to_ascii_lowercase()
    } else {
        key.to_lowercase()
    }
}

/// Compare two keys case-insensitively.
pub(crate) fn keys_equal(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || (!(a.is_ascii() && b.is_ascii()) && fold_key(a) == fold_key(b))
}

/// A loosely-typed value stored in a [`PropertyBag`].
#[derive(Clone, Default)]
pub enum BagValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<BagValue>),
    Bag(PropertyBag),
    /// A callable member, see [`PropertyBag::invoke`]
    Callable(Callback),
    /// An opaque host object (connections, services, per-request state)
    Object(Arc<dyn Any + Send + Sync>),
}

impl BagValue {
    /// Wrap an arbitrary host object.
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        BagValue::Object(Arc::new(value))
    }

    /// Wrap a closure as a callable member.
    pub fn callable<F>(f: F) -> Self
    where
        F: Fn(&[BagValue]) -> Result<BagValue, Error> + Send + Sync + 'static,
    {
        BagValue::Callable(Arc::new(f))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, BagValue::Null)
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, BagValue::Callable(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BagValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BagValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BagValue::Float(f) => Some(*f),
            BagValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BagValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[BagValue]> {
        match self {
            BagValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_bag(&self) -> Option<&PropertyBag> {
        match self {
            BagValue::Bag(bag) => Some(bag),
            _ => None,
        }
    }

    pub fn as_bag_mut(&mut self) -> Option<&mut PropertyBag> {
        match self {
            BagValue::Bag(bag) => Some(bag),
            _ => None,
        }
    }

    /// Borrow a host object as `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            BagValue::Object(obj) => obj.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Share a host object as `Arc<T>`.
    pub fn downcast_arc<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            BagValue::Object(obj) => obj.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Call this value with arguments if it is callable.
    pub fn call(&self, args: &[BagValue]) -> Result<BagValue, Error> {
        match self {
            BagValue::Callable(f) => f(args),
            other => Err(Error::Internal(format!(
                "value of kind {} is not callable",
                other.kind()
            ))),
        }
    }

    /// Short name of the value's kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            BagValue::Null => "null",
            BagValue::Bool(_) => "bool",
            BagValue::Int(_) => "int",
            BagValue::Float(_) => "float",
            BagValue::String(_) => "string",
            BagValue::List(_) => "list",
            BagValue::Bag(_) => "bag",
            BagValue::Callable(_) => "callable",
            BagValue::Object(_) => "object",
        }
    }

    /// Convert into a JSON tree. Callables and host objects become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            BagValue::Null | BagValue::Callable(_) | BagValue::Object(_) => Value::Null,
            BagValue::Bool(b) => Value::Bool(*b),
            BagValue::Int(i) => Value::from(*i),
            BagValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            BagValue::String(s) => Value::String(s.clone()),
            BagValue::List(items) => Value::Array(items.iter().map(BagValue::to_json).collect()),
            BagValue::Bag(bag) => bag.to_json(),
        }
    }
}

impl fmt::Debug for BagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BagValue::Null => f.write_str("Null"),
            BagValue::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            BagValue::Int(i) => f.debug_tuple("Int").field(i).finish(),
            BagValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
            BagValue::String(s) => f.debug_tuple("String").field(s).finish(),
            BagValue::List(items) => f.debug_tuple("List").field(items).finish(),
            BagValue::Bag(bag) => f.debug_tuple("Bag").field(bag).finish(),
            BagValue::Callable(_) => f.write_str("Callable(..)"),
            BagValue::Object(_) => f.write_str("Object(..)"),
        }
    }
}

impl PartialEq for BagValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (BagValue::Null, BagValue::Null) => true,
            (BagValue::Bool(a), BagValue::Bool(b)) => a == b,
            (BagValue::Int(a), BagValue::Int(b)) => a == b,
            (BagValue::Float(a), BagValue::Float(b)) => a == b,
            (BagValue::String(a), BagValue::String(b)) => a == b,
            (BagValue::List(a), BagValue::List(b)) => a == b,
            (BagValue::Bag(a), BagValue::Bag(b)) => a == b,
            (BagValue::Callable(a), BagValue::Callable(b)) => Arc::ptr_eq(a, b),
            (BagValue::Object(a), BagValue::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq<i64> for BagValue {
    fn eq(&self, other: &i64) -> bool {
        self.as_i64() == Some(*other)
    }
}

impl PartialEq<i32> for BagValue {
    fn eq(&self, other: &i32) -> bool {
        self.as_i64() == Some(i64::from(*other))
    }
}

impl PartialEq<f64> for BagValue {
    fn eq(&self, other: &f64) -> bool {
        self.as_f64() == Some(*other)
    }
}

impl PartialEq<bool> for BagValue {
    fn eq(&self, other: &bool) -> bool {
        self.as_bool() == Some(*other)
    }
}

impl PartialEq<&str> for BagValue {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == Some(*other)
    }
}

impl PartialEq<str> for BagValue {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == Some(other)
    }
}

impl From<bool> for BagValue {
    fn from(v: bool) -> Self {
        BagValue::Bool(v)
    }
}

impl From<i32> for BagValue {
    fn from(v: i32) -> Self {
        BagValue::Int(i64::from(v))
    }
}

impl From<i64> for BagValue {
    fn from(v: i64) -> Self {
        BagValue::Int(v)
    }
}

impl From<u32> for BagValue {
    fn from(v: u32) -> Self {
        BagValue::Int(i64::from(v))
    }
}

impl From<f64> for BagValue {
    fn from(v: f64) -> Self {
        BagValue::Float(v)
    }
}

impl From<&str> for BagValue {
    fn from(v: &str) -> Self {
        BagValue::String(v.to_string())
    }
}

impl From<String> for BagValue {
    fn from(v: String) -> Self {
        BagValue::String(v)
    }
}

impl From<Vec<BagValue>> for BagValue {
    fn from(v: Vec<BagValue>) -> Self {
        BagValue::List(v)
    }
}

impl From<PropertyBag> for BagValue {
    fn from(v: PropertyBag) -> Self {
        BagValue::Bag(v)
    }
}

impl<T: Into<BagValue>> From<Option<T>> for BagValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(BagValue::Null)
    }
}

impl From<serde_json::Value> for BagValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => BagValue::Null,
            Value::Bool(b) => BagValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => BagValue::Int(i),
                None => BagValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => BagValue::String(s),
            Value::Array(items) => BagValue::List(items.into_iter().map(BagValue::from).collect()),
            Value::Object(map) => {
                let mut bag = PropertyBag::with_capacity(map.len());
                for (key, value) in map {
                    bag.set(key, BagValue::from(value));
                }
                BagValue::Bag(bag)
            }
        }
    }
}

impl Index<&str> for BagValue {
    type Output = BagValue;

    fn index(&self, key: &str) -> &BagValue {
        match self {
            BagValue::Bag(bag) => bag.get(key),
            _ => &NULL,
        }
    }
}

impl Index<usize> for BagValue {
    type Output = BagValue;

    fn index(&self, index: usize) -> &BagValue {
        match self {
            BagValue::List(items) => items.get(index).unwrap_or(&NULL),
            _ => &NULL,
        }
    }
}

impl Serialize for BagValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BagValue::Null | BagValue::Callable(_) | BagValue::Object(_) => {
                serializer.serialize_unit()
            }
            BagValue::Bool(b) => serializer.serialize_bool(*b),
            BagValue::Int(i) => serializer.serialize_i64(*i),
            BagValue::Float(f) => serializer.serialize_f64(*f),
            BagValue::String(s) => serializer.serialize_str(s),
            BagValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            BagValue::Bag(bag) => bag.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for BagValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(BagValue::from)
    }
}

#[derive(Clone)]
struct Entry {
    key: String,
    value: BagValue,
}

/// Case-insensitive, insertion-ordered map of [`BagValue`]s.
#[derive(Clone, Default)]
pub struct PropertyBag {
    entries: IndexMap<String, Entry>,
}

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: IndexMap::with_capacity(capacity),
        }
    }

    /// Read a member; a missing key reads as [`BagValue::Null`].
    pub fn get(&self, key: &str) -> &BagValue {
        self.try_get(key).unwrap_or(&NULL)
    }

    /// Read a member, distinguishing a missing key from a stored null.
    pub fn try_get(&self, key: &str) -> Option<&BagValue> {
        self.entries.get(&fold_key(key)).map(|entry| &entry.value)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut BagValue> {
        self.entries
            .get_mut(&fold_key(key))
            .map(|entry| &mut entry.value)
    }

    /// Write a member, returning the previous value.
    ///
    /// Overwriting keeps the original key casing and position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<BagValue>) -> Option<BagValue> {
        let key = key.into();
        let value = value.into();
        match self.entries.get_mut(&fold_key(&key)) {
            Some(entry) => Some(std::mem::replace(&mut entry.value, value)),
            None => {
                self.entries.insert(fold_key(&key), Entry { key, value });
                None
            }
        }
    }

    /// Store a callable member.
    pub fn set_callable<F>(&mut self, key: impl Into<String>, f: F) -> Option<BagValue>
    where
        F: Fn(&[BagValue]) -> Result<BagValue, Error> + Send + Sync + 'static,
    {
        self.set(key, BagValue::callable(f))
    }

    pub fn remove(&mut self, key: &str) -> Option<BagValue> {
        self.entries
            .shift_remove(&fold_key(key))
            .map(|entry| entry.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&fold_key(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Keys in insertion order, with their first-seen casing.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|entry| entry.key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &BagValue> {
        self.entries.values().map(|entry| &entry.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BagValue)> {
        self.entries
            .values()
            .map(|entry| (entry.key.as_str(), &entry.value))
    }

    /// Invoke a callable member by name.
    pub fn invoke(&self, key: &str, args: &[BagValue]) -> Result<BagValue, Error> {
        match self.try_get(key) {
            Some(value) => value.call(args),
            None => Err(Error::NotFound(format!("no member named '{}'", key))),
        }
    }

    /// Drain every entry, handing ownership of the values to the caller.
    pub fn drain(&mut self) -> impl Iterator<Item = (String, BagValue)> + '_ {
        self.entries.drain(..).map(|(_, entry)| (entry.key, entry.value))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.iter()
                .map(|(key, value)| (key.to_string(), value.to_json()))
                .collect(),
        )
    }

    /// Build a bag from a JSON object; any other JSON kind is rejected.
    pub fn from_json(value: serde_json::Value) -> Result<Self, Error> {
        match BagValue::from(value) {
            BagValue::Bag(bag) => Ok(bag),
            other => Err(Error::Deserialization(format!(
                "expected a JSON object, found {}",
                other.kind()
            ))),
        }
    }
}

impl fmt::Debug for PropertyBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl PartialEq for PropertyBag {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.try_get(key) == Some(value))
    }
}

impl Index<&str> for PropertyBag {
    type Output = BagValue;

    fn index(&self, key: &str) -> &BagValue {
        self.get(key)
    }
}

/// Member-style assignment: a missing key is inserted as null first.
impl IndexMut<&str> for PropertyBag {
    fn index_mut(&mut self, key: &str) -> &mut BagValue {
        let folded = fold_key(key);
        &mut self
            .entries
            .entry(folded)
            .or_insert_with(|| Entry {
                key: key.to_string(),
                value: BagValue::Null,
            })
            .value
    }
}

impl<K: Into<String>, V: Into<BagValue>> FromIterator<(K, V)> for PropertyBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bag = PropertyBag::new();
        for (key, value) in iter {
            bag.set(key, value);
        }
        bag
    }
}

impl Serialize for PropertyBag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PropertyBag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        PropertyBag::from_json(value).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_case_insensitive_access() {
        let mut bag = PropertyBag::new();
        bag.set("FirstName", "Ada");

        assert_eq!(bag["FirstName"], "Ada");
        assert_eq!(bag["firstname"], "Ada");
        assert_eq!(bag["FIRSTNAME"], "Ada");
        assert!(bag.contains_key("fIrStNaMe"));
    }

    #[test]
    fn test_missing_key_reads_null() {
        let bag = PropertyBag::new();
        assert!(bag.get("nothing").is_null());
        assert!(bag.try_get("nothing").is_none());
    }

    #[test]
    fn test_overwrite_keeps_first_casing_and_order() {
        let mut bag = PropertyBag::new();
        bag.set("Alpha", 1);
        bag.set("Beta", 2);
        let previous = bag.set("ALPHA", 3);

        assert_eq!(previous, Some(BagValue::Int(1)));
        assert_eq!(bag.keys().collect::<Vec<_>>(), vec!["Alpha", "Beta"]);
        assert_eq!(bag["alpha"], 3);
    }

    #[test]
    fn test_index_mut_inserts_member() {
        let mut bag = PropertyBag::new();
        bag["Count"] = BagValue::from(1);
        bag["count"] = BagValue::from(2);

        assert_eq!(bag.len(), 1);
        assert_eq!(bag["COUNT"], 2);
    }

    #[test]
    fn test_remove_preserves_order() {
        let mut bag: PropertyBag = vec![("a", 1), ("b", 2), ("c", 3)].into_iter().collect();
        assert_eq!(bag.remove("B"), Some(BagValue::Int(2)));
        assert_eq!(bag.keys().collect::<Vec<_>>(), vec!["a", "c"]);
    }

    #[test]
    fn test_invoke_callable_member() {
        let mut bag = PropertyBag::new();
        bag.set_callable("Add", |args| {
            let sum: i64 = args.iter().filter_map(BagValue::as_i64).sum();
            Ok(BagValue::Int(sum))
        });

        let result = bag.invoke("add", &[BagValue::Int(2), BagValue::Int(3)]).unwrap();
        assert_eq!(result, 5);
    }

    #[test]
    fn test_invoke_non_callable_fails() {
        let mut bag = PropertyBag::new();
        bag.set("name", "x");

        assert!(bag.invoke("name", &[]).is_err());
        assert!(matches!(bag.invoke("missing", &[]), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_nested_json_round_trip() {
        let value = json!({"Customer": {"Id": 5, "Tags": ["a", "b"]}, "Active": true});
        let bag = PropertyBag::from_json(value.clone()).unwrap();

        assert_eq!(bag["customer"]["id"], 5);
        assert_eq!(bag["CUSTOMER"]["tags"][1], "b");
        assert_eq!(bag.to_json(), value);
    }

    #[test]
    fn test_from_json_rejects_scalars() {
        assert!(PropertyBag::from_json(json!(5)).is_err());
    }

    #[test]
    fn test_deserialize_and_serialize() {
        let bag: PropertyBag = serde_json::from_str(r#"{"Id":5,"Name":"X"}"#).unwrap();
        assert_eq!(bag["ID"], 5);
        assert_eq!(serde_json::to_string(&bag).unwrap(), r#"{"Id":5,"Name":"X"}"#);
    }

    #[test]
    fn test_host_object_downcast() {
        struct Connection {
            id: u32,
        }

        let mut bag = PropertyBag::new();
        bag.set("db", BagValue::object(Connection { id: 7 }));

        let conn = bag["DB"].downcast_arc::<Connection>().unwrap();
        assert_eq!(conn.id, 7);
        assert!(bag["db"].downcast_ref::<String>().is_none());
        assert_eq!(bag.to_json(), json!({"db": null}));
    }

    #[test]
    fn test_unicode_keys_fold() {
        let mut bag = PropertyBag::new();
        bag.set("Größe", 1);
        assert_eq!(bag["GRÖSSE".to_lowercase().as_str()], BagValue::Null);
        assert_eq!(bag["größe"], 1);
        assert!(keys_equal("ÄBC", "äbc"));
    }
}
