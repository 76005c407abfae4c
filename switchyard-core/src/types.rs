//! Runtime type model for operation signatures.
//!
//! Operation parameters and results are described as data ([`TypeInfo`])
//! rather than live reflection handles, so the binder, the type converter and
//! the metadata generator can all work from the same description. Rust types
//! opt in through the [`Reflect`] trait, usually via the [`reflect_object!`]
//! and [`reflect_enum!`] macros.
//!
//! [`reflect_object!`]: crate::reflect_object
//! [`reflect_enum!`]: crate::reflect_enum

use crate::bag::{BagValue, PropertyBag};
use crate::context::RequestContext;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Scalar kinds understood by the fast-path type converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    String,
    DateTime,
    Uuid,
}

impl Primitive {
    pub fn name(&self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Char => "char",
            Primitive::I8 => "i8",
            Primitive::I16 => "i16",
            Primitive::I32 => "i32",
            Primitive::I64 => "i64",
            Primitive::U8 => "u8",
            Primitive::U16 => "u16",
            Primitive::U32 => "u32",
            Primitive::U64 => "u64",
            Primitive::F32 => "f32",
            Primitive::F64 => "f64",
            Primitive::String => "String",
            Primitive::DateTime => "DateTime",
            Primitive::Uuid => "Uuid",
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Primitive::I8
                | Primitive::I16
                | Primitive::I32
                | Primitive::I64
                | Primitive::U8
                | Primitive::U16
                | Primitive::U32
                | Primitive::U64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Primitive::F32 | Primitive::F64)
    }

    /// Inclusive range of an integer primitive.
    pub(crate) fn integer_range(&self) -> Option<(i128, i128)> {
        let range = match self {
            Primitive::I8 => (i8::MIN as i128, i8::MAX as i128),
            Primitive::I16 => (i16::MIN as i128, i16::MAX as i128),
            Primitive::I32 => (i32::MIN as i128, i32::MAX as i128),
            Primitive::I64 => (i64::MIN as i128, i64::MAX as i128),
            Primitive::U8 => (0, u8::MAX as i128),
            Primitive::U16 => (0, u16::MAX as i128),
            Primitive::U32 => (0, u32::MAX as i128),
            Primitive::U64 => (0, u64::MAX as i128),
            _ => return None,
        };
        Some(range)
    }
}

/// A field type that is resolved on demand.
///
/// Deferring resolution is what lets self-referential and mutually
/// referential aggregates be described without infinite construction.
#[derive(Clone)]
pub struct TypeRef(Arc<dyn Fn() -> TypeInfo + Send + Sync>);

impl TypeRef {
    /// Reference the description of a reflected Rust type.
    pub fn of<T: Reflect + ?Sized + 'static>() -> Self {
        TypeRef(Arc::new(T::type_info))
    }

    /// Reference an already-built description.
    pub fn resolved(info: TypeInfo) -> Self {
        TypeRef(Arc::new(move || info.clone()))
    }

    pub fn resolve(&self) -> TypeInfo {
        (self.0)()
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeRef").field(&self.resolve().name()).finish()
    }
}

impl From<TypeInfo> for TypeRef {
    fn from(info: TypeInfo) -> Self {
        TypeRef::resolved(info)
    }
}

/// A public field or property of an aggregate type.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub ty: TypeRef,
    pub description: Option<String>,
    /// Field may be omitted from a payload
    pub optional: bool,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            description: None,
            optional: false,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Description of a user-defined aggregate.
#[derive(Debug, Clone)]
pub struct ObjectInfo {
    pub name: String,
    /// Module path (namespace) the type was declared in
    pub module: String,
    pub description: Option<String>,
    pub fields: Vec<FieldInfo>,
}

/// Description of an enumeration with named members.
#[derive(Debug, Clone)]
pub struct EnumInfo {
    pub name: String,
    pub module: String,
    pub description: Option<String>,
    pub variants: Vec<String>,
}

impl EnumInfo {
    /// Match a member name case-insensitively, returning its declared spelling.
    pub fn variant(&self, name: &str) -> Option<&str> {
        let name = name.trim();
        self.variants
            .iter()
            .find(|variant| crate::bag::keys_equal(variant, name))
            .map(String::as_str)
    }
}

/// Runtime description of a parameter or result type.
#[derive(Debug, Clone)]
pub enum TypeInfo {
    /// No value (an operation without a result)
    Unit,
    /// The live request context
    Context,
    /// Loosely-typed payload landing in a property bag
    Dynamic,
    Primitive(Primitive),
    Enum(Arc<EnumInfo>),
    Nullable(Box<TypeInfo>),
    List(Box<TypeInfo>),
    /// String-keyed dictionary of the value type
    Map(Box<TypeInfo>),
    Object(Arc<ObjectInfo>),
}

impl TypeInfo {
    /// Start describing a user-defined aggregate.
    pub fn object(name: impl Into<String>, module: impl Into<String>) -> ObjectBuilder {
        ObjectBuilder {
            info: ObjectInfo {
                name: name.into(),
                module: module.into(),
                description: None,
                fields: Vec::new(),
            },
        }
    }

    /// Describe an enumeration.
    pub fn enumeration<I, S>(name: impl Into<String>, module: impl Into<String>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TypeInfo::Enum(Arc::new(EnumInfo {
            name: name.into(),
            module: module.into(),
            description: None,
            variants: variants.into_iter().map(Into::into).collect(),
        }))
    }

    pub fn nullable(inner: TypeInfo) -> Self {
        TypeInfo::Nullable(Box::new(inner))
    }

    pub fn list(element: TypeInfo) -> Self {
        TypeInfo::List(Box::new(element))
    }

    pub fn map(value: TypeInfo) -> Self {
        TypeInfo::Map(Box::new(value))
    }

    /// Human-readable label, e.g. `Vec<Customer>` or `Option<i32>`.
    pub fn name(&self) -> String {
        match self {
            TypeInfo::Unit => "()".to_string(),
            TypeInfo::Context => "RequestContext".to_string(),
            TypeInfo::Dynamic => "dynamic".to_string(),
            TypeInfo::Primitive(p) => p.name().to_string(),
            TypeInfo::Enum(info) => info.name.clone(),
            TypeInfo::Nullable(inner) => format!("Option<{}>", inner.name()),
            TypeInfo::List(element) => format!("Vec<{}>", element.name()),
            TypeInfo::Map(value) => format!("Map<String, {}>", value.name()),
            TypeInfo::Object(info) => info.name.clone(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, TypeInfo::Nullable(_))
    }

    pub fn is_context(&self) -> bool {
        matches!(self, TypeInfo::Context)
    }

    /// Strip one level of nullability.
    pub fn unwrap_nullable(&self) -> &TypeInfo {
        match self {
            TypeInfo::Nullable(inner) => inner,
            other => other,
        }
    }

    /// Strip every container (nullable, list, map) down to the element type.
    pub fn element_type(&self) -> &TypeInfo {
        match self {
            TypeInfo::Nullable(inner) | TypeInfo::List(inner) | TypeInfo::Map(inner) => {
                inner.element_type()
            }
            other => other,
        }
    }

    /// Value types have a non-null default (zero, false, epoch, first member).
    pub fn is_value_type(&self) -> bool {
        matches!(self, TypeInfo::Primitive(_) | TypeInfo::Enum(_))
    }

    /// Module path for declared types; `None` for built-in kinds.
    pub fn module(&self) -> Option<&str> {
        match self {
            TypeInfo::Object(info) => Some(&info.module),
            TypeInfo::Enum(info) => Some(&info.module),
            _ => None,
        }
    }

    /// Explicit description attached to a declared type.
    pub fn description(&self) -> Option<&str> {
        match self {
            TypeInfo::Object(info) => info.description.as_deref(),
            TypeInfo::Enum(info) => info.description.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Builder for [`ObjectInfo`].
pub struct ObjectBuilder {
    info: ObjectInfo,
}

impl ObjectBuilder {
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.info.description = Some(description.into());
        self
    }

    pub fn field(mut self, field: FieldInfo) -> Self {
        self.info.fields.push(field);
        self
    }

    pub fn build(self) -> TypeInfo {
        TypeInfo::Object(Arc::new(self.info))
    }
}

/// Types that can describe themselves as a [`TypeInfo`].
pub trait Reflect {
    fn type_info() -> TypeInfo;
}

macro_rules! reflect_primitive {
    ($($ty:ty => $prim:ident),* $(,)?) => {
        $(
            impl Reflect for $ty {
                fn type_info() -> TypeInfo {
                    TypeInfo::Primitive(Primitive::$prim)
                }
            }
        )*
    };
}

reflect_primitive! {
    bool => Bool,
    char => Char,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => String,
    str => String,
    chrono::DateTime<chrono::Utc> => DateTime,
    uuid::Uuid => Uuid,
}

impl Reflect for () {
    fn type_info() -> TypeInfo {
        TypeInfo::Unit
    }
}

impl<T: Reflect> Reflect for Option<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::nullable(T::type_info())
    }
}

impl<T: Reflect> Reflect for Vec<T> {
    fn type_info() -> TypeInfo {
        TypeInfo::list(T::type_info())
    }
}

impl<T: Reflect> Reflect for [T] {
    fn type_info() -> TypeInfo {
        TypeInfo::list(T::type_info())
    }
}

impl<V: Reflect, S> Reflect for HashMap<String, V, S> {
    fn type_info() -> TypeInfo {
        TypeInfo::map(V::type_info())
    }
}

impl<V: Reflect> Reflect for BTreeMap<String, V> {
    fn type_info() -> TypeInfo {
        TypeInfo::map(V::type_info())
    }
}

impl<T: Reflect + ?Sized> Reflect for Box<T> {
    fn type_info() -> TypeInfo {
        T::type_info()
    }
}

impl<T: Reflect + ?Sized> Reflect for Arc<T> {
    fn type_info() -> TypeInfo {
        T::type_info()
    }
}

impl Reflect for serde_json::Value {
    fn type_info() -> TypeInfo {
        TypeInfo::Dynamic
    }
}

impl Reflect for PropertyBag {
    fn type_info() -> TypeInfo {
        TypeInfo::Dynamic
    }
}

impl Reflect for BagValue {
    fn type_info() -> TypeInfo {
        TypeInfo::Dynamic
    }
}

impl Reflect for RequestContext {
    fn type_info() -> TypeInfo {
        TypeInfo::Context
    }
}

/// Implement [`Reflect`] for a struct by listing its public fields.
///
/// ```
/// use switchyard_core::{reflect_object, Reflect, TypeInfo};
///
/// struct Order {
///     id: i64,
///     lines: Vec<String>,
///     note: Option<String>,
/// }
///
/// reflect_object!(Order "A placed order" {
///     id: i64,
///     lines: Vec<String>,
///     note: Option<String>,
/// });
///
/// match Order::type_info() {
///     TypeInfo::Object(info) => {
///         assert_eq!(info.name, "Order");
///         assert_eq!(info.fields.len(), 3);
///     }
///     _ => unreachable!(),
/// }
/// ```
#[macro_export]
macro_rules! reflect_object {
    ($ty:ident $($desc:literal)? { $($field:ident : $fty:ty),* $(,)? }) => {
        impl $crate::types::Reflect for $ty {
            fn type_info() -> $crate::types::TypeInfo {
                $crate::types::TypeInfo::object(stringify!($ty), module_path!())
                    $(.describe($desc))?
                    $(
                        .field($crate::types::FieldInfo::new(
                            stringify!($field),
                            $crate::types::TypeRef::of::<$fty>(),
                        ))
                    )*
                    .build()
            }
        }
    };
}

/// Implement [`Reflect`] for a fieldless enum by listing its members.
///
/// The enum is expected to (de)serialize as its member names.
#[macro_export]
macro_rules! reflect_enum {
    ($ty:ident { $($variant:ident),* $(,)? }) => {
        impl $crate::types::Reflect for $ty {
            fn type_info() -> $crate::types::TypeInfo {
                $crate::types::TypeInfo::enumeration(
                    stringify!($ty),
                    module_path!(),
                    [$(stringify!($variant)),*],
                )
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Node {
        #[allow(dead_code)]
        next: Option<Box<Node>>,
    }

    crate::reflect_object!(Node {
        next: Option<Box<Node>>,
    });

    #[allow(dead_code)]
    enum Color {
        Red,
        Green,
    }

    crate::reflect_enum!(Color { Red, Green });

    #[test]
    fn test_container_labels() {
        assert_eq!(<Vec<i32>>::type_info().name(), "Vec<i32>");
        assert_eq!(<Option<u8>>::type_info().name(), "Option<u8>");
        assert_eq!(
            <HashMap<String, Vec<bool>>>::type_info().name(),
            "Map<String, Vec<bool>>"
        );
    }

    #[test]
    fn test_element_type_unwraps_every_container() {
        let ty = <Option<Vec<HashMap<String, Color>>>>::type_info();
        assert_eq!(ty.element_type().name(), "Color");
        assert_eq!(ty.unwrap_nullable().name(), "Vec<Map<String, Color>>");
    }

    #[test]
    fn test_self_referential_object_is_constructible() {
        let info = Node::type_info();
        let TypeInfo::Object(object) = info else {
            panic!("expected an object");
        };
        let next = object.fields[0].ty.resolve();
        assert_eq!(next.name(), "Option<Node>");
        assert_eq!(next.element_type().name(), "Node");
    }

    #[test]
    fn test_enum_variant_lookup_is_case_insensitive() {
        let TypeInfo::Enum(info) = Color::type_info() else {
            panic!("expected an enum");
        };
        assert_eq!(info.variant("green"), Some("Green"));
        assert_eq!(info.variant("RED"), Some("Red"));
        assert_eq!(info.variant("blue"), None);
    }

    #[test]
    fn test_type_ref_of_unsized_and_nested() {
        assert_eq!(TypeRef::of::<str>().resolve().name(), "String");
        assert_eq!(TypeRef::of::<[Node]>().resolve().name(), "Vec<Node>");
        let shared = TypeRef::of::<Arc<Vec<Color>>>();
        assert_eq!(shared.clone().resolve().name(), shared.resolve().name());
    }

    #[test]
    fn test_value_types() {
        assert!(i32::type_info().is_value_type());
        assert!(Color::type_info().is_value_type());
        assert!(!<Option<i32>>::type_info().is_value_type());
        assert!(!Node::type_info().is_value_type());
    }
}
