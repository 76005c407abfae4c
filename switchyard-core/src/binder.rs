//! Parameter binding.
//!
//! [`ParameterBinder`] turns request data into the positional [`Arguments`]
//! of an operation. Each parameter is resolved independently, in position
//! order:
//!
//! 1. the request context, by declared type or by the reserved name
//! 2. an entry of the context's item bag under the parameter name
//! 3. query string, then form fields, then headers (case-insensitive, first
//!    source wins)
//! 4. the whole request body, when nothing matched and there is no form data
//! 5. absence: optional parameters take their default, nullable ones take
//!    null, anything else is a [`BindingError::MissingParameter`]
//! 6. the scalar [`TypeConverter`], unless the parameter is dynamic
//! 7. the [`SerializationService`]'s lenient structural decode
//!
//! Conversion failures in step 6 are not errors; they only send the value on
//! to step 7. A failure in step 7 is.

use crate::bag::{BagValue, keys_equal};
use crate::context::RequestContext;
use crate::convert::{Scalar, TypeConverter};
use crate::descriptor::{OperationDescriptor, ParameterDescriptor};
use crate::error::{BindingError, ConversionError, Error};
use crate::logging::{debug, trace};
use crate::serialization::SerializationService;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Name that binds the request context regardless of declared type.
pub const DEFAULT_CONTEXT_TOKEN: &str = "context";

/// A bound value for one parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    /// The live request context; passed to the operation separately
    Context,
    /// No value supplied; the operation should use its declared default
    Default,
    Null,
    /// Converted by the fast path
    Scalar(Scalar),
    /// Decoded and conformed to the declared type
    Structured(Value),
    /// Decoded into a loosely-typed tree
    Dynamic(BagValue),
    /// Taken from the request's item bag
    Item(BagValue),
}

impl Argument {
    fn to_json(&self) -> Option<Value> {
        match self {
            Argument::Context => None,
            Argument::Default | Argument::Null => Some(Value::Null),
            Argument::Scalar(s) => Some(s.to_json()),
            Argument::Structured(v) => Some(v.clone()),
            Argument::Dynamic(b) | Argument::Item(b) => Some(b.to_json()),
        }
    }
}

/// Bound arguments of one invocation, in parameter order.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    operation: String,
    names: Vec<String>,
    values: Vec<Argument>,
}

impl Arguments {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    /// Append an argument. Used by the binder and by tests that invoke
    /// operations directly.
    pub fn push(&mut self, name: impl Into<String>, value: Argument) {
        self.names.push(name.into());
        self.values.push(value);
    }

    pub fn with(mut self, name: impl Into<String>, value: Argument) -> Self {
        self.push(name, value);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn argument(&self, index: usize) -> Option<&Argument> {
        self.values.get(index)
    }

    /// Position of a parameter by name, ignoring case.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| keys_equal(n, name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Argument)> {
        self.names.iter().map(String::as_str).zip(self.values.iter())
    }

    /// Whether the argument at `index` asks for the declared default.
    pub fn is_default(&self, index: usize) -> bool {
        matches!(self.values.get(index), Some(Argument::Default))
    }

    /// Extract the argument at `index` as `T`.
    ///
    /// Null and default arguments extract as JSON `null`, so they succeed for
    /// `Option<T>` and fail for everything else; use
    /// [`get_or`](Arguments::get_or) for parameters with defaults.
    pub fn get<T: DeserializeOwned>(&self, index: usize) -> Result<T, Error> {
        let name = self.names.get(index).map(String::as_str).unwrap_or("?");
        let value = self
            .values
            .get(index)
            .ok_or_else(|| self.extract_error(name, format!("no argument at position {}", index)))?
            .to_json()
            .ok_or_else(|| self.extract_error(name, "the request context is not a value".into()))?;

        serde_json::from_value(value).map_err(|e| self.extract_error(name, e.to_string()))
    }

    /// Like [`get`](Arguments::get) but returns `default` when the argument
    /// was not supplied.
    pub fn get_or<T: DeserializeOwned>(&self, index: usize, default: T) -> Result<T, Error> {
        if self.is_default(index) {
            Ok(default)
        } else {
            self.get(index)
        }
    }

    pub fn get_or_default<T: DeserializeOwned + Default>(&self, index: usize) -> Result<T, Error> {
        self.get_or(index, T::default())
    }

    /// Extract by parameter name.
    pub fn get_named<T: DeserializeOwned>(&self, name: &str) -> Result<T, Error> {
        let index = self
            .position(name)
            .ok_or_else(|| self.extract_error(name, "no such parameter".into()))?;
        self.get(index)
    }

    /// Loosely-typed view of a dynamic or item-bag argument.
    pub fn dynamic(&self, index: usize) -> Option<&BagValue> {
        match self.values.get(index)? {
            Argument::Dynamic(value) | Argument::Item(value) => Some(value),
            _ => None,
        }
    }

    /// Host object stored in the item bag and bound to this parameter.
    pub fn item<T: Any + Send + Sync>(&self, index: usize) -> Option<Arc<T>> {
        match self.values.get(index)? {
            Argument::Item(value) => value.downcast_arc::<T>(),
            _ => None,
        }
    }

    fn extract_error(&self, parameter: &str, reason: String) -> Error {
        Error::Deserialization(format!(
            "argument '{}' of operation '{}': {}",
            parameter, self.operation, reason
        ))
    }
}

/// Resolves operation parameters from request data.
#[derive(Clone)]
pub struct ParameterBinder {
    converter: Arc<TypeConverter>,
    serializer: Arc<dyn SerializationService>,
    context_token: String,
}

impl ParameterBinder {
    pub fn new(converter: Arc<TypeConverter>, serializer: Arc<dyn SerializationService>) -> Self {
        Self {
            converter,
            serializer,
            context_token: DEFAULT_CONTEXT_TOKEN.to_string(),
        }
    }

    /// Change the reserved parameter name that binds the request context.
    pub fn with_context_token(mut self, token: impl Into<String>) -> Self {
        self.context_token = token.into();
        self
    }

    pub fn converter(&self) -> &Arc<TypeConverter> {
        &self.converter
    }

    pub fn serializer(&self) -> &Arc<dyn SerializationService> {
        &self.serializer
    }

    /// Bind every parameter of `operation`, stopping at the first failure.
    pub fn bind(
        &self,
        ctx: &mut RequestContext,
        operation: &OperationDescriptor,
    ) -> Result<Arguments, BindingError> {
        let mut args = Arguments::new(operation.name.clone());
        for param in &operation.parameters {
            let argument = self.bind_parameter(ctx, operation, param)?;
            args.push(param.name.clone(), argument);
        }
        Ok(args)
    }

    fn bind_parameter(
        &self,
        ctx: &mut RequestContext,
        operation: &OperationDescriptor,
        param: &ParameterDescriptor,
    ) -> Result<Argument, BindingError> {
        if param.is_context() || keys_equal(&param.name, &self.context_token) {
            return Ok(Argument::Context);
        }

        if let Some(item) = ctx.items().try_get(&param.name) {
            trace!(operation = %operation.name, parameter = %param.name, source = "items", "Bound parameter");
            return Ok(Argument::Item(item.clone()));
        }

        let Some(raw) = self.lookup(ctx, operation, param) else {
            return if param.optional {
                Ok(Argument::Default)
            } else if param.is_nullable() {
                Ok(Argument::Null)
            } else {
                Err(BindingError::MissingParameter {
                    parameter: param.name.clone(),
                    operation: operation.name.clone(),
                })
            };
        };

        let mut conversion: Option<ConversionError> = None;
        if !param.dynamic {
            match self.converter.convert(raw.as_str(), &param.ty) {
                Ok(value) => return Ok(Argument::Scalar(value)),
                Err(e) => {
                    trace!(parameter = %param.name, error = %e, "Scalar conversion failed, trying structural decode");
                    conversion = Some(e);
                }
            }
        }

        let structural = if param.dynamic {
            self.serializer.deserialize_dynamic(&raw).map(Argument::Dynamic)
        } else {
            self.serializer
                .deserialize(&raw, param.ty.unwrap_nullable())
                .map(Argument::Structured)
        };

        structural.map_err(|e| {
            // for scalar targets the converter's reason is the useful one
            let reason = match conversion {
                Some(c) if param.ty.unwrap_nullable().is_value_type() => c.cause,
                _ => e.to_string(),
            };
            debug!(operation = %operation.name, parameter = %param.name, %reason, "Parameter binding failed");
            BindingError::InvalidValue {
                parameter: param.name.clone(),
                operation: operation.name.clone(),
                value: raw.clone(),
                target: param.ty.name(),
                reason,
            }
        })
    }

    fn lookup(
        &self,
        ctx: &mut RequestContext,
        operation: &OperationDescriptor,
        param: &ParameterDescriptor,
    ) -> Option<String> {
        let request = ctx.request();
        let sources = [
            ("query", &request.query),
            ("form", &request.form),
            ("headers", &request.headers),
        ];
        for (source, map) in sources {
            if let Some(value) = map.get(&param.name) {
                trace!(operation = %operation.name, parameter = %param.name, source, "Bound parameter");
                return Some(value.to_string());
            }
        }

        if !request.form.is_empty() {
            return None;
        }

        // optional parameters keep their default rather than claim the whole body
        if param.optional {
            return None;
        }

        let bytes = ctx.read_body()?;
        match String::from_utf8(bytes.to_vec()) {
            Ok(text) => {
                trace!(operation = %operation.name, parameter = %param.name, source = "body", "Bound parameter");
                Some(text)
            }
            Err(_) => {
                trace!(parameter = %param.name, "Request body is not UTF-8, treating as absent");
                None
            }
        }
    }
}

impl fmt::Debug for ParameterBinder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterBinder")
            .field("converter", &self.converter)
            .field("context_token", &self.context_token)
            .finish()
    }
}
