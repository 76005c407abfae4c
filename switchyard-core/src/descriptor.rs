//! Operation descriptors and invocable operations.
//!
//! An [`OperationDescriptor`] is the data form of a callable signature: its
//! name, ordered parameters and result type. Descriptors are built once at
//! configuration time and never mutated, which lets every request share them
//! without synchronization.

use crate::binder::Arguments;
use crate::bag::keys_equal;
use crate::context::RequestContext;
use crate::error::Error;
use crate::types::{Reflect, TypeInfo};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// One declared parameter of an operation.
#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    pub name: String,
    /// Zero-based, dense within the operation
    pub position: usize,
    pub ty: TypeInfo,
    /// Omitted values bind the "use declared default" marker
    pub optional: bool,
    /// Values land in a property bag instead of the declared type
    pub dynamic: bool,
    pub description: Option<String>,
}

impl ParameterDescriptor {
    pub fn is_context(&self) -> bool {
        self.ty.is_context()
    }

    pub fn is_nullable(&self) -> bool {
        self.ty.is_nullable()
    }
}

/// Immutable description of an invocable operation.
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Vec<ParameterDescriptor>,
    pub returns: TypeInfo,
}

impl OperationDescriptor {
    pub fn builder(name: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder {
            name: name.into(),
            description: None,
            parameters: Vec::new(),
            returns: TypeInfo::Unit,
        }
    }

    /// Look a parameter up by name, ignoring case.
    pub fn parameter(&self, name: &str) -> Option<&ParameterDescriptor> {
        self.parameters.iter().find(|p| keys_equal(&p.name, name))
    }

    /// Stable signature string, e.g. `GetCustomer(i64,Option<bool>)`.
    pub fn signature(&self) -> String {
        let types: Vec<String> = self.parameters.iter().map(|p| p.ty.name()).collect();
        format!("{}({})", self.name, types.join(","))
    }
}

/// Builder for [`OperationDescriptor`].
///
/// ```
/// use switchyard_core::OperationDescriptor;
///
/// let descriptor = OperationDescriptor::builder("ListOrders")
///     .description("Orders for a customer")
///     .context_param("context")
///     .param::<i64>("customerId")
///     .optional_param::<u32>("limit")
///     .describe_param("limit", "Maximum number of orders")
///     .returns::<Vec<String>>()
///     .build()
///     .unwrap();
///
/// assert_eq!(descriptor.parameters[2].position, 2);
/// assert_eq!(descriptor.signature(), "ListOrders(RequestContext,i64,u32)");
/// ```
#[derive(Debug)]
pub struct DescriptorBuilder {
    name: String,
    description: Option<String>,
    parameters: Vec<ParameterDescriptor>,
    returns: TypeInfo,
}

impl DescriptorBuilder {
    fn push(mut self, name: impl Into<String>, ty: TypeInfo, optional: bool) -> Self {
        let dynamic = matches!(ty, TypeInfo::Dynamic);
        self.parameters.push(ParameterDescriptor {
            name: name.into(),
            position: self.parameters.len(),
            ty,
            optional,
            dynamic,
            description: None,
        });
        self
    }

    /// Required parameter of a reflected type.
    pub fn param<T: Reflect + ?Sized>(self, name: impl Into<String>) -> Self {
        self.push(name, T::type_info(), false)
    }

    /// Parameter with a declared default; absence binds the default marker.
    pub fn optional_param<T: Reflect + ?Sized>(self, name: impl Into<String>) -> Self {
        self.push(name, T::type_info(), true)
    }

    /// Parameter described by an explicit [`TypeInfo`].
    pub fn param_of(self, name: impl Into<String>, ty: TypeInfo) -> Self {
        self.push(name, ty, false)
    }

    /// Loosely-typed parameter bound into a property bag.
    pub fn dynamic_param(self, name: impl Into<String>) -> Self {
        self.push(name, TypeInfo::Dynamic, false)
    }

    /// Receives the live request context.
    pub fn context_param(self, name: impl Into<String>) -> Self {
        self.push(name, TypeInfo::Context, false)
    }

    /// Attach a description to an already-declared parameter.
    pub fn describe_param(mut self, name: &str, description: impl Into<String>) -> Self {
        if let Some(param) = self.parameters.iter_mut().rev().find(|p| keys_equal(&p.name, name)) {
            param.description = Some(description.into());
        }
        self
    }

    pub fn returns<T: Reflect + ?Sized>(mut self) -> Self {
        self.returns = T::type_info();
        self
    }

    pub fn returns_type(mut self, ty: TypeInfo) -> Self {
        self.returns = ty;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validate and freeze the descriptor.
    pub fn build(self) -> Result<OperationDescriptor, Error> {
        if self.name.trim().is_empty() {
            return Err(Error::Configuration("operation name must not be empty".into()));
        }
        for (i, param) in self.parameters.iter().enumerate() {
            if param.name.trim().is_empty() {
                return Err(Error::Configuration(format!(
                    "parameter {} of operation '{}' has no name",
                    i, self.name
                )));
            }
            if self.parameters[..i].iter().any(|p| keys_equal(&p.name, &param.name)) {
                return Err(Error::Configuration(format!(
                    "operation '{}' declares parameter '{}' more than once",
                    self.name, param.name
                )));
            }
        }

        Ok(OperationDescriptor {
            name: self.name,
            description: self.description,
            parameters: self.parameters,
            returns: self.returns,
        })
    }
}

/// What an operation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Serialized as the response body
    Value(Value),
    /// No result
    Empty,
    /// Explicit status code with a body
    Status(u16, Value),
}

impl Reply {
    /// Serialize any value into a [`Reply::Value`].
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        serde_json::to_value(value)
            .map(Reply::Value)
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl From<Value> for Reply {
    fn from(value: Value) -> Self {
        Reply::Value(value)
    }
}

impl From<()> for Reply {
    fn from(_: ()) -> Self {
        Reply::Empty
    }
}

/// Boxed future returned by async operation closures.
pub type OperationFuture<'a> = Pin<Box<dyn Future<Output = Result<Reply, Error>> + Send + 'a>>;

/// An invocable unit of business logic.
#[async_trait]
pub trait Operation: Send + Sync {
    fn descriptor(&self) -> &OperationDescriptor;

    /// Run the operation with arguments bound positionally to
    /// [`descriptor`](Operation::descriptor)'s parameters.
    async fn invoke(&self, ctx: &mut RequestContext, args: Arguments) -> Result<Reply, Error>;
}

/// Operation backed by an async closure.
///
/// ```
/// use futures_util::FutureExt;
/// use switchyard_core::{FnOperation, OperationDescriptor, Reply};
///
/// let descriptor = OperationDescriptor::builder("Echo").param::<String>("text").build().unwrap();
/// let echo = FnOperation::new(descriptor, |_ctx, args| {
///     async move {
///         let text: String = args.get(0)?;
///         Ok(Reply::Value(text.into()))
///     }
///     .boxed()
/// });
/// # let _ = echo;
/// ```
pub struct FnOperation<F> {
    descriptor: OperationDescriptor,
    f: F,
}

impl<F> FnOperation<F>
where
    F: for<'a> Fn(&'a mut RequestContext, Arguments) -> OperationFuture<'a> + Send + Sync,
{
    pub fn new(descriptor: OperationDescriptor, f: F) -> Self {
        Self { descriptor, f }
    }
}

#[async_trait]
impl<F> Operation for FnOperation<F>
where
    F: for<'a> Fn(&'a mut RequestContext, Arguments) -> OperationFuture<'a> + Send + Sync,
{
    fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, ctx: &mut RequestContext, args: Arguments) -> Result<Reply, Error> {
        (self.f)(ctx, args).await
    }
}

/// Operation backed by a plain closure.
pub struct SyncOperation<F> {
    descriptor: OperationDescriptor,
    f: F,
}

impl<F> SyncOperation<F>
where
    F: Fn(&mut RequestContext, Arguments) -> Result<Reply, Error> + Send + Sync,
{
    pub fn new(descriptor: OperationDescriptor, f: F) -> Self {
        Self { descriptor, f }
    }
}

#[async_trait]
impl<F> Operation for SyncOperation<F>
where
    F: Fn(&mut RequestContext, Arguments) -> Result<Reply, Error> + Send + Sync,
{
    fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, ctx: &mut RequestContext, args: Arguments) -> Result<Reply, Error> {
        (self.f)(ctx, args)
    }
}
