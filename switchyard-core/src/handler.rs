// Handler kinds behind a route
//
// Every route owns one `RequestHandler`. `MethodHandler` is the one that binds
// parameters and invokes an `Operation`; `FuncHandler` hands the raw context to
// a closure. Other crates add their own kinds (the metadata handler is one).

use crate::binder::ParameterBinder;
use crate::context::RequestContext;
use crate::descriptor::{Operation, OperationDescriptor, Reply};
use crate::error::Error;
use crate::logging::warn;
use crate::routing::Router;
use async_trait::async_trait;
use std::sync::Arc;

/// Uniform "handle one request" contract of a route.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Produce the response for `ctx`, writing it into the context.
    async fn handle_request(&self, ctx: &mut RequestContext) -> Result<(), Error>;

    /// The operation this handler invokes, for handlers that wrap one.
    fn operation(&self) -> Option<&OperationDescriptor> {
        None
    }

    /// Called once after the route table is frozen.
    fn attach(&self, _router: &Router) {}

    /// Short label for logs.
    fn kind(&self) -> &'static str;
}

/// Binds parameters from the request and invokes an operation.
pub struct MethodHandler {
    operation: Arc<dyn Operation>,
    binder: Arc<ParameterBinder>,
    no_content_on_empty: bool,
}

impl MethodHandler {
    pub fn new(operation: Arc<dyn Operation>, binder: Arc<ParameterBinder>) -> Self {
        Self {
            operation,
            binder,
            no_content_on_empty: true,
        }
    }

    /// Answer `204 No Content` when the operation returns no result.
    pub fn no_content_on_empty(mut self, enabled: bool) -> Self {
        self.no_content_on_empty = enabled;
        self
    }

    fn write_reply(&self, ctx: &mut RequestContext, reply: Reply) {
        match reply {
            Reply::Value(value) => ctx.respond_with(value),
            Reply::Status(status, value) => {
                ctx.set_status(status);
                ctx.respond_with(value);
            }
            Reply::Empty => {
                let untouched = matches!(ctx.body(), crate::context::ResponseBody::Empty) && ctx.status() == 200;
                if self.no_content_on_empty && untouched {
                    ctx.set_status(204);
                }
            }
        }
    }
}

#[async_trait]
impl RequestHandler for MethodHandler {
    async fn handle_request(&self, ctx: &mut RequestContext) -> Result<(), Error> {
        let descriptor = self.operation.descriptor();
        let args = self.binder.bind(ctx, descriptor).inspect_err(|e| {
            warn!(operation = %descriptor.name, parameter = %e.parameter(), error = %e, "Binding failed");
        })?;

        let reply = self.operation.invoke(ctx, args).await?;
        self.write_reply(ctx, reply);
        Ok(())
    }

    fn operation(&self) -> Option<&OperationDescriptor> {
        Some(self.operation.descriptor())
    }

    fn kind(&self) -> &'static str {
        "method"
    }
}

/// Hands the raw request context to a closure; no parameter binding.
pub struct FuncHandler<F> {
    f: F,
}

impl<F> FuncHandler<F>
where
    F: Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> RequestHandler for FuncHandler<F>
where
    F: Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync,
{
    async fn handle_request(&self, ctx: &mut RequestContext) -> Result<(), Error> {
        (self.f)(ctx)
    }

    fn kind(&self) -> &'static str {
        "func"
    }
}
