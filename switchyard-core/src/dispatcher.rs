//! Request dispatch.
//!
//! [`Dispatcher`] owns the frozen route table, the shared binder and the
//! global hooks. It is built once through [`DispatcherBuilder`] and then
//! shared (typically in an `Arc`) by every request.
//!
//! ```
//! use switchyard_core::{Dispatch, Dispatcher, HttpRequest, OperationDescriptor, Reply, SyncOperation};
//!
//! # tokio_test::block_on(async {
//! let greet = OperationDescriptor::builder("Greet")
//!     .param::<String>("name")
//!     .returns::<String>()
//!     .build()?;
//!
//! let dispatcher = Dispatcher::builder()
//!     .operation("/api/greet", SyncOperation::new(greet, |_ctx, args| {
//!         let name: String = args.get(0)?;
//!         Ok(Reply::Value(format!("Hello, {}!", name).into()))
//!     }))
//!     .build();
//!
//! let request = HttpRequest::parse("GET", "/API/Greet?Name=Ada")?;
//! let Dispatch::Handled(response) = dispatcher.dispatch(request).await? else {
//!     panic!("route should match");
//! };
//! assert_eq!(response.text()?, r#""Hello, Ada!""#);
//! # Ok::<(), switchyard_core::Error>(())
//! # }).unwrap();
//! ```

use crate::binder::{DEFAULT_CONTEXT_TOKEN, ParameterBinder};
use crate::context::RequestContext;
use crate::convert::TypeConverter;
use crate::descriptor::Operation;
use crate::error::Error;
use crate::handler::{MethodHandler, RequestHandler};
use crate::http::{HttpRequest, HttpResponse};
use crate::lifecycle::{EventHandlers, LifecycleRunner};
use crate::logging::{debug, info};
use crate::routing::{Route, Router};
use crate::serialization::{JsonSerializer, SerializationService};
use serde::Deserialize;
use std::sync::Arc;

/// Dispatcher behavior settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Parameter name that binds the request context
    pub context_parameter: String,
    /// Message of the generic response written when a handler fails
    pub error_message: String,
    /// Include failure text in that response
    pub expose_error_details: bool,
    /// Answer `204 No Content` for operations without a result
    pub empty_result_no_content: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            context_parameter: DEFAULT_CONTEXT_TOKEN.to_string(),
            error_message: "Internal Server Error".to_string(),
            expose_error_details: false,
            empty_result_no_content: true,
        }
    }
}

/// Outcome of [`Dispatcher::dispatch`].
#[derive(Debug)]
pub enum Dispatch {
    Handled(HttpResponse),
    /// No route matched; the host decides how to answer.
    NotFound(HttpRequest),
}

impl Dispatch {
    /// The response, or a plain 404 when nothing matched.
    pub fn into_response(self) -> HttpResponse {
        match self {
            Dispatch::Handled(response) => response,
            Dispatch::NotFound(_) => HttpResponse::not_found(),
        }
    }

    pub fn is_handled(&self) -> bool {
        matches!(self, Dispatch::Handled(_))
    }
}

/// Routes requests and runs them through the handler lifecycle.
pub struct Dispatcher {
    router: Arc<Router>,
    runner: LifecycleRunner,
    serializer: Arc<dyn SerializationService>,
    binder: Arc<ParameterBinder>,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn binder(&self) -> &Arc<ParameterBinder> {
        &self.binder
    }

    pub fn serializer(&self) -> &Arc<dyn SerializationService> {
        &self.serializer
    }

    /// Handle one request end to end.
    ///
    /// Routing misses come back as [`Dispatch::NotFound`] and handler
    /// failures as a generic error response; `Err` means a hook failed or
    /// the response could not be serialized.
    pub async fn dispatch(&self, request: HttpRequest) -> Result<Dispatch, Error> {
        let mut ctx = RequestContext::new(request);
        if !self.handle(&mut ctx).await? {
            return Ok(Dispatch::NotFound(ctx.into_request()));
        }
        ctx.into_response(self.serializer.as_ref()).map(Dispatch::Handled)
    }

    /// Route and handle a caller-owned context. Returns `false` when no
    /// route matched, leaving the context untouched.
    pub async fn handle(&self, ctx: &mut RequestContext) -> Result<bool, Error> {
        let Some(route) = self.router.resolve(ctx.request().path()) else {
            return Ok(false);
        };
        self.runner.run(route, ctx).await?;
        Ok(true)
    }
}

enum PendingHandler {
    Operation(Arc<dyn Operation>),
    Handler(Arc<dyn RequestHandler>),
}

struct PendingRoute {
    path: String,
    handler: PendingHandler,
    events: EventHandlers,
}

/// Collects routes, hooks and services, then freezes them into a
/// [`Dispatcher`].
#[derive(Default)]
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    serializer: Option<Arc<dyn SerializationService>>,
    converter: Option<Arc<TypeConverter>>,
    routes: Vec<PendingRoute>,
    global: EventHandlers,
}

impl DispatcherBuilder {
    pub fn config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the JSON serializer.
    pub fn serializer(mut self, serializer: Arc<dyn SerializationService>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Share a type converter (and its default-value cache).
    pub fn converter(mut self, converter: Arc<TypeConverter>) -> Self {
        self.converter = Some(converter);
        self
    }

    /// Mount an operation at `path`, binding its parameters from requests.
    pub fn operation(self, path: impl Into<String>, operation: impl Operation + 'static) -> Self {
        self.operation_with_events(path, operation, EventHandlers::default())
    }

    pub fn operation_with_events(
        mut self,
        path: impl Into<String>,
        operation: impl Operation + 'static,
        events: EventHandlers,
    ) -> Self {
        self.routes.push(PendingRoute {
            path: path.into(),
            handler: PendingHandler::Operation(Arc::new(operation)),
            events,
        });
        self
    }

    /// Mount a ready-made handler at `path`.
    pub fn route(self, path: impl Into<String>, handler: impl RequestHandler + 'static) -> Self {
        self.route_with_events(path, handler, EventHandlers::default())
    }

    pub fn route_with_events(
        mut self,
        path: impl Into<String>,
        handler: impl RequestHandler + 'static,
        events: EventHandlers,
    ) -> Self {
        self.routes.push(PendingRoute {
            path: path.into(),
            handler: PendingHandler::Handler(Arc::new(handler)),
            events,
        });
        self
    }

    /// Mount every operation of a service under `prefix`, one route per
    /// operation at `prefix` + the lower-cased operation name.
    pub fn service<I>(mut self, prefix: &str, operations: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Operation>>,
    {
        let prefix = if prefix.ends_with('/') {
            prefix.to_string()
        } else {
            format!("{}/", prefix)
        };
        for operation in operations {
            let path = format!("{}{}", prefix, operation.descriptor().name.to_lowercase());
            self.routes.push(PendingRoute {
                path,
                handler: PendingHandler::Operation(operation),
                events: EventHandlers::default(),
            });
        }
        self
    }

    pub fn on_pre_invoke<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.global = self.global.on_pre_invoke(hook);
        self
    }

    pub fn on_post_invoke<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.global = self.global.on_post_invoke(hook);
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext, &Arc<Error>) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.global = self.global.on_error(hook);
        self
    }

    /// Freeze the route table and attach handlers to it.
    pub fn build(self) -> Dispatcher {
        let converter = self.converter.unwrap_or_else(|| Arc::new(TypeConverter::new()));
        let serializer = self
            .serializer
            .unwrap_or_else(|| Arc::new(JsonSerializer::with_converter(converter.clone())));
        let binder = Arc::new(
            ParameterBinder::new(converter, serializer.clone())
                .with_context_token(self.config.context_parameter.clone()),
        );

        let mut router = Router::new();
        for pending in self.routes {
            let handler: Arc<dyn RequestHandler> = match pending.handler {
                PendingHandler::Operation(operation) => Arc::new(
                    MethodHandler::new(operation, binder.clone())
                        .no_content_on_empty(self.config.empty_result_no_content),
                ),
                PendingHandler::Handler(handler) => handler,
            };
            debug!(path = %pending.path, handler = handler.kind(), "Registered route");
            router.add_route(Route::new(&pending.path, handler).with_events(pending.events));
        }

        let router = Arc::new(router);
        for route in router.routes() {
            route.handler().attach(&router);
        }
        info!(routes = router.len(), "Dispatcher ready");

        let runner = LifecycleRunner::new(self.global)
            .error_message(self.config.error_message.clone())
            .expose_error_details(self.config.expose_error_details);

        Dispatcher {
            router,
            runner,
            serializer,
            binder,
            config: self.config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{OperationDescriptor, Reply, SyncOperation};
    use serde_json::json;

    fn echo(name: &str) -> Arc<dyn Operation> {
        let descriptor = OperationDescriptor::builder(name)
            .param::<String>("text")
            .build()
            .unwrap();
        Arc::new(SyncOperation::new(descriptor, |_ctx, args| {
            Ok(Reply::Value(json!(args.get::<String>(0)?)))
        }))
    }

    #[test]
    fn test_default_config() {
        let config = DispatcherConfig::default();
        assert_eq!(config.context_parameter, "context");
        assert_eq!(config.error_message, "Internal Server Error");
        assert!(!config.expose_error_details);
        assert!(config.empty_result_no_content);
    }

    #[test]
    fn test_service_mounts_lowercase_paths() {
        let dispatcher = Dispatcher::builder()
            .service("/api/Text", vec![echo("Echo"), echo("Shout")])
            .build();
        let paths: Vec<&str> = dispatcher.router().routes().iter().map(|r| r.path()).collect();
        assert_eq!(paths, vec!["/api/text/echo", "/api/text/shout"]);
    }

    #[tokio::test]
    async fn test_not_found_returns_request() {
        let dispatcher = Dispatcher::builder().build();
        let outcome = dispatcher.dispatch(HttpRequest::new("GET", "/missing")).await.unwrap();
        assert!(!outcome.is_handled());
        assert_eq!(outcome.into_response().status, 404);
    }

    #[tokio::test]
    async fn test_handle_with_caller_context() {
        let dispatcher = Dispatcher::builder()
            .service("/svc", vec![echo("Echo")])
            .build();

        let mut ctx = RequestContext::new(HttpRequest::new("GET", "/svc/echo").with_query("text", "hi"));
        assert!(dispatcher.handle(&mut ctx).await.unwrap());
        assert_eq!(ctx.route(), Some("/svc/echo"));

        let mut ctx = RequestContext::new(HttpRequest::new("GET", "/nope"));
        assert!(!dispatcher.handle(&mut ctx).await.unwrap());
    }
}
