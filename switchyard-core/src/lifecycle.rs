//! Handler lifecycle: pre-invoke, invoke, error and post-invoke hooks.
//!
//! Each request moves through
//! `Created → PreInvoke → Invoking → PostInvoke → Completed`, with a detour
//! through `Error` when the handler fails. A pre-invoke hook can mark the
//! context handled, which skips `Invoking`.
//!
//! Hooks come in two scopes: attached to one route, or global. Route hooks
//! run before global hooks, each list in registration order.
//!
//! Handler failures (binding errors included) are recovered here exactly
//! once: recorded on the context, turned into a generic error response and
//! reported to the error hooks. Post-invoke hooks run afterwards as usual.
//! A failing hook is treated as a configuration defect and is *not*
//! recovered; it is returned to the caller as [`Error::Hook`].

use crate::context::{LifecycleState, RequestContext};
use crate::error::{Error, HookStage};
use crate::logging::{debug, error};
use crate::routing::Route;
use serde_json::json;
use std::fmt;
use std::sync::Arc;

/// Pre- and post-invoke hook.
pub type Hook = Arc<dyn Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync>;

/// Error hook, given the recorded handler failure.
pub type ErrorHook = Arc<dyn Fn(&mut RequestContext, &Arc<Error>) -> Result<(), Error> + Send + Sync>;

/// An ordered, append-only set of lifecycle hooks.
#[derive(Clone, Default)]
pub struct EventHandlers {
    pre_invoke: Vec<Hook>,
    post_invoke: Vec<Hook>,
    error: Vec<ErrorHook>,
}

impl EventHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_pre_invoke<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.pre_invoke.push(Arc::new(hook));
        self
    }

    pub fn on_post_invoke<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.post_invoke.push(Arc::new(hook));
        self
    }

    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut RequestContext, &Arc<Error>) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.error.push(Arc::new(hook));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.pre_invoke.is_empty() && self.post_invoke.is_empty() && self.error.is_empty()
    }
}

impl fmt::Debug for EventHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandlers")
            .field("pre_invoke", &self.pre_invoke.len())
            .field("post_invoke", &self.post_invoke.len())
            .field("error", &self.error.len())
            .finish()
    }
}

/// Runs a route's handler inside the hook lifecycle.
#[derive(Debug, Clone)]
pub struct LifecycleRunner {
    global: EventHandlers,
    error_message: String,
    expose_error_details: bool,
}

impl LifecycleRunner {
    pub fn new(global: EventHandlers) -> Self {
        Self {
            global,
            error_message: "Internal Server Error".to_string(),
            expose_error_details: false,
        }
    }

    /// Message of the generic response written when a handler fails.
    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = message.into();
        self
    }

    /// Include the failure's text in the generic error response.
    pub fn expose_error_details(mut self, expose: bool) -> Self {
        self.expose_error_details = expose;
        self
    }

    pub fn global(&self) -> &EventHandlers {
        &self.global
    }

    /// Handle `ctx` with `route`.
    ///
    /// Returns `Err` only when a hook fails.
    pub async fn run(&self, route: &Route, ctx: &mut RequestContext) -> Result<(), Error> {
        let scoped = route.events();
        ctx.set_route(route.path());

        ctx.transition(LifecycleState::PreInvoke);
        for hook in scoped.pre_invoke.iter().chain(&self.global.pre_invoke) {
            if ctx.is_handled() {
                break;
            }
            hook(ctx).map_err(|e| Error::hook(HookStage::PreInvoke, e))?;
        }

        let mut hook_failure = None;
        if ctx.is_handled() {
            debug!(route = %route.path(), "Request handled by pre-invoke hook, skipping handler");
        } else {
            ctx.transition(LifecycleState::Invoking);
            if let Err(e) = route.handler().handle_request(ctx).await {
                hook_failure = self.recover(route, ctx, e);
            }
        }

        ctx.transition(LifecycleState::PostInvoke);
        for hook in scoped.post_invoke.iter().chain(&self.global.post_invoke) {
            hook(ctx).map_err(|e| Error::hook(HookStage::PostInvoke, e))?;
        }
        ctx.transition(LifecycleState::Completed);

        match hook_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Record a handler failure and run the error hooks. Returns the first
    /// error-hook failure, if any.
    fn recover(&self, route: &Route, ctx: &mut RequestContext, failure: Error) -> Option<Error> {
        ctx.transition(LifecycleState::Error);
        error!(
            route = %route.path(),
            handler = route.handler().kind(),
            status = failure.status_code(),
            error = %failure,
            "Request handler failed"
        );

        let failure = ctx.record_error(failure);
        let body = if self.expose_error_details {
            json!({ "error": self.error_message, "detail": failure.to_string() })
        } else {
            json!({ "error": self.error_message })
        };
        ctx.fail_with(500, body);

        for hook in route.events().error.iter().chain(&self.global.error) {
            if let Err(e) = hook(ctx, &failure) {
                return Some(Error::hook(HookStage::Error, e));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{FuncHandler, RequestHandler};
    use crate::http::HttpRequest;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn record(log: Log, entry: &'static str) -> impl Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync + 'static {
        move |_ctx: &mut RequestContext| {
            log.lock().unwrap().push(entry.to_string());
            Ok(())
        }
    }

    fn route(handler: impl RequestHandler + 'static, events: EventHandlers) -> Route {
        Route::new("/test", Arc::new(handler)).with_events(events)
    }

    fn failing() -> impl RequestHandler {
        FuncHandler::new(|_ctx: &mut RequestContext| Err(Error::Internal("boom".into())))
    }

    fn succeeding(log: Log) -> impl RequestHandler {
        FuncHandler::new(move |_ctx: &mut RequestContext| {
            log.lock().unwrap().push("handler".into());
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_hook_order() {
        let log: Log = Arc::default();
        let scoped = EventHandlers::new()
            .on_pre_invoke(record(log.clone(), "route-pre"))
            .on_post_invoke(record(log.clone(), "route-post"));
        let global = EventHandlers::new()
            .on_pre_invoke(record(log.clone(), "global-pre"))
            .on_post_invoke(record(log.clone(), "global-post"));

        let runner = LifecycleRunner::new(global);
        let mut ctx = RequestContext::new(HttpRequest::new("GET", "/test"));
        runner.run(&route(succeeding(log.clone()), scoped), &mut ctx).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["route-pre", "global-pre", "handler", "route-post", "global-post"]
        );
        assert_eq!(ctx.state(), LifecycleState::Completed);
        assert_eq!(ctx.route(), Some("/test"));
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler_but_not_post() {
        let log: Log = Arc::default();
        let scoped = EventHandlers::new()
            .on_pre_invoke(|ctx| {
                ctx.set_status(204);
                ctx.set_handled(true);
                Ok(())
            })
            .on_post_invoke(record(log.clone(), "post"));
        let global = EventHandlers::new().on_pre_invoke(record(log.clone(), "global-pre"));

        let mut ctx = RequestContext::new(HttpRequest::new("OPTIONS", "/test"));
        LifecycleRunner::new(global)
            .run(&route(succeeding(log.clone()), scoped), &mut ctx)
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["post"]);
        assert_eq!(ctx.status(), 204);
    }

    #[tokio::test]
    async fn test_handler_failure_is_recovered() {
        let log: Log = Arc::default();
        let seen = Arc::new(Mutex::new(None));
        let seen_in_hook = seen.clone();
        let scoped = EventHandlers::new()
            .on_error(move |_ctx, err| {
                *seen_in_hook.lock().unwrap() = Some(err.to_string());
                Ok(())
            })
            .on_post_invoke(record(log.clone(), "post"));

        let mut ctx = RequestContext::new(HttpRequest::new("GET", "/test"));
        LifecycleRunner::new(EventHandlers::new())
            .run(&route(failing(), scoped), &mut ctx)
            .await
            .unwrap();

        assert_eq!(ctx.errors().len(), 1);
        assert_eq!(ctx.status(), 500);
        assert_eq!(*log.lock().unwrap(), vec!["post"]);
        assert!(seen.lock().unwrap().as_deref().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_error_details_are_hidden_by_default() {
        let mut ctx = RequestContext::new(HttpRequest::new("GET", "/test"));
        LifecycleRunner::new(EventHandlers::new())
            .run(&route(failing(), EventHandlers::new()), &mut ctx)
            .await
            .unwrap();
        assert!(matches!(
            ctx.body(),
            crate::context::ResponseBody::Object(v) if v.get("detail").is_none() && v["error"] == "Internal Server Error"
        ));

        let mut ctx = RequestContext::new(HttpRequest::new("GET", "/test"));
        LifecycleRunner::new(EventHandlers::new())
            .expose_error_details(true)
            .run(&route(failing(), EventHandlers::new()), &mut ctx)
            .await
            .unwrap();
        assert!(matches!(
            ctx.body(),
            crate::context::ResponseBody::Object(v) if v["detail"].as_str().unwrap_or_default().contains("boom")
        ));
    }

    #[tokio::test]
    async fn test_pre_invoke_hook_failure_propagates() {
        let log: Log = Arc::default();
        let scoped = EventHandlers::new()
            .on_pre_invoke(|_ctx| Err(Error::Configuration("bad hook".into())))
            .on_post_invoke(record(log.clone(), "post"));

        let mut ctx = RequestContext::new(HttpRequest::new("GET", "/test"));
        let err = LifecycleRunner::new(EventHandlers::new())
            .run(&route(succeeding(log.clone()), scoped), &mut ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Hook { stage: HookStage::PreInvoke, .. }));
        assert!(log.lock().unwrap().is_empty());
        assert!(ctx.errors().is_empty());
    }

    #[tokio::test]
    async fn test_error_hook_failure_still_runs_post_hooks() {
        let log: Log = Arc::default();
        let global = EventHandlers::new()
            .on_error(|_ctx, _err| Err(Error::Internal("alerting down".into())))
            .on_post_invoke(record(log.clone(), "global-post"));

        let mut ctx = RequestContext::new(HttpRequest::new("GET", "/test"));
        let err = LifecycleRunner::new(global)
            .run(&route(failing(), EventHandlers::new()), &mut ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Hook { stage: HookStage::Error, .. }));
        assert_eq!(*log.lock().unwrap(), vec!["global-post"]);
        assert_eq!(ctx.state(), LifecycleState::Completed);
    }

    #[tokio::test]
    async fn test_post_invoke_hook_failure_propagates() {
        let global = EventHandlers::new().on_post_invoke(|_ctx| Err(Error::Internal("flush failed".into())));
        let log: Log = Arc::default();

        let mut ctx = RequestContext::new(HttpRequest::new("GET", "/test"));
        let err = LifecycleRunner::new(global)
            .run(&route(succeeding(log.clone()), EventHandlers::new()), &mut ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Hook { stage: HookStage::PostInvoke, .. }));
        assert_eq!(*log.lock().unwrap(), vec!["handler"]);
    }
}
