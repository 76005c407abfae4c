// Routing of request paths to handlers

use crate::handler::RequestHandler;
use crate::lifecycle::EventHandlers;
use crate::logging::debug;
use std::fmt;
use std::sync::Arc;

/// A URL-path prefix bound to one handler and its route-scoped hooks.
#[derive(Clone)]
pub struct Route {
    path: String,
    handler: Arc<dyn RequestHandler>,
    events: EventHandlers,
}

impl Route {
    /// Paths are stored lower-cased; matching ignores case.
    pub fn new(path: impl AsRef<str>, handler: Arc<dyn RequestHandler>) -> Self {
        Self {
            path: normalize(path.as_ref()),
            handler,
            events: EventHandlers::default(),
        }
    }

    pub fn with_events(mut self, events: EventHandlers) -> Self {
        self.events = events;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn handler(&self) -> &Arc<dyn RequestHandler> {
        &self.handler
    }

    pub fn events(&self) -> &EventHandlers {
        &self.events
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("handler", &self.handler.kind())
            .field("events", &self.events)
            .finish()
    }
}

/// Ordered route table.
///
/// Routes are added while the dispatcher is being configured. Once the
/// router is shared it is only ever read, so concurrent requests need no
/// locking.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route to the router
    pub fn add_route(&mut self, route: Route) {
        self.routes.push(route);
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Find the route for a request path.
    ///
    /// An exact (case-insensitive) match wins regardless of registration
    /// order. Otherwise the first registered route whose path is a prefix of
    /// the request path is chosen.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        let path = normalize(path);

        if let Some(route) = self.routes.iter().find(|r| r.path == path) {
            debug!(path = %path, route = %route.path, matched = "exact", "Route resolved");
            return Some(route);
        }

        match self.routes.iter().find(|r| path.starts_with(r.path.as_str())) {
            Some(route) => {
                debug!(path = %path, route = %route.path, matched = "prefix", "Route resolved");
                Some(route)
            }
            None => {
                debug!(path = %path, "No route matched");
                None
            }
        }
    }
}

fn normalize(path: &str) -> String {
    crate::bag::fold_key(path)
}
