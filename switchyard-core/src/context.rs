//! Per-request state.
//!
//! A [`RequestContext`] is created for every inbound request and owned by
//! that request's call stack. It carries the raw request, the response being
//! built, an item bag that hooks and operations use to hand values to each
//! other, and the errors recorded along the way. Dropping the context (or
//! calling [`RequestContext::into_response`]) disposes of the items.

use crate::bag::PropertyBag;
use crate::error::Error;
use crate::http::{HttpRequest, HttpResponse};
use crate::logging::trace;
use crate::serialization::SerializationService;
use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;

/// Where a request is in the handler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    PreInvoke,
    Invoking,
    Error,
    PostInvoke,
    Completed,
}

/// Streams the response body directly, for payloads that should not be
/// buffered as an object first.
pub type BodyWriter = Box<dyn FnOnce(&mut dyn io::Write) -> io::Result<()> + Send>;

/// The response payload being built.
#[derive(Default)]
pub enum ResponseBody {
    #[default]
    Empty,
    /// Serialized through the serialization service when the response is finalized
    Object(Value),
    Bytes(Bytes),
    Writer(BodyWriter),
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseBody::Empty => f.write_str("Empty"),
            ResponseBody::Object(v) => f.debug_tuple("Object").field(v).finish(),
            ResponseBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            ResponseBody::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

#[derive(Debug)]
pub struct RequestContext {
    request: HttpRequest,
    route: Option<String>,
    status: u16,
    headers: HashMap<String, String>,
    content_type: Option<String>,
    body: ResponseBody,
    items: PropertyBag,
    errors: Vec<Arc<Error>>,
    handled: bool,
    state: LifecycleState,
}

impl RequestContext {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            request,
            route: None,
            status: 200,
            headers: HashMap::new(),
            content_type: None,
            body: ResponseBody::Empty,
            items: PropertyBag::new(),
            errors: Vec::new(),
            handled: false,
            state: LifecycleState::Created,
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut HttpRequest {
        &mut self.request
    }

    /// Give the request back, discarding any response state.
    pub fn into_request(self) -> HttpRequest {
        self.request
    }

    /// Path of the route that matched this request, if routing has run.
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    pub(crate) fn set_route(&mut self, route: impl Into<String>) {
        self.route = Some(route.into());
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub(crate) fn transition(&mut self, state: LifecycleState) {
        trace!(from = ?self.state, to = ?state, path = %self.request.path(), "Lifecycle transition");
        self.state = state;
    }

    /// Whether a hook has already produced the response.
    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// Mark the request as answered. Set in a pre-invoke hook, this skips
    /// the operation.
    pub fn set_handled(&mut self, handled: bool) {
        self.handled = handled;
    }

    /// Per-request item bag.
    pub fn items(&self) -> &PropertyBag {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut PropertyBag {
        &mut self.items
    }

    /// Errors recorded while handling this request, oldest first.
    pub fn errors(&self) -> &[Arc<Error>] {
        &self.errors
    }

    pub fn record_error(&mut self, error: Error) -> Arc<Error> {
        let error = Arc::new(error);
        self.errors.push(error.clone());
        error
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn set_status(&mut self, status: u16) {
        self.status = status;
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Set a response header, replacing any value under the same name.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(&name));
        self.headers.insert(name, value.into());
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    /// Respond with an object to be serialized.
    pub fn respond_with(&mut self, value: Value) {
        self.body = ResponseBody::Object(value);
    }

    pub fn respond_bytes(&mut self, bytes: impl Into<Bytes>) {
        self.body = ResponseBody::Bytes(bytes.into());
    }

    /// Respond by streaming through `writer` once the response is finalized.
    pub fn respond_with_writer<F>(&mut self, writer: F)
    where
        F: FnOnce(&mut dyn io::Write) -> io::Result<()> + Send + 'static,
    {
        self.body = ResponseBody::Writer(Box::new(writer));
    }

    /// Replace whatever response was built so far with a generic failure.
    pub(crate) fn fail_with(&mut self, status: u16, body: Value) {
        self.status = status;
        self.headers.clear();
        self.content_type = None;
        self.body = ResponseBody::Object(body);
    }

    /// Raw request body, read once and cached. A failed read counts as empty.
    pub fn read_body(&mut self) -> Option<Bytes> {
        match self.request.read_body() {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                trace!(error = %e, "Request body unreadable");
                None
            }
        }
    }

    /// The raw request as a loosely-typed tree, for diagnostics.
    pub fn request_bag(&mut self) -> PropertyBag {
        let body = self
            .read_body()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

        let mut url = PropertyBag::new();
        url.set("scheme", self.request.url.scheme.as_str());
        url.set("host", self.request.url.host.as_str());
        url.set("port", self.request.url.port.map(u32::from));
        url.set("basePath", self.request.url.base_path.as_str());
        url.set("path", self.request.url.path.as_str());
        url.set("query", self.request.url.query.as_str());

        let mut bag = PropertyBag::new();
        bag.set("method", self.request.method.as_str());
        bag.set("url", url);
        bag.set("query", self.request.query.to_bag());
        bag.set("form", self.request.form.to_bag());
        bag.set("headers", self.request.headers.to_bag());
        bag.set("body", body);
        bag
    }

    /// Finalize into a wire response, disposing of the item bag.
    pub fn into_response(mut self, serializer: &dyn SerializationService) -> Result<HttpResponse, Error> {
        let disposed = self.items.len();
        self.items.clear();
        if disposed > 0 {
            trace!(items = disposed, "Disposed request items");
        }

        let mut content_type = self.content_type.take();
        let body = match std::mem::take(&mut self.body) {
            ResponseBody::Empty => Vec::new(),
            ResponseBody::Object(value) => {
                content_type.get_or_insert_with(|| serializer.content_type().to_string());
                serializer.serialize(&value)?.into_bytes()
            }
            ResponseBody::Bytes(bytes) => bytes.to_vec(),
            ResponseBody::Writer(writer) => {
                let mut buffer = Vec::new();
                writer(&mut buffer)?;
                buffer
            }
        };

        let mut response = HttpResponse::new(self.status).with_body(body);
        response.headers = std::mem::take(&mut self.headers);
        if let Some(content_type) = content_type {
            response.headers.retain(|k, _| !k.eq_ignore_ascii_case("content-type"));
            response.headers.insert("Content-Type".to_string(), content_type);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::BagValue;
    use crate::serialization::JsonSerializer;
    use serde_json::json;

    #[test]
    fn test_items_are_case_insensitive() {
        let mut ctx = RequestContext::new(HttpRequest::new("GET", "/"));
        ctx.items_mut().set("UserId", 42);
        assert_eq!(ctx.items()["userid"], 42);
        assert!(ctx.items().get("missing").is_null());
    }

    #[test]
    fn test_object_response_is_serialized() {
        let mut ctx = RequestContext::new(HttpRequest::new("GET", "/"));
        ctx.respond_with(json!({"id": 1}));
        ctx.set_header("X-Trace", "abc");

        let response = ctx.into_response(&JsonSerializer::new()).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(response.header("x-trace"), Some("abc"));
        assert_eq!(response.text().unwrap(), r#"{"id":1}"#);
    }

    #[test]
    fn test_writer_response() {
        let mut ctx = RequestContext::new(HttpRequest::new("GET", "/"));
        ctx.set_content_type("text/plain");
        ctx.respond_with_writer(|out| out.write_all(b"streamed"));

        let response = ctx.into_response(&JsonSerializer::new()).unwrap();
        assert_eq!(response.body, b"streamed");
        assert_eq!(response.header("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn test_items_disposed_on_finalize() {
        struct Tracked(Arc<()>);

        let marker = Arc::new(());
        let mut ctx = RequestContext::new(HttpRequest::new("GET", "/"));
        ctx.items_mut().set("conn", BagValue::object(Tracked(marker.clone())));
        assert_eq!(Arc::strong_count(&marker), 2);

        ctx.into_response(&JsonSerializer::new()).unwrap();
        assert_eq!(Arc::strong_count(&marker), 1);
    }

    #[test]
    fn test_request_bag() {
        let request = HttpRequest::parse("POST", "http://localhost:8080/api/echo?Name=x")
            .unwrap()
            .with_header("Accept", "application/json")
            .with_body("hello");
        let mut ctx = RequestContext::new(request);

        let bag = ctx.request_bag();
        assert_eq!(bag["METHOD"], "POST");
        assert_eq!(bag["url"]["port"], 8080);
        assert_eq!(bag["query"]["name"], "x");
        assert_eq!(bag["headers"]["accept"], "application/json");
        assert_eq!(bag["body"], "hello");
    }

    #[test]
    fn test_errors_accumulate() {
        let mut ctx = RequestContext::new(HttpRequest::new("GET", "/"));
        ctx.record_error(Error::Internal("first".into()));
        ctx.record_error(Error::Internal("second".into()));
        assert_eq!(ctx.errors().len(), 2);
        assert!(ctx.errors()[0].to_string().contains("first"));
    }
}
