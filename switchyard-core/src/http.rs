// HTTP request and response types

use crate::bag::{PropertyBag, fold_key};
use crate::error::Error;
use bytes::Bytes;
use indexmap::IndexMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::io;

/// Case-insensitive, order-preserving string map.
///
/// Request collections can repeat a key (`?tag=a&tag=b`); the first
/// occurrence wins and later ones are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap {
    entries: IndexMap<String, (String, String)>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the key is already present. Returns whether it was added.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        let folded = fold_key(&key);
        if self.entries.contains_key(&folded) {
            return false;
        }
        self.entries.insert(folded, (key, value.into()));
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&fold_key(key)).map(|(_, v)| v.as_str())
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

    /// Entries with their original key spelling.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Decode an `application/x-www-form-urlencoded` string.
    pub fn from_urlencoded(encoded: &str) -> Result<Self, Error> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(encoded)
            .map_err(|e| Error::BadRequest(format!("malformed url-encoded data: {}", e)))?;
        Ok(pairs.into_iter().collect())
    }

    pub fn to_bag(&self) -> PropertyBag {
        self.iter().collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParamMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = ParamMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

/// Parsed request URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUrl {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    /// Mount point of the application, without a trailing slash
    pub base_path: String,
    /// Path relative to the base path, always starting with `/`
    pub path: String,
    /// Raw query string, without the leading `?`
    pub query: String,
}

impl RequestUrl {
    /// Parse an absolute (`http://host:8080/a?b=c`) or origin-form (`/a?b=c`) URL.
    pub fn parse(url: &str) -> Result<Self, Error> {
        let (scheme, rest) = match url.split_once("://") {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => ("http".to_string(), url),
        };

        let (authority, target) = if url.contains("://") {
            match rest.find('/') {
                Some(i) => (&rest[..i], &rest[i..]),
                None => match rest.find('?') {
                    Some(i) => (&rest[..i], &rest[i..]),
                    None => (rest, ""),
                },
            }
        } else {
            ("", rest)
        };

        let (host, port) = match authority.rsplit_once(':') {
            Some((host, port)) if !port.is_empty() && !port.contains(']') => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| Error::BadRequest(format!("invalid port in URL '{}'", url)))?;
                (host.to_string(), Some(port))
            }
            _ => (authority.to_string(), None),
        };

        let target = target.split('#').next().unwrap_or_default();
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        let path = if path.is_empty() { "/" } else { path };
        if !path.starts_with('/') {
            return Err(Error::BadRequest(format!("invalid request target '{}'", url)));
        }

        Ok(Self {
            scheme,
            host,
            port,
            base_path: String::new(),
            path: path.to_string(),
            query: query.to_string(),
        })
    }

    /// Move a leading mount point from `path` to `base_path`.
    pub fn with_base_path(mut self, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        if base.is_empty() {
            return self;
        }
        let matches_base = self
            .path
            .get(..base.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(base));
        if !matches_base {
            return self;
        }
        let remainder = &self.path[base.len()..];
        if remainder.is_empty() || remainder.starts_with('/') {
            self.path = if remainder.is_empty() {
                "/".to_string()
            } else {
                remainder.to_string()
            };
            self.base_path = base.to_string();
        }
        self
    }
}

impl fmt::Display for RequestUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.host.is_empty() {
            write!(f, "{}://{}", self.scheme, self.host)?;
            if let Some(port) = self.port {
                write!(f, ":{}", port)?;
            }
        }
        write!(f, "{}{}", self.base_path, self.path)?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        Ok(())
    }
}

/// Deferred body read, e.g. from a host transport stream.
pub type BodyReader = Box<dyn FnOnce() -> io::Result<Bytes> + Send>;

/// Request body, read at most once.
#[derive(Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Bytes(Bytes),
    Reader(BodyReader),
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Empty => f.write_str("Empty"),
            RequestBody::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            RequestBody::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// HTTP request wrapper
#[derive(Debug)]
pub struct HttpRequest {
    pub method: String,
    pub url: RequestUrl,
    pub query: ParamMap,
    pub form: ParamMap,
    pub headers: ParamMap,
    pub body: RequestBody,
}

impl HttpRequest {
    /// Build a request for an origin-form path with no query string.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            method: method.into().to_ascii_uppercase(),
            url: RequestUrl {
                scheme: "http".to_string(),
                host: String::new(),
                port: None,
                base_path: String::new(),
                path,
                query: String::new(),
            },
            query: ParamMap::new(),
            form: ParamMap::new(),
            headers: ParamMap::new(),
            body: RequestBody::Empty,
        }
    }

    /// Build a request from a URL, decoding its query string.
    pub fn parse(method: impl Into<String>, url: &str) -> Result<Self, Error> {
        let url = RequestUrl::parse(url)?;
        let query = ParamMap::from_urlencoded(&url.query)?;
        let mut request = Self::new(method, String::new());
        request.url = url;
        request.query = query;
        Ok(request)
    }

    pub fn path(&self) -> &str {
        &self.url.path
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(name, value);
        self
    }

    pub fn with_form(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.insert(name, value);
        self
    }

    /// Decode a url-encoded form body into the form collection.
    pub fn with_form_body(mut self, encoded: &str) -> Result<Self, Error> {
        for (k, v) in ParamMap::from_urlencoded(encoded)?.iter() {
            self.form.insert(k, v);
        }
        self.headers
            .insert("Content-Type", "application/x-www-form-urlencoded");
        Ok(self)
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = RequestBody::Bytes(body.into());
        self
    }

    /// Serialize `value` as the JSON body.
    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, Error> {
        let body = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.body = RequestBody::Bytes(Bytes::from(body));
        self.headers.insert("Content-Type", "application/json");
        Ok(self)
    }

    /// Supply the body lazily; the reader runs on first access.
    pub fn with_body_reader<F>(mut self, reader: F) -> Self
    where
        F: FnOnce() -> io::Result<Bytes> + Send + 'static,
    {
        self.body = RequestBody::Reader(Box::new(reader));
        self
    }

    /// Read the whole body. The result is cached, so later calls are cheap.
    /// A failed read leaves the body empty.
    pub fn read_body(&mut self) -> io::Result<Bytes> {
        match std::mem::take(&mut self.body) {
            RequestBody::Empty => Ok(Bytes::new()),
            RequestBody::Bytes(bytes) => {
                self.body = RequestBody::Bytes(bytes.clone());
                Ok(bytes)
            }
            RequestBody::Reader(reader) => {
                let bytes = reader()?;
                self.body = RequestBody::Bytes(bytes.clone());
                Ok(bytes)
            }
        }
    }

    /// Body decoded as UTF-8 text.
    pub fn body_text(&mut self) -> io::Result<String> {
        let bytes = self.read_body()?;
        String::from_utf8(bytes.to_vec()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Parse the request body as JSON
    pub fn json<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        let bytes = self.read_body()?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// HTTP response wrapper
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    pub fn bad_request() -> Self {
        Self::new(400)
    }

    pub fn not_found() -> Self {
        Self::new(404)
    }

    pub fn internal_server_error() -> Self {
        Self::new(500)
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, Error> {
        self.body = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> Result<&str, Error> {
        std::str::from_utf8(&self.body).map_err(|e| Error::Deserialization(e.to_string()))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_map_first_wins_and_ignores_case() {
        let map: ParamMap = [("Tag", "a"), ("tag", "b"), ("Other", "c")].into_iter().collect();
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("TAG"), Some("a"));
        assert_eq!(map.iter().next(), Some(("Tag", "a")));
    }

    #[test]
    fn test_parse_absolute_url() {
        let request = HttpRequest::parse("get", "https://api.example.com:8443/API/Customer?ID=5&name=J%20Doe")
            .unwrap();
        assert_eq!(request.method, "GET");
        assert_eq!(request.url.scheme, "https");
        assert_eq!(request.url.host, "api.example.com");
        assert_eq!(request.url.port, Some(8443));
        assert_eq!(request.path(), "/API/Customer");
        assert_eq!(request.query.get("id"), Some("5"));
        assert_eq!(request.query.get("NAME"), Some("J Doe"));
    }

    #[test]
    fn test_parse_origin_form() {
        let request = HttpRequest::parse("POST", "/orders").unwrap();
        assert_eq!(request.path(), "/orders");
        assert!(request.query.is_empty());
        assert_eq!(request.url.to_string(), "/orders");
    }

    #[test]
    fn test_base_path() {
        let url = RequestUrl::parse("/app/api/x").unwrap().with_base_path("/App/");
        assert_eq!(url.base_path, "/App");
        assert_eq!(url.path, "/api/x");

        let url = RequestUrl::parse("/application").unwrap().with_base_path("/app");
        assert_eq!(url.base_path, "");
        assert_eq!(url.path, "/application");
    }

    #[test]
    fn test_base_path_with_non_ascii_path() {
        let url = RequestUrl::parse("/é/x").unwrap().with_base_path("/a");
        assert_eq!(url.base_path, "");
        assert_eq!(url.path, "/é/x");

        let url = RequestUrl::parse("/café/menu").unwrap().with_base_path("/café");
        assert_eq!(url.base_path, "/café");
        assert_eq!(url.path, "/menu");
    }

    #[test]
    fn test_form_body() {
        let request = HttpRequest::new("POST", "/x")
            .with_form_body("first=1&second=two+words")
            .unwrap();
        assert_eq!(request.form.get("Second"), Some("two words"));
        assert_eq!(request.content_type(), Some("application/x-www-form-urlencoded"));
    }

    #[test]
    fn test_body_reader_runs_once() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let reads = Arc::new(AtomicUsize::new(0));
        let counter = reads.clone();
        let mut request = HttpRequest::new("POST", "/x").with_body_reader(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(b"payload"))
        });

        assert_eq!(request.body_text().unwrap(), "payload");
        assert_eq!(request.body_text().unwrap(), "payload");
        assert_eq!(reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_read_leaves_body_empty() {
        let mut request = HttpRequest::new("POST", "/x")
            .with_body_reader(|| Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")));
        assert!(request.read_body().is_err());
        assert!(request.read_body().unwrap().is_empty());
    }

    #[test]
    fn test_response_helpers() {
        let response = HttpResponse::ok().with_json(&serde_json::json!({"a": 1})).unwrap();
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert!(response.is_success());
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["a"], 1);
    }
}
