//! Per-request state threaded through every pipeline stage.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request},
    http::{Extensions, HeaderMap, Method, Uri, Version},
};
use serde_json::{Map, Value};
use sync_wrapper::SyncWrapper;

/// Request payload as it moves through the body parsers.
///
/// The unread stream sits in a [`SyncWrapper`] so a shared context can be
/// held across `.await` in `Send` futures.
#[derive(Default)]
pub enum Payload {
    /// Not read yet; forwarded as-is when no parser claims it.
    Stream(SyncWrapper<Body>),
    /// Read into memory by a body parser.
    Buffered(Bytes),
    /// Handed to a downstream service.
    #[default]
    Consumed,
}

impl Payload {
    pub fn stream(body: Body) -> Self {
        Self::Stream(SyncWrapper::new(body))
    }

    /// The payload as a body, empty once consumed.
    pub fn into_body(self) -> Body {
        match self {
            Self::Stream(body) => body.into_inner(),
            Self::Buffered(bytes) => Body::from(bytes),
            Self::Consumed => Body::empty(),
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("Stream"),
            Self::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            Self::Consumed => f.write_str("Consumed"),
        }
    }
}

/// Structured body attached to requests forwarded to API routes.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBody(pub Value);

/// Request context mutated in place by the stages.
#[derive(Debug)]
pub struct RequestContext {
    pub method: Method,
    /// Set by the method-override stage when the verb was rewritten.
    pub original_method: Option<Method>,
    pub uri: Uri,
    pub version: Version,
    pub headers: HeaderMap,
    pub payload: Payload,
    /// Structured body; `{}` until a parser fills it.
    pub body: Value,
    pub body_parsed: bool,
    /// Path parameters captured by mounted stages, e.g. `lang`.
    pub params: HashMap<String, String>,
    pub request_id: Option<String>,
    pub remote_addr: Option<SocketAddr>,
    pub started_at: Instant,
    pub extensions: Extensions,
}

impl RequestContext {
    pub fn from_request(request: Request) -> Self {
        let (parts, body) = request.into_parts();
        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|info| info.0);

        Self {
            method: parts.method,
            original_method: None,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            payload: Payload::stream(body),
            body: Value::Object(Map::new()),
            body_parsed: false,
            params: HashMap::new(),
            request_id: None,
            remote_addr,
            started_at: Instant::now(),
            extensions: parts.extensions,
        }
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Path plus query, as logged and as seen by mounted routers.
    pub fn original_url(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or_else(|| self.uri.path())
    }

    pub fn header_str(&self, name: impl axum::http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Takes the payload out of the context, leaving it `Consumed`.
    pub fn take_payload(&mut self) -> Payload {
        std::mem::take(&mut self.payload)
    }

    /// Builds a request for a downstream service mounted under some prefix.
    ///
    /// The payload moves into the new request and the parsed body travels
    /// along as a [`ParsedBody`] extension.
    pub fn forward_request(&mut self, uri: Uri) -> Request {
        let mut request = Request::new(self.take_payload().into_body());
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = uri;
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers.clone();
        *request.extensions_mut() = self.extensions.clone();
        request
            .extensions_mut()
            .insert(ParsedBody(self.body.clone()));
        request
    }

    /// A body-less copy of the request line and headers, for file services
    /// that only look at conditional and range headers.
    pub fn bodiless_request(&self, uri: Uri) -> Request {
        let mut request = Request::new(Body::empty());
        *request.method_mut() = self.method.clone();
        *request.uri_mut() = uri;
        *request.version_mut() = self.version;
        *request.headers_mut() = self.headers.clone();
        request
    }
}

/// Whether `path` is `mount` itself or lies below it.
pub fn is_under_mount(path: &str, mount: &str) -> bool {
    let mount = mount.trim_end_matches('/');
    if mount.is_empty() {
        return true;
    }
    match path.strip_prefix(mount) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}
