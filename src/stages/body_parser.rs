//! JSON and URL-encoded body parsers.
//!
//! Each parser claims a request only when its `Content-Type` matches and no
//! earlier parser has filled the body. The raw bytes stay on the context as
//! [`Payload::Buffered`] so a downstream router can still read them.

use std::io::Read;

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes, HttpBody},
    http::{HeaderMap, StatusCode, header},
};
use flate2::read::{GzDecoder, ZlibDecoder};
use futures::StreamExt;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::pipeline::{Outcome, Payload, RequestContext, Stage, StageResult};

use super::media_type;

/// Maximum nesting accepted for `a[b][c]` style keys.
const MAX_DEPTH: usize = 5;

/// Largest numeric index turned into an array slot; larger ones stay object keys.
const MAX_ARRAY_INDEX: usize = 20;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BodyParseError {
    #[error("request entity too large")]
    TooLarge { limit: usize },

    #[error("{0}")]
    Malformed(String),

    #[error("unsupported charset \"{0}\"")]
    UnsupportedCharset(String),

    #[error("unsupported content encoding \"{0}\"")]
    UnsupportedEncoding(String),

    #[error("request aborted: {0}")]
    Aborted(String),
}

impl BodyParseError {
    pub fn status(&self) -> StatusCode {
        match self {
            BodyParseError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            BodyParseError::Malformed(_) | BodyParseError::Aborted(_) => StatusCode::BAD_REQUEST,
            BodyParseError::UnsupportedCharset(_) | BodyParseError::UnsupportedEncoding(_) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
        }
    }
}

/// Parses `application/json` and `*/*+json` bodies.
///
/// Strict: only a top-level object or array is accepted.
#[derive(Debug, Clone)]
pub struct JsonBodyParser {
    limit: usize,
}

impl JsonBodyParser {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl Stage for JsonBodyParser {
    fn name(&self) -> &'static str {
        "json_parser"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> StageResult {
        if ctx.body_parsed || !is_json_type(&ctx.headers) {
            return Ok(Outcome::Continue);
        }
        let Some(bytes) = read_claimed_body(ctx, self.limit).await? else {
            return Ok(Outcome::Continue);
        };

        ctx.body = parse_json_strict(&bytes)?;
        ctx.body_parsed = true;
        ctx.payload = Payload::Buffered(bytes);
        Ok(Outcome::Continue)
    }
}

/// Parses `application/x-www-form-urlencoded` bodies.
#[derive(Debug, Clone)]
pub struct UrlencodedBodyParser {
    limit: usize,
    extended: bool,
}

impl UrlencodedBodyParser {
    pub fn new(limit: usize, extended: bool) -> Self {
        Self { limit, extended }
    }
}

#[async_trait]
impl Stage for UrlencodedBodyParser {
    fn name(&self) -> &'static str {
        "urlencoded_parser"
    }

    async fn handle(&self, ctx: &mut RequestContext) -> StageResult {
        if ctx.body_parsed
            || media_type(&ctx.headers).as_deref() != Some("application/x-www-form-urlencoded")
        {
            return Ok(Outcome::Continue);
        }
        let Some(bytes) = read_claimed_body(ctx, self.limit).await? else {
            return Ok(Outcome::Continue);
        };

        ctx.body = if self.extended {
            parse_urlencoded_extended(&bytes)
        } else {
            parse_urlencoded_flat(&bytes)
        };
        ctx.body_parsed = true;
        ctx.payload = Payload::Buffered(bytes);
        Ok(Outcome::Continue)
    }
}

fn is_json_type(headers: &HeaderMap) -> bool {
    match media_type(headers) {
        Some(essence) => essence == "application/json" || essence.ends_with("+json"),
        None => false,
    }
}

/// Whether the request carries a body.
///
/// Framing headers decide when present. Otherwise the stream itself is
/// asked, since HTTP/2 bodies need not declare a length.
fn has_body(ctx: &mut RequestContext) -> bool {
    if ctx.headers.contains_key(header::TRANSFER_ENCODING) {
        return true;
    }
    if let Some(len) = ctx
        .header_str(header::CONTENT_LENGTH)
        .and_then(|value| value.trim().parse::<u64>().ok())
    {
        return len > 0;
    }
    match &mut ctx.payload {
        Payload::Stream(body) => {
            let body = body.get_mut();
            !body.is_end_stream() && body.size_hint().exact() != Some(0)
        }
        Payload::Buffered(bytes) => !bytes.is_empty(),
        Payload::Consumed => false,
    }
}

fn charset(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())?
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"').to_ascii_lowercase())
}

/// Reads the body for a parser that matched the content type.
///
/// Returns `None` (and leaves the body as `{}`) when the request has no body.
async fn read_claimed_body(
    ctx: &mut RequestContext,
    limit: usize,
) -> Result<Option<Bytes>, BodyParseError> {
    if !has_body(ctx) {
        ctx.body_parsed = true;
        return Ok(None);
    }

    if let Some(charset) = charset(&ctx.headers)
        && charset != "utf-8"
        && charset != "utf8"
    {
        return Err(BodyParseError::UnsupportedCharset(charset.to_uppercase()));
    }

    let encoding = ctx
        .header_str(header::CONTENT_ENCODING)
        .unwrap_or("identity")
        .trim()
        .to_ascii_lowercase();
    if !matches!(encoding.as_str(), "identity" | "gzip" | "deflate") {
        return Err(BodyParseError::UnsupportedEncoding(encoding));
    }

    if encoding == "identity"
        && let Some(declared) = ctx
            .header_str(header::CONTENT_LENGTH)
            .and_then(|value| value.trim().parse::<usize>().ok())
        && declared > limit
    {
        return Err(BodyParseError::TooLarge { limit });
    }

    let raw = match ctx.take_payload() {
        Payload::Stream(body) => read_limited(body.into_inner(), limit).await?,
        Payload::Buffered(bytes) => bytes,
        Payload::Consumed => Bytes::new(),
    };

    let bytes = match encoding.as_str() {
        "gzip" => inflate(GzDecoder::new(&raw[..]), limit)?,
        "deflate" => inflate(ZlibDecoder::new(&raw[..]), limit)?,
        _ => raw,
    };
    Ok(Some(bytes))
}

async fn read_limited(body: Body, limit: usize) -> Result<Bytes, BodyParseError> {
    let mut stream = body.into_data_stream();
    let mut buffer = Vec::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| BodyParseError::Aborted(e.to_string()))?;
        if buffer.len() + chunk.len() > limit {
            return Err(BodyParseError::TooLarge { limit });
        }
        buffer.extend_from_slice(&chunk);
    }

    Ok(Bytes::from(buffer))
}

fn inflate(decoder: impl Read, limit: usize) -> Result<Bytes, BodyParseError> {
    let mut buffer = Vec::new();
    decoder
        .take(limit as u64 + 1)
        .read_to_end(&mut buffer)
        .map_err(|e| BodyParseError::Malformed(format!("invalid compressed body: {}", e)))?;

    if buffer.len() > limit {
        return Err(BodyParseError::TooLarge { limit });
    }
    Ok(Bytes::from(buffer))
}

fn parse_json_strict(bytes: &[u8]) -> Result<Value, BodyParseError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| BodyParseError::Malformed("invalid UTF-8 in JSON body".to_string()))?;
    let trimmed = text.trim_start();

    if trimmed.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        let token = trimmed.chars().next().unwrap_or_default();
        return Err(BodyParseError::Malformed(format!(
            "Unexpected token {} in JSON at position {}",
            token,
            text.len() - trimmed.len()
        )));
    }

    serde_json::from_str(text).map_err(|e| BodyParseError::Malformed(e.to_string()))
}

/// Flat form: repeated keys collect into an array.
fn parse_urlencoded_flat(bytes: &[u8]) -> Value {
    let mut map = Map::new();
    for (key, value) in form_urlencoded::parse(bytes) {
        let value = Value::String(value.into_owned());
        match map.get_mut(key.as_ref()) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.into_owned(), value);
            }
        }
    }
    Value::Object(map)
}

/// Extended form: `user[name]=x&tags[]=a&tags[]=b` builds nested values.
fn parse_urlencoded_extended(bytes: &[u8]) -> Value {
    let mut root = Value::Object(Map::new());
    for (key, value) in form_urlencoded::parse(bytes) {
        let segments = split_key(&key);
        assign(&mut root, &segments, value.into_owned());
    }
    root
}

/// `a[b][]` becomes `["a", "b", ""]`. Keys with unbalanced brackets and
/// anything nested deeper than [`MAX_DEPTH`] are kept literally.
fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[').filter(|&pos| pos > 0) else {
        return vec![key.to_string()];
    };

    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while let Some(inner) = rest.strip_prefix('[') {
        let Some(close) = inner.find(']') else {
            break;
        };
        if segments.len() > MAX_DEPTH {
            break;
        }
        segments.push(inner[..close].to_string());
        rest = &inner[close + 1..];
    }

    if !rest.is_empty() {
        segments.push(rest.to_string());
    }
    segments
}

fn assign(node: &mut Value, segments: &[String], value: String) {
    let Some((segment, rest)) = segments.split_first() else {
        merge_leaf(node, value);
        return;
    };

    if segment.is_empty() {
        let items = as_array(node);
        if rest.is_empty() {
            items.push(Value::String(value));
        } else {
            let mut child = Value::Null;
            assign(&mut child, rest, value);
            items.push(child);
        }
        return;
    }

    if let Ok(index) = segment.parse::<usize>()
        && index <= MAX_ARRAY_INDEX
        && matches!(node, Value::Null | Value::Array(_))
    {
        let items = as_array(node);
        if index < items.len() {
            assign(&mut items[index], rest, value);
        } else {
            let mut child = Value::Null;
            assign(&mut child, rest, value);
            items.push(child);
        }
        return;
    }

    let map = as_object(node);
    let child = map.entry(segment.clone()).or_insert(Value::Null);
    assign(child, rest, value);
}

fn merge_leaf(node: &mut Value, value: String) {
    match node {
        Value::Null => *node = Value::String(value),
        Value::Array(items) => items.push(Value::String(value)),
        Value::Object(_) => {}
        other => {
            let first = other.take();
            *other = Value::Array(vec![first, Value::String(value)]);
        }
    }
}

fn as_array(node: &mut Value) -> &mut Vec<Value> {
    if !node.is_array() {
        let previous = node.take();
        *node = Value::Array(match previous {
            Value::Null => Vec::new(),
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            other => vec![other],
        });
    }
    match node {
        Value::Array(items) => items,
        _ => unreachable!("node was just converted to an array"),
    }
}

fn as_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        let previous = node.take();
        *node = Value::Object(match previous {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("0".to_string(), other);
                map
            }
        });
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just converted to an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Request;
    use flate2::{Compression, write::GzEncoder};
    use serde_json::json;
    use std::io::Write;

    fn context(content_type: Option<&str>, body: &'static [u8]) -> RequestContext {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/v1/echo")
            .header(header::CONTENT_LENGTH, body.len());
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        RequestContext::from_request(builder.body(Body::from(body)).unwrap())
    }

    #[tokio::test]
    async fn test_json_body_is_parsed() {
        let mut ctx = context(Some("application/json"), br#"{"name":"ada","tags":[1,2]}"#);
        JsonBodyParser::new(1024).handle(&mut ctx).await.unwrap();

        assert!(ctx.body_parsed);
        assert_eq!(ctx.body, json!({ "name": "ada", "tags": [1, 2] }));
        assert!(matches!(ctx.payload, Payload::Buffered(_)));
    }

    #[tokio::test]
    async fn test_vendor_json_type_is_parsed() {
        let mut ctx = context(Some("application/vnd.api+json; charset=utf-8"), b"[1]");
        JsonBodyParser::new(1024).handle(&mut ctx).await.unwrap();
        assert_eq!(ctx.body, json!([1]));
    }

    #[tokio::test]
    async fn test_strict_mode_rejects_primitives() {
        let mut ctx = context(Some("application/json"), b"\"just a string\"");
        let err = JsonBodyParser::new(1024).handle(&mut ctx).await.unwrap_err();
        let err = err.downcast::<BodyParseError>().unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("Unexpected token \""));
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_request() {
        let mut ctx = context(Some("application/json"), b"{\"a\":");
        let err = JsonBodyParser::new(1024).handle(&mut ctx).await.unwrap_err();
        let err = err.downcast::<BodyParseError>().unwrap();
        assert!(matches!(err, BodyParseError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_oversized_body_is_rejected() {
        let mut ctx = context(Some("application/json"), br#"{"a":"0123456789"}"#);
        let err = JsonBodyParser::new(8).handle(&mut ctx).await.unwrap_err();
        let err = err.downcast::<BodyParseError>().unwrap();
        assert_eq!(err, BodyParseError::TooLarge { limit: 8 });
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_unsupported_charset() {
        let mut ctx = context(Some("application/json; charset=latin1"), b"{}");
        let err = JsonBodyParser::new(1024).handle(&mut ctx).await.unwrap_err();
        let err = err.downcast::<BodyParseError>().unwrap();
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_other_content_types_are_left_alone() {
        let mut ctx = context(Some("text/plain"), b"hello");
        JsonBodyParser::new(1024).handle(&mut ctx).await.unwrap();
        UrlencodedBodyParser::new(1024, true).handle(&mut ctx).await.unwrap();

        assert!(!ctx.body_parsed);
        assert_eq!(ctx.body, json!({}));
        assert!(matches!(ctx.payload, Payload::Stream(_)));
    }

    #[tokio::test]
    async fn test_empty_body_yields_empty_object() {
        let mut ctx = context(Some("application/json"), b"");
        JsonBodyParser::new(1024).handle(&mut ctx).await.unwrap();
        assert!(ctx.body_parsed);
        assert_eq!(ctx.body, json!({}));
    }

    #[tokio::test]
    async fn test_json_without_length_header_is_parsed() {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/echo")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"greeting":"hello"}"#))
            .unwrap();
        let mut ctx = RequestContext::from_request(request);
        assert!(!ctx.headers.contains_key(header::CONTENT_LENGTH));

        JsonBodyParser::new(1024).handle(&mut ctx).await.unwrap();
        assert!(ctx.body_parsed);
        assert_eq!(ctx.body, json!({ "greeting": "hello" }));
    }

    #[tokio::test]
    async fn test_streamed_body_without_framing_headers_is_parsed() {
        let chunks = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"a=1&")),
            Ok(Bytes::from_static(b"b=2")),
        ]);
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from_stream(chunks))
            .unwrap();
        let mut ctx = RequestContext::from_request(request);

        UrlencodedBodyParser::new(1024, true).handle(&mut ctx).await.unwrap();
        assert_eq!(ctx.body, json!({ "a": "1", "b": "2" }));
    }

    #[tokio::test]
    async fn test_bodiless_json_request_is_left_empty() {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::empty())
            .unwrap();
        let mut ctx = RequestContext::from_request(request);

        JsonBodyParser::new(1024).handle(&mut ctx).await.unwrap();
        assert!(ctx.body_parsed);
        assert_eq!(ctx.body, json!({}));
        assert!(matches!(ctx.payload, Payload::Stream(_)));
    }

    #[tokio::test]
    async fn test_gzip_encoded_json() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(br#"{"zipped":true}"#).unwrap();
        let compressed = encoder.finish().unwrap();

        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_ENCODING, "gzip")
            .header(header::CONTENT_LENGTH, compressed.len())
            .body(Body::from(compressed))
            .unwrap();
        let mut ctx = RequestContext::from_request(request);

        JsonBodyParser::new(1024).handle(&mut ctx).await.unwrap();
        assert_eq!(ctx.body, json!({ "zipped": true }));
    }

    #[tokio::test]
    async fn test_urlencoded_extended() {
        let mut ctx = context(
            Some("application/x-www-form-urlencoded"),
            b"user%5Bname%5D=ada&user%5Brole%5D=admin&tags[]=a&tags[]=b&plain=1",
        );
        UrlencodedBodyParser::new(1024, true).handle(&mut ctx).await.unwrap();

        assert_eq!(
            ctx.body,
            json!({
                "user": { "name": "ada", "role": "admin" },
                "tags": ["a", "b"],
                "plain": "1"
            })
        );
    }

    #[tokio::test]
    async fn test_urlencoded_flat() {
        let mut ctx = context(
            Some("application/x-www-form-urlencoded"),
            b"a=1&a=2&user[name]=ada",
        );
        UrlencodedBodyParser::new(1024, false).handle(&mut ctx).await.unwrap();

        assert_eq!(ctx.body, json!({ "a": ["1", "2"], "user[name]": "ada" }));
    }

    #[tokio::test]
    async fn test_json_parser_claims_first() {
        let mut ctx = context(Some("application/json"), br#"{"first":1}"#);
        JsonBodyParser::new(1024).handle(&mut ctx).await.unwrap();
        UrlencodedBodyParser::new(1024, true).handle(&mut ctx).await.unwrap();
        assert_eq!(ctx.body, json!({ "first": 1 }));
    }

    #[test]
    fn test_indexed_keys_build_arrays() {
        let value = parse_urlencoded_extended(b"list[0]=x&list[1]=y&list[1]=z");
        assert_eq!(value, json!({ "list": ["x", ["y", "z"]] }));
    }

    #[test]
    fn test_nested_objects_in_arrays() {
        let value = parse_urlencoded_extended(b"items[][id]=1");
        assert_eq!(value, json!({ "items": [{ "id": "1" }] }));
    }

    #[test]
    fn test_split_key() {
        assert_eq!(split_key("a[b][]"), vec!["a", "b", ""]);
        assert_eq!(split_key("[a]"), vec!["[a]"]);
        assert_eq!(split_key("a[b"), vec!["a", "[b"]);
    }
}
