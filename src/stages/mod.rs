//! The concrete pipeline stages, in the order the composer installs them.

pub mod api_dispatch;
pub mod assets;
pub mod authentication;
pub mod body_parser;
pub mod compression;
pub mod cors;
pub mod method_override;
pub mod request_logger;
pub mod security_headers;

pub use api_dispatch::{ApiDispatch, Unmatched};
pub use assets::{EntryFile, LocaleAsset, StaticDir};
pub use authentication::Authentication;
pub use body_parser::{BodyParseError, JsonBodyParser, UrlencodedBodyParser};
pub use compression::Compression;
pub use cors::Cors;
pub use method_override::MethodOverride;
pub use request_logger::{AccessLogFormat, RequestLogger};
pub use security_headers::SecurityHeaders;

use std::convert::Infallible;
use std::future::{Ready, ready};
use std::task::{Context, Poll};

use axum::{
    BoxError,
    body::{Body, Bytes, HttpBody},
    extract::Request,
    http::{self, HeaderMap, HeaderValue, header},
    response::Response,
};
use tower::{Layer, Service, ServiceExt};

/// Inner service that answers its single call with a response produced
/// earlier in the chain.
pub(crate) struct Replay(Option<Response>);

impl Service<Request> for Replay {
    type Response = Response;
    type Error = Infallible;
    type Future = Ready<Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _request: Request) -> Self::Future {
        ready(Ok(self.0.take().unwrap_or_default()))
    }
}

/// Runs a tower `layer` around `response` as if the layer had wrapped the
/// service that produced it. `request` is what the layer inspects.
pub(crate) async fn through_layer<L, B>(layer: &L, request: Request, response: Response) -> Response
where
    L: Layer<Replay>,
    L::Service: Service<Request, Response = http::Response<B>, Error = Infallible>,
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    match layer.layer(Replay(Some(response))).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    }
}

/// Adds `field` to the `Vary` header unless it is already listed or the
/// header is `*`.
pub(crate) fn append_vary(headers: &mut HeaderMap, field: &'static str) {
    let listed = headers
        .get_all(header::VARY)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .any(|existing| existing == "*" || existing.eq_ignore_ascii_case(field));

    if !listed {
        headers.append(header::VARY, HeaderValue::from_static(field));
    }
}

/// Lower-cased media type without parameters, e.g. `application/json`.
pub(crate) fn media_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|essence| essence.trim().to_ascii_lowercase())
        .filter(|essence| !essence.is_empty())
}
