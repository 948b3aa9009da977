//! Static asset stages: directory serving, entry files and locale files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, StatusCode, Uri},
    response::Response,
};
use percent_encoding::percent_decode_str;
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};

use crate::error::ApiError;
use crate::pipeline::{Outcome, RequestContext, Stage, StageResult, is_under_mount};

fn is_read(method: &Method) -> bool {
    method == Method::GET || method == Method::HEAD
}

/// Serves files below `root`; directories answer with their `index.html`.
/// Misses continue to the next stage.
pub struct StaticDir {
    name: &'static str,
    root: PathBuf,
}

impl StaticDir {
    pub fn new(name: &'static str, root: impl Into<PathBuf>) -> Self {
        Self {
            name,
            root: root.into(),
        }
    }
}

#[async_trait]
impl Stage for StaticDir {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, ctx: &mut RequestContext) -> StageResult {
        if !is_read(&ctx.method) {
            return Ok(Outcome::Continue);
        }

        let request = ctx.bodiless_request(ctx.uri.clone());
        let response = match ServeDir::new(&self.root).oneshot(request).await {
            Ok(response) => response.map(Body::new),
            Err(never) => match never {},
        };

        match response.status() {
            StatusCode::NOT_FOUND => Ok(Outcome::Continue),
            status if status.is_server_error() => Err(ApiError::internal("Failed to read asset")
                .with_stack(format!("{} answered {} for {}", self.name, status, ctx.path()))
                .into()),
            _ => Ok(Outcome::Respond(response)),
        }
    }
}

/// Answers every request at or below `mount` with a single file.
pub struct EntryFile {
    name: &'static str,
    mount: String,
    file: PathBuf,
}

impl EntryFile {
    pub fn new(name: &'static str, mount: impl Into<String>, file: impl Into<PathBuf>) -> Self {
        Self {
            name,
            mount: mount.into(),
            file: file.into(),
        }
    }
}

#[async_trait]
impl Stage for EntryFile {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, ctx: &mut RequestContext) -> StageResult {
        if !is_under_mount(ctx.path(), &self.mount) {
            return Ok(Outcome::Continue);
        }
        serve_file(ctx, &self.file).await.map(Outcome::Respond)
    }
}

/// Streams `root/<name>` for requests to `mount/<name>`.
pub struct LocaleAsset {
    name: &'static str,
    mount: String,
    root: PathBuf,
}

impl LocaleAsset {
    pub fn new(name: &'static str, mount: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name,
            mount: mount.into().trim_end_matches('/').to_string(),
            root: root.into(),
        }
    }

    /// The raw trailing segment when the path is exactly `mount/<segment>`.
    fn segment<'a>(&self, path: &'a str) -> Option<&'a str> {
        let raw = path.strip_prefix(&self.mount)?.strip_prefix('/')?;
        (!raw.contains('/')).then_some(raw)
    }
}

/// Decodes and validates a single path segment naming a file.
///
/// # Errors
///
/// `400 Invalid asset name` for empty names, names containing separators or
/// NUL, and anything with `..` in it.
pub fn asset_name(raw: &str) -> Result<String, ApiError> {
    let invalid = || ApiError::bad_request("Invalid asset name");

    let name = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| invalid())?
        .into_owned();

    if name.is_empty()
        || name == "."
        || name.contains("..")
        || name.contains(['/', '\\', '\0'])
    {
        return Err(invalid().with_stack(format!("rejected asset name {:?}", name)));
    }
    Ok(name)
}

#[async_trait]
impl Stage for LocaleAsset {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, ctx: &mut RequestContext) -> StageResult {
        let Some(raw) = self.segment(ctx.path()) else {
            return Ok(Outcome::Continue);
        };

        let lang = asset_name(raw)?;
        let file = self.root.join(&lang);
        ctx.params.insert("lang".to_string(), lang);
        serve_file(ctx, &file).await.map(Outcome::Respond)
    }
}

/// Sends one file whatever the request method; a missing file is a 404 for
/// the error funnel.
async fn serve_file(ctx: &RequestContext, file: &Path) -> anyhow::Result<Response> {
    let is_file = tokio::fs::metadata(file)
        .await
        .is_ok_and(|metadata| metadata.is_file());
    if !is_file {
        return Err(ApiError::not_found()
            .with_stack(format!("{} does not exist", file.display()))
            .into());
    }

    // ServeFile only answers reads.
    let mut request = ctx.bodiless_request(Uri::from_static("/"));
    if ctx.method != Method::HEAD {
        *request.method_mut() = Method::GET;
    }
    let response = match ServeFile::new(file).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(never) => match never {},
    };

    if response.status().is_server_error() {
        return Err(ApiError::internal("Failed to read asset")
            .with_stack(format!("serving {} answered {}", file.display(), response.status()))
            .into());
    }
    Ok(response)
}
