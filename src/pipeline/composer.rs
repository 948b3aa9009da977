//! Assembles the application pipeline from settings.

use std::sync::Arc;

use axum::Router;

use crate::auth::StrategyRegistry;
use crate::config::{ConfigError, Settings};
use crate::stages::{
    ApiDispatch, Authentication, Compression, Cors, EntryFile, JsonBodyParser, LocaleAsset,
    MethodOverride, RequestLogger, SecurityHeaders, StaticDir, UrlencodedBodyParser,
};

use super::{ErrorFunnel, Pipeline};

/// Builds the pipeline in its fixed order:
///
/// 1. request logger
/// 2. JSON then URL-encoded body parsers
/// 3. compression
/// 4. method override
/// 5. security headers
/// 6. CORS
/// 7. authentication
/// 8. API dispatch under `http.api_prefix`
/// 9. docs directory, docs entry file, public directory, app entry file,
///    locale files, example locale files
///
/// followed by the error funnel.
///
/// # Errors
///
/// Fails when a configured header value (CORS origins, security headers)
/// is not a valid HTTP header value.
pub fn compose(
    settings: &Settings,
    registry: Arc<StrategyRegistry>,
    api_router: Router,
) -> Result<Pipeline, ConfigError> {
    let environment = settings.application.environment;
    let http = &settings.http;
    let assets = &settings.assets;

    let pipeline = Pipeline::builder(ErrorFunnel::new(environment))
        .stage(RequestLogger::new(http.access_log_format(environment)))
        .stage(JsonBodyParser::new(http.json_limit))
        .stage(UrlencodedBodyParser::new(
            http.urlencoded_limit,
            http.urlencoded_extended,
        ))
        .stage(Compression::new(
            http.compression_threshold,
            http.compression_level,
        ))
        .stage(MethodOverride::new())
        .stage(SecurityHeaders::from_config(&settings.security)?)
        .stage(Cors::from_config(&settings.cors)?)
        .stage(Authentication::new(registry))
        .stage(ApiDispatch::new(&http.api_prefix, api_router))
        .stage(StaticDir::new("docs_static", &assets.docs_root))
        .stage(EntryFile::new(
            "docs_entry",
            &assets.docs_mount,
            assets.docs_index(),
        ))
        .stage(StaticDir::new("public_static", &assets.public_root))
        .stage(EntryFile::new(
            "app_entry",
            &assets.app_mount,
            assets.app_index(),
        ))
        .stage(LocaleAsset::new(
            "locale_asset",
            &assets.locale_mount,
            assets.locale_root(),
        ))
        .stage(LocaleAsset::new(
            "locale_example_asset",
            &assets.locale_examples_mount,
            assets.locale_examples_root(),
        ))
        .build();

    Ok(pipeline)
}
