//! Configuration settings structures for atrium-rs
//!
//! This module defines all configuration structures that can be loaded from
//! TOML files and environment variables.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::environment::Environment;
use crate::logger::LoggerConfig;
use crate::stages::request_logger::AccessLogFormat;

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "atrium-rs".to_string()
}

fn default_app_version() -> String {
    crate::pkg_version().to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_true() -> bool {
    true
}

fn default_api_prefix() -> String {
    "/v1".to_string()
}

fn default_json_limit() -> usize {
    100 * 1024 // 100kb
}

fn default_compression_threshold() -> usize {
    1024
}

fn default_compression_level() -> u32 {
    6
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_allowed_methods() -> Vec<String> {
    ["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE"]
        .iter()
        .map(|m| m.to_string())
        .collect()
}

fn default_frame_options() -> String {
    "SAMEORIGIN".to_string()
}

fn default_hsts_max_age() -> u64 {
    15_552_000 // 180 days
}

fn default_docs_root() -> PathBuf {
    PathBuf::from("docs")
}

fn default_docs_mount() -> String {
    "/docs".to_string()
}

fn default_public_root() -> PathBuf {
    PathBuf::from("public")
}

fn default_app_mount() -> String {
    "/one".to_string()
}

fn default_locale_mount() -> String {
    "/angular-ngrx-material-starter/assets/i18n".to_string()
}

fn default_locale_examples_mount() -> String {
    "/angular-ngrx-material-starter/assets/i18n/examples".to_string()
}

fn default_facebook_profile_url() -> String {
    "https://graph.facebook.com/me".to_string()
}

fn default_google_profile_url() -> String {
    "https://www.googleapis.com/oauth2/v3/userinfo".to_string()
}

// ============================================================================
// Application Configuration
// ============================================================================

/// Application basic information configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Application version
    #[serde(default = "default_app_version")]
    pub version: String,

    /// Runtime environment; overwritten by the loader and `--env`
    #[serde(default)]
    pub environment: Environment,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
            environment: Environment::default(),
        }
    }
}

// ============================================================================
// Server Configuration
// ============================================================================

/// Axum HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    /// Get the full server address as "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

// ============================================================================
// HTTP pipeline Configuration
// ============================================================================

/// Request logging, body parsing, compression and API mount settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Access log format; defaults to `combined` in production, `dev` elsewhere
    #[serde(default)]
    pub access_log: Option<AccessLogFormat>,

    /// Mount point of the versioned API
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Maximum JSON body size in bytes
    #[serde(default = "default_json_limit")]
    pub json_limit: usize,

    /// Maximum URL-encoded body size in bytes
    #[serde(default = "default_json_limit")]
    pub urlencoded_limit: usize,

    /// Parse nested keys such as `user[name]` into objects
    #[serde(default = "default_true")]
    pub urlencoded_extended: bool,

    /// Responses smaller than this many bytes are sent uncompressed
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: usize,

    /// Compression level (0-9)
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,
}

impl HttpConfig {
    /// Resolves the access log format for the given environment.
    pub fn access_log_format(&self, environment: Environment) -> AccessLogFormat {
        self.access_log.unwrap_or(match environment {
            Environment::Production => AccessLogFormat::Combined,
            _ => AccessLogFormat::Dev,
        })
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            access_log: None,
            api_prefix: default_api_prefix(),
            json_limit: default_json_limit(),
            urlencoded_limit: default_json_limit(),
            urlencoded_extended: default_true(),
            compression_threshold: default_compression_threshold(),
            compression_level: default_compression_level(),
        }
    }
}

// ============================================================================
// CORS Configuration
// ============================================================================

/// Cross-origin resource sharing policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allowed origins; `["*"]` allows any origin
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Methods advertised on preflight responses
    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: Vec<String>,

    /// Headers advertised on preflight; empty reflects the request's headers
    #[serde(default)]
    pub allowed_headers: Vec<String>,

    /// Headers exposed to the browser
    #[serde(default)]
    pub exposed_headers: Vec<String>,

    /// Whether to send `Access-Control-Allow-Credentials: true`
    #[serde(default)]
    pub allow_credentials: bool,

    /// Preflight cache lifetime in seconds
    #[serde(default)]
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
            allowed_methods: default_allowed_methods(),
            allowed_headers: Vec::new(),
            exposed_headers: Vec::new(),
            allow_credentials: false,
            max_age: None,
        }
    }
}

// ============================================================================
// Security header Configuration
// ============================================================================

/// Defensive response header settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// `X-Frame-Options` value: `DENY` or `SAMEORIGIN`
    #[serde(default = "default_frame_options")]
    pub frame_options: String,

    /// `Strict-Transport-Security` max-age in seconds
    #[serde(default = "default_hsts_max_age")]
    pub hsts_max_age: u64,

    /// Whether HSTS applies to subdomains
    #[serde(default = "default_true")]
    pub hsts_include_subdomains: bool,

    /// Whether browsers may prefetch DNS for links
    #[serde(default)]
    pub dns_prefetch: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            frame_options: default_frame_options(),
            hsts_max_age: default_hsts_max_age(),
            hsts_include_subdomains: default_true(),
            dns_prefetch: false,
        }
    }
}

// ============================================================================
// Static asset Configuration
// ============================================================================

/// Documentation, frontend bundle and locale asset locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Directory holding the generated API documentation
    #[serde(default = "default_docs_root")]
    pub docs_root: PathBuf,

    /// Path answered with the documentation entry file
    #[serde(default = "default_docs_mount")]
    pub docs_mount: String,

    /// Directory holding the frontend bundle
    #[serde(default = "default_public_root")]
    pub public_root: PathBuf,

    /// Path answered with the frontend entry file
    #[serde(default = "default_app_mount")]
    pub app_mount: String,

    /// Mount of the locale files under `<public_root>/assets/i18n`
    #[serde(default = "default_locale_mount")]
    pub locale_mount: String,

    /// Mount of the example locale files under `<public_root>/assets/i18n/examples`
    #[serde(default = "default_locale_examples_mount")]
    pub locale_examples_mount: String,
}

impl AssetsConfig {
    pub fn docs_index(&self) -> PathBuf {
        self.docs_root.join("index.html")
    }

    pub fn app_index(&self) -> PathBuf {
        self.public_root.join("index.html")
    }

    pub fn locale_root(&self) -> PathBuf {
        self.public_root.join("assets").join("i18n")
    }

    pub fn locale_examples_root(&self) -> PathBuf {
        self.locale_root().join("examples")
    }
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            docs_root: default_docs_root(),
            docs_mount: default_docs_mount(),
            public_root: default_public_root(),
            app_mount: default_app_mount(),
            locale_mount: default_locale_mount(),
            locale_examples_mount: default_locale_examples_mount(),
        }
    }
}

// ============================================================================
// Authentication Configuration
// ============================================================================

/// Authentication strategy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret key for verifying bearer JWTs
    /// IMPORTANT: This should be a strong, random string in production
    /// and should be kept secret (use environment variables)
    #[serde(default)]
    pub jwt_secret: String,

    /// Profile endpoint used to verify Facebook access tokens
    #[serde(default = "default_facebook_profile_url")]
    pub facebook_profile_url: String,

    /// Profile endpoint used to verify Google access tokens
    #[serde(default = "default_google_profile_url")]
    pub google_profile_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            facebook_profile_url: default_facebook_profile_url(),
            google_profile_url: default_google_profile_url(),
        }
    }
}

// ============================================================================
// Main Settings Structure
// ============================================================================

/// Complete application settings
///
/// This structure represents the entire configuration that can be loaded
/// from TOML files and environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub application: ApplicationConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logger: LoggerConfig,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub security: SecurityConfig,

    #[serde(default)]
    pub assets: AssetsConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}
