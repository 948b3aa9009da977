//! Configuration management module for atrium-rs
//!
//! # Configuration Priority (lowest to highest)
//! 1. `default.toml` - Base default configuration
//! 2. `{environment}.toml` - Environment-specific configuration
//! 3. `local.toml` - Local development overrides (not committed to version control)
//! 4. `ATRIUM_*` environment variables
//! 5. Command line flags (see [`crate::cli`])

pub mod environment;
pub mod error;
pub mod loader;
pub mod settings;
mod validation;

pub use environment::Environment;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use settings::{
    ApplicationConfig, AssetsConfig, AuthConfig, CorsConfig, HttpConfig, SecurityConfig,
    ServerConfig, Settings,
};
