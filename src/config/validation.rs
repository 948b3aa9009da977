//! Configuration validation logic

use crate::config::error::ConfigError;
use crate::config::settings::{
    AssetsConfig, AuthConfig, CorsConfig, HttpConfig, SecurityConfig, ServerConfig, Settings,
};

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::validation("server.host", "Host cannot be empty."));
        }
        if self.port == 0 {
            return Err(ConfigError::validation(
                "server.port",
                "Port must be between 1 and 65535.",
            ));
        }
        Ok(())
    }
}

impl HttpConfig {
    /// # Validation Rules
    /// - API prefix must start with `/` and not be `/` itself
    /// - Body limits must be greater than 0
    /// - Compression level must be 0-9
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_mount("http.api_prefix", &self.api_prefix)?;

        if self.json_limit == 0 {
            return Err(ConfigError::validation(
                "http.json_limit",
                "JSON body limit must be greater than 0 bytes.",
            ));
        }
        if self.urlencoded_limit == 0 {
            return Err(ConfigError::validation(
                "http.urlencoded_limit",
                "URL-encoded body limit must be greater than 0 bytes.",
            ));
        }
        if self.compression_level > 9 {
            return Err(ConfigError::validation(
                "http.compression_level",
                format!("Compression level must be 0-9, got {}.", self.compression_level),
            ));
        }
        Ok(())
    }
}

impl CorsConfig {
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.iter().any(|origin| origin == "*")
    }

    /// Browsers reject credentialed responses with a wildcard origin, so
    /// that combination is refused up front.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_origins.is_empty() {
            return Err(ConfigError::validation(
                "cors.allowed_origins",
                "At least one origin (or \"*\") must be configured.",
            ));
        }
        if self.allow_credentials && self.allows_any_origin() {
            return Err(ConfigError::validation(
                "cors.allow_credentials",
                "Credentials cannot be allowed together with the \"*\" origin.",
            ));
        }
        if self.allowed_methods.is_empty() {
            return Err(ConfigError::validation(
                "cors.allowed_methods",
                "At least one method must be allowed.",
            ));
        }
        Ok(())
    }
}

impl SecurityConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.frame_options.to_ascii_uppercase().as_str() {
            "DENY" | "SAMEORIGIN" => Ok(()),
            other => Err(ConfigError::validation(
                "security.frame_options",
                format!("Expected DENY or SAMEORIGIN, got '{}'.", other),
            )),
        }
    }
}

impl AssetsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_mount("assets.docs_mount", &self.docs_mount)?;
        validate_mount("assets.app_mount", &self.app_mount)?;
        validate_mount("assets.locale_mount", &self.locale_mount)?;
        validate_mount("assets.locale_examples_mount", &self.locale_examples_mount)?;

        if self.docs_root.as_os_str().is_empty() {
            return Err(ConfigError::validation(
                "assets.docs_root",
                "Documentation root cannot be empty.",
            ));
        }
        if self.public_root.as_os_str().is_empty() {
            return Err(ConfigError::validation(
                "assets.public_root",
                "Public root cannot be empty.",
            ));
        }
        Ok(())
    }
}

impl AuthConfig {
    /// Checked when the server starts rather than on load, so `--dry-run`
    /// and tooling work without a secret.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::validation(
                "auth.jwt_secret",
                "JWT secret cannot be empty.",
            ));
        }
        if self.jwt_secret.len() < 32 {
            return Err(ConfigError::validation(
                "auth.jwt_secret",
                "JWT secret should be at least 32 characters.",
            ));
        }
        Ok(())
    }
}

impl Settings {
    /// Validates everything except the auth secret.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.logger
            .validate()
            .map_err(|e| ConfigError::validation("logger", e.to_string()))?;
        self.http.validate()?;
        self.cors.validate()?;
        self.security.validate()?;
        self.assets.validate()?;
        Ok(())
    }
}

fn validate_mount(field: &str, mount: &str) -> Result<(), ConfigError> {
    if !mount.starts_with('/') || mount.len() < 2 {
        return Err(ConfigError::validation(
            field,
            format!("Mount path must start with '/' and name a segment, got '{}'.", mount),
        ));
    }
    Ok(())
}
