//! Serve command handler
//!
//! Handles the serve command including dry-run validation and server startup.

use std::sync::Arc;

use crate::api;
use crate::auth::default_registry;
use crate::config::settings::Settings;
use crate::pipeline::{Pipeline, compose};
use crate::server::Server;

/// Handler for the serve command
pub struct ServeCommandHandler {
    config: Settings,
}

impl ServeCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Runs the server, or only checks that it could start when `dry_run`.
    ///
    /// # Errors
    /// - Configuration validation errors
    /// - Strategy registration or pipeline composition errors
    /// - Bind and server runtime errors (if not dry-run)
    pub async fn execute(self, dry_run: bool) -> anyhow::Result<()> {
        if dry_run {
            self.validate_only().map(|_| ())
        } else {
            Server::new(self.config).run().await
        }
    }

    /// Validates the configuration and composes the pipeline without binding.
    pub fn validate_only(&self) -> anyhow::Result<Pipeline> {
        self.config.validate()?;
        println!("✓ Configuration is valid");
        println!("✓ Environment: {}", self.config.application.environment);
        println!("✓ Server would bind to: {}", self.config.server.address());

        let registry = default_registry(&self.config.auth)?;
        println!("✓ Authentication strategies: {}", registry.names().join(", "));

        let pipeline = compose(&self.config, Arc::new(registry), api::v1_routes())?;
        println!("✓ Pipeline: {}", pipeline.stage_names().join(" -> "));

        if let Err(e) = self.config.auth.validate() {
            println!("! {} (required to start the server)", e);
        }

        println!("Dry run completed successfully - configuration is ready for deployment");
        Ok(pipeline)
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}
