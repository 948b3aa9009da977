//! Server module for managing HTTP server lifecycle
//!
//! This module handles server initialization, startup, and graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;

use crate::api;
use crate::auth::default_registry;
use crate::config::settings::Settings;
use crate::pipeline::compose;

/// HTTP server manager
pub struct Server {
    settings: Settings,
}

impl Server {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Start the server and run until shutdown signal
    ///
    /// 1. Logs startup information
    /// 2. Validates the authentication settings
    /// 3. Registers the authentication strategies
    /// 4. Composes the request pipeline
    /// 5. Binds and serves with graceful shutdown
    ///
    /// # Errors
    /// - Invalid authentication settings
    /// - Strategy registration or pipeline composition errors
    /// - Address binding errors
    /// - Server runtime errors
    pub async fn run(self) -> anyhow::Result<()> {
        let settings = &self.settings;

        tracing::info!(
            app_name = %settings.application.name,
            app_version = %settings.application.version,
            environment = %settings.application.environment,
            "Application starting"
        );

        tracing::info!(
            host = %settings.server.host,
            port = %settings.server.port,
            api_prefix = %settings.http.api_prefix,
            access_log = ?settings.http.access_log_format(settings.application.environment),
            "Server configuration loaded"
        );

        tracing::info!(
            level = %settings.logger.level,
            console_enabled = %settings.logger.console.enabled,
            file_enabled = %settings.logger.file.enabled,
            "Logger configuration loaded"
        );

        tracing::info!(
            docs_root = %settings.assets.docs_root.display(),
            public_root = %settings.assets.public_root.display(),
            "Asset roots configured"
        );

        // Secret is never logged.
        settings.auth.validate().map_err(|e| {
            tracing::error!(error = %e, "Authentication configuration validation failed");
            anyhow::anyhow!("Authentication configuration validation failed: {}", e)
        })?;

        let registry = default_registry(&settings.auth)?;
        tracing::info!(strategies = ?registry.names(), "Authentication strategies registered");

        let pipeline = compose(settings, Arc::new(registry), api::v1_routes())?;
        tracing::info!(stages = ?pipeline.stage_names(), "Pipeline composed");

        let address = settings.server.address();
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!(error = %e, address = %address, "Failed to bind to address");
            anyhow::anyhow!("Failed to bind to {}: {}", address, e)
        })?;

        tracing::info!(address = %address, "Server listening");

        let service = pipeline
            .into_router()
            .into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, service)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Waits for Ctrl+C or SIGTERM.
///
/// A signal handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
