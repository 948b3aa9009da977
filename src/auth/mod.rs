//! Authentication strategies and the registry shared by the pipeline.
//!
//! A [`StrategyRegistry`] is built once at startup, wrapped in an `Arc` and
//! attached to every request by the authentication stage. Routes look up a
//! strategy by name and ask it to verify the request's credentials.

mod error;
pub mod jwt;
pub mod provider;

pub use error::AuthError;
pub use jwt::{Claims, JwtStrategy};
pub use provider::{OAuthProvider, ProviderKind};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;

/// Who a strategy says the caller is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Name of the strategy that verified the caller
    pub provider: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

/// A named credential verifier.
#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError>;
}

/// Immutable-after-startup map of strategy name to verifier.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<&'static str, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// `AuthError::DuplicateStrategy` when the name is already taken; the
    /// existing strategy is kept.
    pub fn register<S: Strategy + 'static>(&mut self, strategy: S) -> Result<(), AuthError> {
        let name = strategy.name();
        if self.strategies.contains_key(name) {
            return Err(AuthError::DuplicateStrategy(name.to_string()));
        }
        self.strategies.insert(name, Arc::new(strategy));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.get(name).cloned()
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    /// Verifies the request with the named strategy.
    pub async fn authenticate(&self, name: &str, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let strategy = self
            .get(name)
            .ok_or_else(|| AuthError::UnknownStrategy(name.to_string()))?;
        strategy.authenticate(headers).await
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

/// Registry with the `jwt`, `facebook` and `google` strategies.
pub fn default_registry(config: &AuthConfig) -> Result<StrategyRegistry, AuthError> {
    let client = provider::http_client()?;

    let mut registry = StrategyRegistry::new();
    registry.register(JwtStrategy::new(&config.jwt_secret))?;
    registry.register(OAuthProvider::new(
        ProviderKind::Facebook,
        &config.facebook_profile_url,
        client.clone(),
    ))?;
    registry.register(OAuthProvider::new(
        ProviderKind::Google,
        &config.google_profile_url,
        client,
    ))?;
    Ok(registry)
}

/// Token from `Authorization: Bearer <token>`; the scheme is case-insensitive.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    let (scheme, token) = value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MissingCredentials)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    Ok(token)
}
