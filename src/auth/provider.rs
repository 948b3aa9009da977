//! Social login strategies.
//!
//! The client sends an access token it obtained from Facebook or Google; the
//! token is verified by fetching the provider's profile endpoint with it.

use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde_json::Value;

use super::{AuthError, Identity, Strategy, bearer_token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Facebook,
    Google,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Facebook => "facebook",
            ProviderKind::Google => "google",
        }
    }

    /// Extra query parameters the profile endpoint needs.
    fn query(self) -> &'static [(&'static str, &'static str)] {
        match self {
            ProviderKind::Facebook => &[("fields", "id,name,email,picture")],
            ProviderKind::Google => &[],
        }
    }

    /// Maps the provider's profile document to an identity.
    pub fn identity_from_profile(self, profile: &Value) -> Result<Identity, AuthError> {
        let text = |key: &str| profile.get(key).and_then(Value::as_str).map(String::from);

        let (id, picture) = match self {
            ProviderKind::Facebook => (
                text("id"),
                profile
                    .pointer("/picture/data/url")
                    .and_then(Value::as_str)
                    .map(String::from),
            ),
            ProviderKind::Google => (text("sub"), text("picture")),
        };

        let id = id.ok_or_else(|| {
            AuthError::InvalidCredentials(format!("{} profile has no id", self.as_str()))
        })?;

        Ok(Identity {
            provider: self.as_str().to_string(),
            id,
            email: text("email"),
            name: text("name"),
            picture,
        })
    }
}

/// Shared client for provider calls.
pub fn http_client() -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .pool_idle_timeout(Duration::from_secs(90))
        .gzip(true)
        .user_agent(format!("atrium-rs/{}", crate::pkg_version()))
        .build()
        .map_err(|e| AuthError::Provider(format!("Failed to build HTTP client: {}", e)))
}

/// Bearer strategy backed by a provider profile endpoint.
pub struct OAuthProvider {
    kind: ProviderKind,
    profile_url: String,
    client: reqwest::Client,
}

impl OAuthProvider {
    pub fn new(kind: ProviderKind, profile_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            kind,
            profile_url: profile_url.into(),
            client,
        }
    }

    fn profile_request_url(&self, token: &str) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        for (key, value) in self.kind.query() {
            query.append_pair(key, value);
        }
        query.append_pair("access_token", token);

        let separator = if self.profile_url.contains('?') { '&' } else { '?' };
        format!("{}{}{}", self.profile_url, separator, query.finish())
    }
}

#[async_trait]
impl Strategy for OAuthProvider {
    fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let token = bearer_token(headers)?;

        let response = self
            .client
            .get(self.profile_request_url(token))
            .send()
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            tracing::debug!(provider = self.name(), status = %status, "Provider rejected token");
            return Err(AuthError::InvalidCredentials(format!(
                "{} rejected the access token",
                self.name()
            )));
        }
        if !status.is_success() {
            return Err(AuthError::Provider(format!(
                "{} answered {}",
                self.name(),
                status
            )));
        }

        let profile: Value = response
            .json()
            .await
            .map_err(|e| AuthError::Provider(format!("Invalid profile document: {}", e)))?;
        self.kind.identity_from_profile(&profile)
    }
}
