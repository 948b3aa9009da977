//! HS256 bearer tokens.

use async_trait::async_trait;
use axum::http::HeaderMap;
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};

use super::{AuthError, Identity, Strategy, bearer_token};

/// Claims carried by access tokens.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expiration time (unix seconds)
    pub exp: i64,
}

/// Verifies signature and expiry and returns the claims.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidToken => AuthError::InvalidCredentials("Invalid token".to_string()),
        ErrorKind::InvalidSignature => {
            AuthError::InvalidCredentials("Invalid token signature".to_string())
        }
        _ => AuthError::InvalidCredentials(format!("Token validation failed: {}", e)),
    })
}

/// The `jwt` strategy: `Authorization: Bearer <token>` signed with the
/// configured secret.
pub struct JwtStrategy {
    secret: String,
}

impl JwtStrategy {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl Strategy for JwtStrategy {
    fn name(&self) -> &'static str {
        "jwt"
    }

    async fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, AuthError> {
        let token = bearer_token(headers)?;
        let claims = validate_token(token, &self.secret)?;

        Ok(Identity {
            provider: self.name().to_string(),
            id: claims.sub,
            email: claims.email,
            name: claims.name,
            picture: None,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::issue_token;
    use super::*;
    use axum::http::{HeaderValue, header};

    const TEST_SECRET: &str = "test_secret_key_for_jwt_testing_0123";

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn test_issue_and_validate() {
        let claims = Claims::new("7", 15).with_email("ada@example.com");
        let token = issue_token(&claims, TEST_SECRET);
        assert_eq!(token.matches('.').count(), 2);

        let decoded = validate_token(&token, TEST_SECRET).unwrap();
        assert_eq!(decoded, claims);
        assert_eq!(decoded.exp - decoded.iat, 15 * 60);
    }

    #[test]
    fn test_wrong_secret() {
        let token = issue_token(&Claims::new("7", 15), TEST_SECRET);
        let err = validate_token(&token, "another_secret_key_of_sufficient_len").unwrap_err();
        assert_eq!(
            err,
            AuthError::InvalidCredentials("Invalid token signature".to_string())
        );
    }

    #[test]
    fn test_expired_token() {
        let claims = Claims::new("7", -120);
        let token = issue_token(&claims, TEST_SECRET);
        assert_eq!(validate_token(&token, TEST_SECRET), Err(AuthError::TokenExpired));
    }

    #[test]
    fn test_garbage_token() {
        assert!(matches!(
            validate_token("not-a-token", TEST_SECRET),
            Err(AuthError::InvalidCredentials(_))
        ));
    }

    #[tokio::test]
    async fn test_strategy_maps_claims_to_identity() {
        let strategy = JwtStrategy::new(TEST_SECRET);
        let token = issue_token(&Claims::new("7", 15).with_name("Ada"), TEST_SECRET);

        let identity = strategy.authenticate(&bearer(&token)).await.unwrap();
        assert_eq!(identity.provider, "jwt");
        assert_eq!(identity.id, "7");
        assert_eq!(identity.name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_strategy_requires_header() {
        let strategy = JwtStrategy::new(TEST_SECRET);
        assert_eq!(
            strategy.authenticate(&HeaderMap::new()).await,
            Err(AuthError::MissingCredentials)
        );
    }
}
