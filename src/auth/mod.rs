//! Bearer token verification / Bearer令牌验证
//!
//! `verify` pulls the credential out of the `Authorization` header and hands
//! it to an [`IdentityProvider`]. Provider failures are classified into
//! distinct [`AuthError`] variants; every variant surfaces as HTTP 401.

pub mod firebase;

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

pub use firebase::{FirebaseConfig, FirebaseVerifier};

/// Authenticated caller for the lifetime of one request / 单次请求内的已认证调用方
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub uid: String,
    pub expires_at: DateTime<Utc>,
    pub email: Option<String>,
}

/// Failures reported by an identity provider / 身份提供方返回的错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{0}")]
    Invalid(String),
    #[error("{0}")]
    Expired(String),
    #[error("{0}")]
    Revoked(String),
    #[error("{0}")]
    Disabled(String),
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization header missing")]
    MissingHeader,
    #[error("Bearer token not found or malformed in Authorization header")]
    Malformed,
    #[error("Invalid ID token: {0}")]
    InvalidToken(String),
    #[error("Expired ID token: {0}")]
    Expired(String),
    #[error("Revoked ID token: {0}")]
    Revoked(String),
    #[error("User account has been disabled: {0}")]
    UserDisabled(String),
    #[error("Token verification failed: {0}")]
    VerificationFailed(String),
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Invalid(m) => AuthError::InvalidToken(m),
            ProviderError::Expired(m) => AuthError::Expired(m),
            ProviderError::Revoked(m) => AuthError::Revoked(m),
            ProviderError::Disabled(m) => AuthError::UserDisabled(m),
            ProviderError::Other(m) => AuthError::VerificationFailed(m),
        }
    }
}

/// Identity token verification capability / 身份令牌验证能力
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_id_token(&self, token: &str) -> Result<Principal, ProviderError>;
}

/// Extract the bearer credential without verifying it / 仅提取Bearer凭证
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers.get(AUTHORIZATION).ok_or(AuthError::MissingHeader)?;
    let value = value.to_str().map_err(|_| AuthError::Malformed)?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or(AuthError::Malformed)?;
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(AuthError::Malformed);
    }
    Ok(token)
}

/// Verify the request's bearer token / 验证请求的Bearer令牌
pub async fn verify(
    headers: &HeaderMap,
    provider: &dyn IdentityProvider,
) -> Result<Principal, AuthError> {
    let token = bearer_token(headers)?;
    match provider.verify_id_token(token).await {
        Ok(principal) => {
            debug!(uid = %principal.uid, "request authenticated");
            Ok(principal)
        }
        Err(e) => {
            let err = AuthError::from(e);
            warn!(reason = %err, "token verification failed");
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticProvider {
        outcome: Result<Principal, ProviderError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityProvider for StaticProvider {
        async fn verify_id_token(&self, _token: &str) -> Result<Principal, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    fn principal() -> Principal {
        Principal {
            uid: "user-1".to_string(),
            expires_at: Utc::now(),
            email: None,
        }
    }

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    #[tokio::test]
    async fn test_missing_header() {
        let provider = StaticProvider {
            outcome: Ok(principal()),
            calls: AtomicUsize::new(0),
        };
        let err = verify(&HeaderMap::new(), &provider).await.unwrap_err();
        assert_eq!(err, AuthError::MissingHeader);
        assert!(err.to_string().contains("Authorization header missing"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_headers_never_reach_provider() {
        let provider = StaticProvider {
            outcome: Ok(principal()),
            calls: AtomicUsize::new(0),
        };
        for value in ["Bearer ", "Bearer    ", "Basic abc", "bearer abc", "Bearer a b"] {
            let err = verify(&headers(value), &provider).await.unwrap_err();
            assert_eq!(err, AuthError::Malformed, "header {value:?}");
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_valid_token() {
        let provider = StaticProvider {
            outcome: Ok(principal()),
            calls: AtomicUsize::new(0),
        };
        let p = verify(&headers("Bearer abc.def.ghi"), &provider).await.unwrap();
        assert_eq!(p.uid, "user-1");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_provider_errors_are_classified() {
        let cases = [
            (ProviderError::Invalid("bad sig".into()), "Invalid ID token: bad sig"),
            (ProviderError::Expired("exp".into()), "Expired ID token: exp"),
            (ProviderError::Revoked("rev".into()), "Revoked ID token: rev"),
            (
                ProviderError::Disabled("off".into()),
                "User account has been disabled: off",
            ),
            (ProviderError::Other("io".into()), "Token verification failed: io"),
        ];
        for (provider_err, message) in cases {
            let provider = StaticProvider {
                outcome: Err(provider_err),
                calls: AtomicUsize::new(0),
            };
            let err = verify(&headers("Bearer t"), &provider).await.unwrap_err();
            assert_eq!(err.to_string(), message);
        }
    }
}
