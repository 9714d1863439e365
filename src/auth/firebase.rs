//! Firebase ID token verification / Firebase ID令牌验证
//!
//! Tokens are RS256 JWTs signed by Google's secure-token service. Public keys
//! come from a JWKS document which is cached and refetched when a token names
//! a key id the cached set does not know, at most once per refetch interval.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{
    decode, decode_header, errors::ErrorKind, jwk::JwkSet, Algorithm, DecodingKey, Validation,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{IdentityProvider, Principal, ProviderError};
use crate::cache::TtlCache;

pub const GOOGLE_SECURETOKEN_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Identity provider settings / 身份提供方配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirebaseConfig {
    /// Firebase / GCP project id; also the expected audience
    /// 项目ID，同时作为期望的audience
    pub project_id: String,
    /// JWKS endpoint / JWKS地址
    pub jwks_url: String,
    /// How long a fetched key set is trusted / 密钥集缓存时长
    pub jwks_ttl_secs: u64,
    /// Minimum gap between fetches forced by an unknown `kid` / 未知kid触发重新拉取的最小间隔
    pub jwks_refetch_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for FirebaseConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            jwks_url: GOOGLE_SECURETOKEN_JWKS_URL.to_string(),
            jwks_ttl_secs: 3600,
            jwks_refetch_interval_secs: 60,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    exp: i64,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    auth_time: Option<i64>,
}

pub struct FirebaseVerifier {
    config: FirebaseConfig,
    client: reqwest::Client,
    keys: TtlCache<Arc<JwkSet>>,
    last_fetch: Mutex<Option<Instant>>,
}

impl FirebaseVerifier {
    pub fn new(config: FirebaseConfig) -> anyhow::Result<Self> {
        if config.project_id.trim().is_empty() {
            anyhow::bail!("identity provider project_id is not configured");
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let keys = TtlCache::new(Duration::from_secs(config.jwks_ttl_secs));
        info!(project_id = %config.project_id, "firebase token verifier ready");
        Ok(Self {
            config,
            client,
            keys,
            last_fetch: Mutex::new(None),
        })
    }

    fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.config.project_id)
    }

    async fn fetch_keys(&self) -> Result<Option<Arc<JwkSet>>, ProviderError> {
        debug!(url = %self.config.jwks_url, "fetching signing keys");
        *self.last_fetch.lock() = Some(Instant::now());
        let resp = self
            .client
            .get(&self.config.jwks_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| ProviderError::Other(format!("failed to fetch signing keys: {e}")))?;
        let set: JwkSet = resp
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("invalid signing key set: {e}")))?;
        Ok(Some(Arc::new(set)))
    }

    fn refetched_recently(&self) -> bool {
        let interval = Duration::from_secs(self.config.jwks_refetch_interval_secs);
        self.last_fetch
            .lock()
            .is_some_and(|at| at.elapsed() < interval)
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, ProviderError> {
        let unavailable = || ProviderError::Other("signing key set unavailable".to_string());
        let no_match = || ProviderError::Invalid(format!("no signing key matches kid {kid}"));

        let set = self
            .keys
            .get_or_refresh(|| self.fetch_keys())
            .await?
            .ok_or_else(unavailable)?;
        if let Some(jwk) = set.find(kid) {
            return DecodingKey::from_jwk(jwk).map_err(|e| ProviderError::Other(e.to_string()));
        }

        // Keys may have rotated, but an unknown kid must not turn every
        // request into an outbound fetch.
        if self.refetched_recently() {
            warn!(kid = %kid, "unknown signing key id; refetch suppressed");
            return Err(no_match());
        }
        let set = self
            .keys
            .refresh(|| self.fetch_keys())
            .await?
            .ok_or_else(unavailable)?;
        let jwk = set.find(kid).ok_or_else(no_match)?;
        DecodingKey::from_jwk(jwk).map_err(|e| ProviderError::Other(e.to_string()))
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> ProviderError {
    match err.kind() {
        ErrorKind::ExpiredSignature => ProviderError::Expired("token has expired".to_string()),
        ErrorKind::InvalidToken
        | ErrorKind::InvalidSignature
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidSubject
        | ErrorKind::ImmatureSignature
        | ErrorKind::InvalidAlgorithm
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => ProviderError::Invalid(err.to_string()),
        _ => ProviderError::Other(err.to_string()),
    }
}

#[async_trait]
impl IdentityProvider for FirebaseVerifier {
    async fn verify_id_token(&self, token: &str) -> Result<Principal, ProviderError> {
        let header = decode_header(token).map_err(classify)?;
        if header.alg != Algorithm::RS256 {
            return Err(ProviderError::Invalid(format!(
                "unexpected signing algorithm {:?}",
                header.alg
            )));
        }
        let kid = header
            .kid
            .ok_or_else(|| ProviderError::Invalid("token header has no kid".to_string()))?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[self.config.project_id.as_str()]);
        validation.set_issuer(&[self.issuer()]);
        validation.set_required_spec_claims(&["exp", "aud", "iss", "sub"]);

        let claims = decode::<IdTokenClaims>(token, &key, &validation)
            .map_err(classify)?
            .claims;

        if claims.sub.trim().is_empty() {
            return Err(ProviderError::Invalid("token has an empty subject".to_string()));
        }
        let now = Utc::now().timestamp();
        if matches!(claims.auth_time, Some(t) if t > now + validation.leeway as i64) {
            return Err(ProviderError::Invalid("auth_time is in the future".to_string()));
        }
        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .ok_or_else(|| ProviderError::Invalid("exp out of range".to_string()))?;

        Ok(Principal {
            uid: claims.sub,
            expires_at,
            email: claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TEST_KEY_PEM: &str = include_str!("testdata/rsa_test_key.pem");
    const TEST_KEY_N: &str = "1gdoddJXSw3nxiez0FH5lsykhp9Tv_KJANVvv5Xss1m76XNUjSdOCPcIQLa1mTXhHv99T8wrVoVL_zh5I7HQwC5xfpjG_Mv9EBQXtVRf_9aH6SSZ3QqX7lqcC4z2ifbV10lNMHbwAr5FKFSXGVSeMnU6_YRWFbVO0vJGzrfKmUQPWbDOUetttPkQbEresG1c7ysHHrER-NuxTqfTYXM-pQdHt-xbwvlJm6n_5R5jhR_ZYPMh6ZsOzK6lWJduIrlWqyfAdbg108A0Fsr6JbijaO77CYIosBWdza4S9ebT9BiRJS4ekLlBpV8dDot7SeAYZxfuWRYlgroWffpPzvVf-Q";
    const PROJECT: &str = "vss-demo";

    async fn spawn_jwks(fetches: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/jwks",
            get(move || {
                let fetches = fetches.clone();
                async move {
                    fetches.fetch_add(1, Ordering::SeqCst);
                    Json(json!({
                        "keys": [{
                            "kty": "RSA",
                            "alg": "RS256",
                            "use": "sig",
                            "kid": "k1",
                            "n": TEST_KEY_N,
                            "e": "AQAB"
                        }]
                    }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/jwks")
    }

    fn verifier_with_interval(jwks_url: String, refetch_secs: u64) -> FirebaseVerifier {
        FirebaseVerifier::new(FirebaseConfig {
            project_id: PROJECT.to_string(),
            jwks_url,
            jwks_ttl_secs: 3600,
            jwks_refetch_interval_secs: refetch_secs,
            timeout_secs: 5,
        })
        .unwrap()
    }

    fn verifier(jwks_url: String) -> FirebaseVerifier {
        verifier_with_interval(jwks_url, 60)
    }

    fn sign(kid: &str, claims: Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        let key = EncodingKey::from_rsa_pem(TEST_KEY_PEM.as_bytes()).unwrap();
        encode(&header, &claims, &key).unwrap()
    }

    fn claims(exp_offset: i64, aud: &str) -> Value {
        let now = Utc::now().timestamp();
        json!({
            "sub": "uid-42",
            "aud": aud,
            "iss": format!("https://securetoken.google.com/{aud}"),
            "iat": now - 10,
            "auth_time": now - 10,
            "exp": now + exp_offset,
            "email": "ops@example.com"
        })
    }

    #[tokio::test]
    async fn test_valid_token_and_key_caching() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let v = verifier(spawn_jwks(fetches.clone()).await);
        let token = sign("k1", claims(3600, PROJECT));

        let p = v.verify_id_token(&token).await.unwrap();
        assert_eq!(p.uid, "uid-42");
        assert_eq!(p.email.as_deref(), Some("ops@example.com"));
        v.verify_id_token(&token).await.unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let v = verifier(spawn_jwks(fetches).await);
        let token = sign("k1", claims(-3600, PROJECT));
        assert!(matches!(
            v.verify_id_token(&token).await,
            Err(ProviderError::Expired(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_audience_is_invalid() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let v = verifier(spawn_jwks(fetches).await);
        let token = sign("k1", claims(3600, "someone-else"));
        assert!(matches!(
            v.verify_id_token(&token).await,
            Err(ProviderError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_kid_refetches_keys() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let v = verifier_with_interval(spawn_jwks(fetches.clone()).await, 0);
        v.verify_id_token(&sign("k1", claims(3600, PROJECT)))
            .await
            .unwrap();

        let err = v
            .verify_id_token(&sign("rotated", claims(3600, PROJECT)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Invalid(_)));
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_kid_refetch_is_rate_limited() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let v = verifier(spawn_jwks(fetches.clone()).await);
        v.verify_id_token(&sign("k1", claims(3600, PROJECT)))
            .await
            .unwrap();

        let bogus = sign("bogus", claims(3600, PROJECT));
        for _ in 0..20 {
            assert!(matches!(
                v.verify_id_token(&bogus).await,
                Err(ProviderError::Invalid(_))
            ));
        }
        assert_eq!(fetches.load(Ordering::SeqCst), 1);

        // Known keys keep working while refetches are suppressed.
        v.verify_id_token(&sign("k1", claims(3600, PROJECT)))
            .await
            .unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_garbage_and_hmac_tokens_rejected_without_fetch() {
        let fetches = Arc::new(AtomicUsize::new(0));
        let v = verifier(spawn_jwks(fetches.clone()).await);

        assert!(matches!(
            v.verify_id_token("not-a-jwt").await,
            Err(ProviderError::Invalid(_))
        ));
        let hs = encode(
            &Header::new(Algorithm::HS256),
            &claims(3600, PROJECT),
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(matches!(
            v.verify_id_token(&hs).await,
            Err(ProviderError::Invalid(_))
        ));
        assert_eq!(fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreachable_jwks_is_other() {
        let v = verifier("http://127.0.0.1:9/jwks".to_string());
        let token = sign("k1", claims(3600, PROJECT));
        assert!(matches!(
            v.verify_id_token(&token).await,
            Err(ProviderError::Other(_))
        ));
    }

    #[test]
    fn test_missing_project_rejected() {
        assert!(FirebaseVerifier::new(FirebaseConfig::default()).is_err());
    }
}
