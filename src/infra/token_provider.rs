use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::app_error::{AppError, AppResult};

/// Refresh this long before the advertised expiry so in-flight requests
/// never ride a token that dies mid-call.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl IssuedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(EXPIRY_SKEW_SECS) > now
    }
}

/// Seam over the token endpoint so refresh behavior is testable.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    async fn fetch(&self) -> AppResult<IssuedToken>;
}

/// Process-wide cached gateway credential with lazy, serialized refresh.
///
/// The cache mutex is held across the refresh call, so concurrent
/// reconciliation shares a single in-flight refresh instead of storming
/// the token endpoint.
pub struct TokenProvider {
    fetcher: Arc<dyn TokenFetcher>,
    cached: Mutex<Option<IssuedToken>>,
}

impl TokenProvider {
    pub fn new(fetcher: Arc<dyn TokenFetcher>) -> Self {
        Self {
            fetcher,
            cached: Mutex::new(None),
        }
    }

    pub async fn get_valid_token(&self) -> AppResult<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.access_token.clone());
            }
        }

        debug!("Refreshing gateway access token");
        let fresh = self.fetcher.fetch().await?;
        let access_token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(access_token)
    }
}

// ============================================================================
// HTTP fetcher
// ============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_at: i64,
}

pub struct HttpTokenFetcher {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
}

impl HttpTokenFetcher {
    pub fn new(
        client: Client,
        token_url: String,
        client_id: String,
        client_secret: SecretString,
    ) -> Self {
        Self {
            client,
            token_url,
            client_id,
            client_secret,
        }
    }

    fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.client_id, self.client_secret.expose_secret());
        let encoded = base64::engine::general_purpose::STANDARD.encode(raw);
        format!("Basic {encoded}")
    }
}

#[async_trait]
impl TokenFetcher for HttpTokenFetcher {
    async fn fetch(&self) -> AppResult<IssuedToken> {
        let response = self
            .client
            .post(&self.token_url)
            .header("Authorization", self.basic_auth_header())
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| AppError::GatewayTransport(format!("token request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::GatewayTransport(format!("token response unreadable: {e}")))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Token endpoint error");
            return Err(AppError::Gateway {
                code: "TOKEN_REFRESH_FAILED".into(),
                message: format!("token endpoint answered {status}"),
            });
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| AppError::Internal(format!("failed to parse token response: {e}")))?;

        let expires_at = DateTime::<Utc>::from_timestamp(parsed.expires_at, 0)
            .ok_or_else(|| AppError::Internal("token expiry out of range".into()))?;

        Ok(IssuedToken {
            access_token: parsed.access_token,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CountingFetcher {
        calls: AtomicUsize,
        ttl_secs: i64,
    }

    impl CountingFetcher {
        fn new(ttl_secs: i64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                ttl_secs,
            }
        }
    }

    #[async_trait]
    impl TokenFetcher for CountingFetcher {
        async fn fetch(&self) -> AppResult<IssuedToken> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            // A short pause widens the race window for the concurrency test.
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            Ok(IssuedToken {
                access_token: format!("token-{n}"),
                expires_at: Utc::now() + Duration::seconds(self.ttl_secs),
            })
        }
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let fetcher = Arc::new(CountingFetcher::new(3600));
        let provider = Arc::new(TokenProvider::new(fetcher.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let provider = provider.clone();
            handles.push(tokio::spawn(
                async move { provider.get_valid_token().await },
            ));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "token-0");
        }

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fresh_token_is_reused() {
        let fetcher = Arc::new(CountingFetcher::new(3600));
        let provider = TokenProvider::new(fetcher.clone());

        provider.get_valid_token().await.unwrap();
        provider.get_valid_token().await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_token_triggers_refresh() {
        // TTL inside the skew window, so the token is already stale.
        let fetcher = Arc::new(CountingFetcher::new(30));
        let provider = TokenProvider::new(fetcher.clone());

        let first = provider.get_valid_token().await.unwrap();
        let second = provider.get_valid_token().await.unwrap();
        assert_eq!(first, "token-0");
        assert_eq!(second, "token-1");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }
}
