use std::fmt::Debug;
use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::HeaderValue;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::application::use_cases::webhook::WebhookCredentials;

pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub cors_origin: HeaderValue,
    /// Base URL of the payment gateway's mandate API, e.g.
    /// `https://api.gateway.example/v2`.
    pub gateway_base_url: Url,
    pub gateway_token_url: String,
    pub gateway_client_id: String,
    pub gateway_client_secret: SecretString,
    pub gateway_timeout_secs: u64,
    /// Webhook credentials the gateway was configured with. Both must be
    /// set; otherwise ingestion fails closed.
    pub webhook_username: Option<String>,
    pub webhook_password: Option<SecretString>,
    /// Explicit escape hatch: accept unauthenticated webhook deliveries
    /// when no credentials are provisioned. Every admitted request is
    /// logged loudly. Default false.
    pub webhook_allow_unauthenticated: bool,
    /// Max concurrent gateway status calls during batch reconciliation.
    pub reconcile_concurrency: usize,
    /// Window during which repeated batch reconciliation is suppressed.
    pub reconcile_debounce_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let bind_addr: SocketAddr = get_env_default("BIND_ADDR", "127.0.0.1:3002".parse().unwrap());
        let database_url: String = get_env("DATABASE_URL");
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .expect("CORS_ORIGIN must be a valid header value");

        let gateway_base_url: Url = get_env("GATEWAY_BASE_URL");
        let gateway_token_url: String = get_env_default(
            "GATEWAY_TOKEN_URL",
            format!("{}/oauth/token", gateway_base_url.as_str().trim_end_matches('/')),
        );
        let gateway_client_id: String = get_env("GATEWAY_CLIENT_ID");
        let gateway_client_secret =
            SecretString::new(get_env::<String>("GATEWAY_CLIENT_SECRET").into());
        let gateway_timeout_secs: u64 = get_env_default("GATEWAY_TIMEOUT_SECS", 10);

        let webhook_username: Option<String> = std::env::var("WEBHOOK_USERNAME").ok();
        let webhook_password: Option<SecretString> = std::env::var("WEBHOOK_PASSWORD")
            .ok()
            .map(|p| SecretString::new(p.into()));
        let webhook_allow_unauthenticated: bool =
            get_env_default("WEBHOOK_ALLOW_UNAUTHENTICATED", false);

        let reconcile_concurrency: usize = get_env_default("RECONCILE_CONCURRENCY", 2);
        let reconcile_debounce_secs: u64 = get_env_default("RECONCILE_DEBOUNCE_SECS", 5);

        Self {
            bind_addr,
            database_url,
            cors_origin,
            gateway_base_url,
            gateway_token_url,
            gateway_client_id,
            gateway_client_secret,
            gateway_timeout_secs,
            webhook_username,
            webhook_password,
            webhook_allow_unauthenticated,
            reconcile_concurrency,
            reconcile_debounce_secs,
        }
    }

    pub fn webhook_credentials(&self) -> Option<WebhookCredentials> {
        match (&self.webhook_username, &self.webhook_password) {
            (Some(username), Some(password)) => Some(WebhookCredentials {
                username: username.clone(),
                password: SecretString::new(password.expose_secret().into()),
            }),
            _ => None,
        }
    }
}

fn get_env<T: FromStr>(key: &str) -> T
where
    T::Err: Debug,
{
    let raw = std::env::var(key).unwrap_or_else(|_| panic!("{key} must be set"));
    raw.parse()
        .unwrap_or_else(|e| panic!("{key} is invalid: {e:?}"))
}

fn get_env_default<T: FromStr>(key: &str, default: T) -> T
where
    T::Err: Debug,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{key} is invalid: {e:?}")),
        Err(_) => default,
    }
}
