use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::utils::{RelayError, Result};

static ENDPOINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://.+$").expect("endpoint pattern is valid"));

/// Checks a username/token pair against a tenant's endpoint.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, api: &str, username: &str, token: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct TokenCheck<'a> {
    username: &'a str,
    token: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenCheckResponse {
    #[serde(default)]
    code: String,
}

/// POSTs `{username, token}` to the tenant API and accepts only `{"code": "0"}`.
#[derive(Debug, Clone, Default)]
pub struct HttpTokenValidator {
    client: reqwest::Client,
}

impl HttpTokenValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

pub fn is_valid_endpoint(api: &str) -> bool {
    ENDPOINT.is_match(api)
}

#[async_trait]
impl TokenValidator for HttpTokenValidator {
    async fn validate(&self, api: &str, username: &str, token: &str) -> Result<()> {
        if !is_valid_endpoint(api) {
            return Err(RelayError::InvalidEndpoint(api.to_string()));
        }

        let body = self
            .client
            .post(api)
            .json(&TokenCheck { username, token })
            .send()
            .await?
            .text()
            .await?;
        debug!(%api, %username, %body, "Token validation response");

        let response: TokenCheckResponse = serde_json::from_str(&body)?;
        if response.code != "0" {
            return Err(RelayError::TokenRejected {
                username: username.to_string(),
                code: response.code,
            });
        }
        Ok(())
    }
}
