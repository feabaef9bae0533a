//! Bearer credential acquisition

use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable that supplies the token directly
pub const API_KEY_ENV: &str = "LLM_API_KEY";

/// Process-wide bearer token; absent when acquisition failed
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(Option<String>);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn absent() -> Self {
        Self(None)
    }

    pub fn token(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_present(&self) -> bool {
        self.0.is_some()
    }
}

// Keep the token out of logs
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Credential(<redacted>)"),
            None => f.write_str("Credential(absent)"),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    token: Option<String>,
}

/// Fetch the token from `token_url`. Any failure degrades to an absent credential.
pub async fn fetch(token_url: &str) -> Credential {
    match try_fetch(token_url).await {
        Ok(Some(token)) => {
            info!(token_url, "Acquired completion credential");
            Credential::new(token)
        }
        Ok(None) => {
            warn!(token_url, "Token endpoint returned no token; continuing without credential");
            Credential::absent()
        }
        Err(e) => {
            warn!(token_url, error = %e, "Token fetch failed; continuing without credential");
            Credential::absent()
        }
    }
}

async fn try_fetch(token_url: &str) -> Result<Option<String>, reqwest::Error> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    let body: TokenResponse = client
        .get(token_url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(body.token.filter(|t| !t.is_empty()))
}

/// `LLM_API_KEY` when set, otherwise the token endpoint
pub async fn resolve(token_url: &str) -> Credential {
    match std::env::var(API_KEY_ENV) {
        Ok(key) if !key.is_empty() => {
            info!("Using completion credential from {}", API_KEY_ENV);
            Credential::new(key)
        }
        _ => fetch(token_url).await,
    }
}
