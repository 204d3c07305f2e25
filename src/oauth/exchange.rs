//! OAuth token endpoint calls.
//!
//! Covers the three grants the core needs: the standard authorization-code
//! exchange (confidential client), the PKCE exchange (public client with a
//! code verifier), and the refresh-token grant used by the sync engine's
//! retry wrapper.

use super::provider::ProviderConfig;
use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// Tokens issued by a provider token endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Exchanges an authorization code for tokens (standard variant, with
/// client secret).
pub async fn exchange_code(
    http: &reqwest::Client,
    config: &ProviderConfig,
    code: &str,
) -> Result<TokenSet> {
    let mut form = HashMap::new();
    form.insert("grant_type", "authorization_code");
    form.insert("code", code);
    form.insert("redirect_uri", config.redirect_uri.as_str());
    form.insert("client_id", config.client_id.as_str());
    if let Some(secret) = &config.client_secret {
        form.insert("client_secret", secret.as_str());
    }

    post_token_request(http, config, form, "code_exchange").await
}

/// Exchanges an authorization code plus the recovered PKCE verifier for
/// tokens (public client, no secret).
pub async fn exchange_code_pkce(
    http: &reqwest::Client,
    config: &ProviderConfig,
    code: &str,
    code_verifier: &str,
) -> Result<TokenSet> {
    let mut form = HashMap::new();
    form.insert("grant_type", "authorization_code");
    form.insert("code", code);
    form.insert("redirect_uri", config.redirect_uri.as_str());
    form.insert("client_id", config.client_id.as_str());
    form.insert("code_verifier", code_verifier);

    post_token_request(http, config, form, "code_exchange").await
}

/// Exchanges a stored refresh token for a new access token (and, if the
/// provider reissues one, a new refresh token).
pub async fn refresh_access_token(
    http: &reqwest::Client,
    config: &ProviderConfig,
    refresh_token: &str,
) -> Result<TokenSet> {
    let mut form = HashMap::new();
    form.insert("grant_type", "refresh_token");
    form.insert("refresh_token", refresh_token);
    form.insert("client_id", config.client_id.as_str());
    if let Some(secret) = &config.client_secret {
        form.insert("client_secret", secret.as_str());
    }

    post_token_request(http, config, form, "token_refresh").await
}

async fn post_token_request(
    http: &reqwest::Client,
    config: &ProviderConfig,
    form: HashMap<&str, &str>,
    operation: &'static str,
) -> Result<TokenSet> {
    tracing::debug!(provider = %config.provider, operation, "Calling token endpoint");

    let response = http
        .post(&config.token_url)
        .header("Accept", "application/json")
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Provider {
            provider: config.provider,
            operation,
            message: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(Error::Provider {
            provider: config.provider,
            operation,
            message: format!("{status}: {body}"),
        });
    }

    let tokens: TokenSet = response.json().await.map_err(|e| Error::Provider {
        provider: config.provider,
        operation,
        message: format!("failed to parse token response: {e}"),
    })?;

    tracing::debug!(
        provider = %config.provider,
        operation,
        has_refresh_token = tokens.refresh_token.is_some(),
        "Token endpoint call succeeded"
    );

    Ok(tokens)
}
