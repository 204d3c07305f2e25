//! Account identity lookup after token exchange.
//!
//! Resolves the provider-assigned stable account id plus the display
//! identity (primary email for mail accounts, handle for microblog
//! accounts) that the linked-account record carries.

use super::provider::ProviderConfig;
use crate::accounts::Provider;
use crate::error::{Error, Result};
use reqwest::StatusCode;
use serde::Deserialize;

/// Resolved identity of the authorizing provider account.
#[derive(Clone, Debug)]
pub struct AccountIdentity {
    pub account_id: String,
    pub email: Option<String>,
    pub username: Option<String>,
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: String,
}

#[derive(Deserialize)]
struct TwitterUserEnvelope {
    data: TwitterUser,
}

#[derive(Deserialize)]
struct TwitterUser {
    id: String,
    username: String,
}

/// Fetches the authorizing account's identity with a freshly issued access
/// token.
pub async fn fetch_identity(
    http: &reqwest::Client,
    config: &ProviderConfig,
    access_token: &str,
) -> Result<AccountIdentity> {
    let response = http
        .get(&config.identity_url)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| Error::Provider {
            provider: config.provider,
            operation: "fetch_identity",
            message: e.to_string(),
        })?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(Error::ProviderAuth {
            provider: config.provider,
        });
    }
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(Error::Provider {
            provider: config.provider,
            operation: "fetch_identity",
            message: format!("{status}: {body}"),
        });
    }

    let parse_error = |e: reqwest::Error| Error::Provider {
        provider: config.provider,
        operation: "fetch_identity",
        message: format!("failed to parse identity response: {e}"),
    };

    match config.provider {
        Provider::Gmail => {
            let info: GoogleUserInfo = response.json().await.map_err(parse_error)?;
            Ok(AccountIdentity {
                account_id: info.id,
                email: Some(info.email),
                username: None,
            })
        }
        Provider::Twitter => {
            let envelope: TwitterUserEnvelope = response.json().await.map_err(parse_error)?;
            Ok(AccountIdentity {
                account_id: envelope.data.id,
                email: None,
                username: Some(envelope.data.username),
            })
        }
    }
}
