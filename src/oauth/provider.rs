//! OAuth provider configurations.
//!
//! Defines endpoints, scopes, and client credentials for each supported
//! provider. Client credentials come from environment variables; endpoint
//! URLs default to the real providers and stay overridable so tests can
//! point a flow at a mock server.

use crate::accounts::Provider;
use serde::{Deserialize, Serialize};

/// OAuth configuration for one provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: Provider,

    /// Authorization (consent) endpoint
    pub auth_url: String,

    /// Token exchange endpoint
    pub token_url: String,

    /// Resource API base URL
    pub api_base: String,

    /// Account identity endpoint (userinfo / users/me)
    pub identity_url: String,

    /// Requested OAuth scopes
    pub scopes: Vec<String>,

    /// Client ID (from environment variable)
    pub client_id: String,

    /// Client secret; `None` for the PKCE public client
    pub client_secret: Option<String>,

    /// Redirect URI registered with the provider
    pub redirect_uri: String,
}

impl ProviderConfig {
    /// Builds the consent URL for the standard (confidential client)
    /// variant.
    ///
    /// `access_type=offline` makes the provider issue a refresh token and
    /// `prompt=consent` forces it to be reissued on every re-auth.
    pub fn offline_consent_auth_url(&self) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&scope={}&response_type=code&access_type=offline&prompt=consent",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&self.scopes.join(" ")),
        )
    }

    /// Builds the consent URL for the PKCE variant, carrying the state
    /// token and the S256 code challenge.
    pub fn pkce_auth_url(&self, state: &str, code_challenge: &str) -> String {
        format!(
            "{}?response_type=code&client_id={}&redirect_uri={}&scope={}&state={}&code_challenge={}&code_challenge_method=S256",
            self.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&self.scopes.join(" ")),
            urlencoding::encode(state),
            urlencoding::encode(code_challenge),
        )
    }

    /// Loads the configuration for a provider from the environment.
    ///
    /// Reads `PULSE_OAUTH_<PROVIDER>_CLIENT_ID`, `_CLIENT_SECRET` (gmail
    /// only; the microblog client is a PKCE public client) and
    /// `_REDIRECT_URI`. Returns `None` when a required variable is unset.
    pub fn from_env(provider: Provider) -> Option<Self> {
        let env_prefix = provider.as_str().to_uppercase();
        let client_id = std::env::var(format!("PULSE_OAUTH_{env_prefix}_CLIENT_ID")).ok()?;
        let redirect_uri = std::env::var(format!("PULSE_OAUTH_{env_prefix}_REDIRECT_URI")).ok()?;

        match provider {
            Provider::Gmail => {
                let client_secret =
                    std::env::var(format!("PULSE_OAUTH_{env_prefix}_CLIENT_SECRET")).ok()?;
                Some(Self {
                    provider,
                    auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                    token_url: "https://oauth2.googleapis.com/token".to_string(),
                    api_base: "https://gmail.googleapis.com/gmail/v1".to_string(),
                    identity_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
                    scopes: vec![
                        "https://www.googleapis.com/auth/gmail.readonly".to_string(),
                        "https://www.googleapis.com/auth/userinfo.email".to_string(),
                        "https://www.googleapis.com/auth/userinfo.profile".to_string(),
                        "openid".to_string(),
                    ],
                    client_id,
                    client_secret: Some(client_secret),
                    redirect_uri,
                })
            }
            Provider::Twitter => Some(Self {
                provider,
                auth_url: "https://twitter.com/i/oauth2/authorize".to_string(),
                token_url: "https://api.twitter.com/2/oauth2/token".to_string(),
                api_base: "https://api.twitter.com/2".to_string(),
                identity_url: "https://api.twitter.com/2/users/me".to_string(),
                scopes: vec![
                    "tweet.read".to_string(),
                    "users.read".to_string(),
                    "offline.access".to_string(),
                ],
                client_id,
                client_secret: None,
                redirect_uri,
            }),
        }
    }
}
