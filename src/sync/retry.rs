//! Transparent token refresh around provider API calls.
//!
//! The single point through which every authenticated provider call
//! passes. On an authorization failure it performs exactly one refresh,
//! persists the new tokens, and retries once. No loops, no swallowed
//! errors.

use crate::accounts::{AccountStore, LinkedAccount};
use crate::error::{Error, Result};
use crate::oauth::{refresh_access_token, ProviderConfig};
use std::future::Future;
use tracing::{info, warn};

/// Invokes `call` with the account's access token, recovering once from a
/// provider 401 by refreshing the stored token pair.
///
/// - The first [`Error::ProviderAuth`] triggers a refresh-token grant; the
///   new pair is persisted (last successful write wins under concurrent
///   refreshes) and `call` is retried with the fresh token.
/// - A second auth failure becomes [`Error::ProviderAuthFailure`].
/// - Without a refresh token the original failure propagates unchanged,
///   as does a failed refresh call, which never overwrites stored tokens.
pub async fn with_auth_retry<T, F, Fut>(
    accounts: &AccountStore,
    http: &reqwest::Client,
    config: &ProviderConfig,
    account: &LinkedAccount,
    call: F,
) -> Result<T>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match call(account.access_token.clone()).await {
        Err(original @ Error::ProviderAuth { .. }) => {
            let Some(refresh_token) = account.refresh_token.as_deref() else {
                warn!(
                    account = %account.id,
                    provider = %account.provider,
                    "Access token rejected and no refresh token is stored"
                );
                return Err(original);
            };

            info!(
                account = %account.id,
                provider = %account.provider,
                "Access token rejected, refreshing"
            );

            let tokens = refresh_access_token(http, config, refresh_token).await?;
            accounts.update_tokens(
                account.id,
                &tokens.access_token,
                tokens.refresh_token.as_deref(),
            )?;

            match call(tokens.access_token).await {
                Err(Error::ProviderAuth { provider }) => {
                    warn!(
                        account = %account.id,
                        provider = %provider,
                        "Refreshed token was also rejected"
                    );
                    Err(Error::ProviderAuthFailure { provider })
                }
                other => other,
            }
        }
        other => other,
    }
}
