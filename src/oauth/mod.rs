//! OAuth 2.0 authorization flows for linking provider accounts.
//!
//! Two variants behind one controller:
//! 1. Caller asks to connect a provider → [`AuthFlowController::start_gmail`]
//!    or [`AuthFlowController::start_twitter`] returns the consent URL
//! 2. User authorizes on the provider's site
//! 3. Provider redirects back; the HTTP layer resolves the caller identity
//!    and hands the callback parameters to `finish_gmail`/`finish_twitter`
//! 4. Code is exchanged for tokens (with the recovered PKCE verifier for
//!    the microblog provider), the account identity is fetched, and the
//!    linked account is created through the atomic admission gate
//!
//! No partial record survives a failed callback: the admission check and
//! the insert are one store transaction, and a consumed PKCE state is
//! removed whether the exchange succeeds or fails.

mod exchange;
mod identity;
mod pkce;
mod provider;
mod state;

pub use exchange::{refresh_access_token, TokenSet};
pub use identity::AccountIdentity;
pub use pkce::PkcePair;
pub use provider::ProviderConfig;
pub use state::PendingAuthStore;

use crate::accounts::{AccountStore, LinkedAccount, NewLinkedAccount, Provider};
use crate::error::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Query parameters a provider sends to the callback endpoint.
///
/// Extracted by the HTTP collaborator and passed through unparsed.
#[derive(Clone, Debug, Default)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Drives the redirect → callback → credential-creation sequence for both
/// providers.
pub struct AuthFlowController {
    accounts: Arc<AccountStore>,
    pending: PendingAuthStore,
    http: reqwest::Client,
    gmail: ProviderConfig,
    twitter: ProviderConfig,
}

impl AuthFlowController {
    pub fn new(
        accounts: Arc<AccountStore>,
        pending: PendingAuthStore,
        gmail: ProviderConfig,
        twitter: ProviderConfig,
    ) -> Self {
        Self {
            accounts,
            pending,
            http: reqwest::Client::new(),
            gmail,
            twitter,
        }
    }

    /// Pending PKCE flows awaiting their callback (for monitoring and
    /// periodic expiry cleanup by a collaborator).
    pub fn pending(&self) -> &PendingAuthStore {
        &self.pending
    }

    /// Builds the mail provider's consent URL.
    ///
    /// Requests read-only mailbox plus identity scopes with offline access
    /// and forced consent, so a refresh token is issued on every re-auth.
    pub fn start_gmail(&self) -> String {
        debug!(provider = %Provider::Gmail, "Authorization flow started");
        self.gmail.offline_consent_auth_url()
    }

    /// Starts a PKCE flow for the microblog provider.
    ///
    /// Generates a code verifier, binds it to a fresh one-time state token,
    /// and returns the consent URL carrying the derived challenge.
    pub fn start_twitter(&self) -> String {
        let pair = PkcePair::generate();
        let state = self.pending.create(&pair.verifier);

        debug!(
            provider = %Provider::Twitter,
            pending = self.pending.count(),
            "Authorization flow started"
        );

        self.twitter.pkce_auth_url(&state, &pair.challenge)
    }

    /// Completes the mail provider's callback and links the account.
    pub async fn finish_gmail(
        &self,
        caller: Option<Uuid>,
        params: &CallbackParams,
    ) -> Result<LinkedAccount> {
        let user_id = caller.ok_or(Error::Unauthorized)?;
        reject_provider_error(Provider::Gmail, params)?;

        let code = params
            .code
            .as_deref()
            .ok_or_else(|| Error::BadRequest("missing 'code' parameter".to_string()))?;

        let tokens = exchange::exchange_code(&self.http, &self.gmail, code).await?;
        let who = identity::fetch_identity(&self.http, &self.gmail, &tokens.access_token).await?;

        let account = self.accounts.create(NewLinkedAccount {
            user_id,
            provider: Provider::Gmail,
            account_id: who.account_id,
            email: who.email,
            username: None,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            scopes: self.gmail.scopes.clone(),
        })?;

        info!(
            user_id = %user_id,
            provider = %Provider::Gmail,
            account = %account.id,
            has_refresh_token = account.refresh_token.is_some(),
            "Authorization flow completed"
        );

        Ok(account)
    }

    /// Completes the microblog provider's PKCE callback and links the
    /// account.
    ///
    /// The state token is consumed before the exchange, so a replayed
    /// callback, or one presenting a state this process never issued,
    /// fails with [`Error::ExpiredOrUnknownState`].
    pub async fn finish_twitter(
        &self,
        caller: Option<Uuid>,
        params: &CallbackParams,
    ) -> Result<LinkedAccount> {
        let user_id = caller.ok_or(Error::Unauthorized)?;
        reject_provider_error(Provider::Twitter, params)?;

        let code = params
            .code
            .as_deref()
            .ok_or_else(|| Error::BadRequest("missing 'code' parameter".to_string()))?;
        let state = params
            .state
            .as_deref()
            .ok_or_else(|| Error::BadRequest("missing 'state' parameter".to_string()))?;

        let verifier = self
            .pending
            .validate_and_consume(state)
            .ok_or(Error::ExpiredOrUnknownState)?;

        debug!(provider = %Provider::Twitter, "PKCE state consumed");

        let tokens = exchange::exchange_code_pkce(&self.http, &self.twitter, code, &verifier).await?;
        let who = identity::fetch_identity(&self.http, &self.twitter, &tokens.access_token).await?;

        // Early duplicate check for a distinct error before the admission
        // gate re-verifies inside its transaction
        if self
            .accounts
            .find(user_id, Provider::Twitter, &who.account_id)?
            .is_some()
        {
            return Err(Error::DuplicateAccount {
                provider: Provider::Twitter,
            });
        }

        let account = self.accounts.create(NewLinkedAccount {
            user_id,
            provider: Provider::Twitter,
            account_id: who.account_id,
            email: None,
            username: who.username,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            scopes: self.twitter.scopes.clone(),
        })?;

        info!(
            user_id = %user_id,
            provider = %Provider::Twitter,
            account = %account.id,
            "Authorization flow completed"
        );

        Ok(account)
    }
}

/// Surfaces a provider-reported authorization error before any state is
/// touched.
fn reject_provider_error(provider: Provider, params: &CallbackParams) -> Result<()> {
    if let Some(error) = &params.error {
        let description = params
            .error_description
            .as_deref()
            .unwrap_or("unknown error");
        warn!(
            provider = %provider,
            error = %error,
            description = %description,
            "Provider reported authorization failure"
        );
        return Err(Error::BadRequest(format!(
            "authorization failed: {error} - {description}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::Plan;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    fn test_store() -> Arc<AccountStore> {
        let key = BASE64.encode([0u8; 32]);
        Arc::new(AccountStore::new(":memory:", &key).unwrap())
    }

    fn test_config(provider: Provider) -> ProviderConfig {
        ProviderConfig {
            provider,
            auth_url: "https://example.com/authorize".to_string(),
            token_url: "https://example.com/token".to_string(),
            api_base: "https://example.com/api".to_string(),
            identity_url: "https://example.com/userinfo".to_string(),
            scopes: vec!["read".to_string()],
            client_id: "client-1".to_string(),
            client_secret: None,
            redirect_uri: "http://localhost:3000/callback".to_string(),
        }
    }

    fn test_controller() -> AuthFlowController {
        AuthFlowController::new(
            test_store(),
            PendingAuthStore::new(600),
            test_config(Provider::Gmail),
            test_config(Provider::Twitter),
        )
    }

    #[test]
    fn test_start_twitter_registers_pending_state() {
        let controller = test_controller();

        let url = controller.start_twitter();
        assert!(url.contains("code_challenge="));
        assert!(url.contains("code_challenge_method=S256"));
        assert!(url.contains("state="));
        assert_eq!(controller.pending().count(), 1);

        // A second start is an independent flow with its own state
        controller.start_twitter();
        assert_eq!(controller.pending().count(), 2);
    }

    #[test]
    fn test_start_gmail_has_no_state() {
        let controller = test_controller();
        let url = controller.start_gmail();

        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(!url.contains("state="));
        assert_eq!(controller.pending().count(), 0);
    }

    #[tokio::test]
    async fn test_callback_without_caller_is_unauthorized() {
        let controller = test_controller();
        let params = CallbackParams {
            code: Some("code-1".to_string()),
            state: Some("state-1".to_string()),
            ..Default::default()
        };

        let err = controller.finish_twitter(None, &params).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized));

        let err = controller.finish_gmail(None, &params).await.unwrap_err();
        assert!(matches!(err, Error::Unauthorized));
    }

    #[tokio::test]
    async fn test_callback_requires_code_and_state() {
        let controller = test_controller();
        let store = Arc::clone(&controller.accounts);
        let user = store.create_user("Bob", "bob@example.com", Plan::Free).unwrap();

        let missing_code = CallbackParams {
            state: Some("state-1".to_string()),
            ..Default::default()
        };
        let err = controller
            .finish_twitter(Some(user.id), &missing_code)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));

        let missing_state = CallbackParams {
            code: Some("code-1".to_string()),
            ..Default::default()
        };
        let err = controller
            .finish_twitter(Some(user.id), &missing_state)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_unknown_state_rejected_before_any_exchange() {
        let controller = test_controller();
        let store = Arc::clone(&controller.accounts);
        let user = store.create_user("Bob", "bob@example.com", Plan::Free).unwrap();

        // The token endpoint is unreachable; failing with the state error
        // proves nothing was exchanged
        let params = CallbackParams {
            code: Some("code-1".to_string()),
            state: Some("never-issued".to_string()),
            ..Default::default()
        };
        let err = controller
            .finish_twitter(Some(user.id), &params)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ExpiredOrUnknownState));
    }

    #[tokio::test]
    async fn test_provider_reported_error_surfaces() {
        let controller = test_controller();
        let store = Arc::clone(&controller.accounts);
        let user = store.create_user("Bob", "bob@example.com", Plan::Free).unwrap();

        let params = CallbackParams {
            error: Some("access_denied".to_string()),
            error_description: Some("User cancelled".to_string()),
            ..Default::default()
        };
        let err = controller
            .finish_gmail(Some(user.id), &params)
            .await
            .unwrap_err();

        match err {
            Error::BadRequest(msg) => {
                assert!(msg.contains("access_denied"));
                assert!(msg.contains("User cancelled"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
