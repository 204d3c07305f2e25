//! Error taxonomy for the integration and notification core.
//!
//! Every failure surfaced to callers is one of these kinds. The token
//! refresh manager is the only place a failure is recovered locally
//! (a single retry after `ProviderAuth`); everything else propagates
//! unchanged so a caller can map kinds to its own wire format.

use crate::accounts::{Plan, Provider};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The referenced user does not exist.
    #[error("user not found")]
    UserNotFound,

    /// The referenced linked account does not exist.
    #[error("integration not found")]
    IntegrationNotFound,

    /// No resolved caller identity was supplied by the session layer.
    #[error("unauthorized: no resolved caller identity")]
    Unauthorized,

    /// The (user, provider, external account) triple is already linked.
    #[error("this {provider} account is already connected")]
    DuplicateAccount { provider: Provider },

    /// The user's plan does not allow another linked account.
    #[error("plan limit reached: the {plan} plan allows {limit} integrations")]
    PlanLimitExceeded { plan: Plan, limit: usize },

    /// A required callback parameter is missing or malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The PKCE state token is unknown, already consumed, or expired.
    #[error("authorization state is unknown, already used, or expired")]
    ExpiredOrUnknownState,

    /// The provider rejected the access token (401-equivalent) and no
    /// local recovery was possible.
    #[error("{provider} rejected the access token")]
    ProviderAuth { provider: Provider },

    /// Both the original call and the retry with a refreshed token were
    /// rejected by the provider.
    #[error("{provider} authorization failed after token refresh")]
    ProviderAuthFailure { provider: Provider },

    /// Any other upstream provider failure, carrying the originating
    /// provider and operation for logging.
    #[error("{provider} request failed during {operation}: {message}")]
    Provider {
        provider: Provider,
        operation: &'static str,
        message: String,
    },

    /// Persistence or token encryption failure.
    #[error("storage failure: {0}")]
    Store(String),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Store(err.to_string())
    }
}
