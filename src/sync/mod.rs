//! Notification sync engine.
//!
//! One fetcher per (provider, event kind) pair, all behind the
//! [`NotificationFetcher`] trait. The engine resolves the linked account,
//! picks the fetcher variant, runs it through the token-refresh wrapper,
//! and batch-persists whatever it produced. Adding a provider means adding
//! fetcher variants; the retry and persistence paths are shared.

mod gmail;
mod retry;
mod twitter;

pub use gmail::{GmailClient, GmailMessages};
pub use retry::with_auth_retry;
pub use twitter::{
    TwitterClient, TwitterFollowers, TwitterLikes, TwitterMentions, TwitterRetweets,
};

use crate::accounts::{AccountStore, LinkedAccount, Provider};
use crate::error::{Error, Result};
use crate::notify::{NewNotification, NotificationStore};
use crate::oauth::ProviderConfig;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// What to pull for a linked account.
///
/// Likes and retweets carry the target post id because it is supplied by
/// the caller; it cannot be derived from the linked account alone.
#[derive(Clone, Debug)]
pub enum SyncKind {
    /// Recent mailbox messages (mail provider).
    Messages,
    /// Recent mentions of the linked account (microblog provider).
    Mentions,
    /// Users who liked the given post (microblog provider).
    Likes { post_id: String },
    /// Users who retweeted the given post (microblog provider).
    Retweets { post_id: String },
    /// Recent followers (microblog provider).
    Followers,
}

/// A provider/kind-specific notification producer.
#[async_trait]
pub trait NotificationFetcher: Send + Sync {
    fn provider(&self) -> Provider;
    fn kind(&self) -> crate::notify::NotificationKind;

    /// Pulls recent provider activity for the account and maps it into
    /// normalized notifications. Implementations route their HTTP calls
    /// through [`with_auth_retry`] and never persist anything themselves.
    async fn fetch(
        &self,
        engine: &SyncEngine,
        account: &LinkedAccount,
    ) -> Result<Vec<NewNotification>>;
}

/// Result of one sync run.
#[derive(Debug)]
pub struct SyncReport {
    /// Notifications produced by the fetcher, in provider order.
    pub notifications: Vec<NewNotification>,
    /// How many of them were newly stored (the rest were dedup hits).
    pub stored: usize,
}

/// Coordinates fetcher selection, token refresh, and persistence.
pub struct SyncEngine {
    pub(crate) accounts: Arc<AccountStore>,
    pub(crate) notifications: Arc<NotificationStore>,
    pub(crate) http: reqwest::Client,
    pub(crate) gmail: ProviderConfig,
    pub(crate) twitter: ProviderConfig,
}

impl SyncEngine {
    pub fn new(
        accounts: Arc<AccountStore>,
        notifications: Arc<NotificationStore>,
        gmail: ProviderConfig,
        twitter: ProviderConfig,
    ) -> Self {
        Self {
            accounts,
            notifications,
            http: reqwest::Client::new(),
            gmail,
            twitter,
        }
    }

    pub(crate) fn config_for(&self, provider: Provider) -> &ProviderConfig {
        match provider {
            Provider::Gmail => &self.gmail,
            Provider::Twitter => &self.twitter,
        }
    }

    /// Runs one sync for a linked account.
    ///
    /// Fails with [`Error::IntegrationNotFound`] if the account id does
    /// not resolve, and with [`Error::BadRequest`] if the requested kind
    /// does not belong to the account's provider.
    pub async fn run(&self, account_id: Uuid, kind: SyncKind) -> Result<SyncReport> {
        let account = self
            .accounts
            .get(account_id)?
            .ok_or(Error::IntegrationNotFound)?;

        let fetcher: Box<dyn NotificationFetcher> = match (account.provider, &kind) {
            (Provider::Gmail, SyncKind::Messages) => Box::new(GmailMessages),
            (Provider::Twitter, SyncKind::Mentions) => Box::new(TwitterMentions),
            (Provider::Twitter, SyncKind::Likes { post_id }) => Box::new(TwitterLikes {
                post_id: post_id.clone(),
            }),
            (Provider::Twitter, SyncKind::Retweets { post_id }) => Box::new(TwitterRetweets {
                post_id: post_id.clone(),
            }),
            (Provider::Twitter, SyncKind::Followers) => Box::new(TwitterFollowers),
            (provider, kind) => {
                return Err(Error::BadRequest(format!(
                    "sync kind {kind:?} is not supported for provider {provider}"
                )))
            }
        };

        debug!(
            account = %account.id,
            provider = %account.provider,
            kind = %fetcher.kind(),
            "Sync started"
        );

        let notifications = fetcher.fetch(self, &account).await?;
        let stored = self.notifications.insert_batch(&notifications)?;

        info!(
            account = %account.id,
            provider = %account.provider,
            kind = %fetcher.kind(),
            fetched = notifications.len(),
            stored,
            "Sync completed"
        );

        Ok(SyncReport {
            notifications,
            stored,
        })
    }
}
