//! Microblog provider client and fetchers.
//!
//! One client over the v2 REST surface, four fetchers mapping mentions,
//! likes, retweets, and new followers into normalized notifications.

use super::{with_auth_retry, NotificationFetcher, SyncEngine};
use crate::accounts::{LinkedAccount, Provider};
use crate::error::{Error, Result};
use crate::notify::{NewNotification, NotificationKind};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

/// Items pulled per sync for paged endpoints.
const PAGE_SIZE: u32 = 5;

const STATUS_LINK_BASE: &str = "https://twitter.com/i/web/status";
const PROFILE_LINK_BASE: &str = "https://twitter.com";

#[derive(Debug, Deserialize)]
struct TweetListResponse {
    #[serde(default)]
    data: Vec<Tweet>,
}

#[derive(Debug, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct UserListResponse {
    #[serde(default)]
    data: Vec<TwitterUser>,
}

#[derive(Debug, Deserialize)]
pub struct TwitterUser {
    pub id: String,
    pub username: String,
}

/// HTTP client for the microblog provider's v2 API.
pub struct TwitterClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl TwitterClient {
    pub fn new(http: Client, base_url: &str, access_token: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            access_token: access_token.to_string(),
        }
    }

    /// Recent tweets mentioning the account.
    pub async fn mentions(&self, account_id: &str) -> Result<Vec<Tweet>> {
        let url = format!(
            "{}/users/{account_id}/mentions?max_results={PAGE_SIZE}",
            self.base_url
        );
        let list: TweetListResponse = self.get_json(&url, "list_mentions").await?;
        Ok(list.data)
    }

    /// Users who liked the given post.
    pub async fn liking_users(&self, post_id: &str) -> Result<Vec<TwitterUser>> {
        let url = format!("{}/tweets/{post_id}/liking_users", self.base_url);
        let list: UserListResponse = self.get_json(&url, "list_liking_users").await?;
        Ok(list.data)
    }

    /// Users who retweeted the given post.
    pub async fn retweeted_by(&self, post_id: &str) -> Result<Vec<TwitterUser>> {
        let url = format!("{}/tweets/{post_id}/retweeted_by", self.base_url);
        let list: UserListResponse = self.get_json(&url, "list_retweeters").await?;
        Ok(list.data)
    }

    /// Recent followers of the account.
    pub async fn followers(&self, account_id: &str) -> Result<Vec<TwitterUser>> {
        let url = format!(
            "{}/users/{account_id}/followers?max_results={PAGE_SIZE}",
            self.base_url
        );
        let list: UserListResponse = self.get_json(&url, "list_followers").await?;
        Ok(list.data)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        operation: &'static str,
    ) -> Result<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| request_error(operation, e.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(Error::ProviderAuth {
                provider: Provider::Twitter,
            }),
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                Err(request_error(operation, format!("{s}: {body}")))
            }
            _ => response
                .json()
                .await
                .map_err(|e| request_error(operation, e.to_string())),
        }
    }
}

fn request_error(operation: &'static str, message: String) -> Error {
    Error::Provider {
        provider: Provider::Twitter,
        operation,
        message,
    }
}

fn notification(
    account: &LinkedAccount,
    kind: NotificationKind,
    title: String,
    content: String,
    link: String,
    source_id: String,
) -> NewNotification {
    NewNotification {
        user_id: account.user_id,
        account_id: account.id,
        provider: Provider::Twitter,
        kind,
        title,
        content,
        link,
        source_id,
    }
}

/// Mention fetcher: one notification per tweet mentioning the account.
pub struct TwitterMentions;

#[async_trait]
impl NotificationFetcher for TwitterMentions {
    fn provider(&self) -> Provider {
        Provider::Twitter
    }

    fn kind(&self) -> NotificationKind {
        NotificationKind::Mention
    }

    async fn fetch(
        &self,
        engine: &SyncEngine,
        account: &LinkedAccount,
    ) -> Result<Vec<NewNotification>> {
        let config = engine.config_for(Provider::Twitter);

        with_auth_retry(&engine.accounts, &engine.http, config, account, |token| async move {
            let client = TwitterClient::new(engine.http.clone(), &config.api_base, &token);
            let tweets = client.mentions(&account.account_id).await?;

            Ok(tweets
                .into_iter()
                .map(|tweet| {
                    notification(
                        account,
                        NotificationKind::Mention,
                        "New mention".to_string(),
                        tweet.text,
                        format!("{STATUS_LINK_BASE}/{}", tweet.id),
                        tweet.id,
                    )
                })
                .collect())
        })
        .await
    }
}

/// Like fetcher: one notification per user who liked the post.
///
/// The source id composes post and liker so the same user liking a
/// different post still produces a new notification.
pub struct TwitterLikes {
    pub post_id: String,
}

#[async_trait]
impl NotificationFetcher for TwitterLikes {
    fn provider(&self) -> Provider {
        Provider::Twitter
    }

    fn kind(&self) -> NotificationKind {
        NotificationKind::Like
    }

    async fn fetch(
        &self,
        engine: &SyncEngine,
        account: &LinkedAccount,
    ) -> Result<Vec<NewNotification>> {
        let config = engine.config_for(Provider::Twitter);
        let post_id = self.post_id.as_str();

        with_auth_retry(&engine.accounts, &engine.http, config, account, |token| async move {
            let client = TwitterClient::new(engine.http.clone(), &config.api_base, &token);
            let users = client.liking_users(post_id).await?;

            Ok(users
                .into_iter()
                .map(|user| {
                    notification(
                        account,
                        NotificationKind::Like,
                        format!("New like from @{}", user.username),
                        format!("@{} liked your post.", user.username),
                        format!("{STATUS_LINK_BASE}/{post_id}"),
                        format!("{post_id}:{}", user.id),
                    )
                })
                .collect())
        })
        .await
    }
}

/// Retweet fetcher: one notification per user who retweeted the post.
pub struct TwitterRetweets {
    pub post_id: String,
}

#[async_trait]
impl NotificationFetcher for TwitterRetweets {
    fn provider(&self) -> Provider {
        Provider::Twitter
    }

    fn kind(&self) -> NotificationKind {
        NotificationKind::Retweet
    }

    async fn fetch(
        &self,
        engine: &SyncEngine,
        account: &LinkedAccount,
    ) -> Result<Vec<NewNotification>> {
        let config = engine.config_for(Provider::Twitter);
        let post_id = self.post_id.as_str();

        with_auth_retry(&engine.accounts, &engine.http, config, account, |token| async move {
            let client = TwitterClient::new(engine.http.clone(), &config.api_base, &token);
            let users = client.retweeted_by(post_id).await?;

            Ok(users
                .into_iter()
                .map(|user| {
                    notification(
                        account,
                        NotificationKind::Retweet,
                        format!("New retweet from @{}", user.username),
                        format!("@{} retweeted your post.", user.username),
                        format!("{STATUS_LINK_BASE}/{post_id}"),
                        format!("{post_id}:{}", user.id),
                    )
                })
                .collect())
        })
        .await
    }
}

/// Follower fetcher: one notification per recent follower.
pub struct TwitterFollowers;

#[async_trait]
impl NotificationFetcher for TwitterFollowers {
    fn provider(&self) -> Provider {
        Provider::Twitter
    }

    fn kind(&self) -> NotificationKind {
        NotificationKind::NewFollower
    }

    async fn fetch(
        &self,
        engine: &SyncEngine,
        account: &LinkedAccount,
    ) -> Result<Vec<NewNotification>> {
        let config = engine.config_for(Provider::Twitter);

        with_auth_retry(&engine.accounts, &engine.http, config, account, |token| async move {
            let client = TwitterClient::new(engine.http.clone(), &config.api_base, &token);
            let users = client.followers(&account.account_id).await?;

            Ok(users
                .into_iter()
                .map(|user| {
                    notification(
                        account,
                        NotificationKind::NewFollower,
                        "New follower".to_string(),
                        format!("@{} followed you.", user.username),
                        format!("{PROFILE_LINK_BASE}/{}", user.username),
                        user.id,
                    )
                })
                .collect())
        })
        .await
    }
}
