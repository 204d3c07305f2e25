//! Mail provider client and fetcher.
//!
//! Lists recent inbox messages and maps each into a direct-message
//! notification deep-linking to the provider's web view.

use super::{with_auth_retry, NotificationFetcher, SyncEngine};
use crate::accounts::{LinkedAccount, Provider};
use crate::error::{Error, Result};
use crate::notify::{NewNotification, NotificationKind};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

/// Messages pulled per sync.
const PAGE_SIZE: u32 = 10;

/// Web view of one message (the notification deep link target).
const MESSAGE_LINK_BASE: &str = "https://mail.google.com/mail/u/0/#inbox";

#[derive(Debug, Deserialize)]
struct MessageListResponse {
    #[serde(default)]
    messages: Option<Vec<MessageRef>>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct MessageDetail {
    id: String,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    payload: Option<MessagePayload>,
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    headers: Vec<MessageHeader>,
}

#[derive(Debug, Deserialize)]
struct MessageHeader {
    name: String,
    value: String,
}

impl MessageDetail {
    fn subject(&self) -> Option<&str> {
        self.payload.as_ref()?.headers.iter().find_map(|h| {
            if h.name.eq_ignore_ascii_case("Subject") {
                Some(h.value.as_str())
            } else {
                None
            }
        })
    }
}

/// HTTP client for the mail provider's message API.
pub struct GmailClient {
    http: Client,
    base_url: String,
    access_token: String,
}

impl GmailClient {
    pub fn new(http: Client, base_url: &str, access_token: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
            access_token: access_token.to_string(),
        }
    }

    /// Lists ids of the most recent messages (bounded page).
    pub async fn list_message_ids(&self, max_results: u32) -> Result<Vec<String>> {
        let url = format!(
            "{}/users/me/messages?maxResults={max_results}",
            self.base_url
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| request_error("list_messages", e))?;

        let response = check_status(response, "list_messages").await?;
        let list: MessageListResponse = response
            .json()
            .await
            .map_err(|e| request_error("list_messages", e))?;

        Ok(list
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| m.id)
            .collect())
    }

    /// Fetches one message's subject header and snippet.
    async fn get_message(&self, id: &str) -> Result<MessageDetail> {
        let url = format!("{}/users/me/messages/{id}", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| request_error("get_message", e))?;

        let response = check_status(response, "get_message").await?;
        response
            .json()
            .await
            .map_err(|e| request_error("get_message", e))
    }
}

fn request_error(operation: &'static str, err: reqwest::Error) -> Error {
    Error::Provider {
        provider: Provider::Gmail,
        operation,
        message: err.to_string(),
    }
}

async fn check_status(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response> {
    match response.status() {
        StatusCode::UNAUTHORIZED => Err(Error::ProviderAuth {
            provider: Provider::Gmail,
        }),
        s if !s.is_success() => {
            let body = response.text().await.unwrap_or_default();
            Err(Error::Provider {
                provider: Provider::Gmail,
                operation,
                message: format!("{s}: {body}"),
            })
        }
        _ => Ok(response),
    }
}

/// Direct-message fetcher for the mail provider.
pub struct GmailMessages;

#[async_trait]
impl NotificationFetcher for GmailMessages {
    fn provider(&self) -> Provider {
        Provider::Gmail
    }

    fn kind(&self) -> NotificationKind {
        NotificationKind::DirectMessage
    }

    async fn fetch(
        &self,
        engine: &SyncEngine,
        account: &LinkedAccount,
    ) -> Result<Vec<NewNotification>> {
        let config = engine.config_for(Provider::Gmail);

        with_auth_retry(&engine.accounts, &engine.http, config, account, |token| async move {
            let client = GmailClient::new(engine.http.clone(), &config.api_base, &token);

            let ids = client.list_message_ids(PAGE_SIZE).await?;
            let mut notifications = Vec::with_capacity(ids.len());

            for id in ids {
                let message = client.get_message(&id).await?;
                notifications.push(NewNotification {
                    user_id: account.user_id,
                    account_id: account.id,
                    provider: Provider::Gmail,
                    kind: NotificationKind::DirectMessage,
                    title: message.subject().unwrap_or("No subject").to_string(),
                    content: message.snippet.clone().unwrap_or_default(),
                    link: format!("{MESSAGE_LINK_BASE}/{}", message.id),
                    source_id: message.id,
                });
            }

            Ok(notifications)
        })
        .await
    }
}
