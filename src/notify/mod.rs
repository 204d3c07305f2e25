//! Normalized notifications surfaced to users.
//!
//! Every provider activity event (a new mail message, a mention, a like)
//! is mapped into one [`Notification`] shape by the sync engine and stored
//! in batches. Rows are immutable once created except for the read flag.

use crate::accounts::Provider;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

mod storage;

pub use storage::NotificationStore;

/// Kind of provider activity (closed set, extensible).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DirectMessage,
    Mention,
    Like,
    Retweet,
    NewFollower,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::DirectMessage => "direct_message",
            NotificationKind::Mention => "mention",
            NotificationKind::Like => "like",
            NotificationKind::Retweet => "retweet",
            NotificationKind::NewFollower => "new_follower",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "direct_message" => Some(NotificationKind::DirectMessage),
            "mention" => Some(NotificationKind::Mention),
            "like" => Some(NotificationKind::Like),
            "retweet" => Some(NotificationKind::Retweet),
            "new_follower" => Some(NotificationKind::NewFollower),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized activity event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Source linked account.
    pub account_id: Uuid,
    pub provider: Provider,
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    /// Deep link back to the provider's UI for this event.
    pub link: String,
    /// Provider-native event key, used for dedup across repeated syncs.
    pub source_id: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// A notification produced by a fetcher, before persistence.
#[derive(Clone, Debug)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub provider: Provider,
    pub kind: NotificationKind,
    pub title: String,
    pub content: String,
    pub link: String,
    pub source_id: String,
}
