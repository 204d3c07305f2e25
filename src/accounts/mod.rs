//! Linked provider accounts and the users that own them.
//!
//! A [`LinkedAccount`] is one authorized connection between a user and an
//! external provider account. OAuth tokens are encrypted at rest with
//! AES-256-GCM and stored in SQLite; the (user, provider, external account)
//! triple is unique.
//!
//! # Usage
//!
//! ```no_run
//! use pulse::accounts::{AccountStore, NewLinkedAccount, Plan, Provider};
//!
//! # fn main() -> pulse::Result<()> {
//! let encryption_key = std::env::var("PULSE_ENCRYPTION_KEY")
//!     .map_err(|e| pulse::Error::Store(e.to_string()))?;
//! let store = AccountStore::new("pulse.db", &encryption_key)?;
//!
//! let user = store.create_user("Alice", "alice@example.com", Plan::Free)?;
//!
//! // Created through the atomic admission gate: user exists, no duplicate
//! // triple, plan limit not exceeded, all checked in one transaction.
//! let account = store.create(NewLinkedAccount {
//!     user_id: user.id,
//!     provider: Provider::Gmail,
//!     account_id: "109284".to_string(),
//!     email: Some("alice@gmail.com".to_string()),
//!     username: None,
//!     access_token: "ya29.a0...".to_string(),
//!     refresh_token: Some("1//0g...".to_string()),
//!     scopes: vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()],
//! })?;
//! println!("linked {}", account.id);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod admission;
mod encryption;
mod storage;

pub use storage::AccountStore;

/// Supported external providers (closed set).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Mail provider (direct-message notifications).
    Gmail,
    /// Microblogging provider (mentions, likes, retweets, followers).
    Twitter,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gmail => "gmail",
            Provider::Twitter => "twitter",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "gmail" => Some(Provider::Gmail),
            "twitter" => Some(Provider::Twitter),
            _ => None,
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription plan tier (closed set).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Free,
    Pro,
    Premium,
}

impl Plan {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Free => "free",
            Plan::Pro => "pro",
            Plan::Premium => "premium",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Plan::Free),
            "pro" => Some(Plan::Pro),
            "premium" => Some(Plan::Premium),
            _ => None,
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered user.
///
/// Created by the external sign-up collaborator; the core only reads the
/// plan tier for admission checks. The user's linked-account set is the
/// `linked_accounts` table keyed on `user_id`, so appending to it is the
/// same write as creating the account.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub plan: Plan,
    pub created_at: DateTime<Utc>,
}

/// One authorized connection between a user and a provider account.
///
/// Token fields are the only fields mutated after creation (by the token
/// refresh manager). Tokens are encrypted at rest; this in-memory form
/// holds them decrypted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkedAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: Provider,
    /// Provider-assigned stable account identifier.
    pub account_id: String,
    /// Primary email for mail accounts.
    pub email: Option<String>,
    /// Handle for microblog accounts.
    pub username: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a linked account through the admission gate.
#[derive(Clone, Debug)]
pub struct NewLinkedAccount {
    pub user_id: Uuid,
    pub provider: Provider,
    pub account_id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scopes: Vec<String>,
}
