//! Pending-authorization store for the PKCE flow.
//!
//! Binds each one-time state token to the code verifier generated for that
//! connect attempt. Entries are single-use and expire after a TTL so the
//! map cannot grow without bound. The store is passed to the flow
//! controller as an explicit dependency, never process-global state.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Clone, Debug)]
struct PendingAuth {
    verifier: String,
    created_at: DateTime<Utc>,
}

/// State-token → verifier map with automatic expiration.
#[derive(Clone)]
pub struct PendingAuthStore {
    entries: Arc<Mutex<HashMap<String, PendingAuth>>>,
    expiry: Duration,
}

impl PendingAuthStore {
    /// Creates a store whose entries expire after `expiry_seconds`
    /// (600, ten minutes, in production).
    pub fn new(expiry_seconds: i64) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            expiry: Duration::seconds(expiry_seconds),
        }
    }

    /// Stores a verifier under a fresh unguessable state token and returns
    /// the token.
    pub fn create(&self, verifier: &str) -> String {
        let state = Uuid::new_v4().simple().to_string();

        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            state.clone(),
            PendingAuth {
                verifier: verifier.to_string(),
                created_at: Utc::now(),
            },
        );

        state
    }

    /// Consumes a state token, returning its verifier.
    ///
    /// The entry is removed before the expiry check, so a token is
    /// consumable exactly once; a replayed or expired state yields `None`.
    pub fn validate_and_consume(&self, state: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();

        let entry = entries.remove(state)?;

        if Utc::now() - entry.created_at > self.expiry {
            return None;
        }

        Some(entry.verifier)
    }

    /// Prunes expired entries. Call periodically from a collaborator.
    pub fn cleanup_expired(&self) {
        let mut entries = self.entries.lock().unwrap();
        let now = Utc::now();

        entries.retain(|_, entry| now - entry.created_at <= self.expiry);
    }

    /// Number of outstanding flows (for monitoring).
    pub fn count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

impl Default for PendingAuthStore {
    fn default() -> Self {
        Self::new(600)
    }
}
