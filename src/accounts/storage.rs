//! Encrypted account storage using SQLite.
//!
//! Holds users and their linked provider accounts. OAuth tokens are
//! encrypted at rest with AES-256-GCM.
//!
//! # Schema
//! ```sql
//! CREATE TABLE users (
//!     id TEXT PRIMARY KEY,
//!     name TEXT NOT NULL,
//!     email TEXT NOT NULL UNIQUE,
//!     plan TEXT NOT NULL,               -- free | pro | premium
//!     created_at TEXT NOT NULL          -- ISO 8601 timestamp
//! );
//! CREATE TABLE linked_accounts (
//!     id TEXT PRIMARY KEY,
//!     user_id TEXT NOT NULL,
//!     provider TEXT NOT NULL,           -- gmail | twitter
//!     account_id TEXT NOT NULL,         -- provider-assigned id
//!     email TEXT,
//!     username TEXT,
//!     access_token TEXT NOT NULL,       -- Encrypted
//!     access_token_nonce TEXT NOT NULL,
//!     refresh_token TEXT,               -- Encrypted (optional)
//!     refresh_token_nonce TEXT,
//!     scopes TEXT NOT NULL,             -- JSON array
//!     created_at TEXT NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     UNIQUE(user_id, provider, account_id)
//! );
//! ```
//!
//! # Concurrency
//! - Connection is wrapped in a Mutex; SQLite runs in serialized mode
//! - The admission sequence (user exists, duplicate triple, plan limit,
//!   insert) executes inside one transaction, so two concurrent connect
//!   attempts cannot both pass the limit check and insert
//! - Token updates are single-row writes; readers never observe a
//!   half-written access/refresh pair

use super::{admission, encryption, LinkedAccount, NewLinkedAccount, Plan, Provider, User};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

pub struct AccountStore {
    conn: Mutex<Connection>,
    encryption_key: Vec<u8>,
}

impl AccountStore {
    /// Creates or opens an account store.
    ///
    /// `encryption_key` is the base64-encoded 32-byte master key.
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let key_bytes = encryption::validate_key(encryption_key)?;

        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                plan TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS linked_accounts (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                account_id TEXT NOT NULL,
                email TEXT,
                username TEXT,
                access_token TEXT NOT NULL,
                access_token_nonce TEXT NOT NULL,
                refresh_token TEXT,
                refresh_token_nonce TEXT,
                scopes TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(user_id, provider, account_id)
            );
            CREATE INDEX IF NOT EXISTS idx_accounts_user ON linked_accounts(user_id);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            encryption_key: key_bytes,
        })
    }

    /// Creates a user record.
    ///
    /// Sign-up itself is an external collaborator concern; this exists so
    /// collaborators and tests can seed users the core operates on.
    pub fn create_user(&self, name: &str, email: &str, plan: Plan) -> Result<User> {
        let user = User {
            id: Uuid::now_v7(),
            name: name.to_string(),
            email: email.to_string(),
            plan,
            created_at: Utc::now(),
        };

        self.conn.lock().unwrap().execute(
            "INSERT INTO users (id, name, email, plan, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id.to_string(),
                user.name,
                user.email,
                user.plan.as_str(),
                user.created_at.to_rfc3339(),
            ],
        )?;

        Ok(user)
    }

    /// Retrieves a user by id.
    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, name, email, plan, created_at FROM users WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, name, email, plan, created_at)| {
            Ok(User {
                id: parse_uuid(&id)?,
                name,
                email,
                plan: Plan::from_str(&plan)
                    .ok_or_else(|| Error::Store(format!("unknown plan tier: {plan}")))?,
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .transpose()
    }

    /// Creates a linked account through the admission gate.
    ///
    /// The whole sequence runs in one transaction: the user must exist, the
    /// (user, provider, account) triple must not already be linked, and the
    /// user's plan limit must not be reached. On any failure nothing is
    /// persisted. The UNIQUE constraint backstops duplicate races that the
    /// explicit check cannot see.
    pub fn create(&self, new: NewLinkedAccount) -> Result<LinkedAccount> {
        let (access_token_enc, access_token_nonce) =
            encryption::encrypt(&new.access_token, &self.encryption_key)?;

        let (refresh_token_enc, refresh_token_nonce) = match &new.refresh_token {
            Some(token) => {
                let (enc, nonce) = encryption::encrypt(token, &self.encryption_key)?;
                (Some(enc), Some(nonce))
            }
            None => (None, None),
        };

        let scopes_json = serde_json::to_string(&new.scopes)
            .map_err(|e| Error::Store(format!("failed to encode scopes: {e}")))?;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let plan: Option<String> = tx
            .query_row(
                "SELECT plan FROM users WHERE id = ?1",
                params![new.user_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let plan = plan
            .and_then(|p| Plan::from_str(&p))
            .ok_or(Error::UserNotFound)?;

        let duplicates: usize = tx.query_row(
            "SELECT COUNT(*) FROM linked_accounts
             WHERE user_id = ?1 AND provider = ?2 AND account_id = ?3",
            params![
                new.user_id.to_string(),
                new.provider.as_str(),
                new.account_id
            ],
            |row| row.get(0),
        )?;
        if duplicates > 0 {
            return Err(Error::DuplicateAccount {
                provider: new.provider,
            });
        }

        let current_count: usize = tx.query_row(
            "SELECT COUNT(*) FROM linked_accounts WHERE user_id = ?1",
            params![new.user_id.to_string()],
            |row| row.get(0),
        )?;
        admission::check(plan, current_count)?;

        let now = Utc::now();
        let account = LinkedAccount {
            id: Uuid::now_v7(),
            user_id: new.user_id,
            provider: new.provider,
            account_id: new.account_id,
            email: new.email,
            username: new.username,
            access_token: new.access_token,
            refresh_token: new.refresh_token,
            scopes: new.scopes,
            created_at: now,
            updated_at: now,
        };

        tx.execute(
            r#"
            INSERT INTO linked_accounts (
                id, user_id, provider, account_id, email, username,
                access_token, access_token_nonce,
                refresh_token, refresh_token_nonce,
                scopes, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                account.id.to_string(),
                account.user_id.to_string(),
                account.provider.as_str(),
                account.account_id,
                account.email,
                account.username,
                access_token_enc,
                access_token_nonce,
                refresh_token_enc,
                refresh_token_nonce,
                scopes_json,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        tx.commit()?;

        tracing::info!(
            user_id = %account.user_id,
            provider = %account.provider,
            account_id = %account.account_id,
            "Linked account created"
        );

        Ok(account)
    }

    /// Retrieves a linked account by id, with tokens decrypted.
    pub fn get(&self, id: Uuid) -> Result<Option<LinkedAccount>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!("{SELECT_ACCOUNT} WHERE id = ?1"),
                params![id.to_string()],
                raw_account_row,
            )
            .optional()?;

        row.map(|raw| self.decode_account(raw)).transpose()
    }

    /// Looks up a linked account by its unique triple.
    pub fn find(
        &self,
        user_id: Uuid,
        provider: Provider,
        account_id: &str,
    ) -> Result<Option<LinkedAccount>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!(
                    "{SELECT_ACCOUNT} WHERE user_id = ?1 AND provider = ?2 AND account_id = ?3"
                ),
                params![user_id.to_string(), provider.as_str(), account_id],
                raw_account_row,
            )
            .optional()?;

        row.map(|raw| self.decode_account(raw)).transpose()
    }

    /// Lists a user's linked accounts (their integration set).
    pub fn list_by_user(&self, user_id: Uuid) -> Result<Vec<LinkedAccount>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare(&format!("{SELECT_ACCOUNT} WHERE user_id = ?1 ORDER BY created_at"))?;

        let raw_rows = stmt
            .query_map(params![user_id.to_string()], raw_account_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raw_rows
            .into_iter()
            .map(|raw| self.decode_account(raw))
            .collect()
    }

    /// Number of linked accounts a user currently has.
    pub fn count_for_user(&self, user_id: Uuid) -> Result<usize> {
        let count = self.conn.lock().unwrap().query_row(
            "SELECT COUNT(*) FROM linked_accounts WHERE user_id = ?1",
            params![user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Replaces the stored token pair after a refresh.
    ///
    /// The refresh token is only replaced when the provider reissued one;
    /// `None` keeps the existing value. The whole update is a single row
    /// write, so a concurrent reader sees either the old pair or the new
    /// one, never a mix.
    pub fn update_tokens(
        &self,
        id: Uuid,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<()> {
        let (access_enc, access_nonce) = encryption::encrypt(access_token, &self.encryption_key)?;
        let now = Utc::now().to_rfc3339();

        let updated = match refresh_token {
            Some(token) => {
                let (refresh_enc, refresh_nonce) =
                    encryption::encrypt(token, &self.encryption_key)?;
                self.conn.lock().unwrap().execute(
                    "UPDATE linked_accounts
                     SET access_token = ?1, access_token_nonce = ?2,
                         refresh_token = ?3, refresh_token_nonce = ?4,
                         updated_at = ?5
                     WHERE id = ?6",
                    params![access_enc, access_nonce, refresh_enc, refresh_nonce, now, id.to_string()],
                )?
            }
            None => self.conn.lock().unwrap().execute(
                "UPDATE linked_accounts
                 SET access_token = ?1, access_token_nonce = ?2, updated_at = ?3
                 WHERE id = ?4",
                params![access_enc, access_nonce, now, id.to_string()],
            )?,
        };

        if updated == 0 {
            return Err(Error::IntegrationNotFound);
        }

        tracing::debug!(account = %id, reissued_refresh = refresh_token.is_some(), "Tokens updated");
        Ok(())
    }

    fn decode_account(&self, raw: RawAccount) -> Result<LinkedAccount> {
        let access_token =
            encryption::decrypt(&raw.access_token, &raw.access_token_nonce, &self.encryption_key)?;

        let refresh_token = match (raw.refresh_token, raw.refresh_token_nonce) {
            (Some(enc), Some(nonce)) => {
                Some(encryption::decrypt(&enc, &nonce, &self.encryption_key)?)
            }
            _ => None,
        };

        let scopes: Vec<String> = serde_json::from_str(&raw.scopes)
            .map_err(|e| Error::Store(format!("failed to decode scopes: {e}")))?;

        Ok(LinkedAccount {
            id: parse_uuid(&raw.id)?,
            user_id: parse_uuid(&raw.user_id)?,
            provider: Provider::from_str(&raw.provider)
                .ok_or_else(|| Error::Store(format!("unknown provider: {}", raw.provider)))?,
            account_id: raw.account_id,
            email: raw.email,
            username: raw.username,
            access_token,
            refresh_token,
            scopes,
            created_at: parse_timestamp(&raw.created_at)?,
            updated_at: parse_timestamp(&raw.updated_at)?,
        })
    }
}

const SELECT_ACCOUNT: &str = "SELECT id, user_id, provider, account_id, email, username, \
     access_token, access_token_nonce, refresh_token, refresh_token_nonce, \
     scopes, created_at, updated_at FROM linked_accounts";

/// Column values before decryption/parsing.
struct RawAccount {
    id: String,
    user_id: String,
    provider: String,
    account_id: String,
    email: Option<String>,
    username: Option<String>,
    access_token: String,
    access_token_nonce: String,
    refresh_token: Option<String>,
    refresh_token_nonce: Option<String>,
    scopes: String,
    created_at: String,
    updated_at: String,
}

fn raw_account_row(row: &Row<'_>) -> rusqlite::Result<RawAccount> {
    Ok(RawAccount {
        id: row.get(0)?,
        user_id: row.get(1)?,
        provider: row.get(2)?,
        account_id: row.get(3)?,
        email: row.get(4)?,
        username: row.get(5)?,
        access_token: row.get(6)?,
        access_token_nonce: row.get(7)?,
        refresh_token: row.get(8)?,
        refresh_token_nonce: row.get(9)?,
        scopes: row.get(10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Store(format!("invalid uuid in store: {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Store(format!("invalid timestamp in store: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    fn create_test_store() -> AccountStore {
        let key = BASE64.encode([0u8; 32]);
        AccountStore::new(":memory:", &key).expect("failed to create test store")
    }

    fn new_account(user_id: Uuid, provider: Provider, account_id: &str) -> NewLinkedAccount {
        NewLinkedAccount {
            user_id,
            provider,
            account_id: account_id.to_string(),
            email: Some("alice@example.com".to_string()),
            username: None,
            access_token: "access-token-12345".to_string(),
            refresh_token: Some("refresh-token-67890".to_string()),
            scopes: vec!["read".to_string()],
        }
    }

    #[test]
    fn test_create_and_get() {
        let store = create_test_store();
        let user = store.create_user("Alice", "alice@example.com", Plan::Free).unwrap();

        let created = store
            .create(new_account(user.id, Provider::Gmail, "g-1"))
            .unwrap();

        let fetched = store.get(created.id).unwrap().expect("account not found");
        assert_eq!(fetched.user_id, user.id);
        assert_eq!(fetched.provider, Provider::Gmail);
        assert_eq!(fetched.access_token, "access-token-12345");
        assert_eq!(fetched.refresh_token.as_deref(), Some("refresh-token-67890"));
        assert_eq!(fetched.scopes, vec!["read".to_string()]);
    }

    #[test]
    fn test_create_unknown_user_rejected() {
        let store = create_test_store();

        let err = store
            .create(new_account(Uuid::now_v7(), Provider::Gmail, "g-1"))
            .unwrap_err();
        assert!(matches!(err, Error::UserNotFound));
    }

    #[test]
    fn test_duplicate_triple_rejected() {
        let store = create_test_store();
        let user = store.create_user("Alice", "alice@example.com", Plan::Free).unwrap();

        store.create(new_account(user.id, Provider::Twitter, "t-9")).unwrap();

        let err = store
            .create(new_account(user.id, Provider::Twitter, "t-9"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateAccount { provider: Provider::Twitter }));

        // The existing record is unchanged and still the only one
        assert_eq!(store.count_for_user(user.id).unwrap(), 1);

        // Same external id under the other provider is a different triple
        assert!(store.create(new_account(user.id, Provider::Gmail, "t-9")).is_ok());
    }

    #[test]
    fn test_plan_limit_enforced() {
        let store = create_test_store();
        let user = store.create_user("Alice", "alice@example.com", Plan::Free).unwrap();

        for i in 0..3 {
            store
                .create(new_account(user.id, Provider::Gmail, &format!("g-{i}")))
                .unwrap();
        }

        let err = store
            .create(new_account(user.id, Provider::Gmail, "g-overflow"))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::PlanLimitExceeded { plan: Plan::Free, limit: 3 }
        ));
        assert_eq!(store.count_for_user(user.id).unwrap(), 3);
    }

    #[test]
    fn test_find_by_triple() {
        let store = create_test_store();
        let user = store.create_user("Bob", "bob@example.com", Plan::Pro).unwrap();

        store.create(new_account(user.id, Provider::Twitter, "t-1")).unwrap();

        let found = store.find(user.id, Provider::Twitter, "t-1").unwrap();
        assert!(found.is_some());

        let missing = store.find(user.id, Provider::Twitter, "t-2").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_update_tokens() {
        let store = create_test_store();
        let user = store.create_user("Alice", "alice@example.com", Plan::Free).unwrap();
        let account = store
            .create(new_account(user.id, Provider::Twitter, "t-1"))
            .unwrap();

        // Refresh without a reissued refresh token keeps the old one
        store.update_tokens(account.id, "new-access", None).unwrap();
        let fetched = store.get(account.id).unwrap().unwrap();
        assert_eq!(fetched.access_token, "new-access");
        assert_eq!(fetched.refresh_token.as_deref(), Some("refresh-token-67890"));

        // Reissued refresh token replaces it
        store
            .update_tokens(account.id, "newer-access", Some("new-refresh"))
            .unwrap();
        let fetched = store.get(account.id).unwrap().unwrap();
        assert_eq!(fetched.access_token, "newer-access");
        assert_eq!(fetched.refresh_token.as_deref(), Some("new-refresh"));
    }

    #[test]
    fn test_update_tokens_unknown_account() {
        let store = create_test_store();
        let err = store.update_tokens(Uuid::now_v7(), "token", None).unwrap_err();
        assert!(matches!(err, Error::IntegrationNotFound));
    }

    #[test]
    fn test_list_by_user() {
        let store = create_test_store();
        let alice = store.create_user("Alice", "alice@example.com", Plan::Pro).unwrap();
        let bob = store.create_user("Bob", "bob@example.com", Plan::Free).unwrap();

        store.create(new_account(alice.id, Provider::Gmail, "g-1")).unwrap();
        store.create(new_account(alice.id, Provider::Twitter, "t-1")).unwrap();
        store.create(new_account(bob.id, Provider::Gmail, "g-2")).unwrap();

        let accounts = store.list_by_user(alice.id).unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts.iter().all(|a| a.user_id == alice.id));

        assert_eq!(store.list_by_user(bob.id).unwrap().len(), 1);
    }

    #[test]
    fn test_persists_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("accounts.db");
        let key = BASE64.encode([7u8; 32]);

        let user_id = {
            let store = AccountStore::new(&db_path, &key).unwrap();
            let user = store.create_user("Alice", "alice@example.com", Plan::Free).unwrap();
            store.create(new_account(user.id, Provider::Gmail, "g-1")).unwrap();
            user.id
        };

        let reopened = AccountStore::new(&db_path, &key).unwrap();
        let accounts = reopened.list_by_user(user_id).unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].access_token, "access-token-12345");
    }

    #[test]
    fn test_invalid_encryption_key() {
        assert!(AccountStore::new(":memory:", "short").is_err());
        assert!(AccountStore::new(":memory:", "not-valid-base64!@#$").is_err());
    }
}
