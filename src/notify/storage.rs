//! Notification storage using SQLite.
//!
//! # Schema
//! ```sql
//! CREATE TABLE notifications (
//!     id TEXT PRIMARY KEY,
//!     user_id TEXT NOT NULL,
//!     account_id TEXT NOT NULL,         -- source linked account
//!     provider TEXT NOT NULL,
//!     kind TEXT NOT NULL,
//!     title TEXT NOT NULL,
//!     content TEXT NOT NULL,
//!     link TEXT NOT NULL,
//!     source_id TEXT NOT NULL,          -- provider-native event key
//!     read INTEGER NOT NULL DEFAULT 0,
//!     created_at TEXT NOT NULL,
//!     UNIQUE(account_id, kind, source_id)
//! );
//! ```
//!
//! The UNIQUE constraint plus `INSERT OR IGNORE` deduplicates repeated
//! syncs: at most one row exists per provider-native event per account.

use super::{NewNotification, Notification, NotificationKind};
use crate::accounts::Provider;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

pub struct NotificationStore {
    conn: Mutex<Connection>,
}

impl NotificationStore {
    /// Creates or opens a notification store.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                link TEXT NOT NULL,
                source_id TEXT NOT NULL,
                read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                UNIQUE(account_id, kind, source_id)
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id);
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Inserts a batch of notifications inside one transaction.
    ///
    /// Events already stored for the same (account, kind, source) are
    /// ignored. An empty batch short-circuits without touching the
    /// database. Returns the number of newly stored rows.
    pub fn insert_batch(&self, batch: &[NewNotification]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        let mut inserted = 0;
        for item in batch {
            inserted += tx.execute(
                r#"
                INSERT OR IGNORE INTO notifications (
                    id, user_id, account_id, provider, kind,
                    title, content, link, source_id, read, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10)
                "#,
                params![
                    Uuid::now_v7().to_string(),
                    item.user_id.to_string(),
                    item.account_id.to_string(),
                    item.provider.as_str(),
                    item.kind.as_str(),
                    item.title,
                    item.content,
                    item.link,
                    item.source_id,
                    now,
                ],
            )?;
        }

        tx.commit()?;

        tracing::debug!(
            batch = batch.len(),
            inserted,
            "Notification batch stored"
        );

        Ok(inserted)
    }

    /// Lists a user's notifications, newest first.
    pub fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, account_id, provider, kind, title, content, link,
                    source_id, read, created_at
             FROM notifications WHERE user_id = ?1 ORDER BY created_at DESC",
        )?;

        let rows = stmt
            .query_map(params![user_id.to_string()], notification_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().collect()
    }

    /// Marks one notification as read.
    ///
    /// The read flag is the only mutable field; nothing else is touched.
    /// Returns false if the id is unknown.
    pub fn mark_read(&self, id: Uuid) -> Result<bool> {
        let updated = self.conn.lock().unwrap().execute(
            "UPDATE notifications SET read = 1 WHERE id = ?1",
            params![id.to_string()],
        )?;

        Ok(updated > 0)
    }
}

fn notification_row(row: &Row<'_>) -> rusqlite::Result<Result<Notification>> {
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let account_id: String = row.get(2)?;
    let provider: String = row.get(3)?;
    let kind: String = row.get(4)?;
    let title: String = row.get(5)?;
    let content: String = row.get(6)?;
    let link: String = row.get(7)?;
    let source_id: String = row.get(8)?;
    let read: bool = row.get(9)?;
    let created_at: String = row.get(10)?;

    Ok(build_notification(
        id, user_id, account_id, provider, kind, title, content, link, source_id, read, created_at,
    ))
}

#[allow(clippy::too_many_arguments)]
fn build_notification(
    id: String,
    user_id: String,
    account_id: String,
    provider: String,
    kind: String,
    title: String,
    content: String,
    link: String,
    source_id: String,
    read: bool,
    created_at: String,
) -> Result<Notification> {
    Ok(Notification {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        account_id: parse_uuid(&account_id)?,
        provider: Provider::from_str(&provider)
            .ok_or_else(|| Error::Store(format!("unknown provider: {provider}")))?,
        kind: NotificationKind::from_str(&kind)
            .ok_or_else(|| Error::Store(format!("unknown notification kind: {kind}")))?,
        title,
        content,
        link,
        source_id,
        read,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::Store(format!("invalid timestamp in store: {e}")))?,
    })
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| Error::Store(format!("invalid uuid in store: {e}")))
}
