//! SQLite storage for subscribers and the alert log.

use crate::config::{AlertLogEntry, MAX_ALERTS_PER_KEY};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;
use walletwatch_core::{
    normalize_wallets, ChatSubscriber, DeviceSubscriber, FilterConfig, SubscriberSnapshot,
    WalletAddress,
};
use walletwatch_engine::{StoreError, SubscriberStore};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid wallet address: {0:?}")]
    InvalidWallet(String),
}

/// Database connection for subscribers and alerts.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

/// Wallet lists are stored as a JSON array of strings; anything else reads as empty.
fn decode_wallets(raw: &str) -> Vec<WalletAddress> {
    let items: Vec<String> = serde_json::from_str(raw).unwrap_or_default();
    normalize_wallets(items)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Database {
    /// Connect to SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        // Each in-memory connection is its own database, so keep exactly one alive.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_subscribers (
                chat_id TEXT PRIMARY KEY,
                wallets TEXT NOT NULL DEFAULT '[]',
                filter_json TEXT NOT NULL DEFAULT '{}',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS device_subscribers (
                token TEXT PRIMARY KEY,
                wallet TEXT NOT NULL,
                filter_json TEXT NOT NULL DEFAULT '{}',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS alert_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL,
                message TEXT NOT NULL,
                time_ms INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_alert_log_key ON alert_log(key, time_ms)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Chats
    // ------------------------------------------------------------------

    /// Get or create the record for a chat.
    pub async fn get_or_create_chat(&self, chat_id: &str) -> Result<ChatSubscriber, DbError> {
        sqlx::query("INSERT OR IGNORE INTO chat_subscribers (chat_id) VALUES (?)")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;

        let (wallets_json, filter_json) = sqlx::query_as::<_, (String, String)>(
            "SELECT wallets, filter_json FROM chat_subscribers WHERE chat_id = ?",
        )
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(ChatSubscriber::new(chat_id, decode_wallets(&wallets_json))
            .with_filter(FilterConfig::from_json_lenient(&filter_json)))
    }

    /// Wallets followed by a chat. Unknown chats follow nothing.
    pub async fn list_wallets(&self, chat_id: &str) -> Result<Vec<WalletAddress>, DbError> {
        let row = sqlx::query_scalar::<_, String>(
            "SELECT wallets FROM chat_subscribers WHERE chat_id = ?",
        )
        .bind(chat_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|raw| decode_wallets(&raw)).unwrap_or_default())
    }

    /// Replace a chat's wallets. Entries are trimmed, blanks and duplicates dropped.
    pub async fn set_wallets<I, S>(
        &self,
        chat_id: &str,
        wallets: I,
    ) -> Result<Vec<WalletAddress>, DbError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let wallets = normalize_wallets(wallets);
        let wallets_json = serde_json::to_string(&wallets)?;

        sqlx::query(
            r#"
            INSERT INTO chat_subscribers (chat_id, wallets) VALUES (?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET wallets = excluded.wallets
            "#,
        )
        .bind(chat_id)
        .bind(&wallets_json)
        .execute(&self.pool)
        .await?;

        Ok(wallets)
    }

    /// Add a wallet to a chat. Adding a followed wallet again is a no-op.
    pub async fn add_wallet(
        &self,
        chat_id: &str,
        wallet: &str,
    ) -> Result<Vec<WalletAddress>, DbError> {
        let wallet =
            WalletAddress::parse(wallet).ok_or_else(|| DbError::InvalidWallet(wallet.to_string()))?;

        let mut wallets = self.list_wallets(chat_id).await?;
        if !wallets.contains(&wallet) {
            wallets.push(wallet);
        }
        self.set_wallets(chat_id, &wallets).await
    }

    /// Remove a wallet from a chat. Returns the remaining wallets.
    pub async fn remove_wallet(
        &self,
        chat_id: &str,
        wallet: &str,
    ) -> Result<Vec<WalletAddress>, DbError> {
        let target = wallet.trim();
        let wallets: Vec<WalletAddress> = self
            .list_wallets(chat_id)
            .await?
            .into_iter()
            .filter(|w| w.as_str() != target)
            .collect();
        self.set_wallets(chat_id, &wallets).await
    }

    /// Update a chat's filter.
    pub async fn set_chat_filter(&self, chat_id: &str, filter: &FilterConfig) -> Result<(), DbError> {
        let filter_json = serde_json::to_string(filter)?;

        sqlx::query(
            r#"
            INSERT INTO chat_subscribers (chat_id, filter_json) VALUES (?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET filter_json = excluded.filter_json
            "#,
        )
        .bind(chat_id)
        .bind(&filter_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Devices
    // ------------------------------------------------------------------

    /// Register a device or move it to another wallet/filter.
    pub async fn upsert_device(
        &self,
        token: &str,
        wallet: &str,
        filter: &FilterConfig,
    ) -> Result<DeviceSubscriber, DbError> {
        let wallet =
            WalletAddress::parse(wallet).ok_or_else(|| DbError::InvalidWallet(wallet.to_string()))?;
        let filter_json = serde_json::to_string(filter)?;

        sqlx::query(
            r#"
            INSERT INTO device_subscribers (token, wallet, filter_json) VALUES (?, ?, ?)
            ON CONFLICT(token) DO UPDATE SET wallet = excluded.wallet, filter_json = excluded.filter_json
            "#,
        )
        .bind(token)
        .bind(wallet.as_str())
        .bind(&filter_json)
        .execute(&self.pool)
        .await?;

        Ok(DeviceSubscriber::new(token, wallet).with_filter(filter.clone()))
    }

    /// Unregister a device. Returns whether it existed.
    pub async fn remove_device(&self, token: &str) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM device_subscribers WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Snapshot
    // ------------------------------------------------------------------

    /// All chats and devices. Malformed rows are normalized, never rejected.
    pub async fn snapshot(&self) -> Result<SubscriberSnapshot, DbError> {
        let chat_rows = sqlx::query_as::<_, (String, String, String)>(
            "SELECT chat_id, wallets, filter_json FROM chat_subscribers ORDER BY created_at, chat_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let chats = chat_rows
            .into_iter()
            .map(|(chat_id, wallets_json, filter_json)| {
                ChatSubscriber::new(chat_id, decode_wallets(&wallets_json))
                    .with_filter(FilterConfig::from_json_lenient(&filter_json))
            })
            .collect();

        let device_rows = sqlx::query_as::<_, (String, String, String)>(
            "SELECT token, wallet, filter_json FROM device_subscribers ORDER BY created_at, token",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut devices = Vec::with_capacity(device_rows.len());
        for (token, wallet, filter_json) in device_rows {
            match WalletAddress::parse(&wallet) {
                Some(wallet) => devices.push(
                    DeviceSubscriber::new(token, wallet)
                        .with_filter(FilterConfig::from_json_lenient(&filter_json)),
                ),
                None => debug!(token = %token, "Skipping device with blank wallet"),
            }
        }

        Ok(SubscriberSnapshot { chats, devices })
    }

    // ------------------------------------------------------------------
    // Alert log
    // ------------------------------------------------------------------

    /// Append an alert under `key`, keeping only the most recent entries.
    pub async fn append_alert(&self, key: &str, message: &str) -> Result<(), DbError> {
        self.append_alert_at(key, message, now_ms()).await
    }

    /// Append an alert with an explicit timestamp.
    pub async fn append_alert_at(
        &self,
        key: &str,
        message: &str,
        time_ms: i64,
    ) -> Result<(), DbError> {
        sqlx::query("INSERT INTO alert_log (key, message, time_ms) VALUES (?, ?, ?)")
            .bind(key)
            .bind(message)
            .bind(time_ms)
            .execute(&self.pool)
            .await?;

        let pruned = sqlx::query(
            r#"
            DELETE FROM alert_log
            WHERE key = ? AND id NOT IN (
                SELECT id FROM alert_log WHERE key = ?
                ORDER BY time_ms DESC, id DESC
                LIMIT ?
            )
            "#,
        )
        .bind(key)
        .bind(key)
        .bind(MAX_ALERTS_PER_KEY)
        .execute(&self.pool)
        .await?;

        if pruned.rows_affected() > 0 {
            debug!(key = %key, pruned = pruned.rows_affected(), "Pruned alert log");
        }
        Ok(())
    }

    /// Alerts stored under `key`, oldest first.
    pub async fn recent_alerts(&self, key: &str) -> Result<Vec<AlertLogEntry>, DbError> {
        let rows = sqlx::query_as::<_, (i64, String)>(
            "SELECT time_ms, message FROM alert_log WHERE key = ? ORDER BY time_ms ASC, id ASC",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(time_ms, message)| AlertLogEntry { time_ms, message })
            .collect())
    }

    /// Newest alert stored under `key`.
    pub async fn latest_alert(&self, key: &str) -> Result<Option<AlertLogEntry>, DbError> {
        let row = sqlx::query_as::<_, (i64, String)>(
            "SELECT time_ms, message FROM alert_log WHERE key = ? ORDER BY time_ms DESC, id DESC LIMIT 1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(time_ms, message)| AlertLogEntry { time_ms, message }))
    }
}

#[async_trait]
impl SubscriberStore for Database {
    async fn load_subscribers(&self) -> Result<SubscriberSnapshot, StoreError> {
        self.snapshot().await.map_err(|e| match e {
            DbError::Sqlx(sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut) => {
                StoreError::Unavailable(e.to_string())
            }
            other => StoreError::Query(other.to_string()),
        })
    }
}
