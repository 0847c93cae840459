//! SQLite implementation of the core repository ports.
//!
//! One file on disk, one connection per call, blocking work moved off the
//! async executor. Records with lifecycle semantics carry an `expires_at`
//! column (epoch millis) filtered on read and cleared lazily; counter
//! updates are single UPSERT statements so concurrent deliveries can never
//! lose an increment.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::task;

use warden_core::{
    domain::{ChatId, UserId},
    errors::Error,
    polls::Poll,
    settings::{
        GroupSettings, GroupSettingsPatch, VerificationSettings, VerificationSettingsPatch,
    },
    storage::{
        ActivityLog, FlaggedMessage, GroupStats, PollStore, SettingsStore, VerificationStore,
        WarningLedger,
    },
    verification::Challenge,
    warnings::WarningEntry,
    Result,
};

const WARNING_LOG_CAP: i64 = 20;
const FLAGGED_LOG_CAP: i64 = 100;

#[derive(Clone, Debug)]
pub struct SqliteStore {
    db_path: String,
}

impl SqliteStore {
    /// Open (creating if needed) the database and apply the schema.
    pub fn open(db_path: impl Into<String>) -> Result<Self> {
        let db_path = db_path.into();
        let conn = Connection::open(&db_path).map_err(storage_err)?;
        init_db(&conn)?;
        Ok(Self { db_path })
    }

    /// Run sqlite work off the async executor (connections are not Sync).
    async fn call<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Connection) -> Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        task::spawn_blocking(move || {
            let conn = Connection::open(db_path).map_err(storage_err)?;
            f(conn)
        })
        .await
        .map_err(|e| Error::Storage(format!("sqlite task join failed: {e}")))?
    }
}

fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS group_settings (
  chat_id INTEGER PRIMARY KEY,
  settings TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS verification_settings (
  chat_id INTEGER PRIMARY KEY,
  settings TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS warnings (
  chat_id INTEGER NOT NULL,
  user_id INTEGER NOT NULL,
  count INTEGER NOT NULL,
  expires_at INTEGER NOT NULL,
  PRIMARY KEY (chat_id, user_id)
);

CREATE TABLE IF NOT EXISTS warning_log (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  chat_id INTEGER NOT NULL,
  user_id INTEGER NOT NULL,
  warning_number INTEGER NOT NULL,
  reason TEXT NOT NULL,
  created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS challenges (
  chat_id INTEGER NOT NULL,
  user_id INTEGER NOT NULL,
  data TEXT NOT NULL,
  expires_at INTEGER NOT NULL,
  PRIMARY KEY (chat_id, user_id)
);

CREATE TABLE IF NOT EXISTS polls (
  id TEXT PRIMARY KEY,
  data TEXT NOT NULL,
  expires_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS group_stats (
  chat_id INTEGER PRIMARY KEY,
  joins INTEGER NOT NULL DEFAULT 0,
  leaves INTEGER NOT NULL DEFAULT 0,
  messages INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS members (
  chat_id INTEGER NOT NULL,
  user_id INTEGER NOT NULL,
  joined_at INTEGER,
  message_count INTEGER NOT NULL DEFAULT 0,
  last_activity INTEGER,
  PRIMARY KEY (chat_id, user_id)
);

CREATE TABLE IF NOT EXISTS recent_messages (
  chat_id INTEGER NOT NULL,
  user_id INTEGER NOT NULL,
  messages TEXT NOT NULL,
  expires_at INTEGER NOT NULL,
  PRIMARY KEY (chat_id, user_id)
);

CREATE TABLE IF NOT EXISTS flagged_messages (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  chat_id INTEGER NOT NULL,
  data TEXT NOT NULL,
  created_at INTEGER NOT NULL
);
"#,
    )
    .map_err(storage_err)
}

fn storage_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn millis_to_utc(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

#[async_trait]
impl SettingsStore for SqliteStore {
    async fn settings(&self, chat_id: ChatId) -> Result<GroupSettings> {
        self.call(move |conn| {
            let stored: Option<String> = conn
                .query_row(
                    "SELECT settings FROM group_settings WHERE chat_id = ?1",
                    params![chat_id.0],
                    |r| r.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            match stored {
                Some(json) => Ok(serde_json::from_str(&json)?),
                None => Ok(GroupSettings::default()),
            }
        })
        .await
    }

    async fn update_settings(
        &self,
        chat_id: ChatId,
        patch: GroupSettingsPatch,
    ) -> Result<GroupSettings> {
        self.call(move |conn| {
            let stored: Option<String> = conn
                .query_row(
                    "SELECT settings FROM group_settings WHERE chat_id = ?1",
                    params![chat_id.0],
                    |r| r.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            let current: GroupSettings = match stored {
                Some(json) => serde_json::from_str(&json)?,
                None => GroupSettings::default(),
            };
            let merged = current.merged(patch);
            conn.execute(
                "INSERT INTO group_settings(chat_id, settings) VALUES(?1, ?2)
                 ON CONFLICT(chat_id) DO UPDATE SET settings = excluded.settings",
                params![chat_id.0, serde_json::to_string(&merged)?],
            )
            .map_err(storage_err)?;
            Ok(merged)
        })
        .await
    }

    async fn verification_settings(&self, chat_id: ChatId) -> Result<VerificationSettings> {
        self.call(move |conn| {
            let stored: Option<String> = conn
                .query_row(
                    "SELECT settings FROM verification_settings WHERE chat_id = ?1",
                    params![chat_id.0],
                    |r| r.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            match stored {
                Some(json) => Ok(serde_json::from_str(&json)?),
                None => Ok(VerificationSettings::default()),
            }
        })
        .await
    }

    async fn update_verification_settings(
        &self,
        chat_id: ChatId,
        patch: VerificationSettingsPatch,
    ) -> Result<VerificationSettings> {
        self.call(move |conn| {
            let stored: Option<String> = conn
                .query_row(
                    "SELECT settings FROM verification_settings WHERE chat_id = ?1",
                    params![chat_id.0],
                    |r| r.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            let current: VerificationSettings = match stored {
                Some(json) => serde_json::from_str(&json)?,
                None => VerificationSettings::default(),
            };
            let merged = current.merged(patch);
            conn.execute(
                "INSERT INTO verification_settings(chat_id, settings) VALUES(?1, ?2)
                 ON CONFLICT(chat_id) DO UPDATE SET settings = excluded.settings",
                params![chat_id.0, serde_json::to_string(&merged)?],
            )
            .map_err(storage_err)?;
            Ok(merged)
        })
        .await
    }
}

#[async_trait]
impl WarningLedger for SqliteStore {
    async fn add_warning(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        reason: &str,
        ttl: Duration,
    ) -> Result<u32> {
        let reason = reason.to_string();
        self.call(move |mut conn| {
            let now = now_millis();
            let expires = now + ttl.as_millis() as i64;
            let tx = conn.transaction().map_err(storage_err)?;

            // Elapsed window: start a fresh one.
            let purged = tx
                .execute(
                    "DELETE FROM warnings WHERE chat_id = ?1 AND user_id = ?2 AND expires_at <= ?3",
                    params![chat_id.0, user_id.0, now],
                )
                .map_err(storage_err)?;
            if purged > 0 {
                tx.execute(
                    "DELETE FROM warning_log WHERE chat_id = ?1 AND user_id = ?2",
                    params![chat_id.0, user_id.0],
                )
                .map_err(storage_err)?;
            }

            let count: u32 = tx
                .query_row(
                    "INSERT INTO warnings(chat_id, user_id, count, expires_at) VALUES(?1, ?2, 1, ?3)
                     ON CONFLICT(chat_id, user_id) DO UPDATE SET count = count + 1
                     RETURNING count",
                    params![chat_id.0, user_id.0, expires],
                    |r| r.get(0),
                )
                .map_err(storage_err)?;

            tx.execute(
                "INSERT INTO warning_log(chat_id, user_id, warning_number, reason, created_at)
                 VALUES(?1, ?2, ?3, ?4, ?5)",
                params![chat_id.0, user_id.0, count, reason, now],
            )
            .map_err(storage_err)?;
            tx.execute(
                "DELETE FROM warning_log WHERE chat_id = ?1 AND user_id = ?2 AND id NOT IN (
                   SELECT id FROM warning_log WHERE chat_id = ?1 AND user_id = ?2
                   ORDER BY id DESC LIMIT ?3)",
                params![chat_id.0, user_id.0, WARNING_LOG_CAP],
            )
            .map_err(storage_err)?;

            tx.commit().map_err(storage_err)?;
            Ok(count)
        })
        .await
    }

    async fn warning_count(&self, chat_id: ChatId, user_id: UserId) -> Result<u32> {
        self.call(move |conn| {
            let count: Option<u32> = conn
                .query_row(
                    "SELECT count FROM warnings
                     WHERE chat_id = ?1 AND user_id = ?2 AND expires_at > ?3",
                    params![chat_id.0, user_id.0, now_millis()],
                    |r| r.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            Ok(count.unwrap_or(0))
        })
        .await
    }

    async fn warning_log(&self, chat_id: ChatId, user_id: UserId) -> Result<Vec<WarningEntry>> {
        self.call(move |conn| {
            let live: Option<i64> = conn
                .query_row(
                    "SELECT expires_at FROM warnings
                     WHERE chat_id = ?1 AND user_id = ?2 AND expires_at > ?3",
                    params![chat_id.0, user_id.0, now_millis()],
                    |r| r.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            if live.is_none() {
                return Ok(Vec::new());
            }

            let mut stmt = conn
                .prepare(
                    "SELECT reason, created_at, warning_number FROM warning_log
                     WHERE chat_id = ?1 AND user_id = ?2 ORDER BY id DESC",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![chat_id.0, user_id.0], |r| {
                    Ok(WarningEntry {
                        reason: r.get(0)?,
                        timestamp: millis_to_utc(r.get(1)?),
                        warning_number: r.get(2)?,
                    })
                })
                .map_err(storage_err)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(storage_err)
        })
        .await
    }

    async fn clear_warnings(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        self.call(move |conn| {
            conn.execute(
                "DELETE FROM warnings WHERE chat_id = ?1 AND user_id = ?2",
                params![chat_id.0, user_id.0],
            )
            .map_err(storage_err)?;
            conn.execute(
                "DELETE FROM warning_log WHERE chat_id = ?1 AND user_id = ?2",
                params![chat_id.0, user_id.0],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl VerificationStore for SqliteStore {
    async fn challenge(&self, chat_id: ChatId, user_id: UserId) -> Result<Option<Challenge>> {
        self.call(move |conn| {
            let now = now_millis();
            let row: Option<(String, i64)> = conn
                .query_row(
                    "SELECT data, expires_at FROM challenges WHERE chat_id = ?1 AND user_id = ?2",
                    params![chat_id.0, user_id.0],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()
                .map_err(storage_err)?;

            match row {
                Some((_, expires)) if expires <= now => {
                    conn.execute(
                        "DELETE FROM challenges WHERE chat_id = ?1 AND user_id = ?2",
                        params![chat_id.0, user_id.0],
                    )
                    .map_err(storage_err)?;
                    Ok(None)
                }
                Some((data, _)) => Ok(Some(serde_json::from_str(&data)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn put_challenge(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        challenge: &Challenge,
        ttl: Duration,
    ) -> Result<()> {
        let data = serde_json::to_string(challenge)?;
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO challenges(chat_id, user_id, data, expires_at) VALUES(?1, ?2, ?3, ?4)
                 ON CONFLICT(chat_id, user_id) DO UPDATE
                 SET data = excluded.data, expires_at = excluded.expires_at",
                params![
                    chat_id.0,
                    user_id.0,
                    data,
                    now_millis() + ttl.as_millis() as i64
                ],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    async fn delete_challenge(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        self.call(move |conn| {
            conn.execute(
                "DELETE FROM challenges WHERE chat_id = ?1 AND user_id = ?2",
                params![chat_id.0, user_id.0],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl PollStore for SqliteStore {
    async fn put_poll(&self, poll: &Poll, ttl: Duration) -> Result<()> {
        let id = poll.id.clone();
        let data = serde_json::to_string(poll)?;
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO polls(id, data, expires_at) VALUES(?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE
                 SET data = excluded.data, expires_at = excluded.expires_at",
                params![id, data, now_millis() + ttl.as_millis() as i64],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    async fn update_poll(&self, poll: &Poll) -> Result<()> {
        let id = poll.id.clone();
        let data = serde_json::to_string(poll)?;
        self.call(move |conn| {
            // Keeps the record's existing TTL; a vanished row means the
            // record expired between read and write.
            conn.execute(
                "UPDATE polls SET data = ?2 WHERE id = ?1",
                params![id, data],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    async fn poll(&self, poll_id: &str) -> Result<Option<Poll>> {
        let poll_id = poll_id.to_string();
        self.call(move |conn| {
            let now = now_millis();
            let row: Option<(String, i64)> = conn
                .query_row(
                    "SELECT data, expires_at FROM polls WHERE id = ?1",
                    params![poll_id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()
                .map_err(storage_err)?;

            match row {
                Some((_, expires)) if expires <= now => {
                    conn.execute("DELETE FROM polls WHERE id = ?1", params![poll_id])
                        .map_err(storage_err)?;
                    Ok(None)
                }
                Some((data, _)) => Ok(Some(serde_json::from_str(&data)?)),
                None => Ok(None),
            }
        })
        .await
    }
}

#[async_trait]
impl ActivityLog for SqliteStore {
    async fn record_join(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO group_stats(chat_id, joins) VALUES(?1, 1)
                 ON CONFLICT(chat_id) DO UPDATE SET joins = joins + 1",
                params![chat_id.0],
            )
            .map_err(storage_err)?;
            conn.execute(
                "INSERT INTO members(chat_id, user_id, joined_at) VALUES(?1, ?2, ?3)
                 ON CONFLICT(chat_id, user_id) DO UPDATE SET joined_at = excluded.joined_at",
                params![chat_id.0, user_id.0, at.timestamp_millis()],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    async fn record_leave(&self, chat_id: ChatId) -> Result<()> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO group_stats(chat_id, leaves) VALUES(?1, 1)
                 ON CONFLICT(chat_id) DO UPDATE SET leaves = leaves + 1",
                params![chat_id.0],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    async fn record_message(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO group_stats(chat_id, messages) VALUES(?1, 1)
                 ON CONFLICT(chat_id) DO UPDATE SET messages = messages + 1",
                params![chat_id.0],
            )
            .map_err(storage_err)?;
            conn.execute(
                "INSERT INTO members(chat_id, user_id, message_count, last_activity)
                 VALUES(?1, ?2, 1, ?3)
                 ON CONFLICT(chat_id, user_id) DO UPDATE
                 SET message_count = message_count + 1, last_activity = excluded.last_activity",
                params![chat_id.0, user_id.0, at.timestamp_millis()],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    async fn joined_at(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<Option<DateTime<Utc>>> {
        self.call(move |conn| {
            let joined: Option<Option<i64>> = conn
                .query_row(
                    "SELECT joined_at FROM members WHERE chat_id = ?1 AND user_id = ?2",
                    params![chat_id.0, user_id.0],
                    |r| r.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            Ok(joined.flatten().map(millis_to_utc))
        })
        .await
    }

    async fn message_count(&self, chat_id: ChatId, user_id: UserId) -> Result<u64> {
        self.call(move |conn| {
            let count: Option<u64> = conn
                .query_row(
                    "SELECT message_count FROM members WHERE chat_id = ?1 AND user_id = ?2",
                    params![chat_id.0, user_id.0],
                    |r| r.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            Ok(count.unwrap_or(0))
        })
        .await
    }

    async fn group_stats(&self, chat_id: ChatId) -> Result<GroupStats> {
        self.call(move |conn| {
            let stats: Option<GroupStats> = conn
                .query_row(
                    "SELECT joins, leaves, messages FROM group_stats WHERE chat_id = ?1",
                    params![chat_id.0],
                    |r| {
                        Ok(GroupStats {
                            joins: r.get(0)?,
                            leaves: r.get(1)?,
                            messages: r.get(2)?,
                        })
                    },
                )
                .optional()
                .map_err(storage_err)?;
            Ok(stats.unwrap_or_default())
        })
        .await
    }

    async fn push_recent_message(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        text: &str,
        cap: usize,
        ttl: Duration,
    ) -> Result<()> {
        let text = text.to_string();
        self.call(move |mut conn| {
            let now = now_millis();
            let tx = conn.transaction().map_err(storage_err)?;

            let row: Option<(String, i64)> = tx
                .query_row(
                    "SELECT messages, expires_at FROM recent_messages
                     WHERE chat_id = ?1 AND user_id = ?2",
                    params![chat_id.0, user_id.0],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )
                .optional()
                .map_err(storage_err)?;

            let mut messages: Vec<String> = match row {
                Some((_, expires)) if expires <= now => Vec::new(),
                Some((json, _)) => serde_json::from_str(&json)?,
                None => Vec::new(),
            };
            messages.insert(0, text);
            messages.truncate(cap);

            tx.execute(
                "INSERT INTO recent_messages(chat_id, user_id, messages, expires_at)
                 VALUES(?1, ?2, ?3, ?4)
                 ON CONFLICT(chat_id, user_id) DO UPDATE
                 SET messages = excluded.messages, expires_at = excluded.expires_at",
                params![
                    chat_id.0,
                    user_id.0,
                    serde_json::to_string(&messages)?,
                    now + ttl.as_millis() as i64
                ],
            )
            .map_err(storage_err)?;
            tx.commit().map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    async fn recent_messages(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<String>> {
        self.call(move |conn| {
            let row: Option<String> = conn
                .query_row(
                    "SELECT messages FROM recent_messages
                     WHERE chat_id = ?1 AND user_id = ?2 AND expires_at > ?3",
                    params![chat_id.0, user_id.0, now_millis()],
                    |r| r.get(0),
                )
                .optional()
                .map_err(storage_err)?;
            match row {
                Some(json) => {
                    let mut messages: Vec<String> = serde_json::from_str(&json)?;
                    messages.truncate(limit);
                    Ok(messages)
                }
                None => Ok(Vec::new()),
            }
        })
        .await
    }

    async fn record_flagged(&self, chat_id: ChatId, entry: &FlaggedMessage) -> Result<()> {
        let data = serde_json::to_string(entry)?;
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO flagged_messages(chat_id, data, created_at) VALUES(?1, ?2, ?3)",
                params![chat_id.0, data, now_millis()],
            )
            .map_err(storage_err)?;
            conn.execute(
                "DELETE FROM flagged_messages WHERE chat_id = ?1 AND id NOT IN (
                   SELECT id FROM flagged_messages WHERE chat_id = ?1
                   ORDER BY id DESC LIMIT ?2)",
                params![chat_id.0, FLAGGED_LOG_CAP],
            )
            .map_err(storage_err)?;
            Ok(())
        })
        .await
    }

    async fn flagged_messages(&self, chat_id: ChatId) -> Result<Vec<FlaggedMessage>> {
        self.call(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT data FROM flagged_messages WHERE chat_id = ?1 ORDER BY id DESC",
                )
                .map_err(storage_err)?;
            let rows = stmt
                .query_map(params![chat_id.0], |r| r.get::<_, String>(0))
                .map_err(storage_err)?;

            let mut out = Vec::new();
            for row in rows {
                out.push(serde_json::from_str(&row.map_err(storage_err)?)?);
            }
            Ok(out)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::domain::MessageId;

    const CHAT: ChatId = ChatId(-1001);
    const USER: UserId = UserId(42);

    fn tmp_store(prefix: &str) -> SqliteStore {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let pid = std::process::id();
        SqliteStore::open(format!("/tmp/{prefix}-{pid}-{ts}.db")).unwrap()
    }

    #[tokio::test]
    async fn settings_round_trip_with_defaults() {
        let store = tmp_store("warden-settings");
        assert_eq!(store.settings(CHAT).await.unwrap(), GroupSettings::default());

        let merged = store
            .update_settings(
                CHAT,
                GroupSettingsPatch {
                    banned_words: Some(vec!["crypto".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(merged.banned_words, vec!["crypto"]);
        assert_eq!(store.settings(CHAT).await.unwrap(), merged);
    }

    #[tokio::test]
    async fn warnings_increment_and_clear() {
        let store = tmp_store("warden-warnings");
        let ttl = Duration::from_secs(60);

        assert_eq!(store.add_warning(CHAT, USER, "a", ttl).await.unwrap(), 1);
        assert_eq!(store.add_warning(CHAT, USER, "b", ttl).await.unwrap(), 2);
        assert_eq!(store.warning_count(CHAT, USER).await.unwrap(), 2);

        let log = store.warning_log(CHAT, USER).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].reason, "b");

        store.clear_warnings(CHAT, USER).await.unwrap();
        assert_eq!(store.warning_count(CHAT, USER).await.unwrap(), 0);
        assert!(store.warning_log(CHAT, USER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_warning_window_restarts() {
        let store = tmp_store("warden-warnexp");
        // Zero TTL: the record is expired as soon as it lands.
        assert_eq!(
            store
                .add_warning(CHAT, USER, "a", Duration::ZERO)
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.warning_count(CHAT, USER).await.unwrap(), 0);
        assert_eq!(
            store
                .add_warning(CHAT, USER, "b", Duration::from_secs(60))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn challenge_round_trip_and_expiry() {
        let store = tmp_store("warden-challenge");
        let challenge = warden_core::verification::generate_challenge(&mut rand::rngs::OsRng);

        store
            .put_challenge(CHAT, USER, &challenge, Duration::from_secs(300))
            .await
            .unwrap();
        assert_eq!(store.challenge(CHAT, USER).await.unwrap(), Some(challenge.clone()));

        store
            .put_challenge(CHAT, USER, &challenge, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(store.challenge(CHAT, USER).await.unwrap(), None);
    }

    #[tokio::test]
    async fn poll_round_trip_keeps_ttl_on_update() {
        let store = tmp_store("warden-polls");
        let mut poll = Poll {
            id: "poll_1_abc".to_string(),
            chat_id: CHAT,
            creator_id: USER,
            question: "Q?".to_string(),
            options: vec!["A".into(), "B".into()],
            voters: Default::default(),
            is_anonymous: true,
            multiple_answers: false,
            created_at: Utc::now(),
            expires_at: None,
        };

        store.put_poll(&poll, Duration::from_secs(60)).await.unwrap();
        poll.apply_vote(UserId(7), 1);
        store.update_poll(&poll).await.unwrap();

        let stored = store.poll(&poll.id).await.unwrap().unwrap();
        assert_eq!(stored.voters.get(&7), Some(&vec![1]));
        assert!(store.poll("poll_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn activity_counters_and_recent_history() {
        let store = tmp_store("warden-activity");
        let now = Utc::now();

        store.record_join(CHAT, USER, now).await.unwrap();
        store.record_message(CHAT, USER, now).await.unwrap();
        store.record_message(CHAT, USER, now).await.unwrap();
        store.record_leave(CHAT).await.unwrap();

        let stats = store.group_stats(CHAT).await.unwrap();
        assert_eq!(stats.joins, 1);
        assert_eq!(stats.leaves, 1);
        assert_eq!(stats.messages, 2);
        assert_eq!(store.message_count(CHAT, USER).await.unwrap(), 2);
        assert_eq!(
            store.joined_at(CHAT, USER).await.unwrap().map(|t| t.timestamp()),
            Some(now.timestamp())
        );

        for i in 0..12 {
            store
                .push_recent_message(CHAT, USER, &format!("m{i}"), 10, Duration::from_secs(300))
                .await
                .unwrap();
        }
        let recent = store.recent_messages(CHAT, USER, 5).await.unwrap();
        assert_eq!(recent, vec!["m11", "m10", "m9", "m8", "m7"]);

        store
            .record_flagged(
                CHAT,
                &FlaggedMessage {
                    user_id: USER,
                    message_id: MessageId(3),
                    text: "bad".to_string(),
                    score: -0.8,
                    timestamp: now,
                },
            )
            .await
            .unwrap();
        assert_eq!(store.flagged_messages(CHAT).await.unwrap().len(), 1);
    }
}
