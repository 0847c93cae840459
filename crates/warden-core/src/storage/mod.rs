//! Repository ports for the durable key-value state.
//!
//! Core logic depends only on these traits; the production backend lives in
//! an adapter crate and [`memory::MemoryStore`] doubles as the test fake.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChatId, MessageId, UserId},
    polls::Poll,
    settings::{
        GroupSettings, GroupSettingsPatch, VerificationSettings, VerificationSettingsPatch,
    },
    verification::Challenge,
    warnings::WarningEntry,
    Result,
};

pub mod memory;

/// Per-group configuration. `settings` never reports "missing": an absent
/// record reads as the documented defaults.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn settings(&self, chat_id: ChatId) -> Result<GroupSettings>;
    async fn update_settings(
        &self,
        chat_id: ChatId,
        patch: GroupSettingsPatch,
    ) -> Result<GroupSettings>;

    async fn verification_settings(&self, chat_id: ChatId) -> Result<VerificationSettings>;
    async fn update_verification_settings(
        &self,
        chat_id: ChatId,
        patch: VerificationSettingsPatch,
    ) -> Result<VerificationSettings>;
}

/// Warning counters with a reason log.
#[async_trait]
pub trait WarningLedger: Send + Sync {
    /// Atomically increment the counter, creating the record with `ttl` on
    /// the first warning of a window, append a log entry, and return the
    /// post-increment count. Concurrent calls for the same key must all be
    /// reflected (no read-modify-write).
    async fn add_warning(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        reason: &str,
        ttl: Duration,
    ) -> Result<u32>;

    /// Current non-expired count; 0 when absent.
    async fn warning_count(&self, chat_id: ChatId, user_id: UserId) -> Result<u32>;

    async fn warning_log(&self, chat_id: ChatId, user_id: UserId) -> Result<Vec<WarningEntry>>;

    /// Unconditionally delete counter and log.
    async fn clear_warnings(&self, chat_id: ChatId, user_id: UserId) -> Result<()>;
}

/// Live verification challenges, at most one per (group, user).
#[async_trait]
pub trait VerificationStore: Send + Sync {
    async fn challenge(&self, chat_id: ChatId, user_id: UserId) -> Result<Option<Challenge>>;
    async fn put_challenge(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        challenge: &Challenge,
        ttl: Duration,
    ) -> Result<()>;
    async fn delete_challenge(&self, chat_id: ChatId, user_id: UserId) -> Result<()>;
}

/// Poll records by id.
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Insert with a fresh TTL (creation).
    async fn put_poll(&self, poll: &Poll, ttl: Duration) -> Result<()>;
    /// Overwrite the record, keeping its existing TTL (votes, close).
    async fn update_poll(&self, poll: &Poll) -> Result<()>;
    async fn poll(&self, poll_id: &str) -> Result<Option<Poll>>;
}

/// Aggregated per-group counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupStats {
    pub joins: u64,
    pub leaves: u64,
    pub messages: u64,
}

/// A message kept for admin review after a strongly negative sentiment score.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlaggedMessage {
    pub user_id: UserId,
    pub message_id: MessageId,
    pub text: String,
    pub score: f32,
    pub timestamp: DateTime<Utc>,
}

/// Join/leave/message accounting, trust signals, recent-message history,
/// and the admin-review log. All counter updates are atomic increments.
#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn record_join(&self, chat_id: ChatId, user_id: UserId, at: DateTime<Utc>)
        -> Result<()>;
    async fn record_leave(&self, chat_id: ChatId) -> Result<()>;
    async fn record_message(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn joined_at(&self, chat_id: ChatId, user_id: UserId)
        -> Result<Option<DateTime<Utc>>>;
    async fn message_count(&self, chat_id: ChatId, user_id: UserId) -> Result<u64>;
    async fn group_stats(&self, chat_id: ChatId) -> Result<GroupStats>;

    /// Prepend to the user's bounded recent-message history (most recent
    /// first) and refresh its TTL.
    async fn push_recent_message(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        text: &str,
        cap: usize,
        ttl: Duration,
    ) -> Result<()>;

    /// Up to `limit` most recent messages, newest first.
    async fn recent_messages(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<String>>;

    async fn record_flagged(&self, chat_id: ChatId, entry: &FlaggedMessage) -> Result<()>;
    async fn flagged_messages(&self, chat_id: ChatId) -> Result<Vec<FlaggedMessage>>;
}
