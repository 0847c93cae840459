//! In-memory implementation of every repository port, used as the test fake
//! throughout the workspace. TTLs are tracked with `tokio::time::Instant`
//! so tests can drive expiry with a paused clock.

use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{
    domain::{ChatId, UserId},
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

const WARNING_LOG_CAP: usize = 20;
const FLAGGED_LOG_CAP: usize = 100;

#[derive(Debug)]
struct WarningState {
    count: u32,
    expires: Instant,
    log: VecDeque<WarningEntry>,
}

#[derive(Default)]
struct State {
    settings: HashMap<i64, GroupSettings>,
    verification_settings: HashMap<i64, VerificationSettings>,
    warnings: HashMap<(i64, i64), WarningState>,
    challenges: HashMap<(i64, i64), (Challenge, Instant)>,
    polls: HashMap<String, (Poll, Instant)>,
    stats: HashMap<i64, GroupStats>,
    joined: HashMap<(i64, i64), DateTime<Utc>>,
    message_counts: HashMap<(i64, i64), u64>,
    last_activity: HashMap<(i64, i64), DateTime<Utc>>,
    recent: HashMap<(i64, i64), (VecDeque<String>, Instant)>,
    flagged: HashMap<i64, VecDeque<FlaggedMessage>>,
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last-activity timestamp recorded by `record_message`, for diagnostics.
    pub async fn last_activity(&self, chat_id: ChatId, user_id: UserId) -> Option<DateTime<Utc>> {
        self.state
            .lock()
            .await
            .last_activity
            .get(&(chat_id.0, user_id.0))
            .copied()
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn settings(&self, chat_id: ChatId) -> Result<GroupSettings> {
        let state = self.state.lock().await;
        Ok(state.settings.get(&chat_id.0).cloned().unwrap_or_default())
    }

    async fn update_settings(
        &self,
        chat_id: ChatId,
        patch: GroupSettingsPatch,
    ) -> Result<GroupSettings> {
        let mut state = self.state.lock().await;
        let current = state.settings.get(&chat_id.0).cloned().unwrap_or_default();
        let merged = current.merged(patch);
        state.settings.insert(chat_id.0, merged.clone());
        Ok(merged)
    }

    async fn verification_settings(&self, chat_id: ChatId) -> Result<VerificationSettings> {
        let state = self.state.lock().await;
        Ok(state
            .verification_settings
            .get(&chat_id.0)
            .copied()
            .unwrap_or_default())
    }

    async fn update_verification_settings(
        &self,
        chat_id: ChatId,
        patch: VerificationSettingsPatch,
    ) -> Result<VerificationSettings> {
        let mut state = self.state.lock().await;
        let current = state
            .verification_settings
            .get(&chat_id.0)
            .copied()
            .unwrap_or_default();
        let merged = current.merged(patch);
        state.verification_settings.insert(chat_id.0, merged);
        Ok(merged)
    }
}

#[async_trait]
impl WarningLedger for MemoryStore {
    async fn add_warning(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        reason: &str,
        ttl: Duration,
    ) -> Result<u32> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let key = (chat_id.0, user_id.0);

        let entry = state.warnings.entry(key).or_insert_with(|| WarningState {
            count: 0,
            expires: now + ttl,
            log: VecDeque::new(),
        });
        if now >= entry.expires {
            // Window elapsed: start a fresh one.
            entry.count = 0;
            entry.log.clear();
            entry.expires = now + ttl;
        }

        entry.count += 1;
        entry.log.push_front(WarningEntry {
            reason: reason.to_string(),
            timestamp: Utc::now(),
            warning_number: entry.count,
        });
        entry.log.truncate(WARNING_LOG_CAP);

        Ok(entry.count)
    }

    async fn warning_count(&self, chat_id: ChatId, user_id: UserId) -> Result<u32> {
        let state = self.state.lock().await;
        let now = Instant::now();
        Ok(state
            .warnings
            .get(&(chat_id.0, user_id.0))
            .filter(|w| now < w.expires)
            .map(|w| w.count)
            .unwrap_or(0))
    }

    async fn warning_log(&self, chat_id: ChatId, user_id: UserId) -> Result<Vec<WarningEntry>> {
        let state = self.state.lock().await;
        let now = Instant::now();
        Ok(state
            .warnings
            .get(&(chat_id.0, user_id.0))
            .filter(|w| now < w.expires)
            .map(|w| w.log.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear_warnings(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.warnings.remove(&(chat_id.0, user_id.0));
        Ok(())
    }
}

#[async_trait]
impl VerificationStore for MemoryStore {
    async fn challenge(&self, chat_id: ChatId, user_id: UserId) -> Result<Option<Challenge>> {
        let mut state = self.state.lock().await;
        let key = (chat_id.0, user_id.0);
        let now = Instant::now();

        match state.challenges.get(&key) {
            Some((_, expires)) if now >= *expires => {
                state.challenges.remove(&key);
                Ok(None)
            }
            Some((challenge, _)) => Ok(Some(challenge.clone())),
            None => Ok(None),
        }
    }

    async fn put_challenge(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        challenge: &Challenge,
        ttl: Duration,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.challenges.insert(
            (chat_id.0, user_id.0),
            (challenge.clone(), Instant::now() + ttl),
        );
        Ok(())
    }

    async fn delete_challenge(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.challenges.remove(&(chat_id.0, user_id.0));
        Ok(())
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn put_poll(&self, poll: &Poll, ttl: Duration) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .polls
            .insert(poll.id.clone(), (poll.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn update_poll(&self, poll: &Poll) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.polls.get_mut(&poll.id) {
            Some((stored, _)) => {
                *stored = poll.clone();
                Ok(())
            }
            // Record expired between read and write; the next read sees nothing.
            None => Ok(()),
        }
    }

    async fn poll(&self, poll_id: &str) -> Result<Option<Poll>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        match state.polls.get(poll_id) {
            Some((_, expires)) if now >= *expires => {
                state.polls.remove(poll_id);
                Ok(None)
            }
            Some((poll, _)) => Ok(Some(poll.clone())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ActivityLog for MemoryStore {
    async fn record_join(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.stats.entry(chat_id.0).or_default().joins += 1;
        state.joined.insert((chat_id.0, user_id.0), at);
        Ok(())
    }

    async fn record_leave(&self, chat_id: ChatId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.stats.entry(chat_id.0).or_default().leaves += 1;
        Ok(())
    }

    async fn record_message(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.stats.entry(chat_id.0).or_default().messages += 1;
        *state.message_counts.entry((chat_id.0, user_id.0)).or_default() += 1;
        state.last_activity.insert((chat_id.0, user_id.0), at);
        Ok(())
    }

    async fn joined_at(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> Result<Option<DateTime<Utc>>> {
        let state = self.state.lock().await;
        Ok(state.joined.get(&(chat_id.0, user_id.0)).copied())
    }

    async fn message_count(&self, chat_id: ChatId, user_id: UserId) -> Result<u64> {
        let state = self.state.lock().await;
        Ok(state
            .message_counts
            .get(&(chat_id.0, user_id.0))
            .copied()
            .unwrap_or(0))
    }

    async fn group_stats(&self, chat_id: ChatId) -> Result<GroupStats> {
        let state = self.state.lock().await;
        Ok(state.stats.get(&chat_id.0).copied().unwrap_or_default())
    }

    async fn push_recent_message(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        text: &str,
        cap: usize,
        ttl: Duration,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let key = (chat_id.0, user_id.0);

        let slot = state
            .recent
            .entry(key)
            .or_insert_with(|| (VecDeque::new(), now + ttl));
        if now >= slot.1 {
            slot.0.clear();
        }
        slot.0.push_front(text.to_string());
        slot.0.truncate(cap);
        slot.1 = now + ttl;
        Ok(())
    }

    async fn recent_messages(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        let now = Instant::now();
        Ok(state
            .recent
            .get(&(chat_id.0, user_id.0))
            .filter(|(_, expires)| now < *expires)
            .map(|(msgs, _)| msgs.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn record_flagged(&self, chat_id: ChatId, entry: &FlaggedMessage) -> Result<()> {
        let mut state = self.state.lock().await;
        let log = state.flagged.entry(chat_id.0).or_default();
        log.push_front(entry.clone());
        log.truncate(FLAGGED_LOG_CAP);
        Ok(())
    }

    async fn flagged_messages(&self, chat_id: ChatId) -> Result<Vec<FlaggedMessage>> {
        let state = self.state.lock().await;
        Ok(state
            .flagged
            .get(&chat_id.0)
            .map(|log| log.iter().cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MessageId;

    const CHAT: ChatId = ChatId(-1001);
    const USER: UserId = UserId(42);

    #[tokio::test]
    async fn settings_default_when_absent_and_merge_persists() {
        let store = MemoryStore::new();
        assert_eq!(store.settings(CHAT).await.unwrap(), GroupSettings::default());

        let updated = store
            .update_settings(
                CHAT,
                GroupSettingsPatch {
                    max_warnings: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.max_warnings, 5);
        assert!(updated.anti_spam_enabled);

        assert_eq!(store.settings(CHAT).await.unwrap().max_warnings, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn warnings_count_within_window_and_reset_after_ttl() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(86_400);

        assert_eq!(store.add_warning(CHAT, USER, "a", ttl).await.unwrap(), 1);
        assert_eq!(store.add_warning(CHAT, USER, "b", ttl).await.unwrap(), 2);
        assert_eq!(store.warning_count(CHAT, USER).await.unwrap(), 2);

        let log = store.warning_log(CHAT, USER).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].reason, "b");
        assert_eq!(log[0].warning_number, 2);

        tokio::time::advance(Duration::from_secs(86_401)).await;
        assert_eq!(store.warning_count(CHAT, USER).await.unwrap(), 0);
        assert_eq!(store.add_warning(CHAT, USER, "c", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn clear_warnings_removes_counter_and_log() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(60);
        store.add_warning(CHAT, USER, "a", ttl).await.unwrap();
        store.clear_warnings(CHAT, USER).await.unwrap();
        assert_eq!(store.warning_count(CHAT, USER).await.unwrap(), 0);
        assert!(store.warning_log(CHAT, USER).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn challenges_expire_silently() {
        let store = MemoryStore::new();
        let challenge =
            crate::verification::generate_challenge(&mut rand::rngs::OsRng);
        store
            .put_challenge(CHAT, USER, &challenge, Duration::from_secs(300))
            .await
            .unwrap();
        assert!(store.challenge(CHAT, USER).await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(store.challenge(CHAT, USER).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn recent_messages_cap_and_expire() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(300);
        for i in 0..12 {
            store
                .push_recent_message(CHAT, USER, &format!("m{i}"), 10, ttl)
                .await
                .unwrap();
        }

        let recent = store.recent_messages(CHAT, USER, 5).await.unwrap();
        assert_eq!(recent, vec!["m11", "m10", "m9", "m8", "m7"]);
        assert_eq!(store.recent_messages(CHAT, USER, 100).await.unwrap().len(), 10);

        tokio::time::advance(Duration::from_secs(301)).await;
        assert!(store.recent_messages(CHAT, USER, 5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn activity_counters_accumulate() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.record_join(CHAT, USER, now).await.unwrap();
        store.record_message(CHAT, USER, now).await.unwrap();
        store.record_message(CHAT, USER, now).await.unwrap();
        store.record_leave(CHAT).await.unwrap();

        let stats = store.group_stats(CHAT).await.unwrap();
        assert_eq!(
            stats,
            GroupStats {
                joins: 1,
                leaves: 1,
                messages: 2
            }
        );
        assert_eq!(store.message_count(CHAT, USER).await.unwrap(), 2);
        assert_eq!(store.joined_at(CHAT, USER).await.unwrap(), Some(now));
        assert_eq!(store.last_activity(CHAT, USER).await, Some(now));
    }

    #[tokio::test]
    async fn flagged_log_is_bounded_and_newest_first() {
        let store = MemoryStore::new();
        for i in 0..105 {
            store
                .record_flagged(
                    CHAT,
                    &FlaggedMessage {
                        user_id: USER,
                        message_id: MessageId(i),
                        text: format!("msg {i}"),
                        score: -0.9,
                        timestamp: Utc::now(),
                    },
                )
                .await
                .unwrap();
        }
        let log = store.flagged_messages(CHAT).await.unwrap();
        assert_eq!(log.len(), 100);
        assert_eq!(log[0].message_id, MessageId(104));
    }
}
