//! Ad-hoc polls: create / vote / tally, independent of Telegram's native polls.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    domain::{ChatId, UserId},
    format::escape_html,
    locks::KeyedLocks,
    messaging::{
        port::MessagingPort,
        types::{InlineButton, InlineKeyboard},
    },
    storage::PollStore,
    Error, Result,
};

pub const MIN_OPTIONS: usize = 2;
pub const MAX_OPTIONS: usize = 10;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub chat_id: ChatId,
    pub creator_id: UserId,
    pub question: String,
    pub options: Vec<String>,
    /// Voter id -> selected option indices. Single-answer polls keep at most
    /// one entry per voter.
    pub voters: BTreeMap<i64, Vec<usize>>,
    pub is_anonymous: bool,
    pub multiple_answers: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Poll {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| now > at).unwrap_or(false)
    }

    /// Apply one vote.
    ///
    /// Single-answer: the new selection replaces the previous one.
    /// Multi-answer: voting an already-selected option toggles it off.
    pub fn apply_vote(&mut self, user_id: UserId, option_index: usize) {
        if !self.multiple_answers {
            self.voters.insert(user_id.0, vec![option_index]);
            return;
        }

        let selection = self.voters.entry(user_id.0).or_default();
        if let Some(pos) = selection.iter().position(|&v| v == option_index) {
            selection.remove(pos);
        } else {
            selection.push(option_index);
        }
    }

    /// Votes per option: the number of voters whose selection contains the index.
    pub fn tally(&self) -> PollResults {
        let results = self
            .options
            .iter()
            .enumerate()
            .map(|(index, option)| PollOptionCount {
                option: option.clone(),
                votes: self
                    .voters
                    .values()
                    .filter(|selection| selection.contains(&index))
                    .count() as u64,
            })
            .collect();

        PollResults {
            question: self.question.clone(),
            results,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PollResults {
    pub question: String,
    pub results: Vec<PollOptionCount>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PollOptionCount {
    pub option: String,
    pub votes: u64,
}

/// Percentage of `votes` against `total`, rounded; 0 when there are no votes.
pub fn vote_percentage(votes: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    (votes * 100 + total / 2) / total
}

pub fn format_poll_results(results: &PollResults) -> String {
    let total: u64 = results.results.iter().map(|r| r.votes).sum();

    let mut message = format!(
        "📊 <b>Poll Results</b>\n\n<b>{}</b>\n\n",
        escape_html(&results.question)
    );
    for (index, row) in results.results.iter().enumerate() {
        let percentage = vote_percentage(row.votes, total);
        let bar = "█".repeat((percentage / 5) as usize);
        message.push_str(&format!(
            "{}. {}\n{} {} votes ({}%)\n\n",
            index + 1,
            escape_html(&row.option),
            bar,
            row.votes,
            percentage
        ));
    }
    message.push_str(&format!("👥 Total votes: {total}"));
    message
}

/// Poll lifecycle against the store and the messenger.
pub struct PollEngine {
    store: Arc<dyn PollStore>,
    messenger: Arc<dyn MessagingPort>,
    default_ttl: Duration,
    locks: KeyedLocks<String>,
}

impl PollEngine {
    pub fn new(
        store: Arc<dyn PollStore>,
        messenger: Arc<dyn MessagingPort>,
        default_ttl: Duration,
    ) -> Self {
        Self {
            store,
            messenger,
            default_ttl,
            locks: KeyedLocks::new(),
        }
    }

    /// Create and publish a poll. Rejects option counts outside [2, 10]
    /// before any state mutation.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        chat_id: ChatId,
        creator_id: UserId,
        question: &str,
        options: Vec<String>,
        is_anonymous: bool,
        multiple_answers: bool,
        expiry_minutes: Option<u64>,
    ) -> Result<String> {
        if options.len() < MIN_OPTIONS || options.len() > MAX_OPTIONS {
            return Err(Error::Validation(format!(
                "polls need {MIN_OPTIONS}-{MAX_OPTIONS} options, got {}",
                options.len()
            )));
        }

        let now = Utc::now();
        let ttl = expiry_minutes
            .map(|m| Duration::from_secs(m * 60))
            .unwrap_or(self.default_ttl);

        let poll = Poll {
            id: new_poll_id(now),
            chat_id,
            creator_id,
            question: question.to_string(),
            options,
            voters: BTreeMap::new(),
            is_anonymous,
            multiple_answers,
            created_at: now,
            expires_at: expiry_minutes
                .map(|m| now + chrono::Duration::minutes(m as i64)),
        };

        self.store.put_poll(&poll, ttl).await?;

        if let Err(e) = self
            .messenger
            .send_inline_keyboard(chat_id, &announcement(&poll), vote_keyboard(&poll))
            .await
        {
            warn!("failed to publish poll {}: {e}", poll.id);
        }

        info!("created poll {} in {chat_id:?}", poll.id);
        Ok(poll.id)
    }

    /// Record a vote. `false` when the poll is missing, expired, or the
    /// option index is out of range; stored state is not mutated in any of
    /// those cases.
    pub async fn vote(&self, poll_id: &str, user_id: UserId, option_index: usize) -> Result<bool> {
        let _guard = self.locks.lock(poll_id.to_string()).await;

        let Some(mut poll) = self.store.poll(poll_id).await? else {
            return Ok(false);
        };
        if poll.is_expired(Utc::now()) || option_index >= poll.options.len() {
            return Ok(false);
        }

        poll.apply_vote(user_id, option_index);
        self.store.update_poll(&poll).await?;
        Ok(true)
    }

    pub async fn tally(&self, poll_id: &str) -> Result<Option<PollResults>> {
        Ok(self.store.poll(poll_id).await?.map(|poll| poll.tally()))
    }

    /// Close a poll by expiring it immediately. Creator only; `false` when
    /// the poll is missing or the caller may not close it.
    pub async fn close(&self, poll_id: &str, user_id: UserId) -> Result<bool> {
        let _guard = self.locks.lock(poll_id.to_string()).await;

        let Some(mut poll) = self.store.poll(poll_id).await? else {
            return Ok(false);
        };
        if poll.creator_id != user_id {
            return Ok(false);
        }

        poll.expires_at = Some(Utc::now());
        self.store.update_poll(&poll).await?;
        info!("closed poll {poll_id}");
        Ok(true)
    }
}

fn new_poll_id(now: DateTime<Utc>) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("poll_{}_{}", now.timestamp_millis(), suffix.to_lowercase())
}

fn announcement(poll: &Poll) -> String {
    let expiry = poll
        .expires_at
        .map(|at| format!("\n⏰ Expires: {}", at.format("%Y-%m-%d %H:%M UTC")))
        .unwrap_or_default();

    format!(
        "📊 <b>Poll</b>\n\n<b>{}</b>\n\n👥 Total voters: {}{}\n\nClick buttons below to vote!",
        escape_html(&poll.question),
        poll.voters.len(),
        expiry
    )
}

fn vote_keyboard(poll: &Poll) -> InlineKeyboard {
    let mut keyboard = InlineKeyboard::default();
    for (index, option) in poll.options.iter().enumerate() {
        keyboard.push_row(vec![InlineButton::new(
            format!("{}. {option}", index + 1),
            format!("vote_{}_{index}", poll.id),
        )]);
    }
    keyboard.push_row(vec![
        InlineButton::new("📊 Results", format!("results_{}", poll.id)),
        InlineButton::new("🔒 Close Poll", format!("close_{}", poll.id)),
    ]);
    keyboard
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll(multiple_answers: bool) -> Poll {
        Poll {
            id: "poll_test".to_string(),
            chat_id: ChatId(-100),
            creator_id: UserId(1),
            question: "Lunch?".to_string(),
            options: vec!["A".into(), "B".into(), "C".into()],
            voters: BTreeMap::new(),
            is_anonymous: true,
            multiple_answers,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    #[test]
    fn single_answer_vote_replaces() {
        let mut p = poll(false);
        p.apply_vote(UserId(7), 0);
        p.apply_vote(UserId(7), 1);
        assert_eq!(p.voters.get(&7), Some(&vec![1]));
    }

    #[test]
    fn multi_answer_vote_toggles_off() {
        let mut p = poll(true);
        p.apply_vote(UserId(7), 0);
        p.apply_vote(UserId(7), 2);
        assert_eq!(p.voters.get(&7), Some(&vec![0, 2]));

        p.apply_vote(UserId(7), 0);
        assert_eq!(p.voters.get(&7), Some(&vec![2]));

        p.apply_vote(UserId(7), 2);
        assert_eq!(p.voters.get(&7), Some(&Vec::new()));
    }

    #[test]
    fn tally_counts_voters_per_option() {
        let mut p = poll(true);
        p.apply_vote(UserId(1), 0);
        p.apply_vote(UserId(2), 0);
        p.apply_vote(UserId(2), 1);
        p.apply_vote(UserId(3), 1);

        let t = p.tally();
        assert_eq!(t.question, "Lunch?");
        assert_eq!(t.results[0].votes, 2);
        assert_eq!(t.results[1].votes, 2);
        assert_eq!(t.results[2].votes, 0);
    }

    #[test]
    fn expiry_is_strict_after() {
        let mut p = poll(false);
        let now = Utc::now();
        assert!(!p.is_expired(now));

        p.expires_at = Some(now - chrono::Duration::seconds(1));
        assert!(p.is_expired(now));

        p.expires_at = Some(now);
        assert!(!p.is_expired(now));
    }

    #[test]
    fn percentages_round_and_handle_zero() {
        assert_eq!(vote_percentage(0, 0), 0);
        assert_eq!(vote_percentage(1, 3), 33);
        assert_eq!(vote_percentage(2, 3), 67);
        assert_eq!(vote_percentage(1, 2), 50);
        assert_eq!(vote_percentage(4, 4), 100);
    }

    #[test]
    fn formats_results_with_bars() {
        let mut p = poll(false);
        p.apply_vote(UserId(1), 0);
        p.apply_vote(UserId(2), 0);
        p.apply_vote(UserId(3), 1);

        let out = format_poll_results(&p.tally());
        assert!(out.contains("1. A"));
        assert!(out.contains("2 votes (67%)"));
        assert!(out.contains("1 votes (33%)"));
        assert!(out.contains("Total votes: 3"));
    }

    #[test]
    fn poll_ids_are_unique_enough() {
        let now = Utc::now();
        let a = new_poll_id(now);
        let b = new_poll_id(now);
        assert!(a.starts_with("poll_"));
        assert_ne!(a, b);
    }

    mod engine {
        use super::*;
        use crate::{storage::memory::MemoryStore, testsupport::RecordingMessenger, Error};
        use std::sync::Arc;
        use std::time::Duration;

        fn engine() -> (Arc<MemoryStore>, Arc<RecordingMessenger>, PollEngine) {
            let store = Arc::new(MemoryStore::new());
            let messenger = Arc::new(RecordingMessenger::new());
            let engine = PollEngine::new(
                store.clone(),
                messenger.clone(),
                Duration::from_secs(86_400),
            );
            (store, messenger, engine)
        }

        fn options(n: usize) -> Vec<String> {
            (0..n).map(|i| format!("opt{i}")).collect()
        }

        #[tokio::test]
        async fn create_publishes_keyboard_with_close_row() {
            let (_, messenger, engine) = engine();
            let id = engine
                .create(ChatId(-1), UserId(1), "Lunch?", options(3), true, false, None)
                .await
                .unwrap();

            let keyboards = messenger.keyboards.lock().await;
            assert_eq!(keyboards.len(), 1);
            // 3 vote rows + results/close row.
            assert_eq!(keyboards[0].2.rows.len(), 4);
            assert_eq!(
                keyboards[0].2.rows[3][1].callback_data,
                format!("close_{id}")
            );
        }

        #[tokio::test]
        async fn create_rejects_bad_option_counts() {
            let (store, _, engine) = engine();
            for n in [0, 1, 11] {
                let err = engine
                    .create(ChatId(-1), UserId(1), "Q?", options(n), true, false, None)
                    .await
                    .unwrap_err();
                assert!(matches!(err, Error::Validation(_)));
            }
            // Nothing was persisted or published.
            assert!(store.poll("poll_anything").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn votes_round_trip_through_the_store() {
            let (store, _, engine) = engine();
            let id = engine
                .create(ChatId(-1), UserId(1), "Q?", options(3), true, false, None)
                .await
                .unwrap();

            assert!(engine.vote(&id, UserId(7), 0).await.unwrap());
            assert!(engine.vote(&id, UserId(7), 1).await.unwrap());
            let stored = store.poll(&id).await.unwrap().unwrap();
            assert_eq!(stored.voters.get(&7), Some(&vec![1]));

            // Out-of-range option index is rejected without mutation.
            assert!(!engine.vote(&id, UserId(7), 9).await.unwrap());

            let tally = engine.tally(&id).await.unwrap().unwrap();
            assert_eq!(tally.results[1].votes, 1);
            assert!(engine.tally("poll_missing").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn expired_poll_rejects_votes_without_mutation() {
            let (store, _, engine) = engine();
            let id = engine
                .create(ChatId(-1), UserId(1), "Q?", options(2), true, false, Some(1))
                .await
                .unwrap();

            // Force the record past its expiry.
            let mut poll = store.poll(&id).await.unwrap().unwrap();
            poll.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
            store.update_poll(&poll).await.unwrap();

            assert!(!engine.vote(&id, UserId(7), 0).await.unwrap());
            assert!(store.poll(&id).await.unwrap().unwrap().voters.is_empty());
        }

        #[tokio::test]
        async fn close_is_creator_only_and_stops_votes() {
            let (_, _, engine) = engine();
            let id = engine
                .create(ChatId(-1), UserId(1), "Q?", options(2), true, false, None)
                .await
                .unwrap();

            assert!(!engine.close(&id, UserId(99)).await.unwrap());
            assert!(engine.vote(&id, UserId(7), 0).await.unwrap());

            assert!(engine.close(&id, UserId(1)).await.unwrap());
            assert!(!engine.vote(&id, UserId(8), 0).await.unwrap());
            assert!(!engine.close("poll_missing", UserId(1)).await.unwrap());
        }
    }
}
