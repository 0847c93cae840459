//! New-member verification: challenge generation and the attempt state machine.
//!
//! Per (group, user) the states are `NONE -> CHALLENGED -> {VERIFIED, EXPELLED}`.
//! `NONE` and the terminal states have no stored record; the stored
//! [`Challenge`] *is* the CHALLENGED state, so grading a missing record is
//! unrepresentable and [`Challenge::grade`] consumes the record on terminal
//! transitions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    domain::{ChatId, MessageRef, UserId},
    format::escape_html,
    locks::KeyedLocks,
    messaging::{
        port::{MessagingPort, ModerationPort},
        types::{InlineButton, InlineKeyboard},
    },
    storage::{SettingsStore, VerificationStore},
    Result,
};

/// A live verification challenge (the CHALLENGED state).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub question: String,
    /// Shuffled option labels presented to the user.
    pub options: Vec<String>,
    /// Post-shuffle index of the correct answer.
    pub correct_index: usize,
    pub attempts: u8,
    pub created_at: DateTime<Utc>,
    /// The outbound challenge message, kept for later deletion.
    pub message: Option<MessageRef>,
}

/// Result of grading one attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Correct answer: restore permissions, drop the record.
    Verified,
    /// Wrong answer with budget left: the record persists with a fresh TTL.
    Retry { remaining: u8 },
    /// Third wrong answer: remove the user, drop the record.
    Expelled,
}

impl Challenge {
    pub const MAX_ATTEMPTS: u8 = 3;

    /// Grade a selected option index.
    ///
    /// Consumes the record; `Some(challenge)` is returned only for the
    /// self-loop (wrong answer, attempts remaining) and must be persisted
    /// back with a refreshed TTL.
    pub fn grade(mut self, selected: usize) -> (AttemptOutcome, Option<Challenge>) {
        self.attempts += 1;

        if selected == self.correct_index {
            return (AttemptOutcome::Verified, None);
        }
        if self.attempts >= Self::MAX_ATTEMPTS {
            return (AttemptOutcome::Expelled, None);
        }
        let remaining = Self::MAX_ATTEMPTS - self.attempts;
        (AttemptOutcome::Retry { remaining }, Some(self))
    }
}

/// Generate an arithmetic challenge with 4 shuffled options.
///
/// Operand ranges keep every answer (and every wrong option) positive:
/// addition a,b in 1..=20; subtraction minuend in 10..=29, subtrahend in
/// 1..=10; multiplication a,b in 1..=10.
pub fn generate_challenge(rng: &mut impl Rng) -> Challenge {
    let (question, answer) = match rng.gen_range(0..3) {
        0 => {
            let a = rng.gen_range(1..=20);
            let b = rng.gen_range(1..=20);
            (format!("{a} + {b} = ?"), a + b)
        }
        1 => {
            let a = rng.gen_range(10..=29);
            let mut b = rng.gen_range(1..=10);
            // a == 10, b == 10 would make the answer zero.
            while b >= a {
                b = rng.gen_range(1..=10);
            }
            (format!("{a} - {b} = ?"), a - b)
        }
        _ => {
            let a = rng.gen_range(1..=10);
            let b = rng.gen_range(1..=10);
            (format!("{a} × {b} = ?"), a * b)
        }
    };

    let mut wrong: Vec<i64> = Vec::with_capacity(3);
    while wrong.len() < 3 {
        let candidate = answer + rng.gen_range(-5..=4);
        if candidate != answer && candidate > 0 && !wrong.contains(&candidate) {
            wrong.push(candidate);
        }
    }

    let mut options: Vec<i64> = Vec::with_capacity(4);
    options.push(answer);
    options.extend(wrong);
    options.shuffle(rng);

    let correct_index = options
        .iter()
        .position(|&v| v == answer)
        .expect("answer is always one of the options");

    Challenge {
        question,
        options: options.iter().map(|v| v.to_string()).collect(),
        correct_index,
        attempts: 0,
        created_at: Utc::now(),
        message: None,
    }
}

/// Drives the challenge/response protocol against the platform ports.
pub struct VerificationEngine {
    store: Arc<dyn VerificationStore>,
    settings: Arc<dyn SettingsStore>,
    messenger: Arc<dyn MessagingPort>,
    actions: Arc<dyn ModerationPort>,
    locks: KeyedLocks<(i64, i64)>,
}

impl VerificationEngine {
    pub fn new(
        store: Arc<dyn VerificationStore>,
        settings: Arc<dyn SettingsStore>,
        messenger: Arc<dyn MessagingPort>,
        actions: Arc<dyn ModerationPort>,
    ) -> Self {
        Self {
            store,
            settings,
            messenger,
            actions,
            locks: KeyedLocks::new(),
        }
    }

    /// Challenge a freshly joined member when verification is enabled.
    ///
    /// The caller filters out bots. The member is restricted first so the
    /// window between join and challenge cannot be used to post.
    pub async fn on_member_joined(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        display_name: &str,
    ) -> Result<()> {
        let settings = self.settings.verification_settings(chat_id).await?;
        if !settings.enabled {
            return Ok(());
        }

        self.actions.restrict_member(chat_id, user_id, None).await?;

        let ttl = std::time::Duration::from_secs(settings.timeout);
        let mut challenge = generate_challenge(&mut rand::thread_rng());
        self.store
            .put_challenge(chat_id, user_id, &challenge, ttl)
            .await?;

        let buttons = challenge
            .options
            .iter()
            .enumerate()
            .map(|(idx, label)| {
                InlineButton::new(
                    label.clone(),
                    format!("verify_{}_{}_{}", chat_id.0, user_id.0, idx),
                )
            })
            .collect();

        let text = format!(
            "🔐 <b>Verification Required</b>\n\n{}, please solve this to verify you're human:\n\n<b>{}</b>\n\nYou have {} minutes to complete this verification.",
            escape_html(display_name),
            escape_html(&challenge.question),
            settings.timeout / 60,
        );

        match self
            .messenger
            .send_inline_keyboard(chat_id, &text, InlineKeyboard::one_per_row(buttons))
            .await
        {
            Ok(sent) => {
                challenge.message = Some(sent);
                self.store
                    .put_challenge(chat_id, user_id, &challenge, ttl)
                    .await?;
            }
            Err(e) => warn!("failed to publish challenge for {user_id:?} in {chat_id:?}: {e}"),
        }

        info!("challenged {user_id:?} in {chat_id:?}");
        Ok(())
    }

    /// Grade a button press. `None` means no live challenge (expired or
    /// already resolved); the handler layer turns that into an
    /// "expired/not found" notice.
    pub async fn handle_attempt(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        selected: usize,
    ) -> Result<Option<AttemptOutcome>> {
        let _guard = self.locks.lock((chat_id.0, user_id.0)).await;

        let Some(challenge) = self.store.challenge(chat_id, user_id).await? else {
            return Ok(None);
        };

        let challenge_message = challenge.message;
        let (outcome, updated) = challenge.grade(selected);

        match outcome {
            AttemptOutcome::Verified => {
                self.actions.restore_member(chat_id, user_id).await?;
                self.store.delete_challenge(chat_id, user_id).await?;
                self.delete_challenge_message(challenge_message).await;
                if let Err(e) = self
                    .messenger
                    .send_html(chat_id, "✅ Verification successful! Welcome to the group!")
                    .await
                {
                    warn!("failed to announce verification success: {e}");
                }
                info!("verified {user_id:?} in {chat_id:?}");
            }
            AttemptOutcome::Expelled => {
                self.actions.ban_member(chat_id, user_id, None).await?;
                self.store.delete_challenge(chat_id, user_id).await?;
                self.delete_challenge_message(challenge_message).await;
                if let Err(e) = self
                    .messenger
                    .send_html(
                        chat_id,
                        "❌ Verification failed. User has been removed from the group.",
                    )
                    .await
                {
                    warn!("failed to announce verification failure: {e}");
                }
                info!("expelled {user_id:?} from {chat_id:?} after failed verification");
            }
            AttemptOutcome::Retry { remaining } => {
                let settings = self.settings.verification_settings(chat_id).await?;
                let updated = updated.expect("retry keeps the record");
                self.store
                    .put_challenge(
                        chat_id,
                        user_id,
                        &updated,
                        std::time::Duration::from_secs(settings.timeout),
                    )
                    .await?;
                if let Err(e) = self
                    .messenger
                    .send_html(
                        chat_id,
                        &format!("❌ Wrong answer. You have {remaining} attempts remaining."),
                    )
                    .await
                {
                    warn!("failed to announce remaining attempts: {e}");
                }
            }
        }

        Ok(Some(outcome))
    }

    async fn delete_challenge_message(&self, message: Option<MessageRef>) {
        if let Some(msg) = message {
            if let Err(e) = self.messenger.delete_message(msg).await {
                warn!("failed to delete challenge message: {e}");
            }
        }
    }
}
