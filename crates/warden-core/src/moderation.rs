//! Per-message moderation pipeline and group lifecycle accounting.
//!
//! Checks run in a fixed order and stop at the first violation that triggers
//! removal + warning: AI spam, rule-based spam, then the non-blocking
//! auto-translate and sentiment passes. Media and forwarded messages are
//! gated by a coarse trust level instead.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::{info, warn};

use crate::{
    classify::{ClassificationClient, Sentiment, TRANSLATION_FAILED},
    domain::{ChatId, MessageRef, UserId},
    format::escape_html,
    messaging::{
        port::{MessagingPort, ModerationPort},
        types::{IncomingMessage, InlineButton, InlineKeyboard, MessageContent},
    },
    settings::GroupSettings,
    storage::{ActivityLog, FlaggedMessage, SettingsStore, WarningLedger},
    warnings::{self, Escalation},
    Result,
};

/// Trust level required to post media.
const MEDIA_TRUST_LEVEL: u8 = 2;
/// Trust level required to post bare forwards.
const FORWARD_TRUST_LEVEL: u8 = 3;
/// AI spam verdicts below this confidence are ignored.
const AI_SPAM_CONFIDENCE: f32 = 0.7;
/// Sentiment scores below this are kept for admin review.
const NEGATIVE_SENTIMENT_FLOOR: f32 = -0.7;

#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    pub warning_ttl: Duration,
    pub recent_history_cap: usize,
    pub recent_history_ttl: Duration,
    pub new_user_mute: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            warning_ttl: Duration::from_secs(86_400),
            recent_history_cap: 10,
            recent_history_ttl: Duration::from_secs(300),
            new_user_mute: Duration::from_secs(300),
        }
    }
}

pub struct ModerationPipeline {
    settings: Arc<dyn SettingsStore>,
    ledger: Arc<dyn WarningLedger>,
    activity: Arc<dyn ActivityLog>,
    classifier: Arc<ClassificationClient>,
    messenger: Arc<dyn MessagingPort>,
    actions: Arc<dyn ModerationPort>,
    cfg: PipelineConfig,
}

impl ModerationPipeline {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        ledger: Arc<dyn WarningLedger>,
        activity: Arc<dyn ActivityLog>,
        classifier: Arc<ClassificationClient>,
        messenger: Arc<dyn MessagingPort>,
        actions: Arc<dyn ModerationPort>,
        cfg: PipelineConfig,
    ) -> Self {
        Self {
            settings,
            ledger,
            activity,
            classifier,
            messenger,
            actions,
            cfg,
        }
    }

    /// Run the checks for one group message, then record activity stats.
    pub async fn handle_message(&self, msg: &IncomingMessage) -> Result<()> {
        let settings = self.settings.settings(msg.chat_id).await?;

        match &msg.content {
            MessageContent::Text(text) => self.handle_text(msg, text, &settings).await?,
            MessageContent::Media => self.handle_media(msg, &settings).await?,
            MessageContent::Forward => self.handle_forward(msg, &settings).await?,
            MessageContent::Other => {}
        }

        self.activity
            .record_message(msg.chat_id, msg.user_id, Utc::now())
            .await?;
        Ok(())
    }

    async fn handle_text(
        &self,
        msg: &IncomingMessage,
        text: &str,
        settings: &GroupSettings,
    ) -> Result<()> {
        let msg_ref = MessageRef {
            chat_id: msg.chat_id,
            message_id: msg.message_id,
        };

        // 1. AI spam check. Fallback verdicts have confidence 0 and never fire.
        if settings.ai_moderation_enabled {
            let verdict = self.classifier.classify_spam(text).await;
            if verdict.is_spam && verdict.confidence > AI_SPAM_CONFIDENCE {
                self.delete_best_effort(msg_ref).await;
                let count = self
                    .ledger
                    .add_warning(
                        msg.chat_id,
                        msg.user_id,
                        &format!("AI detected spam: {}", verdict.reason),
                        self.cfg.warning_ttl,
                    )
                    .await?;
                info!(
                    "ai flagged message {:?} from {:?} (confidence {:.2})",
                    msg.message_id, msg.user_id, verdict.confidence
                );
                self.escalate(
                    msg.chat_id,
                    msg.user_id,
                    count,
                    settings.max_warnings,
                    &format!(
                        "🤖 AI detected spam from {}. Message removed.\nReason: {}\n\n⚠️ Warning {}/{}.",
                        escape_html(&msg.sender_name),
                        escape_html(&verdict.reason),
                        count,
                        settings.max_warnings
                    ),
                )
                .await?;
                return Ok(());
            }
        }

        // 2. Rule-based spam check.
        if settings.anti_spam_enabled {
            let recent = self
                .activity
                .recent_messages(msg.chat_id, msg.user_id, 5)
                .await?;
            if is_rule_spam(text, settings, &recent) {
                self.delete_best_effort(msg_ref).await;
                let count = self
                    .ledger
                    .add_warning(
                        msg.chat_id,
                        msg.user_id,
                        "Spam detected",
                        self.cfg.warning_ttl,
                    )
                    .await?;
                info!("rules flagged message {:?} from {:?}", msg.message_id, msg.user_id);
                self.escalate(
                    msg.chat_id,
                    msg.user_id,
                    count,
                    settings.max_warnings,
                    &format!(
                        "⚠️ Warning {}/{}. Reason: Spam detected.",
                        count, settings.max_warnings
                    ),
                )
                .await?;
                return Ok(());
            }

            self.activity
                .push_recent_message(
                    msg.chat_id,
                    msg.user_id,
                    text,
                    self.cfg.recent_history_cap,
                    self.cfg.recent_history_ttl,
                )
                .await?;
        }

        // 3. Auto-translate; never blocks the remaining checks.
        if settings.auto_translate && settings.target_language != "en" {
            let translation = self
                .classifier
                .translate(text, &settings.target_language)
                .await;
            if translation != text && translation != TRANSLATION_FAILED {
                if let Err(e) = self
                    .messenger
                    .reply_html(
                        msg_ref,
                        &format!("🌐 <b>Translation:</b>\n{}", escape_html(&translation)),
                    )
                    .await
                {
                    warn!("failed to post translation: {e}");
                }
            }
        }

        // 4. Sentiment: no user-facing action, admin review log only.
        if settings.sentiment_analysis {
            let sentiment = self.classifier.classify_sentiment(text).await;
            if sentiment.sentiment == Sentiment::Negative
                && sentiment.score < NEGATIVE_SENTIMENT_FLOOR
            {
                self.activity
                    .record_flagged(
                        msg.chat_id,
                        &FlaggedMessage {
                            user_id: msg.user_id,
                            message_id: msg.message_id,
                            text: text.to_string(),
                            score: sentiment.score,
                            timestamp: Utc::now(),
                        },
                    )
                    .await?;
            }
        }

        Ok(())
    }

    async fn handle_media(&self, msg: &IncomingMessage, settings: &GroupSettings) -> Result<()> {
        if !settings.media_filtering {
            return Ok(());
        }

        if self.user_trust_level(msg.chat_id, msg.user_id).await? < MEDIA_TRUST_LEVEL {
            self.delete_best_effort(MessageRef {
                chat_id: msg.chat_id,
                message_id: msg.message_id,
            })
            .await;
            if let Err(e) = self
                .messenger
                .send_html(
                    msg.chat_id,
                    &format!(
                        "📷 {}, you need permission to send media. Please request access from admins.",
                        escape_html(&msg.sender_name)
                    ),
                )
                .await
            {
                warn!("failed to send media notice: {e}");
            }
        }
        Ok(())
    }

    async fn handle_forward(&self, msg: &IncomingMessage, settings: &GroupSettings) -> Result<()> {
        if !settings.forward_filtering {
            return Ok(());
        }

        if self.user_trust_level(msg.chat_id, msg.user_id).await? < FORWARD_TRUST_LEVEL {
            self.delete_best_effort(MessageRef {
                chat_id: msg.chat_id,
                message_id: msg.message_id,
            })
            .await;
            if let Err(e) = self
                .messenger
                .send_html(
                    msg.chat_id,
                    &format!(
                        "↩️ {}, forwarded messages are restricted in this group.",
                        escape_html(&msg.sender_name)
                    ),
                )
                .await
            {
                warn!("failed to send forward notice: {e}");
            }
        }
        Ok(())
    }

    /// Welcome, optional temp-mute, and stats for a fresh member. Bots get
    /// no welcome and no mute. The caller hands verification separately and
    /// passes the join service message at most once per update.
    pub async fn handle_member_joined(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        is_bot: bool,
        display_name: &str,
        chat_title: &str,
        service_message: Option<MessageRef>,
    ) -> Result<()> {
        let settings = self.settings.settings(chat_id).await?;

        if !is_bot {
            if settings.welcome_enabled {
                let text = settings.welcome_message.clone().unwrap_or_else(|| {
                    format!(
                        "🎉 Welcome to {}, {}!\n\nPlease read our rules and enjoy your stay!",
                        escape_html(chat_title),
                        escape_html(display_name)
                    )
                });
                if let Err(e) = self.messenger.send_html(chat_id, &text).await {
                    warn!("failed to send welcome: {e}");
                }
            }

            if settings.mute_new_users {
                let until = Utc::now()
                    + chrono::Duration::from_std(self.cfg.new_user_mute)
                        .unwrap_or_else(|_| chrono::Duration::minutes(5));
                if let Err(e) = self
                    .actions
                    .restrict_member(chat_id, user_id, Some(until))
                    .await
                {
                    warn!("failed to mute new member {user_id:?}: {e}");
                } else {
                    let minutes = self.cfg.new_user_mute.as_secs() / 60;
                    let keyboard = InlineKeyboard::one_per_row(vec![InlineButton::new(
                        "🔓 Unmute Me",
                        format!("unmute_{}_{}", chat_id.0, user_id.0),
                    )]);
                    if let Err(e) = self
                        .messenger
                        .send_inline_keyboard(
                            chat_id,
                            &format!(
                                "🔇 {}, you've been temporarily muted for {} minutes. Click the button below when you're ready to participate!",
                                escape_html(display_name),
                                minutes
                            ),
                            keyboard,
                        )
                        .await
                    {
                        warn!("failed to send mute notice: {e}");
                    }
                }
            }

            self.activity
                .record_join(chat_id, user_id, Utc::now())
                .await?;
        }

        if settings.delete_service_messages {
            if let Some(service) = service_message {
                self.delete_best_effort(service).await;
            }
        }
        Ok(())
    }

    pub async fn handle_member_left(
        &self,
        chat_id: ChatId,
        service_message: MessageRef,
    ) -> Result<()> {
        let settings = self.settings.settings(chat_id).await?;
        self.activity.record_leave(chat_id).await?;
        if settings.delete_service_messages {
            self.delete_best_effort(service_message).await;
        }
        Ok(())
    }

    /// An admin-issued warning; shares the ledger and the escalation path
    /// with the automatic checks.
    pub async fn manual_warning(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        display_name: &str,
        reason: &str,
    ) -> Result<()> {
        let settings = self.settings.settings(chat_id).await?;
        let count = self
            .ledger
            .add_warning(chat_id, user_id, reason, self.cfg.warning_ttl)
            .await?;
        self.escalate(
            chat_id,
            user_id,
            count,
            settings.max_warnings,
            &format!(
                "⚠️ Warning {}/{} for {}.\nReason: {}",
                count,
                settings.max_warnings,
                escape_html(display_name),
                escape_html(reason)
            ),
        )
        .await
    }

    /// 1..3 from join age, message count, and warning history.
    pub async fn user_trust_level(&self, chat_id: ChatId, user_id: UserId) -> Result<u8> {
        let joined = self.activity.joined_at(chat_id, user_id).await?;
        let messages = self.activity.message_count(chat_id, user_id).await?;
        let warnings = self.ledger.warning_count(chat_id, user_id).await?;
        Ok(trust_level(joined, Utc::now(), messages, warnings))
    }

    async fn escalate(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        count: u32,
        max_warnings: u32,
        warn_html: &str,
    ) -> Result<()> {
        match warnings::evaluate(count, max_warnings) {
            Escalation::Ban => {
                if let Err(e) = self.actions.ban_member(chat_id, user_id, None).await {
                    warn!("failed to ban {user_id:?} in {chat_id:?}: {e}");
                }
                self.ledger.clear_warnings(chat_id, user_id).await?;
                if let Err(e) = self
                    .messenger
                    .send_html(
                        chat_id,
                        "🚫 User has been banned for repeated spam violations.",
                    )
                    .await
                {
                    warn!("failed to announce ban: {e}");
                }
                info!("banned {user_id:?} in {chat_id:?} after {count} warnings");
            }
            Escalation::Warn { .. } => {
                if let Err(e) = self.messenger.send_html(chat_id, warn_html).await {
                    warn!("failed to announce warning: {e}");
                }
            }
        }
        Ok(())
    }

    async fn delete_best_effort(&self, msg: MessageRef) {
        if let Err(e) = self.messenger.delete_message(msg).await {
            warn!("failed to delete message {:?}: {e}", msg.message_id);
        }
    }
}

/// Rule-based spam verdict over one message.
///
/// `recent` is the user's stored history, newest first; only the last 5
/// entries participate in the repetition check.
pub fn is_rule_spam(text: &str, settings: &GroupSettings, recent: &[String]) -> bool {
    let lower = text.to_lowercase();

    for word in &settings.banned_words {
        if lower.contains(&word.to_lowercase()) {
            return true;
        }
    }

    for url in url_regex().find_iter(&lower) {
        let allowed = settings
            .allowed_links
            .iter()
            .any(|a| url.as_str().contains(&a.to_lowercase()));
        if !allowed {
            return true;
        }
    }

    let total = text.chars().count();
    if total > 10 && caps_ratio(text) > 0.7 {
        return true;
    }

    let repeats = recent
        .iter()
        .take(5)
        .filter(|prior| prior.as_str() == text)
        .count();
    repeats >= 3
}

/// Share of uppercase letters among all characters.
pub fn caps_ratio(text: &str) -> f32 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let upper = text.chars().filter(|c| c.is_uppercase()).count();
    upper as f32 / total as f32
}

/// Coarse trust level: 1 = new/flagged, 2 = regular, 3 = trusted.
pub fn trust_level(
    joined_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    message_count: u64,
    warning_count: u32,
) -> u8 {
    let Some(joined) = joined_at else {
        return 1;
    };

    if warning_count > 0 {
        return 1;
    }

    let days_since_join = (now - joined).num_days();
    if days_since_join < 1 || message_count < 10 {
        return 1;
    }
    if days_since_join < 7 || message_count < 50 {
        return 2;
    }
    3
}

fn url_regex() -> &'static Regex {
    static URL_RE: OnceLock<Regex> = OnceLock::new();
    URL_RE.get_or_init(|| Regex::new(r"https?://\S+").expect("static regex"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::MessageId,
        settings::GroupSettingsPatch,
        storage::memory::MemoryStore,
        testsupport::{CannedInference, FailingInference, RecordingActions, RecordingMessenger},
    };

    const CHAT: ChatId = ChatId(-1001);
    const USER: UserId = UserId(42);

    struct Fixture {
        store: Arc<MemoryStore>,
        messenger: Arc<RecordingMessenger>,
        actions: Arc<RecordingActions>,
        pipeline: ModerationPipeline,
    }

    fn fixture_with(inference: Arc<dyn crate::classify::InferenceClient>) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let actions = Arc::new(RecordingActions::new());
        let pipeline = ModerationPipeline::new(
            store.clone(),
            store.clone(),
            store.clone(),
            Arc::new(ClassificationClient::new(inference)),
            messenger.clone(),
            actions.clone(),
            PipelineConfig::default(),
        );
        Fixture {
            store,
            messenger,
            actions,
            pipeline,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(FailingInference))
    }

    fn text_message(text: &str) -> IncomingMessage {
        IncomingMessage {
            chat_id: CHAT,
            user_id: USER,
            message_id: MessageId(10),
            sender_name: "Sam".to_string(),
            content: MessageContent::Text(text.to_string()),
        }
    }

    #[tokio::test]
    async fn ai_verdict_above_threshold_deletes_and_warns() {
        let f = fixture_with(Arc::new(CannedInference(
            "{\"isSpam\": true, \"confidence\": 0.95, \"reason\": \"pill ads\"}".to_string(),
        )));

        f.pipeline.handle_message(&text_message("cheap pills")).await.unwrap();

        assert_eq!(f.messenger.deleted.lock().await.len(), 1);
        assert_eq!(f.store.warning_count(CHAT, USER).await.unwrap(), 1);
        let texts = f.messenger.sent_texts().await;
        assert!(texts.iter().any(|t| t.contains("pill ads")));
    }

    #[tokio::test]
    async fn ai_verdict_below_threshold_is_ignored() {
        let f = fixture_with(Arc::new(CannedInference(
            "{\"isSpam\": true, \"confidence\": 0.5, \"reason\": \"meh\"}".to_string(),
        )));

        f.pipeline.handle_message(&text_message("hello there")).await.unwrap();

        assert!(f.messenger.deleted.lock().await.is_empty());
        assert_eq!(f.store.warning_count(CHAT, USER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn classifier_outage_never_punishes() {
        let f = fixture(); // failing inference
        f.pipeline.handle_message(&text_message("hello there")).await.unwrap();

        assert!(f.messenger.deleted.lock().await.is_empty());
        assert_eq!(f.store.warning_count(CHAT, USER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn banned_word_is_spam() {
        let f = fixture();
        f.pipeline
            .handle_message(&text_message("free SCAM offer"))
            .await
            .unwrap();

        assert_eq!(f.messenger.deleted.lock().await.len(), 1);
        assert_eq!(f.store.warning_count(CHAT, USER).await.unwrap(), 1);
        let texts = f.messenger.sent_texts().await;
        assert!(texts.iter().any(|t| t.contains("Warning 1/3")));
    }

    #[tokio::test]
    async fn shouting_is_spam_but_short_shouting_is_not() {
        let f = fixture();
        f.pipeline
            .handle_message(&text_message("BUY GOLD RIGHT NOW!!"))
            .await
            .unwrap();
        assert_eq!(f.store.warning_count(CHAT, USER).await.unwrap(), 1);

        let f = fixture();
        f.pipeline.handle_message(&text_message("WOW")).await.unwrap();
        assert_eq!(f.store.warning_count(CHAT, USER).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn allowed_links_pass_unknown_links_do_not() {
        let f = fixture();
        f.store
            .update_settings(
                CHAT,
                GroupSettingsPatch {
                    allowed_links: Some(vec!["example.com".to_string()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        f.pipeline
            .handle_message(&text_message("see https://example.com/page"))
            .await
            .unwrap();
        assert_eq!(f.store.warning_count(CHAT, USER).await.unwrap(), 0);

        f.pipeline
            .handle_message(&text_message("see https://evil.test/page"))
            .await
            .unwrap();
        assert_eq!(f.store.warning_count(CHAT, USER).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn repeated_messages_become_spam() {
        let f = fixture();
        for _ in 0..3 {
            f.pipeline
                .handle_message(&text_message("join my channel"))
                .await
                .unwrap();
        }
        assert_eq!(f.store.warning_count(CHAT, USER).await.unwrap(), 0);

        // Three identical copies are now stored; the fourth trips the check.
        f.pipeline
            .handle_message(&text_message("join my channel"))
            .await
            .unwrap();
        assert_eq!(f.store.warning_count(CHAT, USER).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn third_warning_bans_and_clears_ledger() {
        let f = fixture();
        for _ in 0..3 {
            f.pipeline
                .handle_message(&text_message("totally a scam"))
                .await
                .unwrap();
        }

        assert_eq!(f.actions.banned.lock().await.len(), 1);
        assert_eq!(f.store.warning_count(CHAT, USER).await.unwrap(), 0);
        let texts = f.messenger.sent_texts().await;
        assert!(texts.iter().any(|t| t.contains("banned")));
    }

    #[tokio::test]
    async fn translation_is_posted_as_reply() {
        let f = fixture_with(Arc::new(CannedInference("hola".to_string())));
        f.store
            .update_settings(
                CHAT,
                GroupSettingsPatch {
                    ai_moderation_enabled: Some(false),
                    anti_spam_enabled: Some(false),
                    auto_translate: Some(true),
                    target_language: Some("es".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        f.pipeline.handle_message(&text_message("hello")).await.unwrap();

        let texts = f.messenger.sent_texts().await;
        assert!(texts.iter().any(|t| t.contains("Translation") && t.contains("hola")));
    }

    #[tokio::test]
    async fn failed_translation_stays_silent() {
        let f = fixture();
        f.store
            .update_settings(
                CHAT,
                GroupSettingsPatch {
                    ai_moderation_enabled: Some(false),
                    anti_spam_enabled: Some(false),
                    auto_translate: Some(true),
                    target_language: Some("es".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        f.pipeline.handle_message(&text_message("hello")).await.unwrap();
        assert!(f.messenger.sent_texts().await.is_empty());
    }

    #[tokio::test]
    async fn strongly_negative_sentiment_is_kept_for_review() {
        let f = fixture_with(Arc::new(CannedInference(
            "{\"sentiment\": \"negative\", \"score\": -0.9, \"emotions\": [\"anger\"]}".to_string(),
        )));
        f.store
            .update_settings(
                CHAT,
                GroupSettingsPatch {
                    ai_moderation_enabled: Some(false),
                    anti_spam_enabled: Some(false),
                    sentiment_analysis: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        f.pipeline
            .handle_message(&text_message("I hate all of this"))
            .await
            .unwrap();

        let flagged = f.store.flagged_messages(CHAT).await.unwrap();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].user_id, USER);
        // No user-facing action.
        assert!(f.messenger.deleted.lock().await.is_empty());
    }

    #[tokio::test]
    async fn media_from_new_user_is_removed_when_filtering() {
        let f = fixture();
        f.store
            .update_settings(
                CHAT,
                GroupSettingsPatch {
                    media_filtering: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let msg = IncomingMessage {
            content: MessageContent::Media,
            ..text_message("")
        };
        f.pipeline.handle_message(&msg).await.unwrap();

        assert_eq!(f.messenger.deleted.lock().await.len(), 1);
        let texts = f.messenger.sent_texts().await;
        assert!(texts.iter().any(|t| t.contains("permission to send media")));
    }

    #[tokio::test]
    async fn message_stats_recorded_for_clean_messages() {
        let f = fixture();
        f.pipeline.handle_message(&text_message("hello")).await.unwrap();
        f.pipeline.handle_message(&text_message("again")).await.unwrap();

        assert_eq!(f.store.message_count(CHAT, USER).await.unwrap(), 2);
        assert_eq!(f.store.group_stats(CHAT).await.unwrap().messages, 2);
    }

    #[tokio::test]
    async fn member_join_welcomes_mutes_and_counts() {
        let f = fixture();
        f.store
            .update_settings(
                CHAT,
                GroupSettingsPatch {
                    mute_new_users: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let service = MessageRef {
            chat_id: CHAT,
            message_id: MessageId(5),
        };
        f.pipeline
            .handle_member_joined(CHAT, USER, false, "Sam", "Rustaceans", Some(service))
            .await
            .unwrap();

        assert_eq!(f.store.group_stats(CHAT).await.unwrap().joins, 1);
        assert_eq!(f.actions.restricted.lock().await.len(), 1);
        assert!(f.actions.restricted.lock().await[0].2.is_some());
        // Welcome + service message cleanup.
        assert!(f.messenger.sent_texts().await.iter().any(|t| t.contains("Welcome")));
        assert_eq!(f.messenger.deleted.lock().await.len(), 1);
        // Unmute button offered.
        assert_eq!(f.messenger.keyboards.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn bots_are_not_welcomed_or_muted() {
        let f = fixture();
        let service = MessageRef {
            chat_id: CHAT,
            message_id: MessageId(5),
        };
        f.pipeline
            .handle_member_joined(CHAT, USER, true, "SpamBot", "Rustaceans", Some(service))
            .await
            .unwrap();

        assert_eq!(f.store.group_stats(CHAT).await.unwrap().joins, 0);
        assert!(f.messenger.sent_texts().await.is_empty());
        // Service message still deleted.
        assert_eq!(f.messenger.deleted.lock().await.len(), 1);
    }

    #[test]
    fn caps_ratio_counts_all_characters() {
        assert!(caps_ratio("HELLO THERE FRIENDS") > 0.7);
        assert!(caps_ratio("Hello there friends") < 0.2);
        assert_eq!(caps_ratio(""), 0.0);
    }

    #[test]
    fn trust_levels_follow_thresholds() {
        let now = Utc::now();
        let days = |d: i64| Some(now - chrono::Duration::days(d));

        assert_eq!(trust_level(None, now, 1000, 0), 1);
        assert_eq!(trust_level(days(30), now, 1000, 1), 1);
        assert_eq!(trust_level(days(0), now, 1000, 0), 1);
        assert_eq!(trust_level(days(30), now, 5, 0), 1);
        assert_eq!(trust_level(days(3), now, 100, 0), 2);
        assert_eq!(trust_level(days(30), now, 30, 0), 2);
        assert_eq!(trust_level(days(30), now, 100, 0), 3);
    }

    #[test]
    fn rule_spam_checks_compose() {
        let settings = GroupSettings::default();
        assert!(is_rule_spam("buy this spam", &settings, &[]));
        assert!(!is_rule_spam("a normal message", &settings, &[]));

        let repeated = vec!["hey".to_string(); 3];
        assert!(is_rule_spam("hey", &settings, &repeated));
        let few = vec!["hey".to_string(); 2];
        assert!(!is_rule_spam("hey", &settings, &few));
    }
}
