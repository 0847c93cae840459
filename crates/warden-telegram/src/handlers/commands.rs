use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use teloxide::{prelude::*, types::Message};
use tracing::{error, warn};

use warden_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    format::{escape_html, truncate_text},
    messaging::types::{InlineButton, InlineKeyboard},
    settings::{GroupSettings, GroupSettingsPatch, VerificationSettings},
    Error,
};

use crate::router::AppState;

const MAX_WARNING_PRESETS: [u32; 4] = [1, 2, 3, 5];
const VERIFICATION_TIMEOUT_PRESETS: [u64; 3] = [300, 600, 1800];

pub async fn handle_command(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };

    let chat_id = ChatId(msg.chat.id.0);
    let user_id = UserId(user.id.0 as i64);
    let msg_ref = MessageRef {
        chat_id,
        message_id: MessageId(msg.id.0),
    };

    let text = msg.text().unwrap_or_default().to_string();
    let mut parts = text.split_whitespace();
    let command = parts
        .next()
        .unwrap_or_default()
        .split('@')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    let args: Vec<&str> = parts.collect();

    let result = match command.as_str() {
        "/start" => send(&state, chat_id, START_TEXT).await,
        "/help" => send(&state, chat_id, HELP_TEXT).await,
        "/rules" => send(&state, chat_id, RULES_TEXT).await,
        "/stats" => handle_stats(&state, chat_id).await,
        "/translate" => handle_translate(&state, &msg, chat_id, &args).await,
        "/summarize" => handle_summarize(&state, &msg, chat_id).await,
        "/sentiment" => handle_sentiment(&state, &msg, chat_id).await,
        "/poll" => handle_poll(&state, chat_id, user_id, &args).await,
        "/profile" => handle_profile(&state, chat_id, user_id, &user.first_name).await,

        // Admin commands silently no-op for everyone else; a failed admin
        // lookup counts as non-admin.
        "/settings" | "/verification" | "/warn" | "/unwarn" | "/kick" | "/ban" | "/mute"
        | "/setwelcome" | "/analytics" => {
            if state.actions.is_admin(chat_id, user_id).await.unwrap_or(false) {
                handle_admin_command(&state, &msg, chat_id, &command, &args).await
            } else {
                Ok(())
            }
        }

        _ => handle_unknown(&state, &msg, msg_ref, &text).await,
    };

    if let Err(e) = result {
        error!("command {command} failed: {e}");
    }
    Ok(())
}

async fn handle_admin_command(
    state: &AppState,
    msg: &Message,
    chat_id: ChatId,
    command: &str,
    args: &[&str],
) -> warden_core::Result<()> {
    match command {
        "/settings" => {
            let settings = state.settings.settings(chat_id).await?;
            let (text, keyboard) = settings_view(&settings);
            state
                .messenger
                .send_inline_keyboard(chat_id, &text, keyboard)
                .await?;
            Ok(())
        }
        "/verification" => {
            let settings = state.settings.verification_settings(chat_id).await?;
            let (text, keyboard) = verification_view(&settings);
            state
                .messenger
                .send_inline_keyboard(chat_id, &text, keyboard)
                .await?;
            Ok(())
        }
        "/warn" => {
            let Some(target) = reply_target(msg) else {
                send(state, chat_id, "Please reply to a message to warn the user.").await?;
                return Ok(());
            };
            let reason = join_or(args, "No reason specified");
            state
                .pipeline
                .manual_warning(chat_id, target.1, &target.0, &reason)
                .await
        }
        "/unwarn" => {
            let Some(target) = reply_target(msg) else {
                send(state, chat_id, "Please reply to a message to unwarn the user.").await?;
                return Ok(());
            };
            state.ledger.clear_warnings(chat_id, target.1).await?;
            send(
                state,
                chat_id,
                &format!("✅ Warnings cleared for {}.", escape_html(&target.0)),
            )
            .await
        }
        "/kick" => {
            let Some(target) = reply_target(msg) else {
                send(state, chat_id, "Please reply to a message to kick the user.").await?;
                return Ok(());
            };
            let reason = join_or(args, "No reason specified");
            // A short ban window lets the user rejoin later.
            state
                .actions
                .ban_member(chat_id, target.1, Some(Utc::now() + ChronoDuration::seconds(60)))
                .await?;
            send(
                state,
                chat_id,
                &format!(
                    "👢 {} has been kicked.\nReason: {}",
                    escape_html(&target.0),
                    escape_html(&reason)
                ),
            )
            .await
        }
        "/ban" => {
            let Some(target) = reply_target(msg) else {
                send(state, chat_id, "Please reply to a message to ban the user.").await?;
                return Ok(());
            };
            let reason = join_or(args, "No reason specified");
            state.actions.ban_member(chat_id, target.1, None).await?;
            send(
                state,
                chat_id,
                &format!(
                    "🚫 {} has been banned permanently.\nReason: {}",
                    escape_html(&target.0),
                    escape_html(&reason)
                ),
            )
            .await
        }
        "/mute" => {
            let Some(target) = reply_target(msg) else {
                send(state, chat_id, "Please reply to a message to mute the user.").await?;
                return Ok(());
            };
            let minutes = args
                .first()
                .and_then(|s| s.parse::<i64>().ok())
                .filter(|m| *m > 0)
                .unwrap_or(60);
            state
                .actions
                .restrict_member(
                    chat_id,
                    target.1,
                    Some(Utc::now() + ChronoDuration::minutes(minutes)),
                )
                .await?;
            send(
                state,
                chat_id,
                &format!(
                    "🔇 {} has been muted for {} minutes.",
                    escape_html(&target.0),
                    minutes
                ),
            )
            .await
        }
        "/setwelcome" => {
            if args.is_empty() {
                send(
                    state,
                    chat_id,
                    "Please provide a welcome message.\nExample: /setwelcome Welcome to our amazing group!",
                )
                .await?;
                return Ok(());
            }
            state
                .settings
                .update_settings(
                    chat_id,
                    GroupSettingsPatch {
                        welcome_message: Some(Some(args.join(" "))),
                        ..Default::default()
                    },
                )
                .await?;
            send(state, chat_id, "✅ Welcome message updated successfully!").await
        }
        "/analytics" => handle_analytics(state, chat_id).await,
        _ => Ok(()),
    }
}

async fn handle_stats(state: &AppState, chat_id: ChatId) -> warden_core::Result<()> {
    let stats = state.activity.group_stats(chat_id).await?;
    let text = format!(
        "📊 <b>Group Statistics</b>\n\n\
         👥 <b>Current Members:</b> {}\n\
         📈 <b>Total Joins:</b> {}\n\
         📉 <b>Total Leaves:</b> {}\n\
         💬 <b>Messages:</b> {}",
        stats.joins.saturating_sub(stats.leaves),
        stats.joins,
        stats.leaves,
        stats.messages
    );
    send(state, chat_id, &text).await
}

async fn handle_analytics(state: &AppState, chat_id: ChatId) -> warden_core::Result<()> {
    let stats = state.activity.group_stats(chat_id).await?;
    let flagged = state.activity.flagged_messages(chat_id).await?;
    let text = format!(
        "📊 <b>Group Analytics</b>\n\n\
         👥 <b>Members:</b> {}\n\
         📈 <b>Total Joins:</b> {}\n\
         📉 <b>Total Leaves:</b> {}\n\
         💬 <b>Messages:</b> {}\n\
         🚩 <b>Messages held for review:</b> {}",
        stats.joins.saturating_sub(stats.leaves),
        stats.joins,
        stats.leaves,
        stats.messages,
        flagged.len()
    );
    send(state, chat_id, &text).await
}

async fn handle_translate(
    state: &AppState,
    msg: &Message,
    chat_id: ChatId,
    args: &[&str],
) -> warden_core::Result<()> {
    let Some((reply_ref, text)) = reply_text(msg, chat_id) else {
        send(
            state,
            chat_id,
            "🌐 Reply to a message to translate it: /translate [language]",
        )
        .await?;
        return Ok(());
    };

    let target = args.first().copied().unwrap_or("en");
    let translation = state.classifier.translate(&text, target).await;
    state
        .messenger
        .reply_html(
            reply_ref,
            &format!(
                "🌐 <b>Translation ({}):</b>\n\n{}",
                escape_html(&target.to_uppercase()),
                escape_html(&translation)
            ),
        )
        .await?;
    Ok(())
}

async fn handle_summarize(
    state: &AppState,
    msg: &Message,
    chat_id: ChatId,
) -> warden_core::Result<()> {
    let Some((reply_ref, text)) = reply_text(msg, chat_id) else {
        send(state, chat_id, "📝 Reply to a message to summarize it.").await?;
        return Ok(());
    };

    let summary = state.classifier.summarize(&text, 100).await;
    state
        .messenger
        .reply_html(
            reply_ref,
            &format!("📝 <b>Summary:</b>\n\n{}", escape_html(&summary)),
        )
        .await?;
    Ok(())
}

async fn handle_sentiment(
    state: &AppState,
    msg: &Message,
    chat_id: ChatId,
) -> warden_core::Result<()> {
    use warden_core::classify::Sentiment;

    let Some((reply_ref, text)) = reply_text(msg, chat_id) else {
        send(state, chat_id, "😊 Reply to a message to analyze its sentiment.").await?;
        return Ok(());
    };

    let analysis = state.classifier.classify_sentiment(&text).await;
    let (emoji, label) = match analysis.sentiment {
        Sentiment::Positive => ("😊", "positive"),
        Sentiment::Negative => ("😞", "negative"),
        Sentiment::Neutral => ("😐", "neutral"),
    };
    let intensity = "█".repeat((analysis.score.abs() * 10.0).round() as usize);

    state
        .messenger
        .reply_html(
            reply_ref,
            &format!(
                "{emoji} <b>Sentiment Analysis:</b>\n\n\
                 <b>Sentiment:</b> {label}\n\
                 <b>Score:</b> {:.2}\n\
                 <b>Intensity:</b> {intensity}\n\
                 <b>Emotions:</b> {}",
                analysis.score,
                escape_html(&analysis.emotions.join(", "))
            ),
        )
        .await?;
    Ok(())
}

async fn handle_poll(
    state: &AppState,
    chat_id: ChatId,
    user_id: UserId,
    args: &[&str],
) -> warden_core::Result<()> {
    if args.len() < 3 {
        send(
            state,
            chat_id,
            "📊 <b>Create a Poll</b>\n\nUsage: /poll Question? Option1 Option2 Option3",
        )
        .await?;
        return Ok(());
    }

    let question = args[0];
    let options: Vec<String> = args[1..].iter().map(|s| s.to_string()).collect();

    match state
        .polls
        .create(chat_id, user_id, question, options, true, false, None)
        .await
    {
        Ok(_) => Ok(()),
        Err(Error::Validation(_)) => {
            send(state, chat_id, "❌ Please provide 2-10 options for the poll.").await
        }
        Err(e) => Err(e),
    }
}

async fn handle_profile(
    state: &AppState,
    chat_id: ChatId,
    user_id: UserId,
    name: &str,
) -> warden_core::Result<()> {
    let warnings = state.ledger.warning_count(chat_id, user_id).await?;
    let messages = state.activity.message_count(chat_id, user_id).await?;
    let member_since = state
        .activity
        .joined_at(chat_id, user_id)
        .await?
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let text = format!(
        "👤 <b>Your Profile</b>\n\n\
         <b>Name:</b> {}\n\
         <b>User ID:</b> {}\n\
         <b>Warnings:</b> {}\n\
         <b>Messages:</b> {}\n\
         <b>Member since:</b> {}",
        escape_html(name),
        user_id.0,
        warnings,
        messages,
        member_since
    );
    send(state, chat_id, &text).await
}

async fn handle_unknown(
    state: &AppState,
    msg: &Message,
    msg_ref: MessageRef,
    text: &str,
) -> warden_core::Result<()> {
    let context = format!(
        "Group management bot in Telegram group \"{}\"",
        msg.chat.title().unwrap_or("unknown")
    );
    let response = state.classifier.respond(&context, text).await;
    state
        .messenger
        .reply_html(
            msg_ref,
            &format!(
                "🤖 {}",
                escape_html(&truncate_text(&response, state.cfg.telegram_safe_limit))
            ),
        )
        .await?;
    Ok(())
}

/// `(display_name, user_id)` of the user whose message the command replied to.
fn reply_target(msg: &Message) -> Option<(String, UserId)> {
    let from = msg.reply_to_message()?.from()?;
    Some((from.first_name.clone(), UserId(from.id.0 as i64)))
}

fn reply_text(msg: &Message, chat_id: ChatId) -> Option<(MessageRef, String)> {
    let replied = msg.reply_to_message()?;
    let text = replied.text()?;
    Some((
        MessageRef {
            chat_id,
            message_id: MessageId(replied.id.0),
        },
        text.to_string(),
    ))
}

fn join_or(args: &[&str], fallback: &str) -> String {
    if args.is_empty() {
        fallback.to_string()
    } else {
        args.join(" ")
    }
}

async fn send(state: &AppState, chat_id: ChatId, html: &str) -> warden_core::Result<()> {
    if let Err(e) = state.messenger.send_html(chat_id, html).await {
        warn!("failed to send command reply: {e}");
    }
    Ok(())
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "✅"
    } else {
        "❌"
    }
}

/// Settings panel; also re-rendered by the toggle callbacks.
pub(crate) fn settings_view(settings: &GroupSettings) -> (String, InlineKeyboard) {
    let keyboard = InlineKeyboard::new(vec![
        vec![
            InlineButton::new(
                format!("Welcome: {}", on_off(settings.welcome_enabled)),
                "settings_welcome",
            ),
            InlineButton::new(
                format!("Anti-spam: {}", on_off(settings.anti_spam_enabled)),
                "settings_antispam",
            ),
        ],
        vec![
            InlineButton::new(
                format!("AI Moderation: {}", on_off(settings.ai_moderation_enabled)),
                "settings_ai",
            ),
            InlineButton::new(
                format!("Auto-translate: {}", on_off(settings.auto_translate)),
                "settings_translate",
            ),
        ],
        vec![
            InlineButton::new(
                format!("Media Filter: {}", on_off(settings.media_filtering)),
                "settings_media",
            ),
            InlineButton::new(
                format!("Forward Filter: {}", on_off(settings.forward_filtering)),
                "settings_forward",
            ),
        ],
        vec![
            InlineButton::new(
                format!("Sentiment Analysis: {}", on_off(settings.sentiment_analysis)),
                "settings_sentiment",
            ),
            InlineButton::new(
                format!("Mute New Users: {}", on_off(settings.mute_new_users)),
                "settings_mutenew",
            ),
        ],
        vec![InlineButton::new(
            format!("Max Warnings: {}", settings.max_warnings),
            "settings_maxwarnings",
        )],
    ]);

    (
        "⚙️ <b>Group Settings</b>\n\nClick buttons to toggle settings:".to_string(),
        keyboard,
    )
}

pub(crate) fn next_max_warnings(current: u32) -> u32 {
    let idx = MAX_WARNING_PRESETS.iter().position(|&v| v == current);
    match idx {
        Some(i) => MAX_WARNING_PRESETS[(i + 1) % MAX_WARNING_PRESETS.len()],
        None => MAX_WARNING_PRESETS[0],
    }
}

pub(crate) fn verification_view(settings: &VerificationSettings) -> (String, InlineKeyboard) {
    let keyboard = InlineKeyboard::new(vec![
        vec![InlineButton::new(
            format!("Verification: {}", on_off(settings.enabled)),
            "verification_toggle",
        )],
        vec![InlineButton::new(
            format!("Timeout: {}min", settings.timeout / 60),
            "verification_timeout",
        )],
    ]);

    (
        "🔐 <b>Verification Settings</b>\n\nConfigure new member verification:".to_string(),
        keyboard,
    )
}

pub(crate) fn next_verification_timeout(current: u64) -> u64 {
    let idx = VERIFICATION_TIMEOUT_PRESETS.iter().position(|&v| v == current);
    match idx {
        Some(i) => VERIFICATION_TIMEOUT_PRESETS[(i + 1) % VERIFICATION_TIMEOUT_PRESETS.len()],
        None => VERIFICATION_TIMEOUT_PRESETS[0],
    }
}

const START_TEXT: &str = "\
🤖 <b>Group Warden</b>

I keep this group tidy:

🛡️ <b>Moderation</b>
• AI spam detection and rule-based checks
• Warning escalation with automatic bans
• New-member verification

🌐 <b>Language</b>
• /translate, /summarize, /sentiment

🎮 <b>Interactive</b>
• /poll for quick votes
• /profile for your standing

Admins: /settings, /verification, /analytics";

const HELP_TEXT: &str = "\
📋 <b>Commands</b>

🤖 <b>AI features:</b>
/translate [lang] - translate a replied-to message
/summarize - summarize a replied-to message
/sentiment - analyze a replied-to message

🎮 <b>Interactive:</b>
/poll Question? Option1 Option2 - create a poll
/profile - your activity and warnings

📊 <b>Information:</b>
/help - this help
/rules - group rules
/stats - group statistics

👑 <b>Admin:</b>
/settings - feature toggles
/verification - new-member verification
/warn, /unwarn, /kick, /ban, /mute - moderation
/setwelcome - custom welcome message
/analytics - detailed statistics";

const RULES_TEXT: &str = "\
📋 <b>Group Rules</b>

1. 🤝 Be respectful to all members
2. 🚫 No spam, advertising, or self-promotion
3. 🎯 Stay on topic and relevant
4. 💬 No offensive language or harassment
5. 🔗 No unauthorized links or forwarding
6. 📷 Media sharing may require permission

<b>Violations escalate:</b> ⚠️ Warnings → 🚫 Ban";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_warning_presets_cycle() {
        assert_eq!(next_max_warnings(1), 2);
        assert_eq!(next_max_warnings(3), 5);
        assert_eq!(next_max_warnings(5), 1);
        // Off-preset values restart the cycle.
        assert_eq!(next_max_warnings(7), 1);
    }

    #[test]
    fn verification_timeout_presets_cycle() {
        assert_eq!(next_verification_timeout(300), 600);
        assert_eq!(next_verification_timeout(1800), 300);
        assert_eq!(next_verification_timeout(123), 300);
    }

    #[test]
    fn settings_view_reflects_toggles() {
        let (text, keyboard) = settings_view(&GroupSettings::default());
        assert!(text.contains("Group Settings"));
        assert_eq!(keyboard.rows.len(), 5);
        // Anti-spam defaults on, sentiment defaults off.
        assert!(keyboard.rows[0][1].label.contains('✅'));
        assert!(keyboard.rows[3][0].label.contains('❌'));
    }
}
