use std::sync::Arc;

use teloxide::{prelude::*, types::CallbackQuery};
use tracing::{error, warn};

use warden_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    polls::format_poll_results,
    settings::{GroupSettingsPatch, VerificationSettingsPatch},
    verification::AttemptOutcome,
};

use super::commands::{
    next_max_warnings, next_verification_timeout, settings_view, verification_view,
};
use crate::router::AppState;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    let callback_id = q.id.clone();
    let data = q.data.clone().unwrap_or_default();
    let from = UserId(q.from.id.0 as i64);

    let Some(message) = q.message.as_ref() else {
        answer(&state, &callback_id, None).await;
        return Ok(());
    };
    let chat_id = ChatId(message.chat.id.0);
    let msg_ref = MessageRef {
        chat_id,
        message_id: MessageId(message.id.0),
    };

    if data.is_empty() {
        answer(&state, &callback_id, None).await;
        return Ok(());
    }

    // Verification attempt: verify_{chat}_{user}_{option}
    if let Some(rest) = data.strip_prefix("verify_") {
        let parts: Vec<&str> = rest.split('_').collect();
        let parsed = match parts.as_slice() {
            [chat, user, option] => chat
                .parse::<i64>()
                .ok()
                .zip(user.parse::<i64>().ok())
                .zip(option.parse::<usize>().ok()),
            _ => None,
        };
        let Some(((chat, user), option)) = parsed else {
            answer(&state, &callback_id, Some("Invalid callback data")).await;
            return Ok(());
        };

        if from.0 != user {
            answer(&state, &callback_id, Some("This verification isn't for you.")).await;
            return Ok(());
        }

        let text = match state
            .verification
            .handle_attempt(ChatId(chat), UserId(user), option)
            .await
        {
            Ok(Some(AttemptOutcome::Verified)) => "✅ Verification successful!",
            Ok(Some(AttemptOutcome::Retry { .. })) => "❌ Wrong answer, try again!",
            Ok(Some(AttemptOutcome::Expelled)) => "❌ Verification failed.",
            Ok(None) => "Challenge expired or not found.",
            Err(e) => {
                error!("verification attempt failed: {e}");
                "Something went wrong, try again."
            }
        };
        answer(&state, &callback_id, Some(text)).await;
        return Ok(());
    }

    // Poll vote: vote_{poll_id}_{option}. Poll ids contain underscores, so
    // the option index is split off the end.
    if let Some(rest) = data.strip_prefix("vote_") {
        let parsed = rest
            .rsplit_once('_')
            .and_then(|(poll_id, idx)| idx.parse::<usize>().ok().map(|idx| (poll_id, idx)));
        let Some((poll_id, option)) = parsed else {
            answer(&state, &callback_id, Some("Invalid option")).await;
            return Ok(());
        };

        let text = match state.polls.vote(poll_id, from, option).await {
            Ok(true) => "✅ Vote recorded!",
            Ok(false) => "❌ Voting failed or poll expired!",
            Err(e) => {
                error!("poll vote failed: {e}");
                "Something went wrong, try again."
            }
        };
        answer(&state, &callback_id, Some(text)).await;
        return Ok(());
    }

    if let Some(poll_id) = data.strip_prefix("results_") {
        match state.polls.tally(poll_id).await {
            Ok(Some(results)) => {
                answer(&state, &callback_id, None).await;
                if let Err(e) = state
                    .messenger
                    .send_html(chat_id, &format_poll_results(&results))
                    .await
                {
                    warn!("failed to send poll results: {e}");
                }
            }
            Ok(None) => answer(&state, &callback_id, Some("Poll not found")).await,
            Err(e) => {
                error!("poll tally failed: {e}");
                answer(&state, &callback_id, None).await;
            }
        }
        return Ok(());
    }

    if let Some(poll_id) = data.strip_prefix("close_") {
        let text = match state.polls.close(poll_id, from).await {
            Ok(true) => "🔒 Poll closed.",
            Ok(false) => "❌ Only the poll creator can close it.",
            Err(e) => {
                error!("poll close failed: {e}");
                "Something went wrong, try again."
            }
        };
        answer(&state, &callback_id, Some(text)).await;
        return Ok(());
    }

    // Self-service unmute: unmute_{chat}_{user}
    if let Some(rest) = data.strip_prefix("unmute_") {
        let parsed = rest
            .split_once('_')
            .and_then(|(chat, user)| chat.parse::<i64>().ok().zip(user.parse::<i64>().ok()));
        let Some((chat, user)) = parsed else {
            answer(&state, &callback_id, Some("Invalid callback data")).await;
            return Ok(());
        };

        if from.0 != user {
            answer(&state, &callback_id, Some("This button isn't for you!")).await;
            return Ok(());
        }

        let text = match state.actions.restore_member(ChatId(chat), from).await {
            Ok(()) => "🔓 You can talk now!",
            Err(e) => {
                error!("unmute failed: {e}");
                "Something went wrong, try again."
            }
        };
        answer(&state, &callback_id, Some(text)).await;
        return Ok(());
    }

    if let Some(key) = data.strip_prefix("settings_") {
        handle_settings_toggle(&state, &callback_id, chat_id, from, msg_ref, key).await;
        return Ok(());
    }

    if let Some(key) = data.strip_prefix("verification_") {
        handle_verification_toggle(&state, &callback_id, chat_id, from, msg_ref, key).await;
        return Ok(());
    }

    if data.starts_with("appeal_") {
        answer(
            &state,
            &callback_id,
            Some("🔄 Your appeal has been recorded. An admin will review it."),
        )
        .await;
        return Ok(());
    }

    if data.starts_with("contact_") {
        answer(&state, &callback_id, Some("📞 Admins have been notified.")).await;
        return Ok(());
    }

    answer(&state, &callback_id, Some("Unknown action")).await;
    Ok(())
}

async fn handle_settings_toggle(
    state: &AppState,
    callback_id: &str,
    chat_id: ChatId,
    from: UserId,
    msg_ref: MessageRef,
    key: &str,
) {
    // Settings buttons are visible to everyone once posted; the toggle
    // itself silently no-ops for non-admins.
    if !state.actions.is_admin(chat_id, from).await.unwrap_or(false) {
        answer(state, callback_id, None).await;
        return;
    }

    let current = match state.settings.settings(chat_id).await {
        Ok(s) => s,
        Err(e) => {
            error!("settings read failed: {e}");
            answer(state, callback_id, None).await;
            return;
        }
    };

    let patch = match key {
        "welcome" => GroupSettingsPatch {
            welcome_enabled: Some(!current.welcome_enabled),
            ..Default::default()
        },
        "antispam" => GroupSettingsPatch {
            anti_spam_enabled: Some(!current.anti_spam_enabled),
            ..Default::default()
        },
        "ai" => GroupSettingsPatch {
            ai_moderation_enabled: Some(!current.ai_moderation_enabled),
            ..Default::default()
        },
        "translate" => GroupSettingsPatch {
            auto_translate: Some(!current.auto_translate),
            ..Default::default()
        },
        "media" => GroupSettingsPatch {
            media_filtering: Some(!current.media_filtering),
            ..Default::default()
        },
        "forward" => GroupSettingsPatch {
            forward_filtering: Some(!current.forward_filtering),
            ..Default::default()
        },
        "sentiment" => GroupSettingsPatch {
            sentiment_analysis: Some(!current.sentiment_analysis),
            ..Default::default()
        },
        "mutenew" => GroupSettingsPatch {
            mute_new_users: Some(!current.mute_new_users),
            ..Default::default()
        },
        "maxwarnings" => GroupSettingsPatch {
            max_warnings: Some(next_max_warnings(current.max_warnings)),
            ..Default::default()
        },
        _ => {
            answer(state, callback_id, Some("Unknown setting")).await;
            return;
        }
    };

    match state.settings.update_settings(chat_id, patch).await {
        Ok(updated) => {
            let (text, keyboard) = settings_view(&updated);
            if let Err(e) = state
                .messenger
                .edit_inline_keyboard(msg_ref, &text, keyboard)
                .await
            {
                warn!("failed to refresh settings view: {e}");
            }
            answer(state, callback_id, Some("Setting updated!")).await;
        }
        Err(e) => {
            error!("settings update failed: {e}");
            answer(state, callback_id, None).await;
        }
    }
}

async fn handle_verification_toggle(
    state: &AppState,
    callback_id: &str,
    chat_id: ChatId,
    from: UserId,
    msg_ref: MessageRef,
    key: &str,
) {
    if !state.actions.is_admin(chat_id, from).await.unwrap_or(false) {
        answer(state, callback_id, None).await;
        return;
    }

    let current = match state.settings.verification_settings(chat_id).await {
        Ok(s) => s,
        Err(e) => {
            error!("verification settings read failed: {e}");
            answer(state, callback_id, None).await;
            return;
        }
    };

    let patch = match key {
        "toggle" => VerificationSettingsPatch {
            enabled: Some(!current.enabled),
            ..Default::default()
        },
        "timeout" => VerificationSettingsPatch {
            timeout: Some(next_verification_timeout(current.timeout)),
            ..Default::default()
        },
        _ => {
            answer(state, callback_id, Some("Unknown setting")).await;
            return;
        }
    };

    match state
        .settings
        .update_verification_settings(chat_id, patch)
        .await
    {
        Ok(updated) => {
            let (text, keyboard) = verification_view(&updated);
            if let Err(e) = state
                .messenger
                .edit_inline_keyboard(msg_ref, &text, keyboard)
                .await
            {
                warn!("failed to refresh verification view: {e}");
            }
            answer(state, callback_id, Some("Setting updated!")).await;
        }
        Err(e) => {
            error!("verification settings update failed: {e}");
            answer(state, callback_id, None).await;
        }
    }
}

async fn answer(state: &AppState, callback_id: &str, text: Option<&str>) {
    if let Err(e) = state.messenger.answer_callback_query(callback_id, text).await {
        warn!("failed to answer callback query: {e}");
    }
}
