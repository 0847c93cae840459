use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::error;

use warden_core::{
    domain::{ChatId, MessageId, UserId},
    messaging::types::{IncomingMessage, MessageContent},
};

use crate::router::AppState;

/// Feed a non-command group message through the moderation pipeline.
pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };

    // Text wins over media, media wins over a bare forward.
    let content = if let Some(text) = msg.text() {
        MessageContent::Text(text.to_string())
    } else if msg.photo().is_some() || msg.video().is_some() || msg.document().is_some() {
        MessageContent::Media
    } else if msg.forward_date().is_some() {
        MessageContent::Forward
    } else {
        MessageContent::Other
    };

    let incoming = IncomingMessage {
        chat_id: ChatId(msg.chat.id.0),
        user_id: UserId(user.id.0 as i64),
        message_id: MessageId(msg.id.0),
        sender_name: user.first_name.clone(),
        content,
    };

    if let Err(e) = state.pipeline.handle_message(&incoming).await {
        error!("moderation pipeline failed for {:?}: {e}", incoming.message_id);
    }
    Ok(())
}
