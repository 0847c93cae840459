use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::error;

use warden_core::domain::{ChatId, MessageId, MessageRef, UserId};

use crate::router::AppState;

pub async fn handle_new_members(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(members) = msg.new_chat_members() else {
        return Ok(());
    };

    let chat_id = ChatId(msg.chat.id.0);
    let title = msg.chat.title().unwrap_or("the group").to_string();
    // The join service message exists once per update, however many members
    // arrived with it.
    let mut service = Some(MessageRef {
        chat_id,
        message_id: MessageId(msg.id.0),
    });

    for user in members {
        let user_id = UserId(user.id.0 as i64);

        if let Err(e) = state
            .pipeline
            .handle_member_joined(
                chat_id,
                user_id,
                user.is_bot,
                &user.first_name,
                &title,
                service.take(),
            )
            .await
        {
            error!("member join handling failed for {user_id:?}: {e}");
        }

        if !user.is_bot {
            if let Err(e) = state
                .verification
                .on_member_joined(chat_id, user_id, &user.first_name)
                .await
            {
                error!("verification challenge failed for {user_id:?}: {e}");
            }
        }
    }

    Ok(())
}

pub async fn handle_left_member(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChatId(msg.chat.id.0);
    let service = MessageRef {
        chat_id,
        message_id: MessageId(msg.id.0),
    };

    if let Err(e) = state.pipeline.handle_member_left(chat_id, service).await {
        error!("member leave handling failed: {e}");
    }
    Ok(())
}
