//! Telegram update handlers.
//!
//! Each inbound update is classified by kind and dispatched to exactly one
//! flow: member churn, commands, callbacks, or the moderation pipeline.

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use crate::router::AppState;

mod callback;
mod commands;
mod members;
mod text;

pub async fn handle_callback(q: CallbackQuery, state: Arc<AppState>) -> ResponseResult<()> {
    callback::handle_callback(q, state).await
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    // Only moderate group chats; private chats are out of scope.
    if !(msg.chat.is_group() || msg.chat.is_supergroup()) {
        return Ok(());
    }

    if msg.new_chat_members().is_some() {
        return members::handle_new_members(msg, state).await;
    }
    if msg.left_chat_member().is_some() {
        return members::handle_left_member(msg, state).await;
    }

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            return commands::handle_command(msg, state).await;
        }
    }

    text::handle_message(msg, state).await
}
