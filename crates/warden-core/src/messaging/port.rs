use async_trait::async_trait;

use chrono::{DateTime, Utc};

use crate::{
    domain::{ChatId, MessageRef, UserId},
    messaging::types::{InlineKeyboard, MessagingCapabilities},
    Result,
};

/// Cross-messenger port for plain messaging.
///
/// Telegram is the first implementation; the shape is kept platform-neutral
/// so future adapters can fit behind the same interface.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef>;
    async fn reply_html(&self, to: MessageRef, html: &str) -> Result<MessageRef>;
    async fn edit_html(&self, msg: MessageRef, html: &str) -> Result<()>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}

/// Port for punitive / membership actions.
///
/// These are pure side effects at the platform boundary; the core decides,
/// the adapter executes.
#[async_trait]
pub trait ModerationPort: Send + Sync {
    /// Revoke the member's send permissions, optionally until a timestamp.
    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Restore the group's default member permissions.
    async fn restore_member(&self, chat_id: ChatId, user_id: UserId) -> Result<()>;

    /// Remove the member. `until` of `None` means a permanent ban.
    async fn ban_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Whether the user is an administrator or the owner of the chat.
    async fn is_admin(&self, chat_id: ChatId, user_id: UserId) -> Result<bool>;
}
