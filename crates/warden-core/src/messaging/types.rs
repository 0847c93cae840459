use crate::domain::{ChatId, MessageId, UserId};

/// Cross-messenger incoming group message.
///
/// Telegram-specific fields live in the Telegram adapter; the pipeline only
/// sees what it needs to decide.
#[derive(Clone, Debug)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub message_id: MessageId,
    /// Display name used when addressing the user in group notices.
    pub sender_name: String,
    pub content: MessageContent,
}

/// Message payload kind, classified with the same precedence the pipeline
/// applies: text wins over media, media wins over a bare forward.
#[derive(Clone, Debug)]
pub enum MessageContent {
    Text(String),
    Media,
    Forward,
    Other,
}

/// Inline keyboard (button grid) attached to an outgoing message.
#[derive(Clone, Debug, Default)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(label: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback_data: callback_data.into(),
        }
    }
}

impl InlineKeyboard {
    pub fn new(rows: Vec<Vec<InlineButton>>) -> Self {
        Self { rows }
    }

    /// Convenience for "one button per row" layouts.
    pub fn one_per_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    pub fn push_row(&mut self, row: Vec<InlineButton>) {
        self.rows.push(row);
    }
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_html: bool,
    pub supports_edit: bool,
    pub supports_inline_keyboards: bool,
    pub max_message_len: usize,
}
