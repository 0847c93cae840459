//! Shared in-process fakes for engine tests.

use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    classify::InferenceClient,
    domain::{ChatId, MessageId, MessageRef, UserId},
    messaging::{
        port::{MessagingPort, ModerationPort},
        types::{InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

/// Records outbound messages instead of talking to a platform.
#[derive(Default)]
pub struct RecordingMessenger {
    next_id: AtomicI32,
    pub sent: Mutex<Vec<(ChatId, String)>>,
    pub deleted: Mutex<Vec<MessageRef>>,
    pub keyboards: Mutex<Vec<(ChatId, String, InlineKeyboard)>>,
    pub callback_answers: Mutex<Vec<(String, Option<String>)>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent_texts(&self) -> Vec<String> {
        self.sent.lock().await.iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl MessagingPort for RecordingMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_html: true,
            supports_edit: true,
            supports_inline_keyboards: true,
            max_message_len: 4096,
        }
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<MessageRef> {
        self.sent.lock().await.push((chat_id, html.to_string()));
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)),
        })
    }

    async fn reply_html(&self, to: MessageRef, html: &str) -> Result<MessageRef> {
        self.send_html(to.chat_id, html).await
    }

    async fn edit_html(&self, _msg: MessageRef, _html: &str) -> Result<()> {
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.deleted.lock().await.push(msg);
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.keyboards
            .lock()
            .await
            .push((chat_id, html.to_string(), keyboard));
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)),
        })
    }

    async fn edit_inline_keyboard(
        &self,
        msg: MessageRef,
        html: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()> {
        self.keyboards
            .lock()
            .await
            .push((msg.chat_id, html.to_string(), keyboard));
        Ok(())
    }

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.callback_answers
            .lock()
            .await
            .push((callback_id.to_string(), text.map(|s| s.to_string())));
        Ok(())
    }
}

/// Records punitive actions instead of performing them.
#[derive(Default)]
pub struct RecordingActions {
    pub restricted: Mutex<Vec<(ChatId, UserId, Option<DateTime<Utc>>)>>,
    pub restored: Mutex<Vec<(ChatId, UserId)>>,
    pub banned: Mutex<Vec<(ChatId, UserId, Option<DateTime<Utc>>)>>,
    pub admins: Mutex<Vec<UserId>>,
}

impl RecordingActions {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModerationPort for RecordingActions {
    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.restricted.lock().await.push((chat_id, user_id, until));
        Ok(())
    }

    async fn restore_member(&self, chat_id: ChatId, user_id: UserId) -> Result<()> {
        self.restored.lock().await.push((chat_id, user_id));
        Ok(())
    }

    async fn ban_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.banned.lock().await.push((chat_id, user_id, until));
        Ok(())
    }

    async fn is_admin(&self, _chat_id: ChatId, user_id: UserId) -> Result<bool> {
        Ok(self.admins.lock().await.contains(&user_id))
    }
}

/// Inference stub returning a fixed completion.
pub struct CannedInference(pub String);

#[async_trait]
impl InferenceClient for CannedInference {
    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Inference stub that always fails, for fallback-path tests.
pub struct FailingInference;

#[async_trait]
impl InferenceClient for FailingInference {
    async fn complete(&self, _prompt: &str, _max_tokens: u32) -> Result<String> {
        Err(crate::Error::External("inference unavailable".to_string()))
    }
}
