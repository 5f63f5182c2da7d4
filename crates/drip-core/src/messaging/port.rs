use std::{path::Path, time::Duration};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::InlineKeyboard,
};

/// Transport failures, pre-classified for the delivery and dialog layers.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The recipient blocked the bot or the chat no longer exists.
    /// Permanent: the caller deactivates the user.
    #[error("recipient unreachable: {0}")]
    Unreachable(String),

    /// The target message is too old, already deleted, or otherwise not
    /// editable/deletable. Drives the dialog's send fallback.
    #[error("message unavailable: {0}")]
    MessageGone(String),

    /// Flood control; retry after the given delay.
    #[error("rate limited, retry after {0:?}")]
    RetryAfter(Duration),

    /// Anything else (timeouts, connection errors). Transient.
    #[error("transport error: {0}")]
    Network(String),
}

impl TransportError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, TransportError::Unreachable(_))
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Outbound messaging port.
///
/// Telegram is the first implementation; the shape leaves room for other
/// messengers behind the same interface.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, chat_id: ChatId, text: &str) -> TransportResult<MessageRef>;

    async fn send_photo(
        &self,
        chat_id: ChatId,
        photo: &Path,
        caption: &str,
    ) -> TransportResult<MessageRef>;

    async fn edit_text(&self, msg: MessageRef, text: &str) -> TransportResult<()>;

    async fn edit_with_keyboard(
        &self,
        msg: MessageRef,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> TransportResult<()>;

    async fn delete_message(&self, msg: MessageRef) -> TransportResult<()>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> TransportResult<MessageRef>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> TransportResult<()>;
}
