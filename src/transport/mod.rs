pub mod telegram;

use crate::error::Result;
use async_trait::async_trait;

pub use telegram::TelegramTransport;

/// Handle to a delivered chat message, enough to edit/pin it later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

/// An inline option button under a question message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub callback: String,
}

impl Button {
    pub fn new(label: impl Into<String>, callback: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            callback: callback.into(),
        }
    }
}

/// Chat-transport collaborator. Pin/unpin/edit failures are cosmetic:
/// callers in the quiz engine log and ignore them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<MessageRef>;
    async fn send_with_buttons(
        &self,
        chat_id: i64,
        text: &str,
        buttons: &[Button],
    ) -> Result<MessageRef>;
    async fn edit_message(&self, msg: MessageRef, text: &str, buttons: &[Button]) -> Result<()>;
    async fn pin(&self, msg: MessageRef) -> Result<()>;
    async fn unpin(&self, msg: MessageRef) -> Result<()>;
    /// Confirms receipt of a button tap, optionally with a toast text.
    /// Owned text rather than a borrow so the mock derives cleanly.
    async fn ack_callback(&self, callback_id: &str, text: Option<String>) -> Result<()>;
}
