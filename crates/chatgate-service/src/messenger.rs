//! Messaging platform interface.
//!
//! Outbound delivery is best effort: callers log failures and carry on.

use async_trait::async_trait;

/// Error type for outbound messaging.
#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform rejected the call.
    #[error("messaging API error {code}: {description}")]
    Api {
        /// Platform error code.
        code: i64,
        /// Description.
        description: String,
    },

    /// The bot token was rejected.
    #[error("bot token rejected")]
    Unauthorized,
}

/// An inline button that sends `callback_data` back when pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Label.
    pub text: String,
    /// Payload delivered with the callback.
    pub callback_data: String,
}

impl Button {
    /// Create a callback button.
    #[must_use]
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Rows of inline buttons attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    /// Button rows, top to bottom.
    pub rows: Vec<Vec<Button>>,
}

impl Keyboard {
    /// Append a row.
    #[must_use]
    pub fn row(mut self, buttons: Vec<Button>) -> Self {
        self.rows.push(buttons);
        self
    }
}

/// A messaging platform.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Send an HTML-formatted message to a chat.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), MessengerError>;

    /// Acknowledge a callback query so the client stops its spinner.
    async fn answer_callback(&self, callback_id: &str) -> Result<(), MessengerError>;
}
