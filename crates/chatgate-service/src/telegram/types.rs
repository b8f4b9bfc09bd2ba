//! Telegram Bot API wire types.

use serde::{Deserialize, Serialize};

/// Envelope around every Bot API response.
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the call succeeded.
    pub ok: bool,
    /// Payload on success.
    pub result: Option<T>,
    /// Error code on failure.
    #[serde(default)]
    pub error_code: Option<i64>,
    /// Error description on failure.
    #[serde(default)]
    pub description: Option<String>,
}

/// An incoming update.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    /// Monotonic update id.
    pub update_id: i64,
    /// New message.
    #[serde(default)]
    pub message: Option<Message>,
    /// Inline button press.
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// A chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Message id within the chat.
    pub message_id: i64,
    /// Sender; absent for channel posts.
    #[serde(default)]
    pub from: Option<User>,
    /// The chat.
    pub chat: Chat,
    /// Text content.
    #[serde(default)]
    pub text: Option<String>,
}

/// A platform user.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    /// Numeric user id.
    pub id: i64,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Username without `@`.
    #[serde(default)]
    pub username: Option<String>,
}

/// A chat.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    /// Numeric chat id.
    pub id: i64,
}

/// An inline button press.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    /// Query id to acknowledge.
    pub id: String,
    /// Who pressed the button.
    pub from: User,
    /// Message the button was attached to.
    #[serde(default)]
    pub message: Option<Message>,
    /// Button payload.
    #[serde(default)]
    pub data: Option<String>,
}

/// Body of `sendMessage`.
#[derive(Debug, Serialize)]
pub struct SendMessageBody<'a> {
    /// Target chat.
    pub chat_id: i64,
    /// Message text.
    pub text: &'a str,
    /// Text formatting mode.
    pub parse_mode: &'static str,
    /// Inline keyboard.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

/// Inline keyboard markup.
#[derive(Debug, Serialize)]
pub struct InlineKeyboardMarkup {
    /// Button rows.
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

/// A single inline button.
#[derive(Debug, Serialize)]
pub struct InlineKeyboardButton {
    /// Label.
    pub text: String,
    /// Callback payload.
    pub callback_data: String,
}
