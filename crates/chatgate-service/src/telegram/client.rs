//! Telegram Bot API client implementation.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::types::{
    ApiResponse, InlineKeyboardButton, InlineKeyboardMarkup, SendMessageBody, Update,
};
use crate::messenger::{Keyboard, Messenger, MessengerError};

/// Extra time on top of the long-poll timeout before the HTTP request gives up.
const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

/// Telegram Bot API client.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: Client,
    base_url: String,
    request_timeout: Duration,
}

impl TelegramClient {
    /// Bot API base URL.
    pub const BASE_URL: &'static str = "https://api.telegram.org";

    /// Create a new client for `token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(token: &str, request_timeout: Duration) -> Result<Self, MessengerError> {
        Self::with_base_url(Self::BASE_URL, token, request_timeout)
    }

    /// Create a new client against an arbitrary API host.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_base_url(
        base_url: &str,
        token: &str,
        request_timeout: Duration,
    ) -> Result<Self, MessengerError> {
        // Long polls set their own per-request timeout
        let client = Client::builder().build()?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{token}", base_url.trim_end_matches('/')),
            request_timeout,
        })
    }

    /// Fetch updates after `offset`, waiting up to `timeout` for new ones.
    ///
    /// # Errors
    ///
    /// Returns `MessengerError::Unauthorized` if the token is rejected, other errors for
    /// transport or API failures.
    pub async fn get_updates(
        &self,
        offset: i64,
        timeout: Duration,
    ) -> Result<Vec<Update>, MessengerError> {
        let response = self
            .client
            .post(format!("{}/getUpdates", self.base_url))
            .timeout(timeout + LONG_POLL_GRACE)
            .json(&serde_json::json!({
                "offset": offset,
                "timeout": timeout.as_secs(),
                "allowed_updates": ["message", "callback_query"],
            }))
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, MessengerError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MessengerError::Unauthorized);
        }

        let body: ApiResponse<T> = response.json().await?;
        match body {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                error_code,
                description,
                ..
            } => Err(MessengerError::Api {
                code: error_code.unwrap_or_else(|| i64::from(status.as_u16())),
                description: description.unwrap_or_else(|| format!("HTTP {status}")),
            }),
        }
    }
}

fn to_markup(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: keyboard
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|b| InlineKeyboardButton {
                        text: b.text.clone(),
                        callback_data: b.callback_data.clone(),
                    })
                    .collect()
            })
            .collect(),
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), MessengerError> {
        let body = SendMessageBody {
            chat_id,
            text,
            parse_mode: "HTML",
            reply_markup: keyboard.map(to_markup),
        };

        let response = self
            .client
            .post(format!("{}/sendMessage", self.base_url))
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await?;

        self.handle_response::<serde_json::Value>(response)
            .await
            .map(|_| ())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), MessengerError> {
        let response = self
            .client
            .post(format!("{}/answerCallbackQuery", self.base_url))
            .timeout(self.request_timeout)
            .json(&serde_json::json!({ "callback_query_id": callback_id }))
            .send()
            .await?;

        self.handle_response::<bool>(response).await.map(|_| ())
    }
}
