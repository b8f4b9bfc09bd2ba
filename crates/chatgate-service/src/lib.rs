//! Chatgate service.
//!
//! This crate wires the subscription and payment engine to the outside world:
//!
//! - **Engine**: `QuotaLedger`, `PaymentLedger`, `PaymentReconciler`, `AdminOverride`
//! - **Collaborators**: payment processor (YooKassa), messaging platform (Telegram),
//!   language model (OpenAI-compatible chat completions)
//! - **Surfaces**: the chat bot, the processor webhook and the admin HTTP API
//!
//! # Authentication
//!
//! Admin HTTP requests need the shared `X-Admin-Key` plus an `X-Admin-Id` on the admin
//! allow-list. Chat admin commands check the sender's id against the same list. Processor
//! webhooks are optionally verified with an HMAC-SHA256 signature.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router

pub mod admin;
pub mod auth;
pub mod bot;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod llm;
pub mod messenger;
pub mod payments;
pub mod processor;
pub mod quota;
pub mod reconciler;
pub mod routes;
pub mod state;
pub mod supervisor;
pub mod telegram;
pub mod yookassa;

pub use admin::{AdminError, AdminOverride};
pub use bot::Bot;
pub use config::ServiceConfig;
pub use error::ApiError;
pub use llm::{ChatCompletionClient, Responder};
pub use messenger::{Messenger, MessengerError};
pub use payments::{LedgerError, PaymentLedger};
pub use processor::{PaymentProcessor, ProcessorError};
pub use quota::QuotaLedger;
pub use reconciler::{PaymentReconciler, PollOutcome, WebhookEvent, WebhookOutcome};
pub use routes::create_router;
pub use state::{AppState, Collaborators};
pub use supervisor::{supervise, RestartPolicy};
pub use telegram::TelegramClient;
pub use yookassa::YooKassaClient;
