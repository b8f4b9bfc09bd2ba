//! Chat bot dispatcher.
//!
//! Every update is parsed into a [`Command`] and handled on its own task. Menu and payment
//! commands are privileged and never touch the quota; any other text is a content message
//! that consumes one unit before the language model is asked.

pub mod commands;
pub mod texts;

use std::sync::Arc;
use std::time::Duration;

use chatgate_core::UserId;

use crate::admin::{AdminError, AdminOverride};
use crate::llm::Responder;
use crate::messenger::{Keyboard, Messenger, MessengerError};
use crate::payments::{LedgerError, PaymentLedger};
use crate::quota::QuotaLedger;
use crate::reconciler::PaymentReconciler;
use crate::state::AppState;
use crate::telegram::{TelegramClient, Update};

pub use commands::{parse_callback, parse_message, AdminCommand, Command};

/// Pause after a failed long poll.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(3);

/// Payments listed by `/history`.
const HISTORY_LIMIT: usize = 10;

/// Users listed by `/users`.
const USER_LIST_LIMIT: usize = 50;

/// A user action extracted from an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A text message.
    Message {
        /// Reply target.
        chat_id: i64,
        /// Sender.
        user_id: UserId,
        /// Message text.
        text: String,
    },
    /// An inline button press.
    Callback {
        /// Query id to acknowledge.
        callback_id: String,
        /// Reply target.
        chat_id: i64,
        /// Who pressed the button.
        user_id: UserId,
        /// Button payload.
        data: String,
    },
}

impl Incoming {
    /// Extract the action from an update. Non-text messages and anonymous senders are
    /// ignored.
    #[must_use]
    pub fn from_update(update: Update) -> Option<Self> {
        if let Some(query) = update.callback_query {
            let chat_id = query.message.as_ref().map_or(query.from.id, |m| m.chat.id);
            return Some(Self::Callback {
                callback_id: query.id,
                chat_id,
                user_id: UserId::new(query.from.id),
                data: query.data.unwrap_or_default(),
            });
        }

        let message = update.message?;
        let from = message.from?;
        let text = message.text?;
        Some(Self::Message {
            chat_id: message.chat.id,
            user_id: UserId::new(from.id),
            text,
        })
    }
}

/// A reply to send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// HTML text.
    pub text: String,
    /// Inline keyboard.
    pub keyboard: Option<Keyboard>,
}

impl Reply {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: None,
        }
    }

    fn with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        Self {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }
}

/// Routes chat commands to the engine.
pub struct Bot {
    messenger: Arc<dyn Messenger>,
    responder: Option<Arc<dyn Responder>>,
    quota: Arc<QuotaLedger>,
    ledger: Arc<PaymentLedger>,
    reconciler: Arc<PaymentReconciler>,
    admin: Arc<AdminOverride>,
}

impl Bot {
    /// Create a bot over the engine in `state`.
    #[must_use]
    pub fn new(
        state: &AppState,
        messenger: Arc<dyn Messenger>,
        responder: Option<Arc<dyn Responder>>,
    ) -> Self {
        Self {
            messenger,
            responder,
            quota: state.quota.clone(),
            ledger: state.ledger.clone(),
            reconciler: state.reconciler.clone(),
            admin: state.admin.clone(),
        }
    }

    /// Long-poll for updates until the messaging platform rejects the token.
    ///
    /// Other polling failures are logged and retried after a short pause.
    ///
    /// # Errors
    ///
    /// Returns `MessengerError::Unauthorized` when the bot token is rejected.
    pub async fn run(
        self: Arc<Self>,
        telegram: Arc<TelegramClient>,
        long_poll: Duration,
    ) -> Result<(), MessengerError> {
        tracing::info!("Bot polling started");
        let mut offset = 0_i64;

        loop {
            match telegram.get_updates(offset, long_poll).await {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        let bot = Arc::clone(&self);
                        tokio::spawn(async move { bot.handle_update(update).await });
                    }
                }
                Err(MessengerError::Unauthorized) => {
                    tracing::error!("Bot token rejected, stopping polling");
                    return Err(MessengerError::Unauthorized);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Polling for updates failed, retrying");
                    tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                }
            }
        }
    }

    /// Handle one update, logging delivery failures.
    pub async fn handle_update(&self, update: Update) {
        let update_id = update.update_id;
        let Some(incoming) = Incoming::from_update(update) else {
            tracing::debug!(update_id, "Ignoring update without text");
            return;
        };

        if let Err(e) = self.handle(incoming).await {
            tracing::warn!(update_id, error = %e, "Failed to deliver reply");
        }
    }

    /// Handle one user action and send the reply.
    ///
    /// # Errors
    ///
    /// Returns an error if the reply cannot be delivered.
    pub async fn handle(&self, incoming: Incoming) -> Result<(), MessengerError> {
        let (chat_id, user_id, command) = match incoming {
            Incoming::Message {
                chat_id,
                user_id,
                text,
            } => (chat_id, user_id, parse_message(&text)),
            Incoming::Callback {
                callback_id,
                chat_id,
                user_id,
                data,
            } => {
                if let Err(e) = self.messenger.answer_callback(&callback_id).await {
                    tracing::debug!(error = %e, "Failed to acknowledge callback");
                }
                (chat_id, user_id, parse_callback(&data))
            }
        };

        match self.respond(user_id, command).await {
            Some(reply) => {
                self.messenger
                    .send_message(chat_id, &reply.text, reply.keyboard.as_ref())
                    .await
            }
            None => Ok(()),
        }
    }

    /// Compute the reply to `command` from `user_id`.
    pub async fn respond(&self, user_id: UserId, command: Command) -> Option<Reply> {
        let reply = match command {
            Command::Start | Command::Menu => self.menu(user_id),
            Command::Status => self.status(user_id),
            Command::Plans => Reply::with_keyboard(
                texts::plans(self.ledger.plans()),
                texts::plans_keyboard(self.ledger.plans()),
            ),
            Command::Help => Reply::text(texts::help()),
            Command::History => match self.ledger.history(user_id, HISTORY_LIMIT) {
                Ok(payments) => Reply::text(texts::history(&payments)),
                Err(e) => failure(user_id, "history", &e),
            },
            Command::Buy(plan_id) => self.buy(user_id, &plan_id).await,
            Command::Check(id) => return self.check(user_id, &id).await,
            Command::Admin(admin) => self.admin(user_id, admin).await,
            Command::Invalid(reply) => Reply::text(reply),
            Command::Chat(text) => self.chat(user_id, &text).await,
        };
        Some(reply)
    }

    fn menu(&self, user_id: UserId) -> Reply {
        // Touching the status creates the account on first contact
        if let Err(e) = self.quota.status(user_id) {
            return failure(user_id, "menu", &e);
        }
        Reply::with_keyboard(
            texts::welcome(self.quota.daily_cap()),
            texts::menu_keyboard(),
        )
    }

    fn status(&self, user_id: UserId) -> Reply {
        let result = self
            .quota
            .status(user_id)
            .and_then(|status| Ok((status, self.quota.usage(user_id)?)));
        match result {
            Ok((status, usage)) => Reply::with_keyboard(
                texts::status(&status, &usage),
                texts::menu_keyboard(),
            ),
            Err(e) => failure(user_id, "status", &e),
        }
    }

    async fn buy(&self, user_id: UserId, plan_id: &str) -> Reply {
        match self.ledger.create(user_id, plan_id).await {
            Ok(payment) => match self.ledger.plan(payment.plan_id.as_str()) {
                Ok(plan) => Reply::with_keyboard(
                    texts::payment_created(&payment, plan),
                    texts::check_keyboard(&payment),
                ),
                Err(e) => failure(user_id, "buy", &e),
            },
            Err(LedgerError::Invalid(_)) => Reply::with_keyboard(
                texts::unknown_plan(plan_id),
                texts::plans_keyboard(self.ledger.plans()),
            ),
            Err(e) => failure(user_id, "buy", &e),
        }
    }

    async fn check(&self, user_id: UserId, id: &str) -> Option<Reply> {
        // Users may only check their own payments
        let payment = match self.ledger.find_by_any_id(id) {
            Ok(Some(payment)) if payment.user_id == user_id => payment,
            Ok(_) => return Some(Reply::text("Payment not found.")),
            Err(e) => return Some(failure(user_id, "check", &e)),
        };

        let outcome = self.reconciler.poll(&payment.local_id.to_string()).await;
        texts::poll_outcome(&outcome).map(Reply::text)
    }

    async fn chat(&self, user_id: UserId, text: &str) -> Reply {
        let decision = match self.quota.check_and_consume(user_id, false) {
            Ok(decision) => decision,
            Err(e) => return failure(user_id, "quota", &e),
        };

        if !decision.allowed {
            return Reply::with_keyboard(
                texts::limit_reached(&decision),
                texts::plans_keyboard(self.ledger.plans()),
            );
        }

        let Some(responder) = &self.responder else {
            tracing::warn!(user_id = %user_id, "No language model configured");
            return Reply::text(texts::try_again_later());
        };

        match responder.reply(user_id, text).await {
            Ok(answer) => {
                let mut reply = texts::escape_html(&answer);
                if let Some(footer) = texts::usage_footer(&decision) {
                    reply.push_str(&footer);
                }
                Reply::text(reply)
            }
            Err(e) => failure(user_id, "reply", &e),
        }
    }

    async fn admin(&self, user_id: UserId, command: AdminCommand) -> Reply {
        let result = match command {
            AdminCommand::Grant { user, days } => self
                .admin
                .grant(user_id, user, days)
                .map(|status| texts::admin_status(user, &status)),
            AdminCommand::Revoke { user } => self
                .admin
                .revoke(user_id, user)
                .map(|status| texts::admin_status(user, &status)),
            AdminCommand::ResetCounter { user, day } => self
                .admin
                .reset_counter(user_id, user, day)
                .map(|existed| {
                    if existed {
                        format!("Counter of <code>{user}</code> reset.")
                    } else {
                        format!("<code>{user}</code> had no counter for that day.")
                    }
                }),
            AdminCommand::Inspect { user } => self
                .admin
                .inspect(user_id, user)
                .map(|report| texts::report(&report)),
            AdminCommand::Payment { id } => self
                .admin
                .find_payment(user_id, &id)
                .map(|payment| texts::admin_payment(&payment)),
            AdminCommand::Complete { id } => self
                .admin
                .complete_payment(user_id, &id)
                .await
                .map(|outcome| texts::admin_outcome(&outcome)),
            AdminCommand::Users => self
                .admin
                .list_users(user_id, USER_LIST_LIMIT)
                .map(|users| texts::users(&users)),
            AdminCommand::Stats => self.admin.stats(user_id).map(|stats| texts::stats(&stats)),
        };

        match result {
            Ok(text) => Reply::text(text),
            Err(AdminError::Forbidden(_)) => Reply::text(texts::forbidden()),
            Err(AdminError::Store(e)) => failure(user_id, "admin", &e),
            Err(e) => Reply::text(texts::escape_html(&e.to_string())),
        }
    }
}

/// Log an internal failure and degrade to a generic reply.
fn failure(user_id: UserId, action: &str, error: &dyn std::fmt::Display) -> Reply {
    tracing::error!(user_id = %user_id, action, error = %error, "Request failed");
    Reply::text(texts::try_again_later())
}
