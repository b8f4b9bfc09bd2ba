//! Payment reconciliation.
//!
//! Two independent triggers drive a payment to its terminal state: polls (user, admin or
//! the periodic sweep asking the processor) and webhook notifications from the processor.
//! They may race. Activation is therefore one atomic store step that moves the payment to
//! `succeeded` and grants the entitlement together: whoever performs it notifies the user,
//! and everyone else observes an already-settled payment.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use chatgate_core::{Clock, GateError, Payment, PaymentId, PaymentMode, PaymentStatus, UserId};
use chatgate_store::{Store, StoreError};

use crate::bot::texts;
use crate::messenger::Messenger;
use crate::payments::PaymentLedger;
use crate::processor::PaymentProcessor;

/// Open payments polled concurrently by one sweep.
const SWEEP_CONCURRENCY: usize = 4;

/// Error type for reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The payment references a plan that is no longer offered.
    #[error(transparent)]
    Invalid(#[from] GateError),
}

/// Result of asking for a payment's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PollOutcome {
    /// The payment is paid. `activated` is true only for the call that granted it.
    Succeeded {
        /// Whether this call performed the activation.
        activated: bool,
    },
    /// Not paid yet.
    Open {
        /// Current status.
        status: PaymentStatus,
    },
    /// Canceled or failed.
    Closed {
        /// Terminal status.
        status: PaymentStatus,
    },
    /// No payment with this id.
    NotFound,
    /// The processor could not be asked. Nothing changed; retry later.
    Error {
        /// What went wrong.
        reason: String,
    },
}

/// Result of handling a webhook notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// This notification activated the payment.
    Activated,
    /// The payment had already been activated.
    AlreadySettled,
    /// The payment is canceled or failed.
    Closed {
        /// Terminal status.
        status: PaymentStatus,
    },
    /// Not actionable; acknowledged and ignored.
    Acknowledged,
    /// No local payment matches the notification.
    UnknownPayment,
}

/// Notification payload sent by the processor.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event name, e.g. `payment.succeeded`.
    pub event: String,
    /// The payment the event is about.
    pub object: WebhookObject,
}

/// Payment object embedded in a notification.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookObject {
    /// Processor payment id.
    pub id: String,
    /// Processor status.
    pub status: String,
}

/// Tally of one sweep over open payments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Payments polled.
    pub checked: usize,
    /// Payments activated by this sweep.
    pub activated: usize,
    /// Payments found canceled or failed.
    pub closed: usize,
    /// Polls that failed.
    pub errors: usize,
}

/// Drives payments and entitlements toward consistency.
pub struct PaymentReconciler {
    ledger: Arc<PaymentLedger>,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    processor: Option<Arc<dyn PaymentProcessor>>,
    messenger: Option<Arc<dyn Messenger>>,
}

impl PaymentReconciler {
    /// Create a reconciler.
    #[must_use]
    pub fn new(
        ledger: Arc<PaymentLedger>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        processor: Option<Arc<dyn PaymentProcessor>>,
        messenger: Option<Arc<dyn Messenger>>,
    ) -> Self {
        Self {
            ledger,
            store,
            clock,
            processor,
            messenger,
        }
    }

    // =========================================================================
    // Poll path
    // =========================================================================

    /// Check a payment by local or processor id, activating it if paid.
    pub async fn poll(&self, id: &str) -> PollOutcome {
        match self.ledger.find_by_any_id(id) {
            Ok(Some(payment)) => self.poll_payment(payment).await,
            Ok(None) => PollOutcome::NotFound,
            Err(e) => {
                tracing::error!(payment = %id, error = %e, "Payment lookup failed");
                PollOutcome::Error {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn poll_payment(&self, payment: Payment) -> PollOutcome {
        match payment.status {
            PaymentStatus::Succeeded => return PollOutcome::Succeeded { activated: false },
            status if status.is_terminal() => return PollOutcome::Closed { status },
            _ => {}
        }

        let reported = match payment.mode {
            PaymentMode::Offline => PaymentStatus::Succeeded,
            PaymentMode::Live => match self.fetch_status(&payment).await {
                Ok(status) => status,
                Err(reason) => {
                    tracing::warn!(
                        payment_id = %payment.local_id,
                        reason = %reason,
                        "Processor status check failed, payment left unchanged"
                    );
                    return PollOutcome::Error { reason };
                }
            },
        };

        match self.apply(&payment, reported).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    payment_id = %payment.local_id,
                    error = %e,
                    "Reconciliation failed"
                );
                PollOutcome::Error {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn fetch_status(&self, payment: &Payment) -> Result<PaymentStatus, String> {
        let external_id = payment
            .external_id
            .as_deref()
            .ok_or_else(|| "live payment has no processor id".to_string())?;
        let processor = self
            .processor
            .as_ref()
            .ok_or_else(|| "payment processor unavailable".to_string())?;

        processor
            .fetch_payment(external_id)
            .await
            .map(|p| p.status)
            .map_err(|e| e.to_string())
    }

    /// Move `payment` toward the status the processor reported.
    async fn apply(
        &self,
        payment: &Payment,
        reported: PaymentStatus,
    ) -> Result<PollOutcome, ReconcileError> {
        match reported {
            PaymentStatus::Succeeded => {
                if self.activate(payment).await? {
                    return Ok(PollOutcome::Succeeded { activated: true });
                }
                self.settled_outcome(payment.local_id)
            }
            PaymentStatus::Pending => Ok(PollOutcome::Open {
                status: payment.status,
            }),
            PaymentStatus::WaitingConfirmation => {
                self.ledger
                    .update_status(payment.local_id, PaymentStatus::WaitingConfirmation)?;
                Ok(PollOutcome::Open {
                    status: PaymentStatus::WaitingConfirmation,
                })
            }
            PaymentStatus::Canceled | PaymentStatus::Failed => {
                if self.close(payment, reported).await? {
                    return Ok(PollOutcome::Closed { status: reported });
                }
                self.settled_outcome(payment.local_id)
            }
        }
    }

    /// Outcome for a payment someone else already moved.
    fn settled_outcome(&self, id: PaymentId) -> Result<PollOutcome, ReconcileError> {
        let status = self.current_status(id)?;
        Ok(match status {
            Some(PaymentStatus::Succeeded) => PollOutcome::Succeeded { activated: false },
            Some(status) if status.is_terminal() => PollOutcome::Closed { status },
            Some(status) => PollOutcome::Open { status },
            None => PollOutcome::NotFound,
        })
    }

    fn current_status(&self, id: PaymentId) -> Result<Option<PaymentStatus>, ReconcileError> {
        Ok(self
            .store
            .find_by_local_id(id)?
            .map(|payment| payment.status))
    }

    // =========================================================================
    // Webhook path
    // =========================================================================

    /// Handle a processor notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the payment's plan is unknown.
    pub async fn handle_webhook(
        &self,
        event: &WebhookEvent,
    ) -> Result<WebhookOutcome, ReconcileError> {
        let reported = match (event.event.as_str(), event.object.status.as_str()) {
            ("payment.succeeded", "succeeded") => PaymentStatus::Succeeded,
            ("payment.canceled", _) => PaymentStatus::Canceled,
            ("payment.failed", _) => PaymentStatus::Failed,
            ("payment.waiting_for_capture", _) => PaymentStatus::WaitingConfirmation,
            _ => {
                tracing::debug!(event = %event.event, "Ignoring processor notification");
                return Ok(WebhookOutcome::Acknowledged);
            }
        };

        let Some(payment) = self.ledger.find_by_any_id(&event.object.id)? else {
            tracing::warn!(
                event = %event.event,
                external_id = %event.object.id,
                "Notification for unknown payment dropped"
            );
            return Ok(WebhookOutcome::UnknownPayment);
        };

        tracing::info!(
            event = %event.event,
            payment_id = %payment.local_id,
            "Processing payment notification"
        );

        match reported {
            PaymentStatus::Succeeded => {
                if self.activate(&payment).await? {
                    return Ok(WebhookOutcome::Activated);
                }
            }
            PaymentStatus::Canceled | PaymentStatus::Failed => {
                if self.close(&payment, reported).await? {
                    return Ok(WebhookOutcome::Closed { status: reported });
                }
            }
            PaymentStatus::WaitingConfirmation | PaymentStatus::Pending => {
                self.ledger.update_status(payment.local_id, reported)?;
                return Ok(WebhookOutcome::Acknowledged);
            }
        }

        Ok(match self.current_status(payment.local_id)? {
            Some(PaymentStatus::Succeeded) => WebhookOutcome::AlreadySettled,
            Some(status) if status.is_terminal() => WebhookOutcome::Closed { status },
            _ => WebhookOutcome::Acknowledged,
        })
    }

    // =========================================================================
    // Forced completion and sweep
    // =========================================================================

    /// Complete a payment without asking the processor (administrative path).
    pub async fn complete(&self, id: &str) -> PollOutcome {
        let payment = match self.ledger.find_by_any_id(id) {
            Ok(Some(payment)) => payment,
            Ok(None) => return PollOutcome::NotFound,
            Err(e) => {
                return PollOutcome::Error {
                    reason: e.to_string(),
                }
            }
        };

        match self.apply(&payment, PaymentStatus::Succeeded).await {
            Ok(outcome) => outcome,
            Err(e) => PollOutcome::Error {
                reason: e.to_string(),
            },
        }
    }

    /// Poll every open live payment once.
    ///
    /// Offline payments are left alone; they complete only when asked.
    ///
    /// # Errors
    ///
    /// Returns an error if open payments cannot be listed.
    pub async fn sweep_open(&self) -> Result<SweepReport, ReconcileError> {
        let open: Vec<Payment> = self
            .ledger
            .open_payments()?
            .into_iter()
            .filter(|p| p.mode == PaymentMode::Live)
            .collect();

        let outcomes: Vec<PollOutcome> = stream::iter(open)
            .map(|payment| self.poll_payment(payment))
            .buffer_unordered(SWEEP_CONCURRENCY)
            .collect()
            .await;

        let mut report = SweepReport {
            checked: outcomes.len(),
            ..SweepReport::default()
        };
        for outcome in outcomes {
            match outcome {
                PollOutcome::Succeeded { activated: true } => report.activated += 1,
                PollOutcome::Closed { .. } => report.closed += 1,
                PollOutcome::Error { .. } => report.errors += 1,
                _ => {}
            }
        }

        Ok(report)
    }

    /// Sweep open payments every `interval`, forever.
    pub async fn run_sweep(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.sweep_open().await {
                Ok(report) if report.checked > 0 => {
                    tracing::info!(
                        checked = report.checked,
                        activated = report.activated,
                        closed = report.closed,
                        errors = report.errors,
                        "Open payment sweep finished"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "Open payment sweep failed"),
            }
        }
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    /// Run the activation sequence. Returns `false` if another caller already settled it.
    ///
    /// The status change and the grant are one store operation, so a failure leaves the
    /// payment open for the next poll or notification to retry.
    async fn activate(&self, payment: &Payment) -> Result<bool, ReconcileError> {
        let plan = self.ledger.plan(payment.plan_id.as_str())?;

        let Some(account) = self.store.activate_payment(
            payment.local_id,
            plan.duration_days,
            self.clock.now(),
        )?
        else {
            tracing::debug!(payment_id = %payment.local_id, "Payment already settled");
            return Ok(false);
        };

        tracing::info!(
            payment_id = %payment.local_id,
            user_id = %payment.user_id,
            plan = %plan.id,
            expires_at = ?account.entitlement.expires_at(),
            "Payment succeeded, premium activated"
        );

        let text = texts::payment_succeeded(plan, account.entitlement.expires_at());
        self.notify(payment.user_id, &text).await;
        Ok(true)
    }

    /// Move an open payment to canceled or failed. Returns whether this call did it.
    async fn close(
        &self,
        payment: &Payment,
        status: PaymentStatus,
    ) -> Result<bool, ReconcileError> {
        if !self.ledger.update_status(payment.local_id, status)? {
            return Ok(false);
        }

        tracing::info!(payment_id = %payment.local_id, status = %status, "Payment closed");
        self.notify(payment.user_id, &texts::payment_closed(payment, status))
            .await;
        Ok(true)
    }

    async fn notify(&self, user_id: UserId, text: &str) {
        let Some(messenger) = &self.messenger else {
            tracing::debug!(user_id = %user_id, "No messenger configured, notification skipped");
            return;
        };

        if let Err(e) = messenger.send_message(user_id.get(), text, None).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to deliver notification");
        }
    }
}
