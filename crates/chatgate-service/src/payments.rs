//! Payment creation and lookup.

use std::sync::Arc;

use chatgate_core::{
    Clock, GateError, Payment, PaymentId, PaymentMode, PaymentStatus, Plan, PlanCatalog, UserId,
};
use chatgate_store::{Store, StoreError};

use crate::processor::{CreatePaymentRequest, PaymentMetadata, PaymentProcessor, ProcessorError};

/// Base of the confirmation URL handed out for offline payments.
const DEMO_CONFIRMATION_BASE: &str = "https://yookassa.ru/demo/payment";

/// Error type for payment creation.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Invalid input, e.g. an unknown plan.
    #[error(transparent)]
    Invalid(#[from] GateError),

    /// The processor refused or could not be reached. Nothing was recorded.
    #[error("payment processor error: {0}")]
    Processor(#[from] ProcessorError),

    /// Storage failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Persisted record of every payment attempt.
pub struct PaymentLedger {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    plans: PlanCatalog,
    processor: Option<Arc<dyn PaymentProcessor>>,
    currency: String,
    return_url: Option<String>,
}

impl PaymentLedger {
    /// Create a ledger. Without a processor every payment is created offline.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        plans: PlanCatalog,
        processor: Option<Arc<dyn PaymentProcessor>>,
        currency: impl Into<String>,
        return_url: Option<String>,
    ) -> Self {
        Self {
            store,
            clock,
            plans,
            processor,
            currency: currency.into(),
            return_url,
        }
    }

    /// The plan catalog.
    #[must_use]
    pub const fn plans(&self) -> &PlanCatalog {
        &self.plans
    }

    /// Look up a plan.
    ///
    /// # Errors
    ///
    /// Returns `GateError::UnknownPlan` if no plan has this id.
    pub fn plan(&self, plan_id: &str) -> Result<&Plan, GateError> {
        self.plans.get(plan_id)
    }

    /// Whether payments go through a real processor.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.processor.is_some()
    }

    /// Create a pending payment for `plan_id`.
    ///
    /// With a processor, the processor is asked first (the local id is the idempotence key)
    /// and the local record is written only once it accepts. Without one, an offline payment
    /// is recorded for manual or test-driven completion.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Invalid` for an unknown plan, `LedgerError::Processor` if the
    /// processor fails (no record is written), `LedgerError::Store` on storage failure.
    pub async fn create(&self, user_id: UserId, plan_id: &str) -> Result<Payment, LedgerError> {
        let plan = self.plans.get(plan_id)?;
        let local_id = PaymentId::generate();

        let (mode, external_id, confirmation_url) = match &self.processor {
            Some(processor) => {
                let request = CreatePaymentRequest {
                    idempotence_key: local_id.to_string(),
                    amount_minor: plan.price_minor,
                    currency: self.currency.clone(),
                    description: format!("{} for user {user_id}", plan.display_name),
                    return_url: self.return_url.clone(),
                    metadata: PaymentMetadata {
                        local_id,
                        user_id,
                        plan_id: plan.id.clone(),
                        days: plan.duration_days,
                    },
                };
                let created = processor.create_payment(&request).await.map_err(|e| {
                    tracing::error!(
                        user_id = %user_id,
                        plan = %plan.id,
                        error = %e,
                        "Processor refused payment creation"
                    );
                    e
                })?;
                (
                    PaymentMode::Live,
                    Some(created.id),
                    created.confirmation_url,
                )
            }
            None => (
                PaymentMode::Offline,
                None,
                Some(format!("{DEMO_CONFIRMATION_BASE}/{local_id}")),
            ),
        };

        let now = self.clock.now();
        let payment = Payment {
            local_id,
            external_id,
            user_id,
            plan_id: plan.id.clone(),
            amount_minor: plan.price_minor,
            currency: self.currency.clone(),
            status: PaymentStatus::Pending,
            mode,
            confirmation_url,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_payment(&payment)?;

        tracing::info!(
            payment_id = %payment.local_id,
            external_id = ?payment.external_id,
            user_id = %user_id,
            plan = %plan.id,
            mode = ?mode,
            "Payment created"
        );

        Ok(payment)
    }

    /// Look up a payment by local or processor id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn find_by_any_id(&self, id: &str) -> Result<Option<Payment>, StoreError> {
        self.store.find_by_any_id(id)
    }

    /// Apply a forward-only transition. Returns `false` if it was not applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn update_status(&self, id: PaymentId, next: PaymentStatus) -> Result<bool, StoreError> {
        self.store.update_status(id, next, self.clock.now())
    }

    /// Most recent payments of a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn history(&self, user_id: UserId, limit: usize) -> Result<Vec<Payment>, StoreError> {
        self.store.list_by_user(user_id, limit)
    }

    /// Every payment not yet terminal.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn open_payments(&self) -> Result<Vec<Payment>, StoreError> {
        self.store.list_open()
    }
}
