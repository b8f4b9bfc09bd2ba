//! Application state.

use std::sync::Arc;

use chatgate_core::{Clock, PlanCatalog, SystemClock};
use chatgate_store::Store;

use crate::admin::AdminOverride;
use crate::config::ServiceConfig;
use crate::messenger::Messenger;
use crate::payments::PaymentLedger;
use crate::processor::PaymentProcessor;
use crate::quota::QuotaLedger;
use crate::reconciler::PaymentReconciler;
use crate::yookassa::YooKassaClient;

/// External collaborators the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Payment processor; `None` selects offline payments.
    pub processor: Option<Arc<dyn PaymentProcessor>>,
    /// Outbound user notifications; `None` skips them.
    pub messenger: Option<Arc<dyn Messenger>>,
}

/// Application state shared across handlers, the bot and background tasks.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Daily message quota.
    pub quota: Arc<QuotaLedger>,

    /// Payment records.
    pub ledger: Arc<PaymentLedger>,

    /// Poll and webhook reconciliation.
    pub reconciler: Arc<PaymentReconciler>,

    /// Privileged operations.
    pub admin: Arc<AdminOverride>,
}

impl AppState {
    /// Create the application state, building the payment processor from `config`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        messenger: Option<Arc<dyn Messenger>>,
    ) -> Self {
        let processor = config
            .yookassa_shop_id
            .as_ref()
            .zip(config.yookassa_secret_key.as_ref())
            .and_then(|(shop_id, secret_key)| {
                match YooKassaClient::new(shop_id, secret_key, config.processor_timeout()) {
                    Ok(client) => {
                        tracing::info!(shop_id = %shop_id, "YooKassa integration enabled");
                        Some(Arc::new(client) as Arc<dyn PaymentProcessor>)
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to create YooKassa client");
                        None
                    }
                }
            });

        if processor.is_none() {
            tracing::warn!("YooKassa not configured - payments will be created in offline mode");
        }

        if messenger.is_none() {
            tracing::warn!("Messenger not configured - payment notifications will be skipped");
        }

        Self::with_collaborators(
            store,
            config,
            Collaborators {
                clock: Arc::new(SystemClock),
                processor,
                messenger,
            },
        )
    }

    /// Create the application state from explicit collaborators.
    #[must_use]
    pub fn with_collaborators(
        store: Arc<dyn Store>,
        config: ServiceConfig,
        collaborators: Collaborators,
    ) -> Self {
        let Collaborators {
            clock,
            processor,
            messenger,
        } = collaborators;

        let quota = Arc::new(QuotaLedger::new(
            store.clone(),
            clock.clone(),
            config.daily_free_cap,
        ));
        let ledger = Arc::new(PaymentLedger::new(
            store.clone(),
            clock.clone(),
            PlanCatalog::default(),
            processor.clone(),
            config.payment_currency.clone(),
            config.yookassa_return_url.clone(),
        ));
        let reconciler = Arc::new(PaymentReconciler::new(
            ledger.clone(),
            store.clone(),
            clock.clone(),
            processor,
            messenger,
        ));
        let admin = Arc::new(AdminOverride::new(
            config.admin_ids.clone(),
            store.clone(),
            clock,
            quota.clone(),
            ledger.clone(),
            reconciler.clone(),
        ));

        Self {
            store,
            config,
            quota,
            ledger,
            reconciler,
            admin,
        }
    }

    /// Check if live payments are available.
    #[must_use]
    pub fn has_processor(&self) -> bool {
        self.ledger.is_live()
    }
}
