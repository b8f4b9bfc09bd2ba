//! Reconciliation tests: polls, webhooks, sweeps and their races.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chatgate_core::{
    Account, AccountStatus, Cap, ManualClock, Payment, PaymentId, PaymentMode, PaymentStatus,
    TierCounts, UserId,
};
use chatgate_service::reconciler::{SweepReport, WebhookObject};
use chatgate_service::{
    AppState, Collaborators, Messenger, PollOutcome, WebhookEvent, WebhookOutcome,
};
use chatgate_store::{AccountStore, CounterStore, MemoryStore, PaymentStore, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use common::{t0, test_config, Engine, RecordingMessenger, USER};

fn succeeded(external_id: &str) -> WebhookEvent {
    WebhookEvent {
        event: "payment.succeeded".into(),
        object: WebhookObject {
            id: external_id.into(),
            status: "succeeded".into(),
        },
    }
}

#[tokio::test]
async fn offline_poll_activates() {
    let engine = Engine::offline();
    let payment = engine.state.ledger.create(USER, "premium_year").await.unwrap();
    assert_eq!(payment.mode, PaymentMode::Offline);

    let outcome = engine
        .state
        .reconciler
        .poll(&payment.local_id.to_string())
        .await;

    assert_eq!(outcome, PollOutcome::Succeeded { activated: true });
    let status = engine.store.get_status(USER, t0()).unwrap();
    assert!(status.is_premium());
    assert_eq!(status.days_left, 365);
    assert_eq!(engine.messenger.sent().len(), 1);
    assert_eq!(engine.messenger.sent()[0].0, USER.get());
}

#[tokio::test]
async fn pending_poll_changes_nothing() {
    let engine = Engine::live();
    let payment = engine.state.ledger.create(USER, "premium_month").await.unwrap();

    let outcome = engine.state.reconciler.poll("ext-1").await;

    assert_eq!(
        outcome,
        PollOutcome::Open {
            status: PaymentStatus::Pending
        }
    );
    assert_eq!(engine.processor.fetches(), 1);
    let stored = engine.store.find_by_local_id(payment.local_id).unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert!(engine.messenger.sent().is_empty());
}

#[tokio::test]
async fn processor_error_leaves_payment_pending() {
    let engine = Engine::live();
    let payment = engine.state.ledger.create(USER, "premium_month").await.unwrap();
    engine.processor.fail_fetches(true);

    let outcome = engine
        .state
        .reconciler
        .poll(&payment.local_id.to_string())
        .await;

    assert!(matches!(outcome, PollOutcome::Error { .. }));
    let stored = engine.store.find_by_local_id(payment.local_id).unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert!(!engine.store.get_status(USER, t0()).unwrap().is_premium());

    // The processor recovers and reports success
    engine.processor.fail_fetches(false);
    engine.processor.set_status(PaymentStatus::Succeeded);
    let outcome = engine.state.reconciler.poll("ext-1").await;
    assert_eq!(outcome, PollOutcome::Succeeded { activated: true });
}

#[tokio::test]
async fn unknown_payment_is_not_found() {
    let engine = Engine::live();

    assert_eq!(
        engine.state.reconciler.poll("missing").await,
        PollOutcome::NotFound
    );
    assert_eq!(engine.processor.fetches(), 0);
}

#[tokio::test]
async fn settled_payments_are_not_polled_again() {
    let engine = Engine::live();
    let payment = engine.state.ledger.create(USER, "premium_month").await.unwrap();
    engine.processor.set_status(PaymentStatus::Succeeded);

    let id = payment.local_id.to_string();
    assert_eq!(
        engine.state.reconciler.poll(&id).await,
        PollOutcome::Succeeded { activated: true }
    );
    assert_eq!(
        engine.state.reconciler.poll(&id).await,
        PollOutcome::Succeeded { activated: false }
    );
    assert_eq!(engine.processor.fetches(), 1);
}

#[tokio::test]
async fn canceled_at_processor_closes_payment() {
    let engine = Engine::live();
    let payment = engine.state.ledger.create(USER, "premium_month").await.unwrap();
    engine.processor.set_status(PaymentStatus::Canceled);

    let outcome = engine.state.reconciler.poll("ext-1").await;

    assert_eq!(
        outcome,
        PollOutcome::Closed {
            status: PaymentStatus::Canceled
        }
    );
    assert_eq!(engine.messenger.count_containing("was canceled"), 1);

    // Forward-only: a terminal payment cannot be moved again
    assert!(!engine
        .state
        .ledger
        .update_status(payment.local_id, PaymentStatus::Succeeded)
        .unwrap());
    assert!(!engine.store.get_status(USER, t0()).unwrap().is_premium());
}

#[tokio::test]
async fn cancel_after_success_is_refused() {
    let engine = Engine::offline();
    let payment = engine.state.ledger.create(USER, "premium_month").await.unwrap();
    engine
        .state
        .reconciler
        .complete(&payment.local_id.to_string())
        .await;

    let changed = engine
        .state
        .ledger
        .update_status(payment.local_id, PaymentStatus::Canceled)
        .unwrap();

    assert!(!changed);
    let stored = engine.store.find_by_local_id(payment.local_id).unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Succeeded);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn poll_and_webhook_race_activates_once() {
    for _ in 0..20 {
        let engine = Engine::live();
        engine.state.ledger.create(USER, "premium_month").await.unwrap();
        engine.processor.set_status(PaymentStatus::Succeeded);

        let poller = engine.state.reconciler.clone();
        let polled = tokio::spawn(async move { poller.poll("ext-1").await });
        let notifier = engine.state.reconciler.clone();
        let notified =
            tokio::spawn(async move { notifier.handle_webhook(&succeeded("ext-1")).await });

        let polled = polled.await.unwrap();
        let notified = notified.await.unwrap().unwrap();

        let activations = usize::from(polled == PollOutcome::Succeeded { activated: true })
            + usize::from(notified == WebhookOutcome::Activated);
        assert_eq!(activations, 1, "poll: {polled:?}, webhook: {notified:?}");
        assert_eq!(engine.messenger.count_containing("Payment received"), 1);
        assert!(engine.store.get_status(USER, t0()).unwrap().is_premium());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_completions_activate_once() {
    let engine = Engine::offline();
    let payment = engine.state.ledger.create(USER, "premium_month").await.unwrap();
    let id = payment.local_id.to_string();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let reconciler = engine.state.reconciler.clone();
            let id = id.clone();
            tokio::spawn(async move { reconciler.complete(&id).await })
        })
        .collect();

    let mut activated = 0;
    for handle in handles {
        if handle.await.unwrap() == (PollOutcome::Succeeded { activated: true }) {
            activated += 1;
        }
    }

    assert_eq!(activated, 1);
    assert_eq!(engine.messenger.sent().len(), 1);
}

#[tokio::test]
async fn repeated_activation_resets_expiry() {
    let engine = Engine::offline();
    let first = engine.state.ledger.create(USER, "premium_month").await.unwrap();
    engine
        .state
        .reconciler
        .complete(&first.local_id.to_string())
        .await;

    engine.clock.advance(chrono::Duration::days(10));
    let second = engine.state.ledger.create(USER, "premium_month").await.unwrap();
    engine
        .state
        .reconciler
        .complete(&second.local_id.to_string())
        .await;

    let status = engine
        .store
        .get_status(USER, t0() + chrono::Duration::days(10))
        .unwrap();
    assert_eq!(status.days_left, 30);
}

#[tokio::test]
async fn sweep_settles_live_payments_only() {
    let engine = Engine::live();
    engine.state.ledger.create(USER, "premium_month").await.unwrap();
    engine
        .state
        .ledger
        .create(common::ADMIN, "premium_year")
        .await
        .unwrap();
    engine.processor.set_status(PaymentStatus::Succeeded);

    let report = engine.state.reconciler.sweep_open().await.unwrap();

    assert_eq!(
        report,
        SweepReport {
            checked: 2,
            activated: 2,
            closed: 0,
            errors: 0,
        }
    );
    assert!(engine.state.ledger.open_payments().unwrap().is_empty());

    // Nothing left to do
    let report = engine.state.reconciler.sweep_open().await.unwrap();
    assert_eq!(report, SweepReport::default());
}

#[tokio::test]
async fn sweep_skips_offline_payments() {
    let engine = Engine::offline();
    engine.state.ledger.create(USER, "premium_month").await.unwrap();

    let report = engine.state.reconciler.sweep_open().await.unwrap();

    assert_eq!(report.checked, 0);
    assert_eq!(engine.state.ledger.open_payments().unwrap().len(), 1);
}

#[tokio::test]
async fn sweep_counts_processor_errors() {
    let engine = Engine::live();
    engine.state.ledger.create(USER, "premium_month").await.unwrap();
    engine.processor.fail_fetches(true);

    let report = engine.state.reconciler.sweep_open().await.unwrap();

    assert_eq!(report.checked, 1);
    assert_eq!(report.errors, 1);
    assert_eq!(engine.state.ledger.open_payments().unwrap().len(), 1);
}

/// Memory store whose next payment activation fails, as a dropped database write would.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_next_activation: AtomicBool,
}

impl AccountStore for FlakyStore {
    fn get_account(&self, user_id: UserId) -> chatgate_store::Result<Option<Account>> {
        self.inner.get_account(user_id)
    }

    fn get_status(
        &self,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> chatgate_store::Result<AccountStatus> {
        self.inner.get_status(user_id, now)
    }

    fn grant(
        &self,
        user_id: UserId,
        days: u32,
        now: DateTime<Utc>,
    ) -> chatgate_store::Result<Account> {
        self.inner.grant(user_id, days, now)
    }

    fn revoke(&self, user_id: UserId, now: DateTime<Utc>) -> chatgate_store::Result<Account> {
        self.inner.revoke(user_id, now)
    }

    fn list_accounts(&self, limit: usize) -> chatgate_store::Result<Vec<Account>> {
        self.inner.list_accounts(limit)
    }

    fn count_by_tier(&self, now: DateTime<Utc>) -> chatgate_store::Result<TierCounts> {
        self.inner.count_by_tier(now)
    }
}

impl CounterStore for FlakyStore {
    fn get_count(&self, user_id: UserId, day: NaiveDate) -> chatgate_store::Result<u32> {
        self.inner.get_count(user_id, day)
    }

    fn increment_if_below(
        &self,
        user_id: UserId,
        day: NaiveDate,
        cap: Cap,
    ) -> chatgate_store::Result<(bool, u32)> {
        self.inner.increment_if_below(user_id, day, cap)
    }

    fn reset_counter(&self, user_id: UserId, day: NaiveDate) -> chatgate_store::Result<bool> {
        self.inner.reset_counter(user_id, day)
    }
}

impl PaymentStore for FlakyStore {
    fn insert_payment(&self, payment: &Payment) -> chatgate_store::Result<()> {
        self.inner.insert_payment(payment)
    }

    fn find_by_local_id(&self, id: PaymentId) -> chatgate_store::Result<Option<Payment>> {
        self.inner.find_by_local_id(id)
    }

    fn find_by_external_id(&self, external_id: &str) -> chatgate_store::Result<Option<Payment>> {
        self.inner.find_by_external_id(external_id)
    }

    fn update_status(
        &self,
        id: PaymentId,
        next: PaymentStatus,
        now: DateTime<Utc>,
    ) -> chatgate_store::Result<bool> {
        self.inner.update_status(id, next, now)
    }

    fn activate_payment(
        &self,
        id: PaymentId,
        days: u32,
        now: DateTime<Utc>,
    ) -> chatgate_store::Result<Option<Account>> {
        if self.fail_next_activation.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database("write stalled".into()));
        }
        self.inner.activate_payment(id, days, now)
    }

    fn list_by_user(&self, user_id: UserId, limit: usize) -> chatgate_store::Result<Vec<Payment>> {
        self.inner.list_by_user(user_id, limit)
    }

    fn list_open(&self) -> chatgate_store::Result<Vec<Payment>> {
        self.inner.list_open()
    }
}

#[tokio::test]
async fn failed_activation_is_retried_by_the_next_poll() {
    let store = Arc::new(FlakyStore::default());
    let messenger = Arc::new(RecordingMessenger::default());
    let state = AppState::with_collaborators(
        store.clone(),
        test_config(),
        Collaborators {
            clock: Arc::new(ManualClock::new(t0())),
            processor: None,
            messenger: Some(messenger.clone() as Arc<dyn Messenger>),
        },
    );
    let payment = state.ledger.create(USER, "premium_month").await.unwrap();
    let id = payment.local_id.to_string();
    store.fail_next_activation.store(true, Ordering::SeqCst);

    let outcome = state.reconciler.poll(&id).await;

    assert!(matches!(outcome, PollOutcome::Error { .. }), "{outcome:?}");
    let stored = store.find_by_local_id(payment.local_id).unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Pending);
    assert!(!store.get_status(USER, t0()).unwrap().is_premium());
    assert_eq!(messenger.count_containing("Payment received"), 0);

    let outcome = state.reconciler.poll(&id).await;

    assert_eq!(outcome, PollOutcome::Succeeded { activated: true });
    let status = store.get_status(USER, t0()).unwrap();
    assert!(status.is_premium());
    assert_eq!(status.days_left, 30);
    assert_eq!(messenger.count_containing("Payment received"), 1);
}

#[tokio::test]
async fn failed_activation_from_a_webhook_is_retried_on_redelivery() {
    let store = Arc::new(FlakyStore::default());
    let messenger = Arc::new(RecordingMessenger::default());
    let state = AppState::with_collaborators(
        store.clone(),
        test_config(),
        Collaborators {
            clock: Arc::new(ManualClock::new(t0())),
            processor: None,
            messenger: Some(messenger.clone() as Arc<dyn Messenger>),
        },
    );
    let payment = state.ledger.create(USER, "premium_month").await.unwrap();
    let event = succeeded(&payment.local_id.to_string());
    store.fail_next_activation.store(true, Ordering::SeqCst);

    assert!(state.reconciler.handle_webhook(&event).await.is_err());
    assert!(!store.get_status(USER, t0()).unwrap().is_premium());

    assert_eq!(
        state.reconciler.handle_webhook(&event).await.unwrap(),
        WebhookOutcome::Activated
    );
    assert!(store.get_status(USER, t0()).unwrap().is_premium());
    assert_eq!(messenger.count_containing("Payment received"), 1);
}
