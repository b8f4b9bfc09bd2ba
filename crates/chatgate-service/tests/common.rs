//! Common test utilities for chatgate integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum_test::TestServer;
use chrono::{DateTime, TimeZone, Utc};

use chatgate_core::{ManualClock, PaymentStatus, UserId};
use chatgate_service::llm::ResponderError;
use chatgate_service::messenger::Keyboard;
use chatgate_service::processor::{CreatePaymentRequest, ProcessorPayment};
use chatgate_service::{
    create_router, AppState, Collaborators, Messenger, MessengerError, PaymentProcessor,
    ProcessorError, Responder, ServiceConfig,
};
use chatgate_store::MemoryStore;

/// Operator on the allow-list.
pub const ADMIN: UserId = UserId::new(1000);

/// An ordinary user.
pub const USER: UserId = UserId::new(42);

/// Shared admin API key.
pub const ADMIN_KEY: &str = "test-admin-key";

/// Start of every test clock.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

// ============================================================================
// Fake collaborators
// ============================================================================

/// Messenger that records every outbound message.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(i64, String, Option<Keyboard>)>>,
    callbacks: Mutex<Vec<String>>,
}

impl RecordingMessenger {
    /// Messages sent so far as `(chat, text)`.
    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(chat, text, _)| (*chat, text.clone()))
            .collect()
    }

    /// Keyboard of the last message.
    pub fn last_keyboard(&self) -> Option<Keyboard> {
        self.sent.lock().unwrap().last().and_then(|(_, _, k)| k.clone())
    }

    /// Number of sent messages containing `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.sent()
            .iter()
            .filter(|(_, text)| text.contains(needle))
            .count()
    }

    /// Acknowledged callback ids.
    pub fn callbacks(&self) -> Vec<String> {
        self.callbacks.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), MessengerError> {
        self.sent
            .lock()
            .unwrap()
            .push((chat_id, text.to_string(), keyboard.cloned()));
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), MessengerError> {
        self.callbacks.lock().unwrap().push(callback_id.to_string());
        Ok(())
    }
}

/// Processor whose answers are set by the test.
pub struct ScriptedProcessor {
    status: Mutex<PaymentStatus>,
    fail_fetch: AtomicBool,
    fail_create: AtomicBool,
    created: Mutex<Vec<CreatePaymentRequest>>,
    fetches: AtomicUsize,
}

impl Default for ScriptedProcessor {
    fn default() -> Self {
        Self {
            status: Mutex::new(PaymentStatus::Pending),
            fail_fetch: AtomicBool::new(false),
            fail_create: AtomicBool::new(false),
            created: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
        }
    }
}

impl ScriptedProcessor {
    /// Status reported by subsequent fetches.
    pub fn set_status(&self, status: PaymentStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Make fetches fail (as a timeout would).
    pub fn fail_fetches(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    /// Make creates fail.
    pub fn fail_creates(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Create requests received so far.
    pub fn created(&self) -> Vec<CreatePaymentRequest> {
        self.created.lock().unwrap().clone()
    }

    /// Number of fetches so far.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProcessor for ScriptedProcessor {
    async fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<ProcessorPayment, ProcessorError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ProcessorError::Api {
                status: 401,
                code: "invalid_credentials".into(),
                description: "bad shop id".into(),
            });
        }

        let mut created = self.created.lock().unwrap();
        created.push(request.clone());
        let id = format!("ext-{}", created.len());
        Ok(ProcessorPayment {
            confirmation_url: Some(format!("https://pay.example/{id}")),
            id,
            status: PaymentStatus::Pending,
        })
    }

    async fn fetch_payment(&self, external_id: &str) -> Result<ProcessorPayment, ProcessorError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(ProcessorError::Configuration("processor unreachable".into()));
        }
        Ok(ProcessorPayment {
            id: external_id.to_string(),
            status: *self.status.lock().unwrap(),
            confirmation_url: None,
        })
    }
}

/// Responder that always answers the same thing.
pub struct CannedResponder {
    pub answer: String,
    pub calls: AtomicUsize,
}

impl CannedResponder {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Responder for CannedResponder {
    async fn reply(&self, _user: UserId, _text: &str) -> Result<String, ResponderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}

// ============================================================================
// Engine and HTTP harness
// ============================================================================

/// The engine over a memory store, with fakes for every collaborator.
pub struct Engine {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub processor: Arc<ScriptedProcessor>,
    pub messenger: Arc<RecordingMessenger>,
}

impl Engine {
    /// Payments go through the scripted processor.
    pub fn live() -> Self {
        Self::build(true, test_config())
    }

    /// No processor: payments are created offline.
    pub fn offline() -> Self {
        Self::build(false, test_config())
    }

    pub fn build(live: bool, config: ServiceConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let processor = Arc::new(ScriptedProcessor::default());
        let messenger = Arc::new(RecordingMessenger::default());

        let state = AppState::with_collaborators(
            store.clone(),
            config,
            Collaborators {
                clock: clock.clone(),
                processor: live.then(|| processor.clone() as Arc<dyn PaymentProcessor>),
                messenger: Some(messenger.clone() as Arc<dyn Messenger>),
            },
        );

        Self {
            state,
            store,
            clock,
            processor,
            messenger,
        }
    }
}

/// Configuration with a known admin and admin key.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        admin_ids: HashSet::from([ADMIN]),
        admin_api_key: Some(ADMIN_KEY.into()),
        daily_free_cap: 5,
        pending_sweep_interval_seconds: 0,
        ..ServiceConfig::default()
    }
}

/// Test harness containing everything needed for HTTP integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The engine behind the server.
    pub engine: Engine,
}

impl TestHarness {
    /// Harness with offline payments.
    pub fn new() -> Self {
        Self::from_engine(Engine::offline())
    }

    /// Harness with the scripted processor.
    pub fn live() -> Self {
        Self::from_engine(Engine::live())
    }

    /// Harness with a custom configuration.
    pub fn with_config(config: ServiceConfig) -> Self {
        Self::from_engine(Engine::build(false, config))
    }

    fn from_engine(engine: Engine) -> Self {
        let router: Router = create_router(engine.state.clone());
        let server = TestServer::new(router).expect("Failed to create test server");
        Self { server, engine }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
