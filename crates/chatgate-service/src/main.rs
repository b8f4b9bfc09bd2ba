//! Chatgate Service - subscription, quota and payment engine for a chat bot
//!
//! This is the main entry point: it opens the store, starts the bot and the open-payment
//! sweep under supervision, and serves the webhook and admin API.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use chatgate_service::{
    create_router, supervise, AppState, Bot, ChatCompletionClient, Messenger, Responder,
    RestartPolicy, ServiceConfig, TelegramClient,
};
use chatgate_store::Store;

/// Timeout for outbound messaging and language model calls.
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,chatgate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Chatgate Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        telegram_configured = %config.telegram_token.is_some(),
        llm_configured = %config.llm_api_key.is_some(),
        processor_configured = %config.processor_configured(),
        admins = config.admin_ids.len(),
        daily_free_cap = config.daily_free_cap,
        "Service configuration loaded"
    );

    let store = open_store(&config)?;

    let telegram = match &config.telegram_token {
        Some(token) => Some(Arc::new(TelegramClient::new(token, OUTBOUND_TIMEOUT)?)),
        None => {
            tracing::warn!("TELEGRAM_TOKEN not set - bot polling disabled");
            None
        }
    };
    let messenger = telegram
        .clone()
        .map(|client| client as Arc<dyn Messenger>);

    let state = AppState::new(store, config.clone(), messenger.clone());
    let policy = RestartPolicy::new(
        config.max_restarts,
        Duration::from_secs(config.restart_backoff_seconds),
    );

    // Open-payment sweep
    if let Some(interval) = config.sweep_interval() {
        let reconciler = state.reconciler.clone();
        tokio::spawn(async move {
            let result = supervise("payment-sweep", policy, move || {
                let reconciler = reconciler.clone();
                async move {
                    reconciler.run_sweep(interval).await;
                    Ok::<(), std::convert::Infallible>(())
                }
            })
            .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Payment sweep stopped");
            }
        });
        tracing::info!(interval_secs = interval.as_secs(), "Open-payment sweep enabled");
    }

    // Bot polling
    if let (Some(telegram), Some(messenger)) = (telegram, messenger) {
        let responder = build_responder(&config)?;
        let bot = Arc::new(Bot::new(&state, messenger, responder));
        let long_poll = Duration::from_secs(config.long_poll_timeout_seconds);

        tokio::spawn(async move {
            let result = supervise("bot", policy, move || {
                Arc::clone(&bot).run(Arc::clone(&telegram), long_poll)
            })
            .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Bot stopped");
            }
        });
    }

    // Create the router
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Chatgate Service stopped");
    Ok(())
}

#[cfg(feature = "rocksdb-backend")]
fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    Ok(Arc::new(chatgate_store::RocksStore::open(&config.data_dir)?))
}

#[cfg(not(feature = "rocksdb-backend"))]
#[allow(clippy::unnecessary_wraps)]
fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    tracing::warn!(
        data_dir = %config.data_dir,
        "Built without rocksdb-backend - using in-memory store, data is lost on restart"
    );
    Ok(Arc::new(chatgate_store::MemoryStore::new()))
}

fn build_responder(
    config: &ServiceConfig,
) -> Result<Option<Arc<dyn Responder>>, Box<dyn std::error::Error>> {
    let Some(api_key) = &config.llm_api_key else {
        tracing::warn!("LLM_API_KEY not set - content messages will get an apology");
        return Ok(None);
    };

    let client = ChatCompletionClient::new(
        &config.llm_api_url,
        api_key,
        &config.llm_model,
        &config.llm_system_prompt,
        OUTBOUND_TIMEOUT,
    )?;
    tracing::info!(model = %config.llm_model, "Language model configured");
    Ok(Some(Arc::new(client)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
