use relay::config::RelayConfig;
use relay::dispatch::{Dispatcher, Replies};
use relay_ai::{OpenAiCompatibleBackend, OpenAiCompatibleConfig};
use relay_conversation::{InMemorySessionStore, Orchestrator, OrchestratorConfig};
use relay_telegram::{TelegramClient, TelegramClientConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // A missing .env file is fine; the environment may already be set.
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env().expect("failed to load configuration");
    tracing::info!(
        model = %config.backend.model,
        backend = %config.backend.base_url,
        "Loaded configuration"
    );

    let backend = OpenAiCompatibleBackend::new(
        OpenAiCompatibleConfig::new(
            "ai-gateway",
            config.backend.base_url.clone(),
            config.backend.api_key.clone(),
        )
        .with_timeout(config.backend.request_timeout()),
    )
    .expect("failed to create completion backend");
    tracing::info!(endpoint = backend.endpoint(), "Completion backend ready");

    let orchestrator = Orchestrator::new(
        InMemorySessionStore::new(config.conversation.system_prompt.clone()),
        backend,
        OrchestratorConfig::new(config.backend.model.clone())
            .with_reset_keyword(config.conversation.reset_keyword.clone())
            .with_request_timeout(config.backend.request_timeout()),
    );

    let messenger = TelegramClient::new(
        TelegramClientConfig::new(config.telegram.bot_token.clone())
            .with_api_base(config.telegram.api_base.clone())
            .with_poll_timeout(config.telegram.poll_timeout()),
    )
    .expect("failed to create Telegram client");

    let replies = Replies {
        reset: config.conversation.reset_reply,
        failure: config.conversation.failure_notice,
    };

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("Shutdown signal received");
                    cancel.cancel();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to listen for shutdown signal");
                }
            }
        }
    });

    tracing::info!("Relay started");
    Arc::new(Dispatcher::new(
        Arc::new(messenger),
        Arc::new(orchestrator),
        replies,
    ))
    .run(cancel)
    .await;
    tracing::info!("Relay stopped");
}
