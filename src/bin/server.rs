//! SQLPG Server binary

use anyhow::{Context, Result};
use sqlpg::api::{create_router, ApiState};
use sqlpg::provider::{CompletionClient, OpenAiProvider};
use sqlpg::{credential, AssistantConfig, Assistant, SessionStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting SQLPG Server v{}", env!("CARGO_PKG_VERSION"));

    let config_path = PathBuf::from(
        std::env::args()
            .nth(1)
            .unwrap_or_else(|| "config.toml".to_string()),
    );
    let config = AssistantConfig::load(&config_path)?;

    info!(
        config_path = %config_path.display(),
        model = config.model,
        completion_url = config.completion_url,
        "Loaded configuration"
    );

    let credential = credential::resolve(&config.token_url).await;
    if !credential.is_present() {
        warn!("No completion credential; model requests will be rejected upstream");
    }
    let credential_present = credential.is_present();

    let provider = OpenAiProvider::new(
        &config.completion_url,
        credential,
        &config.model,
        Duration::from_secs(config.request_timeout_secs),
    )
    .context("Failed to create HTTP client")?;
    let client = CompletionClient::new(Arc::new(provider), config.max_tokens, config.temperature);

    if !config.sample_path.exists() {
        warn!(path = %config.sample_path.display(), "Sample script not found; \"Load sample data\" will fail");
    }

    let sessions = Arc::new(SessionStore::new());
    Arc::clone(&sessions).start_eviction_task(
        Duration::from_secs(config.session_ttl_secs),
        config.session_sweep_secs,
    );
    info!(
        ttl_secs = config.session_ttl_secs,
        sweep_secs = config.session_sweep_secs,
        "Started idle session eviction"
    );

    let state = Arc::new(ApiState {
        assistant: Arc::new(Assistant::new(client, config.sample_path.clone())),
        sessions,
        credential_present,
    });

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
