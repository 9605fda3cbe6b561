pub mod chat;
pub mod conversations;
pub mod files;
pub mod identity;
pub mod router;
pub mod state;

use std::sync::Arc;

use tracing::info;

use crate::core::agent_loop::{AgentLoop, default_registry};
use crate::core::config::AppConfig;
use crate::core::error::{Result, SandchatError};
use crate::store::conversations::ConversationStore;

/// Build the shared state for `config`.
pub fn build_state(config: AppConfig) -> Result<state::AppState> {
    std::fs::create_dir_all(&config.data_dir)?;
    let config = Arc::new(config);
    let conversations = Arc::new(ConversationStore::open(&config.data_dir)?);
    let registry = default_registry(&config)?;
    info!(tools = ?registry.names(), "server.tools");
    let agent = Arc::new(AgentLoop::new(config.clone(), conversations, registry));
    Ok(state::AppState::new(config, agent))
}

/// Serve until Ctrl-C.
pub async fn start(config: AppConfig) -> Result<()> {
    let bind_addr = config.bind.clone();
    let app = router::build(build_state(config)?);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| SandchatError::Config(format!("failed to bind to {bind_addr}: {e}")))?;

    info!(addr = %bind_addr, "server.listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await
        .map_err(SandchatError::Io)?;

    info!("server.stopped");
    Ok(())
}
