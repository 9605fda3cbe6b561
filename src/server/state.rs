use std::sync::Arc;

use crate::core::agent_loop::AgentLoop;
use crate::core::config::AppConfig;
use crate::store::conversations::ConversationStore;
use crate::tape::history::HistoryStore;

/// Shared application state accessible to all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub agent: Arc<AgentLoop>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, agent: Arc<AgentLoop>) -> Self {
        Self { config, agent }
    }

    pub fn conversations(&self) -> &ConversationStore {
        self.agent.conversations()
    }

    pub fn history(&self) -> &HistoryStore {
        self.agent.history()
    }
}
