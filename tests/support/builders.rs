use std::path::Path;
use std::sync::Arc;

use sandchat::core::agent_loop::{AgentLoop, default_registry};
use sandchat::core::config::AppConfig;
use sandchat::store::conversations::ConversationStore;

/// Config pointed at a mock inference server, with `sh` as the sandbox.
pub fn test_config(inference_url: &str, data_dir: &Path) -> AppConfig {
    let mut config = AppConfig::with_data_dir(data_dir);
    config.profile = "test".to_string();
    config.inference_url = inference_url.to_string();
    config.sandbox_command = vec!["sh".to_string()];
    config.sandbox_timeout_secs = 10;
    config.retry_delay_ms = 1;
    config
}

pub fn agent(config: AppConfig) -> AgentLoop {
    let config = Arc::new(config);
    let conversations = Arc::new(ConversationStore::open(&config.data_dir).expect("store"));
    let registry = default_registry(&config).expect("registry");
    AgentLoop::new(config, conversations, registry)
}

/// A fenced json action as the model would write it.
pub fn action(tool_name: &str, tool_input: &str) -> String {
    let body = serde_json::json!({ "tool_name": tool_name, "tool_input": tool_input });
    format!(
        "Let me check.\n```json\n{}\n```",
        serde_json::to_string_pretty(&body).expect("json")
    )
}
