//! The tool-invocation loop shared by every channel.
//!
//! For each user message the loop renders the memory window, streams a
//! completion, appends it to history, and parses it. A tool action is
//! dispatched and its observation appended before the next round; a plain
//! answer ends the turn. Parse failures end the turn without retry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::core::config::AppConfig;
use crate::core::error::Result;
use crate::core::model_runner::ModelRunner;
use crate::core::opening_remarks;
use crate::core::output_parser::{self, AgentStep};
use crate::core::prompt;
use crate::core::schemas::{ChatMessage, MessageContent, MessageType};
use crate::core::utils::new_id;
use crate::store::conversations::ConversationStore;
use crate::tape::history::{HistoryStore, SessionHistory};
use crate::tape::store::{Role, StoredMessage};
use crate::tools::code_sandbox::CodeSandbox;
use crate::tools::registry::ToolRegistry;
use crate::tools::sandbox::ProcessExecutor;

/// Receives every message the loop produces for the client.
pub type EventSink = mpsc::UnboundedSender<ChatMessage>;

/// Outcome of one handled user message.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TurnResult {
    /// Last assistant text produced in the turn.
    pub assistant_text: String,
    /// Number of tool observations appended.
    pub tool_rounds: usize,
    pub error: Option<String>,
}

/// Registry with the built-in `code_sandbox` tool backed by a process
/// executor under `<data_dir>/sandbox`.
pub fn default_registry(config: &AppConfig) -> Result<ToolRegistry> {
    let executor = ProcessExecutor::new(
        config.sandbox_command.clone(),
        config.data_dir.join("sandbox"),
        Duration::from_secs(config.sandbox_timeout_secs),
    )?;
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CodeSandbox::new(Arc::new(executor))));
    Ok(registry)
}

pub struct AgentLoop {
    config: Arc<AppConfig>,
    history: HistoryStore,
    conversations: Arc<ConversationStore>,
    registry: ToolRegistry,
}

impl AgentLoop {
    pub fn new(
        config: Arc<AppConfig>,
        conversations: Arc<ConversationStore>,
        registry: ToolRegistry,
    ) -> Self {
        let history = HistoryStore::new(config.data_dir.join("history"));
        Self {
            config,
            history,
            conversations,
            registry,
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    /// Handle one message from `user`, streaming output to `sink`.
    ///
    /// Never fails: errors are sent to the sink and recorded in the result.
    #[instrument(skip_all, fields(conversation = %message.conversation, user = ?user))]
    pub async fn handle_message(
        &self,
        user: Option<&str>,
        message: ChatMessage,
        sink: &EventSink,
    ) -> TurnResult {
        let mut result = TurnResult::default();
        let conversation = message.conversation.clone();

        if let Err(e) = self.conversations.get(&conversation, user).await {
            fail(sink, &conversation, &mut result, e.to_string());
            return result;
        }

        let mut history = match self.history.session(user, &conversation) {
            Ok(history) => history,
            Err(e) => {
                fail(sink, &conversation, &mut result, e.to_string());
                return result;
            }
        };

        match &message.content {
            MessageContent::File(file) => {
                match opening_remarks::start(&mut history, &self.registry, &message.id, file).await
                {
                    Ok(remarks) => {
                        emit(
                            sink,
                            ChatMessage::new(
                                &conversation,
                                "tool",
                                format!("{}\n{}", remarks.tool_name, remarks.tool_output),
                                MessageType::Text,
                            ),
                        );
                        result.tool_rounds = 1;
                    }
                    Err(e) => fail(sink, &conversation, &mut result, e.to_string()),
                }
            }
            MessageContent::Text(text) => {
                if text.trim().is_empty() {
                    return result;
                }
                let human = StoredMessage::new(Role::Human, text.as_str()).with_id(&message.id);
                if let Err(e) = history.add_message(human) {
                    fail(sink, &conversation, &mut result, e.to_string());
                    return result;
                }
                self.run_rounds(&mut history, &conversation, sink, &mut result)
                    .await;
            }
        }

        if let Err(e) = self.conversations.touch(&conversation, user).await {
            warn!(error = %e, "agent_loop.touch.error");
        }
        result
    }

    async fn run_rounds(
        &self,
        history: &mut SessionHistory,
        conversation: &str,
        sink: &EventSink,
        result: &mut TurnResult,
    ) {
        let system =
            prompt::system_prompt_today(self.config.system_prompt.as_deref(), &self.registry);
        let runner = ModelRunner::new(&self.config);

        for round in 0..self.config.max_tool_iterations {
            let memory = history.windowed_messages(self.config.window_size);
            let rendered = prompt::render(&system, &memory);
            debug!(round, memory_len = memory.len(), "agent_loop.model_request");

            let reply_id = new_id();
            emit(
                sink,
                ChatMessage::new(conversation, "ai", "", MessageType::StreamStart).with_id(&reply_id),
            );
            let generated = runner
                .generate(&rendered, |token| {
                    emit(
                        sink,
                        ChatMessage::new(conversation, "ai", token, MessageType::StreamText)
                            .with_id(&reply_id),
                    );
                })
                .await;
            emit(
                sink,
                ChatMessage::new(conversation, "ai", "", MessageType::StreamEnd).with_id(&reply_id),
            );

            let text = match generated {
                Ok(text) => text,
                Err(e) => {
                    fail(sink, conversation, result, e.to_string());
                    return;
                }
            };

            if let Err(e) =
                history.add_message(StoredMessage::new(Role::Ai, text.as_str()).with_id(&reply_id))
            {
                fail(sink, conversation, result, e.to_string());
                return;
            }
            result.assistant_text = text.clone();

            let action = match output_parser::parse(&text) {
                Ok(AgentStep::Finish(_)) => return,
                Ok(AgentStep::Action(action)) => action,
                Err(e) => {
                    fail(sink, conversation, result, e.to_string());
                    return;
                }
            };

            let observation = match self.registry.get(&action.tool_name) {
                Some(tool) => tool.run(history.key(), &action.tool_input).await,
                None => {
                    warn!(tool = %action.tool_name, "agent_loop.unknown_tool");
                    format!("Unknown tool: {}", action.tool_name)
                }
            };
            info!(
                round,
                tool = %action.tool_name,
                result_len = observation.len(),
                "agent_loop.tool_result"
            );

            let content = format!("{}\n{observation}", action.tool_name);
            if let Err(e) = history.add_message(StoredMessage::new(Role::Tool, content.as_str())) {
                fail(sink, conversation, result, e.to_string());
                return;
            }
            emit(
                sink,
                ChatMessage::new(conversation, "tool", content, MessageType::Text),
            );
            result.tool_rounds += 1;
        }

        info!(
            rounds = self.config.max_tool_iterations,
            "agent_loop.iteration_limit"
        );
        emit(
            sink,
            ChatMessage::info(
                conversation,
                format!(
                    "Stopped after {} tool rounds.",
                    self.config.max_tool_iterations
                ),
            ),
        );
    }
}

fn emit(sink: &EventSink, message: ChatMessage) {
    if sink.send(message).is_err() {
        debug!("agent_loop.sink_closed");
    }
}

fn fail(sink: &EventSink, conversation: &str, result: &mut TurnResult, error: String) {
    warn!(error = %error, "agent_loop.error");
    emit(sink, ChatMessage::error(conversation, error.clone()));
    result.error = Some(error);
}
