use std::io::Write;
use std::sync::Arc;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::agent_loop::{AgentLoop, default_registry};
use crate::core::config::AppConfig;
use crate::core::error::{Result, SandchatError};
use crate::core::schemas::{ChatMessage, FileRef, MessageContent, MessageType};
use crate::store::conversations::ConversationStore;

/// What a line typed at the prompt asks for.
#[derive(Debug, PartialEq, Eq)]
pub enum ReplInput {
    Quit,
    Upload(String),
    Message(String),
    Empty,
}

pub fn parse_input(line: &str) -> ReplInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ReplInput::Empty;
    }
    if trimmed == "/quit" || trimmed == "/exit" {
        return ReplInput::Quit;
    }
    if let Some(path) = trimmed.strip_prefix("/upload") {
        let path = path.trim();
        if !path.is_empty() {
            return ReplInput::Upload(path.to_string());
        }
    }
    ReplInput::Message(trimmed.to_string())
}

/// Describe a local file the way an upload would.
pub fn file_ref(path: &str) -> Result<FileRef> {
    let path = std::fs::canonicalize(path)?;
    let size = std::fs::metadata(&path)?.len();
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    Ok(FileRef {
        filename,
        path: path.to_string_lossy().to_string(),
        size,
    })
}

/// Run an interactive chat session against the agent loop.
pub fn run_interactive(
    rt: &Runtime,
    config: AppConfig,
    user: Option<&str>,
    conversation: Option<&str>,
) -> Result<()> {
    std::fs::create_dir_all(&config.data_dir)?;
    let config = Arc::new(config);
    let conversations = Arc::new(ConversationStore::open(&config.data_dir)?);
    let registry = default_registry(&config)?;
    let agent = AgentLoop::new(config.clone(), conversations, registry);

    let conversation = rt.block_on(async {
        match conversation {
            Some(id) => agent.conversations().get(id, user).await,
            None => agent.conversations().create(user, None).await,
        }
    })?;

    let mut editor = DefaultEditor::new()
        .map_err(|e| SandchatError::Config(format!("failed to init editor: {e}")))?;
    let history_path = config.data_dir.join("repl_history.txt");
    let _ = editor.load_history(&history_path);

    println!("sandchat interactive mode");
    println!("  inference: {}", config.inference_url);
    println!("  conversation: {}", conversation.id);
    println!("  Type /upload PATH to analyze a dataset, /quit to exit.\n");

    loop {
        match editor.readline("sandchat > ") {
            Ok(line) => {
                let input = parse_input(&line);
                let message = match input {
                    ReplInput::Empty => continue,
                    ReplInput::Quit => break,
                    ReplInput::Upload(path) => match file_ref(&path) {
                        Ok(file) => ChatMessage::new(
                            &conversation.id,
                            user.unwrap_or("user"),
                            MessageContent::File(file),
                            MessageType::File,
                        ),
                        Err(e) => {
                            eprintln!("error: {e}");
                            continue;
                        }
                    },
                    ReplInput::Message(text) => ChatMessage::new(
                        &conversation.id,
                        user.unwrap_or("user"),
                        text,
                        MessageType::Text,
                    ),
                };
                let _ = editor.add_history_entry(line.trim());

                let agent_ref = &agent;
                let result = rt.block_on(async {
                    let (tx, rx) = mpsc::unbounded_channel();
                    let turn = async move {
                        let result = agent_ref.handle_message(user, message, &tx).await;
                        drop(tx);
                        result
                    };
                    let (result, ()) = tokio::join!(turn, print_events(rx));
                    result
                });
                debug!(tool_rounds = result.tool_rounds, "repl.turn_done");
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted. Use /quit to exit.");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("readline error: {err}");
                break;
            }
        }
    }

    let _ = editor.save_history(&history_path);
    println!("Bye.");
    Ok(())
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<ChatMessage>) {
    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        let text = event.content.as_text().unwrap_or_default();
        match event.kind {
            MessageType::StreamStart => {}
            MessageType::StreamText => {
                print!("{text}");
                let _ = stdout.flush();
            }
            MessageType::StreamEnd => println!(),
            MessageType::Error => eprintln!("error: {text}"),
            MessageType::Info => println!("[info] {text}"),
            MessageType::Text | MessageType::File => {
                let from = event.from.as_deref().unwrap_or("system");
                println!("[{from}] {}", preview(text));
            }
        }
    }
}

fn preview(text: &str) -> String {
    let mut lines = text.lines();
    let head: Vec<&str> = lines.by_ref().take(12).collect();
    let rest = lines.count();
    if rest == 0 {
        head.join("\n")
    } else {
        format!("{}\n... ({rest} more lines)", head.join("\n"))
    }
}
