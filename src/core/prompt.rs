//! ChatML prompt rendering for the memory window.

use chrono::{NaiveDate, Utc};

use crate::core::schemas::MessageContent;
use crate::tape::store::{Role, StoredMessage};
use crate::tools::registry::ToolRegistry;

pub const IM_START: &str = "<|im_start|>";
pub const IM_END: &str = "<|im_end|>";

/// Stop sequences passed to the inference server.
pub const STOP_SEQUENCES: &[&str] = &[IM_END];

const DEFAULT_PREAMBLE: &str = "You are a data analysis assistant. You help the user explore \
and understand their datasets by writing and running Python code.\n\
Current date: {date}";

const TOOL_INSTRUCTIONS: &str = "## Tools\n\n\
Use a markdown fenced json code block (including the backticks) containing the tool name and \
the tool arguments when employing a tool:\n\n\
```json\n\
{\n    \"tool_name\": string, \\ Specify the action to take; choose from {tool_names}\n    \
\"tool_input\": string \\ Provide the input for the action\n}\n\
```\n\n\
The following tools are only provided for you, not for the user. Use these tools to help \
answer the user's question:\n\n\
{tools}";

/// System message: preamble (configured or built-in) plus tool instructions.
pub fn system_prompt(preamble: Option<&str>, registry: &ToolRegistry, today: NaiveDate) -> String {
    let date = today.format("%Y-%m-%d").to_string();
    let template = preamble
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DEFAULT_PREAMBLE);
    let preamble = if template.contains("{date}") {
        template.replace("{date}", &date)
    } else {
        format!("{}\nCurrent date: {date}", template.trim_end())
    };

    if registry.is_empty() {
        return preamble;
    }

    let names = registry.names().join(", ");
    let tools = registry
        .descriptions()
        .into_iter()
        .map(|line| format!("- {line}"))
        .collect::<Vec<_>>()
        .join("\n");
    let instructions = TOOL_INSTRUCTIONS
        .replace("{tool_names}", &names)
        .replace("{tools}", &tools);

    format!("{preamble}\n\n{instructions}")
}

pub fn system_prompt_today(preamble: Option<&str>, registry: &ToolRegistry) -> String {
    system_prompt(preamble, registry, Utc::now().date_naive())
}

fn role_tag(role: Role) -> &'static str {
    match role {
        Role::Human => "user",
        Role::Ai => "assistant",
        Role::System => "system",
        Role::Tool => "tool",
    }
}

fn content_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::File(file) => {
            format!("[uploaded file {} at {}]", file.filename, file.path)
        }
    }
}

/// Render `system` and the memory window, leaving an open assistant turn.
pub fn render(system: &str, memory: &[StoredMessage]) -> String {
    let mut out = String::new();
    if !system.trim().is_empty() {
        push_turn(&mut out, "system", system);
    }
    for message in memory {
        push_turn(&mut out, role_tag(message.role), &content_text(&message.content));
    }
    out.push_str(IM_START);
    out.push_str("assistant\n");
    out
}

fn push_turn(out: &mut String, role: &str, content: &str) {
    out.push_str(IM_START);
    out.push_str(role);
    out.push('\n');
    out.push_str(content);
    out.push_str(IM_END);
    out.push('\n');
}

/// Remove stop sequences the server echoed at the end of the output.
pub fn strip_stop_sequences(text: &str) -> &str {
    let mut trimmed = text.trim_end();
    for stop in STOP_SEQUENCES {
        if let Some(stripped) = trimmed.strip_suffix(stop) {
            trimmed = stripped.trim_end();
        }
    }
    trimmed
}
