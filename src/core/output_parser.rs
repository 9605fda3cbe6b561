//! Turns raw model output into either a tool action or a final answer.
//!
//! A tool call is a fenced code block tagged `json` (or untagged, starting
//! with `{`) holding `{"tool_name": ..., "tool_input": ...}`. Blocks tagged
//! with another language are ordinary answer content.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::core::error::{Result, SandchatError};

#[derive(Debug, Clone, PartialEq)]
pub enum AgentStep {
    Action(AgentAction),
    Finish(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgentAction {
    pub tool_name: String,
    pub tool_input: String,
    /// Full model output the action was parsed from.
    pub log: String,
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```([A-Za-z0-9_+-]*)[ \t]*\r?\n?(.*?)```")
            .unwrap_or_else(|e| panic!("invalid fence regex: {e}"))
    })
}

pub fn parse(text: &str) -> Result<AgentStep> {
    for caps in fence_regex().captures_iter(text) {
        let lang = caps.get(1).map_or("", |m| m.as_str());
        let body = caps.get(2).map_or("", |m| m.as_str()).trim();

        let is_candidate = lang.eq_ignore_ascii_case("json") || (lang.is_empty() && body.starts_with('{'));
        if !is_candidate {
            continue;
        }
        return parse_action(body, text).map(AgentStep::Action);
    }
    Ok(AgentStep::Finish(text.trim().to_string()))
}

fn parse_action(body: &str, log: &str) -> Result<AgentAction> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| SandchatError::OutputParse(format!("invalid json in tool block: {e}")))?;
    let Value::Object(map) = value else {
        return Err(SandchatError::OutputParse(
            "tool block is not a json object".to_string(),
        ));
    };

    let tool_name = match map.get("tool_name") {
        Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
        _ => {
            return Err(SandchatError::OutputParse(
                "tool block has no string tool_name".to_string(),
            ));
        }
    };

    let tool_input = match map.get("tool_input") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    Ok(AgentAction {
        tool_name,
        tool_input,
        log: log.to_string(),
    })
}

/// Render an action the way the model is instructed to write one.
pub fn format_action(tool_name: &str, tool_input: &str) -> String {
    let body = serde_json::json!({
        "tool_name": tool_name,
        "tool_input": tool_input,
    });
    let pretty = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
    format!("```json\n{pretty}\n```")
}
