use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::core::error::{Result, SandchatError};

const DEFAULT_INFERENCE_URL: &str = "http://localhost:8080";
const DEFAULT_BIND: &str = "127.0.0.1:8000";
const DEFAULT_USER_ID_HEADER: &str = "X-Forwarded-User";
const DEFAULT_SANDBOX_COMMAND: &str = "python3 -";
const DEFAULT_MAX_NEW_TOKENS: u32 = 1024;
const DEFAULT_WINDOW_SIZE: usize = 5;
const DEFAULT_MAX_TOOL_ITERATIONS: usize = 5;
const DEFAULT_SANDBOX_TIMEOUT_SECS: u64 = 60;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

const INFERENCE_URL_KEY: &str = "SANDCHAT_INFERENCE_URL";
const API_KEY_KEY: &str = "SANDCHAT_API_KEY";
const BIND_KEY: &str = "SANDCHAT_BIND";
const DATA_DIR_KEY: &str = "SANDCHAT_DATA_DIR";
const USER_ID_HEADER_KEY: &str = "SANDCHAT_USER_ID_HEADER";
const SYSTEM_PROMPT_KEY: &str = "SANDCHAT_SYSTEM_PROMPT";
const MAX_NEW_TOKENS_KEY: &str = "SANDCHAT_MAX_NEW_TOKENS";
const TEMPERATURE_KEY: &str = "SANDCHAT_TEMPERATURE";
const WINDOW_SIZE_KEY: &str = "SANDCHAT_WINDOW_SIZE";
const MAX_TOOL_ITERATIONS_KEY: &str = "SANDCHAT_MAX_TOOL_ITERATIONS";
const SANDBOX_COMMAND_KEY: &str = "SANDCHAT_SANDBOX_COMMAND";
const SANDBOX_TIMEOUT_KEY: &str = "SANDCHAT_SANDBOX_TIMEOUT_SECS";
const RETRY_DELAY_KEY: &str = "SANDCHAT_RETRY_DELAY_MS";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    pub profile: String,
    pub inference_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub bind: String,
    pub data_dir: PathBuf,
    pub user_id_header: String,
    pub system_prompt: Option<String>,
    pub max_new_tokens: u32,
    pub temperature: Option<f32>,
    /// Number of exchange pairs kept in the model's memory window.
    pub window_size: usize,
    pub max_tool_iterations: usize,
    /// Interpreter argv; code is written to its stdin.
    pub sandbox_command: Vec<String>,
    pub sandbox_timeout_secs: u64,
    /// First backoff delay for inference retries; doubles per attempt.
    pub retry_delay_ms: u64,
}

impl AppConfig {
    /// Config with defaults rooted at `data_dir`, for embedding and tests.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            profile: "default".to_string(),
            inference_url: DEFAULT_INFERENCE_URL.to_string(),
            api_key: None,
            bind: DEFAULT_BIND.to_string(),
            data_dir: data_dir.into(),
            user_id_header: DEFAULT_USER_ID_HEADER.to_string(),
            system_prompt: None,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            temperature: None,
            window_size: DEFAULT_WINDOW_SIZE,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            sandbox_command: split_command(DEFAULT_SANDBOX_COMMAND),
            sandbox_timeout_secs: DEFAULT_SANDBOX_TIMEOUT_SECS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CliConfigOverrides {
    pub inference_url: Option<String>,
    pub api_key: Option<String>,
    pub bind: Option<String>,
    pub data_dir: Option<String>,
    pub system_prompt: Option<String>,
}

pub fn load_runtime_config(
    workspace: &Path,
    profile: Option<&str>,
    cli_overrides: &CliConfigOverrides,
) -> Result<AppConfig> {
    let env_vars: HashMap<String, String> = std::env::vars().collect();
    let dotenv_vars = load_dotenv_map(&workspace.join(".env.local"))?;
    resolve_config(workspace, profile, cli_overrides, &env_vars, &dotenv_vars)
}

pub fn resolve_config(
    workspace: &Path,
    profile: Option<&str>,
    cli_overrides: &CliConfigOverrides,
    env_vars: &HashMap<String, String>,
    dotenv_vars: &HashMap<String, String>,
) -> Result<AppConfig> {
    let profile_name = profile.unwrap_or("default").trim().to_string();
    let profile_token = normalize_profile_token(&profile_name);
    let profiled = |key: &str| format!("SANDCHAT_PROFILE_{profile_token}_{key}");

    let lookup = |cli: Option<&String>, key: &str| {
        let profiled_key = profiled(key);
        first_present([
            cli,
            env_vars.get(&profiled_key),
            env_vars.get(key),
            dotenv_vars.get(&profiled_key),
            dotenv_vars.get(key),
        ])
    };

    let inference_url = lookup(cli_overrides.inference_url.as_ref(), INFERENCE_URL_KEY)
        .unwrap_or_else(|| DEFAULT_INFERENCE_URL.to_string());
    let api_key = lookup(cli_overrides.api_key.as_ref(), API_KEY_KEY);
    let bind = lookup(cli_overrides.bind.as_ref(), BIND_KEY)
        .unwrap_or_else(|| DEFAULT_BIND.to_string());
    let data_dir = lookup(cli_overrides.data_dir.as_ref(), DATA_DIR_KEY)
        .map(|dir| workspace.join(dir))
        .unwrap_or_else(|| workspace.join(".sandchat"));
    let user_id_header = lookup(None, USER_ID_HEADER_KEY)
        .unwrap_or_else(|| DEFAULT_USER_ID_HEADER.to_string());
    let system_prompt = lookup(cli_overrides.system_prompt.as_ref(), SYSTEM_PROMPT_KEY);

    let max_new_tokens = parse_number(
        lookup(None, MAX_NEW_TOKENS_KEY),
        MAX_NEW_TOKENS_KEY,
        DEFAULT_MAX_NEW_TOKENS,
    )?;
    let temperature = lookup(None, TEMPERATURE_KEY)
        .map(|raw| {
            raw.parse::<f32>().map_err(|_| {
                SandchatError::Config(format!("{TEMPERATURE_KEY} is not a number: {raw}"))
            })
        })
        .transpose()?;
    let window_size = parse_number(
        lookup(None, WINDOW_SIZE_KEY),
        WINDOW_SIZE_KEY,
        DEFAULT_WINDOW_SIZE,
    )?;
    let max_tool_iterations = parse_number(
        lookup(None, MAX_TOOL_ITERATIONS_KEY),
        MAX_TOOL_ITERATIONS_KEY,
        DEFAULT_MAX_TOOL_ITERATIONS,
    )?;
    if max_tool_iterations == 0 {
        return Err(SandchatError::Config(format!(
            "{MAX_TOOL_ITERATIONS_KEY} must be at least 1"
        )));
    }

    let sandbox_command = split_command(
        &lookup(None, SANDBOX_COMMAND_KEY).unwrap_or_else(|| DEFAULT_SANDBOX_COMMAND.to_string()),
    );
    let sandbox_timeout_secs = parse_number(
        lookup(None, SANDBOX_TIMEOUT_KEY),
        SANDBOX_TIMEOUT_KEY,
        DEFAULT_SANDBOX_TIMEOUT_SECS,
    )?;
    let retry_delay_ms = parse_number(
        lookup(None, RETRY_DELAY_KEY),
        RETRY_DELAY_KEY,
        DEFAULT_RETRY_DELAY_MS,
    )?;

    Ok(AppConfig {
        profile: profile_name,
        inference_url,
        api_key,
        bind,
        data_dir,
        user_id_header,
        system_prompt,
        max_new_tokens,
        temperature,
        window_size,
        max_tool_iterations,
        sandbox_command,
        sandbox_timeout_secs,
        retry_delay_ms,
    })
}

fn parse_number<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse::<T>()
            .map_err(|_| SandchatError::Config(format!("{key} is not a valid number: {value}"))),
    }
}

fn split_command(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_string).collect()
}

fn first_present<const N: usize>(values: [Option<&String>; N]) -> Option<String> {
    values.into_iter().flatten().find_map(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(trimmed.to_string())
    })
}

fn normalize_profile_token(profile: &str) -> String {
    let mut out = String::with_capacity(profile.len());
    for ch in profile.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        "DEFAULT".to_string()
    } else {
        out
    }
}

fn load_dotenv_map(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(parse_dotenv(&content))
}

fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let body = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value)) = body.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = strip_quotes(value.trim()).to_string();
        map.insert(key.to_string(), value);
    }
    map
}

fn strip_quotes(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        return &value[1..value.len() - 1];
    }
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return &value[1..value.len() - 1];
    }
    value
}
