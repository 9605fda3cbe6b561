use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::core::config::{AppConfig, CliConfigOverrides, load_runtime_config};
use crate::core::error::{Result, SandchatError};

#[derive(Debug, Parser)]
#[command(
    name = "sandchat",
    about = "Chat backend that lets a language model analyze data in a code sandbox"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the HTTP and WebSocket server
    Serve(ServeArgs),
    /// Chat with the agent in the terminal
    Chat(ChatArgs),
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[arg(long)]
    profile: Option<String>,
    #[arg(long = "inference-url")]
    inference_url: Option<String>,
    #[arg(long = "api-key")]
    api_key: Option<String>,
    #[arg(long = "data-dir")]
    data_dir: Option<PathBuf>,
    #[arg(long = "system-prompt")]
    system_prompt: Option<String>,
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[command(flatten)]
    config: ConfigArgs,
    #[arg(long)]
    bind: Option<String>,
    /// Print the resolved configuration and exit
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct ChatArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// Continue an existing conversation instead of starting a new one
    #[arg(long)]
    conversation: Option<String>,
    #[arg(long)]
    user: Option<String>,
}

#[derive(Debug, Serialize)]
struct DryRunOutput {
    mode: String,
    config: AppConfig,
    api_key_present: bool,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    dispatch(cli)
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve(args) => serve_command(args),
        Commands::Chat(args) => chat_command(args),
    }
}

fn resolve(args: ConfigArgs, bind: Option<String>) -> Result<AppConfig> {
    let workspace = std::env::current_dir().map_err(SandchatError::Io)?;
    let overrides = CliConfigOverrides {
        inference_url: args.inference_url,
        api_key: args.api_key,
        bind,
        data_dir: args.data_dir.map(|p| p.to_string_lossy().to_string()),
        system_prompt: args.system_prompt,
    };
    load_runtime_config(&workspace, args.profile.as_deref(), &overrides)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| SandchatError::Config(format!("failed to start runtime: {e}")))
}

fn serve_command(args: ServeArgs) -> Result<()> {
    let config = resolve(args.config, args.bind)?;

    if args.dry_run {
        let out = DryRunOutput {
            mode: "dry-run".to_string(),
            api_key_present: config
                .api_key
                .as_deref()
                .is_some_and(|k| !k.trim().is_empty()),
            config,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    runtime()?.block_on(crate::server::start(config))
}

fn chat_command(args: ChatArgs) -> Result<()> {
    let config = resolve(args.config, None)?;
    let rt = runtime()?;
    crate::channels::repl::run_interactive(
        &rt,
        config,
        args.user.as_deref(),
        args.conversation.as_deref(),
    )
}
