mod render;
mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use nest_chat::{ChatSession, EchoProvider, LLMProvider, ScriptedProvider, ScriptedReply};
use nest_core::{Config, ConversationStore};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "nest-cli")]
#[command(about = "Branching conversations with a language model")]
#[command(version)]
struct Cli {
    /// Config file (JSON or TOML). Defaults to ~/.nodenest/config.json or ./nodenest.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "nest_core=trace". RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Model name passed to the provider
    #[arg(long, global = true)]
    model: Option<String>,

    /// Play back replies from a JSON script instead of the offline echo provider
    #[arg(long, global = true)]
    script: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session (default)
    Chat,
    /// Run a short scripted walkthrough and print the resulting tree
    Demo,
}

fn init_logging(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(
            fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .init();
}

fn load_provider(script: Option<&PathBuf>) -> anyhow::Result<Arc<dyn LLMProvider>> {
    let Some(path) = script else {
        return Ok(Arc::new(EchoProvider::new()));
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read script {}", path.display()))?;
    let replies: Vec<ScriptedReply> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse script {}", path.display()))?;
    tracing::info!(replies = replies.len(), "Loaded reply script");
    Ok(Arc::new(ScriptedProvider::new(replies)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut config = match &cli.config {
        Some(path) => Config::from_path(path)?,
        None => Config::load(),
    };
    if let Some(model) = cli.model {
        config.chat.model = Some(model);
    }

    let store = Arc::new(
        ConversationStore::new().with_settings(config.store.clone(), config.titles.clone()),
    );

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let provider = load_provider(cli.script.as_ref())?;
            repl::run(store, provider, config).await
        }
        Commands::Demo => {
            let provider = match cli.script.as_ref() {
                Some(path) => load_provider(Some(path))?,
                None => Arc::new(ScriptedProvider::new([
                    ScriptedReply::reply(["Certainly, ", "X is..."]),
                    ScriptedReply::reply(["X is ", "a placeholder ", "for anything."]),
                ])) as Arc<dyn LLMProvider>,
            };
            let session = ChatSession::new(store, provider, config);
            render::demo(&session).await
        }
    }
}
