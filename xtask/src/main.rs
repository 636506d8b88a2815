use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use parlor_core::config::StoreConfig;
use parlor_core::state::{ChatMessage, ConversationPatch};
use parlor_core::{telemetry, ClientState, StreamChunk};
use std::path::PathBuf;
use tempfile::TempDir;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Parlor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a lightweight smoke test that exercises the Parlor stores on disk.
    Smoke,
    /// Print the conversations persisted under a data directory.
    Inspect {
        /// Data directory; defaults to the configured one.
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    telemetry::init_tracing(telemetry::env_filter_or("info"))?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
        Commands::Inspect { dir } => inspect(dir),
    }
}

fn smoke_test() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let config = StoreConfig::at(temp_dir.path().join("data"));

    {
        let state = ClientState::from_config(&config);
        state
            .chats
            .update_conversation("smoke", ConversationPatch::title("Smoke test"));
        state
            .chats
            .append_message("smoke", ChatMessage::user("ping from xtask"));
        state.begin_answer();
        state.apply_chunk(&StreamChunk::delta("pong"));
        state.finish_answer("smoke");
        state.chats.sync()?;
    }

    let state = ClientState::from_config(&config);
    let conversation = state
        .chats
        .conversation("smoke")
        .ok_or_else(|| anyhow!("smoke conversation was not persisted"))?;
    if conversation.messages.len() != 2 {
        bail!(
            "expected 2 persisted messages, found {}",
            conversation.messages.len()
        );
    }
    info!(
        "messages" = conversation.messages.len(),
        "smoke test conversation saved"
    );

    Ok(())
}

fn inspect(dir: Option<PathBuf>) -> Result<()> {
    let config = match dir {
        Some(dir) => StoreConfig::at(dir),
        None => StoreConfig::load().map_err(|err| anyhow!(err.user_message()))?,
    };
    let state = ClientState::from_config(&config);
    let chats = state.chats.get();
    if chats.is_empty() {
        println!("No conversations under {}", config.data_dir.display());
        return Ok(());
    }
    for (id, conversation) in &chats {
        let token = if conversation.update_token.is_some() {
            " (resumable)"
        } else {
            ""
        };
        println!(
            "{id}\t{}\t{} messages{token}",
            conversation.title,
            conversation.messages.len()
        );
    }
    Ok(())
}
