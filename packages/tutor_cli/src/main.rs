use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use tutor_chat::DEFAULT_SUBJECT;

mod cli;
mod config;
mod format;

use crate::config::TutorConfig;

#[derive(Parser)]
#[command(name = "tutor")]
#[command(about = "Chat with a subject tutor from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.tutor-chat)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new conversation and make it active
    New(NewArgs),

    /// List conversations, newest first
    List,

    /// Print the messages of a conversation
    Show(TargetArgs),

    /// Delete a conversation and its messages
    Delete(RequiredTargetArgs),

    /// Make a conversation active
    Select(RequiredTargetArgs),

    /// List the available subjects
    Subjects,

    /// Chat with the tutor interactively
    Chat(ChatArgs),
}

#[derive(Parser)]
struct NewArgs {
    /// Conversation title
    title: String,

    /// Subject tag (see `tutor subjects`)
    #[arg(short, long, default_value = DEFAULT_SUBJECT)]
    subject: String,
}

#[derive(Parser)]
struct TargetArgs {
    /// Conversation id, id prefix, or title (default: active)
    target: Option<String>,
}

#[derive(Parser)]
struct RequiredTargetArgs {
    /// Conversation id, id prefix, or title
    target: String,
}

#[derive(Parser)]
struct ChatArgs {
    /// Conversation id, id prefix, or title (default: active)
    target: Option<String>,

    /// Tutor WebSocket URL (overrides [server] url)
    #[arg(long)]
    url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Quiet by default so log lines don't interleave with the chat
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tutor_cli=warn,tutor_chat=warn"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();

    let config = TutorConfig::new(cli.data_dir.clone())?;

    match cli.command {
        Commands::New(args) => cli::new_command(&config, &args.title, &args.subject),
        Commands::List => cli::list_command(&config),
        Commands::Show(args) => cli::show_command(&config, args.target.as_deref()),
        Commands::Delete(args) => cli::delete_command(&config, &args.target),
        Commands::Select(args) => cli::select_command(&config, &args.target),
        Commands::Subjects => {
            cli::subjects_command();
            Ok(())
        }
        Commands::Chat(args) => {
            cli::chat::chat_command(&config, args.target.as_deref(), args.url).await
        }
    }
}
