//! Talkbox CLI - command-line chat client.
//!
//! A thin frontend over `talkbox-client`: follows the event stream, pages
//! through history, searches, and posts messages.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use talkbox_client::{ChatClient, MemorySession, SessionStore};
use talkbox_config::Config;

mod commands;
mod format;
mod theme;

use format::OutputFormat;
use theme::Theme;

/// Talkbox - chat from the terminal
#[derive(Parser)]
#[command(name = "talkbox")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format: pretty (default) or json
    #[arg(long, global = true, default_value = "pretty")]
    format: String,

    /// Path to a configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Session token
    #[arg(long, global = true, env = "TALKBOX_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow the event stream and print messages as they arrive
    Tail {
        /// Only print messages from this conversation
        #[arg(short = 'C', long)]
        conversation: Option<String>,

        /// Print the latest page of this conversation first
        #[arg(long, requires = "conversation")]
        backfill: bool,
    },

    /// Print a conversation's history
    History {
        /// Conversation id
        conversation: String,

        /// Number of pages to load, newest first
        #[arg(short, long, default_value_t = 1)]
        pages: u32,
    },

    /// Search a conversation
    Search {
        /// Conversation id
        conversation: String,

        /// Search text
        query: String,
    },

    /// Send a text message
    Send {
        /// Conversation id
        conversation: String,

        /// Message text
        text: String,

        /// Message id to reply to
        #[arg(long)]
        reply_to: Option<String>,

        /// Send over the event stream instead of the HTTP API
        #[arg(long)]
        stream: bool,
    },

    /// Print the effective configuration
    Config,
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    load_config_from(path, None)
}

/// Defaults, then `~/.talkbox/config.toml`, then `path`, then `TALKBOX_*`
/// fallbacks for anything no file set.
fn load_config_from(
    path: Option<&std::path::Path>,
    home: Option<&std::path::Path>,
) -> Result<Config> {
    let config = match home {
        Some(home) => Config::load_with_home(path, home),
        None => Config::load(path),
    };
    config.context("Failed to load configuration")
}

fn build_client(config: &Config, token: Option<String>) -> Result<ChatClient> {
    let token = token.context("No session token: pass --token or set TALKBOX_TOKEN")?;
    let session: Arc<dyn SessionStore> = Arc::new(MemorySession::new(token));
    ChatClient::from_config(config, session).context("Failed to create chat client")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    // Set up logging from config, with --verbose override.
    let mut log_config = talkbox_telemetry::LogConfig::from(&config.logging);
    if cli.verbose {
        "debug".clone_into(&mut log_config.level);
    }
    if let Err(e) = talkbox_telemetry::setup_logging(&log_config) {
        eprintln!("Failed to initialize logging: {e}");
    }

    let output = OutputFormat::from_name(&cli.format);

    let result = match cli.command {
        Commands::Config => commands::config::show(&config),
        Commands::Tail {
            conversation,
            backfill,
        } => {
            let client = build_client(&config, cli.token)?;
            commands::tail::run(&client, conversation.as_deref(), backfill, output).await
        },
        Commands::History {
            conversation,
            pages,
        } => {
            let client = build_client(&config, cli.token)?;
            commands::history::run(&client, &conversation, pages, output).await
        },
        Commands::Search {
            conversation,
            query,
        } => {
            let client = build_client(&config, cli.token)?;
            commands::history::search(&client, &conversation, &query, output).await
        },
        Commands::Send {
            conversation,
            text,
            reply_to,
            stream,
        } => {
            let client = build_client(&config, cli.token)?;
            let request = commands::send::SendRequest {
                conversation: &conversation,
                text,
                reply_to,
                over_stream: stream,
                connect_timeout: config.server.request_timeout(),
            };
            commands::send::run(&client, request, output).await
        },
    };

    if let Err(e) = &result {
        eprintln!("{}", Theme::error(&format!("{e:#}")));
    }
    result
}
