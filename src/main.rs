//! ag — ask a DeepSeek-compatible chat model from the command line.
//!
//! One-shot mode sends the command-line words plus everything on stdin
//! and prints the reply. `--chat` keeps a conversation going, with
//! `!command` lines feeding shell output into the next prompt.
//!
//! API keys come from the credential vault under `AG_CONFIG_PATH`:
//! plain text for SiliconFlow, AES-256-CFB sealed for DeepSeek.

use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

mod adapters;
mod chat;
mod provider;
mod vault;

use adapters::openai_compat::OpenAiCompatClient;
use chat::{Session, SessionOptions};
use provider::{ModelKind, Provider};
use vault::store::{CredentialVault, VaultConfig};

const CONFIG_PATH_VAR: &str = "AG_CONFIG_PATH";
const PROVIDER_VAR: &str = "AG_PROVIDER";

#[derive(Debug, Parser)]
#[command(name = "ag", version, about = "DeepSeek chat agent", args_conflicts_with_subcommands = true)]
struct Cli {
    /// Use the reasoner (R1) model instead of the chat (V3) model
    #[arg(short = 'r', long = "r1")]
    reasoner: bool,

    /// Interactive chat with history
    #[arg(short, long)]
    chat: bool,

    /// Echo the input and print the bare reply
    #[arg(short, long)]
    add: bool,

    /// Stream the reply as it is generated
    #[arg(short, long)]
    stream: bool,

    /// Provider to talk to [default: $AG_PROVIDER or deepseek]
    #[arg(short, long)]
    provider: Option<Provider>,

    /// Text placed before the input
    words: Vec<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read an API key from stdin and store it in the vault
    Seal {
        #[arg(short, long)]
        provider: Option<Provider>,
    },
}

/// Configuration loaded from the environment.
struct Config {
    vault: VaultConfig,
    provider: Provider,
}

impl Config {
    fn from_env() -> Result<Self> {
        let base_dir = std::env::var_os(CONFIG_PATH_VAR)
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let provider = match std::env::var(PROVIDER_VAR) {
            Ok(id) if !id.is_empty() => id
                .parse::<Provider>()
                .with_context(|| format!("Invalid {PROVIDER_VAR}"))?,
            _ => Provider::DeepSeek,
        };

        Ok(Self {
            vault: VaultConfig {
                base_dir,
                ..VaultConfig::default()
            },
            provider,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout is reserved for the conversation.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ag=warn".into()),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let vault = CredentialVault::new(config.vault);

    if let Some(Command::Seal { provider }) = cli.command {
        return seal(&vault, provider.unwrap_or(config.provider));
    }

    let provider = cli.provider.unwrap_or(config.provider);
    let kind = if cli.reasoner {
        ModelKind::Reasoner
    } else {
        ModelKind::Chat
    };
    let model = provider.model(kind);
    info!(provider = %provider, model, stream = cli.stream, chat = cli.chat, "Starting");

    let api_key = vault
        .api_key(provider)
        .with_context(|| format!("Failed to load the {provider} API key"))?;
    let backend = OpenAiCompatClient::for_provider(provider, api_key);

    let mut session = Session::new(
        &backend,
        SessionOptions {
            model: model.to_string(),
            kind,
            stream: cli.stream,
            raw: cli.add,
        },
    );
    let prefix = cli.words.join(" ");
    let mut stdout = io::stdout().lock();

    if cli.chat {
        let mut stdin = io::stdin().lock();
        session.run_interactive(prefix, &mut stdin, &mut stdout).await?;
    } else {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .context("Failed to read stdin")?;
        debug!(bytes = input.len(), "Read prompt from stdin");
        session.ask_once(&prefix, &input, &mut stdout).await?;
    }

    stdout.flush()?;
    Ok(())
}

/// `ag seal`: store the first line of stdin as `provider`'s key.
fn seal(vault: &CredentialVault, provider: Provider) -> Result<()> {
    eprintln!("Paste the {provider} API key and press Enter:");
    let mut secret = zeroize::Zeroizing::new(String::new());
    io::stdin()
        .lock()
        .read_line(&mut secret)
        .context("Failed to read API key from stdin")?;
    if secret.trim().is_empty() {
        anyhow::bail!("No API key given");
    }

    let path = vault.store_api_key(provider, &secret)?;
    eprintln!("Stored {provider} API key in {}", path.display());
    Ok(())
}
