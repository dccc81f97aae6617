//! Command line interface for broadcasting events, resolving profiles, signing
//! zap receipts and running the HTTP gateway.

use std::{fs, net::SocketAddr, path::Path, sync::Arc};

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use serde::Deserialize;

use nostrcast::{
    compose_receipt,
    config::{Settings, DEFAULT_BIND_HTTP, DEFAULT_RELAYS},
    nip19, relays, server,
    transport::{Connection, Transport},
    Error, Event, RelaySet, Service, Tag, UnsignedEvent, WsTransport,
};

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "nostrcast",
    author,
    version,
    about = "Broadcast Nostr events and resolve profiles across many relays"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Broadcast an event file to the given relays plus the defaults.
    Publish {
        /// JSON event file (a signed event, or a draft with `--sign`).
        file: String,
        /// Extra relay to publish to; may be repeated.
        #[arg(long = "relay", value_name = "URL")]
        relays: Vec<String>,
        /// Treat the file as a draft (`kind`, `tags`, `content`) and sign it.
        #[arg(long)]
        sign: bool,
    },
    /// Resolve a profile by npub or hex public key.
    Profile {
        identifier: String,
        /// Relay to ask instead of the defaults; may be repeated.
        #[arg(long = "relay", value_name = "URL")]
        relays: Vec<String>,
    },
    /// Sign a zap receipt for a paid zap request and publish it.
    Receipt {
        /// JSON zap request (kind 9734) file.
        file: String,
        /// The paid invoice.
        #[arg(long)]
        bolt11: String,
        /// Print the receipt without publishing it.
        #[arg(long)]
        no_publish: bool,
    },
    /// Print the configured public key.
    Pubkey,
    /// Manage the default relay list.
    Relays {
        #[command(subcommand)]
        action: RelaysAction,
    },
    /// Run the HTTP gateway.
    Serve,
}

/// Operations available under `nostrcast relays`.
#[derive(Subcommand)]
enum RelaysAction {
    /// Show the configured default relays.
    List,
    /// Add a default relay after verifying connectivity.
    Add { url: String },
    /// Remove a default relay.
    Remove { url: String },
}

/// Unsigned event fields read by `publish --sign`.
#[derive(Deserialize)]
struct Draft {
    kind: u32,
    #[serde(default)]
    tags: Vec<Tag>,
    #[serde(default)]
    content: String,
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    ensure_env_file(&cli.env)?;
    let cfg = Settings::from_env(&cli.env)?;
    match cli.command {
        Commands::Publish { file, relays, sign } => {
            let service = build_service(&cfg)?;
            let data = read_file(&file)?;
            let event = if sign {
                let draft: Draft = serde_json::from_str(&data)?;
                let mut unsigned = UnsignedEvent::new("", draft.kind);
                unsigned.tags = draft.tags;
                unsigned.content = draft.content;
                service.sign(unsigned)?
            } else {
                let event: Event = serde_json::from_str(&data)?;
                event.verify()?;
                event
            };
            let report = service.publish(&event, &relays).await;
            for outcome in &report.outcomes {
                println!("{}", serde_json::to_string(outcome)?);
            }
            report.into_result()?;
        }
        Commands::Profile { identifier, relays } => {
            let service = build_service(&cfg)?;
            let record = service.resolve_profile(&identifier, Some(&relays)).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Receipt {
            file,
            bolt11,
            no_publish,
        } => {
            let zap_request: Event = serde_json::from_str(&read_file(&file)?)?;
            if no_publish {
                let keys = cfg.keys()?.ok_or(Error::MissingKey)?;
                let receipt = compose_receipt(&zap_request, &bolt11, &keys)?;
                println!("{}", serde_json::to_string_pretty(&receipt)?);
            } else {
                let service = build_service(&cfg)?;
                let (receipt, publishing) = service.emit_receipt(&zap_request, &bolt11)?;
                println!("{}", serde_json::to_string_pretty(&receipt)?);
                publishing.await?;
            }
        }
        Commands::Pubkey => {
            let keys = cfg.keys()?.ok_or(Error::MissingKey)?;
            let hex = keys.public_key_hex();
            println!("{}", nip19::encode_npub_or_raw(&hex));
            println!("{hex}");
        }
        Commands::Relays { action } => handle_relays(action, &cli.env, &cfg).await?,
        Commands::Serve => {
            let addr: SocketAddr = cfg
                .bind_http
                .parse()
                .with_context(|| format!("parsing BIND_HTTP={}", cfg.bind_http))?;
            let service = build_service(&cfg)?;
            server::serve_http(addr, service, async {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;
        }
    }
    Ok(())
}

fn build_service(cfg: &Settings) -> anyhow::Result<Service<WsTransport>> {
    let keys = cfg.keys()?;
    let transport = Arc::new(WsTransport::new(cfg.tor_socks.clone()));
    Ok(Service::new(cfg, keys, transport))
}

fn read_file(path: &str) -> anyhow::Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {path}"))
}

/// Create a default `.env` file if one is not already present at `path`.
fn ensure_env_file(path: &str) -> anyhow::Result<()> {
    let env_path = Path::new(path);
    if env_path.exists() {
        return Ok(());
    }
    if let Some(parent) = env_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut content = String::new();
    content.push_str("NOSTR_PRIVATE_KEY=\n");
    content.push_str(&format!("RELAYS={}\n", DEFAULT_RELAYS.join(",")));
    content.push_str(&format!("BIND_HTTP={DEFAULT_BIND_HTTP}\n"));
    content.push_str("TOR_SOCKS=\n");
    content.push_str("PUBLISH_CONCURRENCY=20\n");
    content.push_str("PUBLISH_MAX_RETRIES=3\n");
    content.push_str("PUBLISH_BACKOFF_MS=1000\n");
    content.push_str("PUBLISH_CONNECT_TIMEOUT_MS=5000\n");
    content.push_str("PUBLISH_TIMEOUT_MS=5000\n");
    content.push_str("PROFILE_CONNECT_TIMEOUT_MS=3000\n");
    content.push_str("PROFILE_QUERY_TIMEOUT_MS=3000\n");
    fs::write(env_path, content)?;
    Ok(())
}

async fn handle_relays(action: RelaysAction, env_path: &str, cfg: &Settings) -> anyhow::Result<()> {
    let mut set: RelaySet = cfg.relays.iter().collect();
    match action {
        RelaysAction::List => {
            for relay in set.iter() {
                println!("{relay}");
            }
        }
        RelaysAction::Add { url } => {
            let url = relays::normalize(&url).to_string();
            if url.is_empty() {
                bail!("relay url is empty");
            }
            if set.contains(&url) {
                bail!("relay already configured: {url}");
            }
            test_connection(&url, cfg).await?;
            set.insert(&url);
            write_relays_to_env(env_path, set.as_slice())?;
        }
        RelaysAction::Remove { url } => {
            if !set.remove(&url) {
                bail!("relay not configured: {url}");
            }
            write_relays_to_env(env_path, set.as_slice())?;
        }
    }
    Ok(())
}

/// Open and close one connection to `url`.
async fn test_connection(url: &str, cfg: &Settings) -> anyhow::Result<()> {
    let transport = WsTransport::new(cfg.tor_socks.clone());
    let timeout = cfg.broadcast.connect_timeout;
    let mut conn = tokio::time::timeout(timeout, transport.connect(url))
        .await
        .map_err(|_| anyhow!("timed out connecting to {url}"))??;
    conn.close().await;
    Ok(())
}

fn write_relays_to_env(env_path: &str, relays: &[String]) -> anyhow::Result<()> {
    let content = fs::read_to_string(env_path)?;
    let relays_joined = relays.join(",");
    let mut new_content = String::new();
    let mut replaced = false;
    for line in content.lines() {
        if line.starts_with("RELAYS=") {
            new_content.push_str(&format!("RELAYS={relays_joined}\n"));
            replaced = true;
        } else {
            new_content.push_str(line);
            new_content.push('\n');
        }
    }
    if !replaced {
        new_content.push_str(&format!("RELAYS={relays_joined}\n"));
    }
    fs::write(env_path, new_content)?;
    std::env::set_var("RELAYS", relays_joined);
    Ok(())
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse()?)
                .add_directive("nostrcast=debug".parse()?),
        )
        .init();
    let cli = Cli::parse();
    run(cli).await
}
