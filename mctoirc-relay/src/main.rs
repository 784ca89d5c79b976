//! mctoirc-relay: run the bridge as its own process.
//!
//! The game side writes one JSON event per line to stdin (see [`input`]);
//! every message seen in the IRC channel is printed to stdout as the
//! display string the game would show. Logs go to stderr.

mod input;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use mctoirc_core::{Bridge, BridgeConfig, Broadcast, TomlConfigFile};

use crate::input::GameEvent;

#[derive(Parser)]
#[command(name = "mctoirc-relay", about = "Relay game chat to an IRC channel and back")]
struct Args {
    /// Config file (created with defaults if missing)
    #[arg(long, env = "MCTOIRC_CONFIG")]
    config: Option<PathBuf>,

    /// Write the default config and exit
    #[arg(long)]
    init: bool,
}

fn default_config_path() -> Result<PathBuf> {
    let dir = dirs::config_dir().context("could not determine the user config directory")?;
    Ok(dir.join("mctoirc").join("bridge.toml"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mctoirc_core=info,mctoirc_relay=info".into()),
        )
        .init();

    let args = Args::parse();
    let path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let store = TomlConfigFile::new(&path);

    if args.init {
        store
            .save(&BridgeConfig::default())
            .with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), "default config written");
        return Ok(());
    }

    let config = store
        .load_or_init()
        .with_context(|| format!("loading {}", path.display()))?;

    let sink = Arc::new(|b: &Broadcast| println!("{}", b.display));
    let bridge = Bridge::new(
        config,
        sink,
        Arc::new(store),
        tokio::runtime::Handle::current(),
    );
    bridge.start();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("interrupted");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&bridge, &line),
                Ok(None) => {
                    tracing::info!("stdin closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read stdin");
                    break;
                }
            },
        }
    }

    bridge.shutdown().await;
    tracing::info!("relay stopped");
    Ok(())
}

fn handle_line(bridge: &Bridge, line: &str) {
    match GameEvent::parse(line) {
        Ok(Some(event)) => {
            if event.apply(bridge).is_dropped() {
                tracing::warn!(?event, "outbound queue full, event dropped");
            }
        }
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, %line, "ignoring malformed event"),
    }
}
