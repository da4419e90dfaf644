//! `fakts`: connect to a fakts deployment from the terminal.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use fakts_connection::{
    BrowserSurface, ConnectedContext, ConnectionEvent, ConnectionManager, FileStore, LogSurface,
    SessionStore, default_session_path,
};
use fakts_protocol::constants::{ENDPOINT_KEY, FAKTS_KEY, TOKEN_KEY};

use crate::config::CliConfig;

#[derive(Parser, Debug)]
#[command(name = "fakts")]
#[command(version, about = "Connect applications to fakts deployments", long_about = None)]
struct Args {
    /// Config file (defaults to the platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Session file, overrides the config
    #[arg(short, long, global = true)]
    session: Option<PathBuf>,

    /// Log the consent URL instead of opening a browser
    #[arg(long, global = true)]
    no_browser: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover the deployment behind URL and run the consent handshake
    Connect { url: String },
    /// Re-run the handshake against the last endpoint
    Reconnect,
    /// Restore the persisted session without user interaction
    Restore,
    /// Show what the session file holds and restore it if possible
    Status,
    /// Forget the persisted configuration and token
    Disconnect,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fakts=debug")),
        )
        .init();

    let args = Args::parse();
    let config = CliConfig::load(args.config.as_deref())?;

    let session_path = args
        .session
        .clone()
        .or_else(|| config.session_path.clone())
        .or_else(default_session_path)
        .context("no config directory, pass --session")?;
    let store = Arc::new(
        FileStore::open(session_path.clone())
            .with_context(|| format!("opening session {}", session_path.display()))?,
    );

    let mut manager =
        ConnectionManager::new(config.app.clone(), config.registry(), store.clone())
            .with_config(config.connection_config());
    manager = if args.no_browser {
        manager.with_surface(Arc::new(LogSurface))
    } else {
        manager.with_surface(Arc::new(BrowserSurface::new()))
    };

    if let Some(events) = manager.take_events().await {
        tokio::spawn(log_events(events));
    }

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted, cancelling");
                cancel.cancel();
            }
        });
    }

    match args.command {
        Command::Connect { url } => {
            let ctx = manager.connect_url(&url, &cancel).await?;
            print_context(&ctx);
        }
        Command::Reconnect => {
            let ctx = manager.reconnect(&cancel).await?;
            print_context(&ctx);
        }
        Command::Restore => match manager.try_reconnect(&cancel).await {
            Some(ctx) => print_context(&ctx),
            None => println!("no usable session, run `fakts connect <url>`"),
        },
        Command::Disconnect => {
            manager.disconnect().await;
            println!("session cleared ({})", store.path().display());
        }
        Command::Status => {
            status(store.as_ref()).await?;
            if let Some(ctx) = manager.try_reconnect(&cancel).await {
                print_context(&ctx);
            }
        }
    }

    Ok(())
}

async fn status(store: &FileStore) -> Result<()> {
    println!("session: {}", store.path().display());
    for key in [ENDPOINT_KEY, FAKTS_KEY, TOKEN_KEY] {
        let state = match store.get(key).await? {
            Some(_) => "present",
            None => "missing",
        };
        println!("  {key:<9}{state}");
    }
    Ok(())
}

async fn log_events(mut events: mpsc::Receiver<ConnectionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::StateChanged(state) => tracing::debug!(%state, "state changed"),
            ConnectionEvent::ConsentRequired { url } => {
                println!("Grant access at: {url}");
            }
            ConnectionEvent::ServiceUnresolved { key, reason } => {
                tracing::warn!(%key, %reason, "service unavailable");
            }
        }
    }
}

fn print_context(ctx: &ConnectedContext) {
    if let Some(name) = &ctx.fakts.deployment.deployment_name {
        println!("Connected to {name}");
    } else {
        println!("Connected");
    }
    for available in &ctx.available_services {
        println!(
            "  ok    {:<12} {} -> {}",
            available.key, available.service, available.resolved
        );
    }
    for unresolved in &ctx.unresolved_services {
        println!(
            "  down  {:<12} {} ({})",
            unresolved.key, unresolved.service, unresolved.reason
        );
    }
}
