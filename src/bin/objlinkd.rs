//! objlink server - serves a demo lab deck over WebSocket
//!
//! # Usage
//!
//! ```bash
//! # Serve on the default address (127.0.0.1:31950)
//! objlinkd start
//!
//! # One registry for all clients, idle references expire after 5 minutes
//! objlinkd start --shared-registry --idle-ttl-secs 300
//!
//! # Print the effective configuration
//! objlinkd config
//! ```
//!
//! The listen address can also be set with `OBJLINK_BIND`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use objlink_core::ObjectRef;
use objlink_devices::Deck;
use objlinkd::{ObjectServer, RegistryScope, ServerConfig};

/// objlink server - remote method calls against live objects
#[derive(Parser, Debug)]
#[command(name = "objlinkd", version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server (default)
    Start(ServeArgs),
    /// Print the effective configuration as TOML
    Config(ServeArgs),
}

#[derive(ClapArgs, Debug, Default)]
struct ServeArgs {
    /// Listen address (host:port)
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Config file (defaults to the user config directory)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Share one object registry between all sessions
    #[arg(long)]
    shared_registry: bool,

    /// Evict references unused for this many seconds
    #[arg(long)]
    idle_ttl_secs: Option<u64>,

    /// Fail calls that run longer than this many milliseconds
    #[arg(long)]
    call_timeout_ms: Option<u64>,

    /// Maximum registered objects per registry
    #[arg(long)]
    max_objects: Option<usize>,
}

impl ServeArgs {
    /// File, then environment, then flags.
    fn load_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::load(path)?,
            None => ServerConfig::load_default()?,
        };
        config.apply_env()?;

        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if self.shared_registry {
            config.registry_scope = RegistryScope::Shared;
        }
        if self.idle_ttl_secs.is_some() {
            config.idle_ttl_secs = self.idle_ttl_secs;
        }
        if self.call_timeout_ms.is_some() {
            config.call_timeout_ms = self.call_timeout_ms;
        }
        if let Some(max) = self.max_objects {
            config.max_objects = max;
        }

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start(ServeArgs::default()));

    match command {
        Command::Start(serve) => {
            let config = serve.load_config()?;
            run_server(config)
        }
        Command::Config(serve) => {
            let config = serve.load_config()?;
            let text = toml::to_string_pretty(&config).context("Failed to encode config")?;
            print!("{text}");
            Ok(())
        }
    }
}

#[tokio::main]
async fn run_server(config: ServerConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("objlinkd=info".parse()?)
                .add_directive("objlink_devices=info".parse()?),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "objlink server starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let deck: ObjectRef = Deck::demo();
    let server = ObjectServer::bind(config, Some(deck), cancel_token).await?;
    info!(url = %server.url()?, "Serving demo deck");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("objlink server stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
