//! objlink - command-line client for an objlink server
//!
//! # Usage
//!
//! ```text
//! objlink root                     # Print the server root reference
//! objlink app                      # Call get_root and print the result
//! objlink call <id> get_slot '"1"' # Call a method; args are JSON
//! objlink url                      # Print the server URL in use
//! ```
//!
//! The server URL comes from `--url`, then `OBJLINK_URL`, then the default
//! bind address.
//!
//! Every invocation opens its own connection. Under the default `session`
//! registry scope only the pinned ids (the server root and the application
//! root) survive from one invocation to the next; an id printed by an
//! earlier `objlink call` is `Object with id N not found`. Start the server
//! with `--shared-registry` to navigate the graph across invocations.

use std::env;
use std::process;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;
use tracing_subscriber::EnvFilter;

use objlink_client::{CallReply, ObjectClient};
use objlink_core::ObjectId;
use objlink_protocol::CallStatus;
use objlinkd::DEFAULT_BIND;

/// Environment variable holding the server URL
const URL_ENV: &str = "OBJLINK_URL";

// ============================================================================
// CLI Arguments
// ============================================================================

/// objlink client - call methods on remote objects
#[derive(Parser, Debug)]
#[command(name = "objlink", version, about)]
struct Args {
    /// Server URL (ws://host:port)
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the server root reference from the control message
    Root,
    /// Fetch the application root object
    App,
    /// Call a method on a registered object
    ///
    /// Ids from earlier invocations resolve only when the server shares one
    /// registry between connections (`objlinkd --shared-registry`).
    Call {
        /// Target object id
        that: u64,
        /// Method name
        name: String,
        /// Arguments as JSON; bare words are sent as strings
        args: Vec<String>,
    },
    /// Print the server URL
    Url,
}

fn server_url(flag: Option<String>) -> String {
    flag.or_else(|| env::var(URL_ENV).ok())
        .unwrap_or_else(|| format!("ws://{DEFAULT_BIND}"))
}

/// Parses a command-line argument as JSON, falling back to a string.
fn parse_arg(raw: &str) -> JsonValue {
    serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::String(raw.to_string()))
}

fn print_reply(reply: &CallReply) -> Result<()> {
    match reply.status {
        CallStatus::Success => {
            println!("{}", serde_json::to_string_pretty(&reply.payload)?);
            Ok(())
        }
        CallStatus::Error => {
            eprintln!("error: {}", reply.error_message().unwrap_or("unknown error"));
            process::exit(1);
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("objlink_client=warn".parse()?),
        )
        .init();

    let args = Args::parse();
    let url = server_url(args.url);

    match args.command {
        Command::Url => {
            println!("{url}");
            Ok(())
        }
        Command::Root => {
            let client = connect(&url).await?;
            println!("{}", serde_json::to_string_pretty(client.root())?);
            client.close().await?;
            Ok(())
        }
        Command::App => {
            let mut client = connect(&url).await?;
            let server = client.root_id()?;
            let reply = client.call(server, "get_root", Vec::new()).await?;
            print_reply(&reply)
        }
        Command::Call { that, name, args } => {
            let mut client = connect(&url).await?;
            let args = args.iter().map(|a| parse_arg(a)).collect();
            let reply = client.call(ObjectId::new(that), &name, args).await?;
            print_reply(&reply)
        }
    }
}

async fn connect(url: &str) -> Result<ObjectClient> {
    ObjectClient::connect(url)
        .await
        .with_context(|| format!("Is objlinkd running at {url}?"))
}
