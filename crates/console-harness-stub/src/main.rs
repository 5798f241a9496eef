//! Stand-in for the `net` daemon.
//!
//! Serves the console banner and the attach endpoints the console harness
//! exercises, with none of the node behind them.
//!
//! Run with: cargo run -p console-harness-stub -- --rpc console

mod client;
mod console;
mod node;
mod server;

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{client::Client, console::Welcome, node::Node, server::Servers};

const LOG_ENV: &str = "NET_STUB_LOG";
const LOG_FILE: &str = "net-stub.log";
const DEFAULT_IPC: &str = "net.ipc";

#[derive(Debug, Parser)]
#[command(name = "net-stub", version, about = "Stand-in net daemon for console tests")]
struct Cli {
    /// Network listening port
    #[arg(long, default_value_t = 30303)]
    port: u16,
    /// Maximum number of network peers
    #[arg(long, default_value_t = 25)]
    maxpeers: u32,
    /// Disable peer discovery
    #[arg(long)]
    nodiscover: bool,
    /// NAT port mapping mechanism
    #[arg(long, default_value = "any")]
    nat: String,
    /// Default account
    #[arg(long)]
    neterbase: Option<String>,
    /// Enable the shh API over IPC
    #[arg(long)]
    shh: bool,
    /// Data directory
    #[arg(long)]
    datadir: Option<PathBuf>,
    /// IPC socket or pipe, relative paths are inside the data directory
    #[arg(long)]
    ipcpath: Option<String>,
    /// Enable the HTTP-RPC server
    #[arg(long)]
    rpc: bool,
    /// HTTP-RPC server port
    #[arg(long, default_value_t = 8545)]
    rpcport: u16,
    /// Enable the WS-RPC server
    #[arg(long)]
    ws: bool,
    /// WS-RPC server port
    #[arg(long, default_value_t = 8546)]
    wsport: u16,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the node with an interactive console
    Console,
    /// Attach a console to a running node
    Attach {
        /// IPC path, `http://` or `ws://` URL
        endpoint: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let datadir = match &cli.datadir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?.join("netdata"),
    };
    std::fs::create_dir_all(&datadir)
        .with_context(|| format!("failed to create {}", datadir.display()))?;
    init_tracing(&datadir)?;

    tracing::info!(
        port = cli.port,
        maxpeers = cli.maxpeers,
        nodiscover = cli.nodiscover,
        nat = %cli.nat,
        "Starting"
    );

    match &cli.command {
        Some(Command::Attach { endpoint }) => attach(endpoint).await,
        Some(Command::Console) => run_node(&cli, datadir, true).await,
        None => run_node(&cli, datadir, false).await,
    }
}

/// Log to a file in the data directory, and only when asked to, so the
/// process output is exactly the console text.
fn init_tracing(datadir: &Path) -> anyhow::Result<()> {
    let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) else {
        return Ok(());
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(datadir.join(LOG_FILE))?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .with(filter)
        .init();
    Ok(())
}

async fn run_node(cli: &Cli, datadir: PathBuf, console: bool) -> anyhow::Result<()> {
    let ipc_path = ipc_path(cli.ipcpath.as_deref(), &datadir);
    let node = Arc::new(Node::new(cli.neterbase.clone(), datadir, cli.shh));
    let servers = Servers::start(
        Arc::clone(&node),
        Some(ipc_path),
        cli.rpc.then_some(cli.rpcport),
        cli.ws.then_some(cli.wsport),
    )
    .await?;

    let result = if console {
        let welcome = Welcome::local(&node);
        console::run(&welcome, console::stdin_lines(), &mut tokio::io::stdout()).await
    } else {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for interrupt")?;
        tracing::info!("Interrupted, shutting down");
        Ok(())
    };

    servers.shutdown();
    result
}

async fn attach(endpoint: &str) -> anyhow::Result<()> {
    let mut client = Client::connect(endpoint).await?;
    let welcome = Welcome::remote(&mut client).await?;
    console::run(&welcome, console::stdin_lines(), &mut tokio::io::stdout()).await
}

fn ipc_path(flag: Option<&str>, datadir: &Path) -> PathBuf {
    let name = flag.unwrap_or(DEFAULT_IPC);
    if cfg!(windows) && !name.starts_with(r"\\.\pipe\") {
        return PathBuf::from(format!(r"\\.\pipe\{name}"));
    }
    let path = Path::new(name);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        datadir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_flags() {
        let cli = Cli::try_parse_from([
            "net-stub", "--port", "0", "--maxpeers", "0", "--nodiscover", "--nat", "none",
            "--neterbase", "0xabc", "--shh", "--rpc", "--rpcport", "9000", "console",
        ])
        .unwrap();
        assert_eq!(cli.port, 0);
        assert!(cli.nodiscover && cli.shh && cli.rpc && !cli.ws);
        assert_eq!(cli.rpcport, 9000);
        assert_eq!(cli.neterbase.as_deref(), Some("0xabc"));
        assert!(matches!(cli.command, Some(Command::Console)));
    }

    #[test]
    fn test_attach_subcommand() {
        let cli = Cli::try_parse_from(["net-stub", "--datadir", "/tmp/a", "attach", "ws://localhost:1"])
            .unwrap();
        assert_eq!(cli.datadir, Some(PathBuf::from("/tmp/a")));
        match cli.command {
            Some(Command::Attach { endpoint }) => assert_eq!(endpoint, "ws://localhost:1"),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_ipc_path() {
        let datadir = Path::new("/data");
        assert_eq!(ipc_path(None, datadir), PathBuf::from("/data/net.ipc"));
        assert_eq!(ipc_path(Some("x.ipc"), datadir), PathBuf::from("/data/x.ipc"));
        assert_eq!(ipc_path(Some("/run/n.ipc"), datadir), PathBuf::from("/run/n.ipc"));
    }
}
