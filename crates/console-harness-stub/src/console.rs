//! The interactive console: welcome banner and a line-echo prompt.

use std::io::BufRead;

use console_harness_core::{Transport, template::genesis_time};
use serde_json::Value;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};

use crate::{client::Client, node::Node};

const PROMPT: &str = "> ";
const EXIT: &str = "exit";

/// What the banner reports about the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Welcome {
    pub instance: String,
    pub coinbase: String,
    pub datadir: Option<String>,
    pub modules: String,
}

impl Welcome {
    /// Banner of a console running inside the node itself.
    #[must_use]
    pub fn local(node: &Node) -> Self {
        Self {
            instance: Node::instance(),
            coinbase: node.coinbase.clone(),
            datadir: Some(node.datadir.display().to_string()),
            modules: node.modules.advertisement(Transport::Ipc),
        }
    }

    /// Banner of a console attached to a remote node.
    ///
    /// The data directory is shown only when the endpoint serves `admin`.
    ///
    /// # Errors
    /// Returns error if one of the identity calls fails.
    pub async fn remote(client: &mut Client) -> anyhow::Result<Self> {
        let instance = text(client.call(1, "web3_clientVersion").await?);
        let coinbase = text(client.call(2, "eth_coinbase").await?);
        let modules = advertisement(&client.call(3, "rpc_modules").await?);
        let datadir = if modules.split(' ').any(|m| m.starts_with("admin:")) {
            Some(text(client.call(4, "admin_datadir").await?))
        } else {
            None
        };

        Ok(Self {
            instance,
            coinbase,
            datadir,
            modules,
        })
    }

    /// Render the banner, ending with a blank line.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("Welcome to the Net JavaScript console!\n\n");
        out.push_str(&format!("instance: {}\n", self.instance));
        out.push_str(&format!("coinbase: {}\n", self.coinbase));
        out.push_str(&format!("at block: 0 ({})\n", genesis_time()));
        if let Some(datadir) = &self.datadir {
            out.push_str(&format!(" datadir: {datadir}\n"));
        }
        out.push_str(&format!(" modules: {}\n\n", self.modules));
        out
    }
}

/// `name:version` pairs of an `rpc_modules` reply, in reply order.
#[must_use]
pub fn advertisement(modules: &Value) -> String {
    modules
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(name, version)| format!("{name}:{}", text(version.clone())))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

fn text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Read stdin lines on a plain thread.
///
/// A blocked read on a runtime worker would keep the runtime from shutting
/// down, so the thread is detached and simply dies with the process.
#[must_use]
pub fn stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Print the banner, then echo input lines after a prompt until `exit`,
/// end of input or an interrupt.
///
/// # Errors
/// Returns error if writing to `out` fails.
pub async fn run<W>(
    welcome: &Welcome,
    mut input: mpsc::UnboundedReceiver<String>,
    out: &mut W,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(welcome.render().as_bytes()).await?;

    loop {
        out.write_all(PROMPT.as_bytes()).await?;
        out.flush().await?;

        let line = tokio::select! {
            line = input.recv() => line,
            _ = tokio::signal::ctrl_c() => None,
        };
        let line = line.unwrap_or_else(|| EXIT.to_string());
        out.write_all(format!("{line}\n").as_bytes()).await?;
        if line.trim() == EXIT {
            break;
        }
    }
    out.flush().await?;
    tracing::info!("Console closed");
    Ok(())
}
