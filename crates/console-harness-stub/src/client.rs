//! Client side of `attach`: JSON-RPC over IPC, HTTP or WebSocket.

use anyhow::{Context, anyhow, bail};
use console_harness_attach::{RpcRequest, RpcResponse};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

#[cfg(unix)]
type IpcStream = tokio::net::UnixStream;
#[cfg(windows)]
type IpcStream = tokio::net::windows::named_pipe::NamedPipeClient;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection to a running node.
pub enum Client {
    Ipc {
        reader: BufReader<ReadHalf<IpcStream>>,
        writer: WriteHalf<IpcStream>,
    },
    Http {
        http: reqwest::Client,
        url: String,
    },
    Ws(Box<WsStream>),
}

/// Kind of endpoint an address names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target<'a> {
    Ipc(&'a str),
    Http(&'a str),
    Ws(&'a str),
}

/// Classify an attach address. Anything that is not an HTTP or WS URL is an
/// IPC path; an `ipc:` prefix is accepted and stripped.
#[must_use]
pub fn target(address: &str) -> Target<'_> {
    if address.starts_with("http://") || address.starts_with("https://") {
        Target::Http(address)
    } else if address.starts_with("ws://") || address.starts_with("wss://") {
        Target::Ws(address)
    } else {
        Target::Ipc(address.strip_prefix("ipc:").unwrap_or(address))
    }
}

impl Client {
    /// Connect to the node at `address`.
    ///
    /// # Errors
    /// Returns error if the endpoint cannot be reached.
    pub async fn connect(address: &str) -> anyhow::Result<Self> {
        let client = match target(address) {
            Target::Ipc(path) => {
                let stream = connect_ipc(path)
                    .await
                    .with_context(|| format!("failed to connect to {path}"))?;
                let (reader, writer) = tokio::io::split(stream);
                Self::Ipc {
                    reader: BufReader::new(reader),
                    writer,
                }
            }
            Target::Http(url) => Self::Http {
                http: reqwest::Client::new(),
                url: url.to_string(),
            },
            Target::Ws(url) => {
                let (stream, _) = tokio_tungstenite::connect_async(url)
                    .await
                    .with_context(|| format!("failed to connect to {url}"))?;
                Self::Ws(Box::new(stream))
            }
        };
        tracing::debug!(address, "Attached");
        Ok(client)
    }

    /// Call a parameterless method and return its result.
    ///
    /// # Errors
    /// Returns error on transport failure or an RPC error reply.
    pub async fn call(&mut self, id: u64, method: &str) -> anyhow::Result<Value> {
        let request = RpcRequest::new(id, method);
        let response: RpcResponse = match self {
            Self::Ipc { reader, writer } => {
                let mut line = serde_json::to_string(&request)?;
                line.push('\n');
                writer.write_all(line.as_bytes()).await?;
                let mut reply = String::new();
                if reader.read_line(&mut reply).await? == 0 {
                    bail!("connection closed by node");
                }
                serde_json::from_str(&reply)?
            }
            Self::Http { http, url } => {
                http.post(url.as_str())
                    .json(&request)
                    .send()
                    .await?
                    .error_for_status()?
                    .json()
                    .await?
            }
            Self::Ws(stream) => {
                stream
                    .send(Message::text(serde_json::to_string(&request)?))
                    .await?;
                loop {
                    match stream.next().await {
                        Some(Ok(Message::Text(text))) => break serde_json::from_str(&text)?,
                        Some(Ok(Message::Close(_))) | None => {
                            bail!("connection closed by node")
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                    }
                }
            }
        };

        response
            .into_result()
            .map_err(|e| anyhow!("{method} failed: {} ({})", e.message, e.code))
    }
}

#[cfg(unix)]
async fn connect_ipc(path: &str) -> std::io::Result<IpcStream> {
    tokio::net::UnixStream::connect(path).await
}

#[cfg(windows)]
async fn connect_ipc(path: &str) -> std::io::Result<IpcStream> {
    tokio::net::windows::named_pipe::ClientOptions::new().open(path)
}
