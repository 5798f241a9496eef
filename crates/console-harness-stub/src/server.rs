//! RPC endpoints: IPC (JSON lines), HTTP (`POST /`) and WebSocket (`/`).

use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::{get, post},
};
use console_harness_attach::{RpcRequest, RpcResponse};
use console_harness_core::Transport;
use futures::{SinkExt, StreamExt};
use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader},
    task::JoinHandle,
};

use crate::node::Node;

/// Running endpoint tasks. Dropping without `shutdown` leaves them running.
pub struct Servers {
    tasks: Vec<JoinHandle<()>>,
    ipc_path: Option<PathBuf>,
}

impl Servers {
    /// Open every configured endpoint.
    ///
    /// # Errors
    /// Returns error if a listener cannot be bound.
    pub async fn start(
        node: Arc<Node>,
        ipc_path: Option<PathBuf>,
        http_port: Option<u16>,
        ws_port: Option<u16>,
    ) -> anyhow::Result<Self> {
        let mut tasks = Vec::new();

        if let Some(path) = &ipc_path {
            tasks.push(serve_ipc(Arc::clone(&node), path)?);
            tracing::info!(path = %path.display(), "IPC endpoint opened");
        }
        if let Some(port) = http_port {
            let app = Router::new()
                .route("/", post(http_handler))
                .with_state(Arc::clone(&node));
            tasks.push(serve_tcp(port, app).await?);
            tracing::info!(url = %format!("http://localhost:{port}"), "HTTP endpoint opened");
        }
        if let Some(port) = ws_port {
            let app = Router::new()
                .route("/", get(ws_handler))
                .with_state(Arc::clone(&node));
            tasks.push(serve_tcp(port, app).await?);
            tracing::info!(url = %format!("ws://localhost:{port}"), "WebSocket endpoint opened");
        }

        Ok(Self { tasks, ipc_path })
    }

    /// Stop all endpoints and remove the IPC socket file.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        #[cfg(unix)]
        if let Some(path) = &self.ipc_path {
            let _ = std::fs::remove_file(path);
        }
        #[cfg(not(unix))]
        let _ = self.ipc_path;
        tracing::info!("Endpoints closed");
    }
}

async fn serve_tcp(port: u16, app: Router) -> anyhow::Result<JoinHandle<()>> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to listen on {addr}"))?;
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server on {addr} failed: {e}");
        }
    }))
}

async fn http_handler(
    State(node): State<Arc<Node>>,
    Json(request): Json<RpcRequest>,
) -> Json<RpcResponse> {
    tracing::debug!(method = %request.method, "HTTP request");
    Json(node.handle(Transport::Http, &request))
}

async fn ws_handler(ws: WebSocketUpgrade, State(node): State<Arc<Node>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, node))
}

async fn handle_socket(socket: WebSocket, node: Arc<Node>) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text.as_str().to_owned(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!("WebSocket error: {e}");
                break;
            }
        };

        let reply = node.handle_text(Transport::Ws, &text);
        if sender.send(Message::Text(reply.into())).await.is_err() {
            break;
        }
    }
    tracing::debug!("WebSocket client disconnected");
}

/// Serve newline-delimited JSON-RPC on one IPC connection.
async fn handle_ipc<S>(stream: S, node: Arc<Node>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("IPC read failed: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let mut reply = node.handle_text(Transport::Ipc, &line);
        reply.push('\n');
        if writer.write_all(reply.as_bytes()).await.is_err() {
            break;
        }
    }
}

#[cfg(unix)]
fn serve_ipc(node: Arc<Node>, path: &Path) -> anyhow::Result<JoinHandle<()>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // A socket left behind by a killed node blocks the bind.
    let _ = std::fs::remove_file(path);
    let listener = tokio::net::UnixListener::bind(path)
        .with_context(|| format!("failed to listen on {}", path.display()))?;

    Ok(tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    tokio::spawn(handle_ipc(stream, Arc::clone(&node)));
                }
                Err(e) => {
                    tracing::error!("IPC accept failed: {e}");
                    break;
                }
            }
        }
    }))
}

#[cfg(windows)]
fn serve_ipc(node: Arc<Node>, path: &Path) -> anyhow::Result<JoinHandle<()>> {
    use tokio::net::windows::named_pipe::ServerOptions;

    let name = path.display().to_string();
    let mut server = ServerOptions::new()
        .create(&name)
        .with_context(|| format!("failed to create pipe {name}"))?;

    Ok(tokio::spawn(async move {
        loop {
            if let Err(e) = server.connect().await {
                tracing::error!("IPC accept failed: {e}");
                break;
            }
            let next = match ServerOptions::new().create(&name) {
                Ok(next) => next,
                Err(e) => {
                    tracing::error!("IPC pipe creation failed: {e}");
                    break;
                }
            };
            let connected = std::mem::replace(&mut server, next);
            tokio::spawn(handle_ipc(connected, Arc::clone(&node)));
        }
    }))
}
