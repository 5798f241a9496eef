//! Node identity and the RPC methods an attaching console calls.

use std::path::PathBuf;

use console_harness_attach::{
    RpcRequest, RpcResponse,
    protocol::{INVALID_REQUEST, METHOD_NOT_FOUND},
};
use console_harness_core::{ModuleConfig, Transport};
use serde_json::{Map, Value};

/// Build version reported in `instance:`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Compiler the binary was built with, e.g. `rustc1.85.0`.
pub const TOOLCHAIN: &str = env!("NET_TOOLCHAIN");

/// Account reported when no `--neterbase` is given.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Everything the stub node knows about itself.
#[derive(Debug, Clone)]
pub struct Node {
    pub coinbase: String,
    pub datadir: PathBuf,
    pub modules: ModuleConfig,
}

impl Node {
    /// Create the node, dropping `shh` from the IPC modules unless enabled.
    #[must_use]
    pub fn new(coinbase: Option<String>, datadir: PathBuf, shh: bool) -> Self {
        let mut modules = ModuleConfig::default();
        if !shh {
            modules.ipc.retain(|module| module.name != "shh");
        }
        Self {
            coinbase: coinbase.unwrap_or_else(|| ZERO_ADDRESS.to_string()),
            datadir,
            modules,
        }
    }

    /// `Net/v<version>/<os>-<arch>/<toolchain>`.
    #[must_use]
    pub fn instance() -> String {
        format!(
            "Net/v{VERSION}/{}-{}/{TOOLCHAIN}",
            std::env::consts::OS,
            std::env::consts::ARCH
        )
    }

    /// Answer one request received over `transport`.
    ///
    /// A method is only served when its namespace (the part before `_`) is
    /// among the modules of that transport.
    #[must_use]
    pub fn handle(&self, transport: Transport, request: &RpcRequest) -> RpcResponse {
        let id = request.id;
        let namespace = request.method.split('_').next().unwrap_or_default();
        let modules = self.modules.modules(transport);
        if !modules.iter().any(|module| module.name == namespace) {
            return RpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("the method {} does not exist/is not available", request.method),
            );
        }

        let result = match request.method.as_str() {
            "rpc_modules" => Value::Object(
                modules
                    .iter()
                    .map(|module| (module.name.clone(), Value::from(module.version.clone())))
                    .collect::<Map<_, _>>(),
            ),
            "eth_coinbase" => Value::from(self.coinbase.clone()),
            "admin_datadir" => Value::from(self.datadir.display().to_string()),
            "web3_clientVersion" => Value::from(Self::instance()),
            other => {
                return RpcResponse::error(
                    id,
                    METHOD_NOT_FOUND,
                    format!("the method {other} does not exist/is not available"),
                );
            }
        };
        RpcResponse::result(id, result)
    }

    /// Answer a raw JSON request, replying with an error for malformed input.
    #[must_use]
    pub fn handle_text(&self, transport: Transport, text: &str) -> String {
        let response = match serde_json::from_str::<RpcRequest>(text) {
            Ok(request) => self.handle(transport, &request),
            Err(err) => {
                tracing::warn!(%transport, %err, "Malformed request");
                RpcResponse::error(0, INVALID_REQUEST, err.to_string())
            }
        };
        serde_json::to_string(&response).unwrap_or_default()
    }
}
