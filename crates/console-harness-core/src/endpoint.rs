//! Attach endpoints and the API modules each transport advertises.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport a console can attach over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Unix domain socket or Windows named pipe.
    Ipc,
    /// JSON-RPC over HTTP.
    Http,
    /// JSON-RPC over WebSocket.
    Ws,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ipc => "ipc",
            Self::Http => "http",
            Self::Ws => "ws",
        })
    }
}

/// One advertised RPC API module, rendered as `name:version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiModule {
    pub name: String,
    pub version: String,
}

impl ApiModule {
    /// Create a module entry.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ApiModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

const IPC_MODULES: [&str; 10] = [
    "admin", "debug", "eth", "miner", "net", "personal", "rpc", "shh", "txpool", "web3",
];
const REMOTE_MODULES: [&str; 4] = ["eth", "net", "rpc", "web3"];
const MODULE_VERSION: &str = "1.0";

fn modules(names: &[&str]) -> Vec<ApiModule> {
    names
        .iter()
        .map(|name| ApiModule::new(*name, MODULE_VERSION))
        .collect()
}

/// Which API modules are served on which transport.
///
/// Both the matcher expectations and the stub daemon read this mapping, so
/// the advertised list is declared once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    pub ipc: Vec<ApiModule>,
    pub http: Vec<ApiModule>,
    pub ws: Vec<ApiModule>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            ipc: modules(&IPC_MODULES),
            http: modules(&REMOTE_MODULES),
            ws: modules(&REMOTE_MODULES),
        }
    }
}

impl ModuleConfig {
    /// Load a mapping from JSON.
    ///
    /// # Errors
    /// Returns error if the JSON does not describe all three transports.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Modules served on a transport, in advertisement order.
    #[must_use]
    pub fn modules(&self, transport: Transport) -> &[ApiModule] {
        match transport {
            Transport::Ipc => &self.ipc,
            Transport::Http => &self.http,
            Transport::Ws => &self.ws,
        }
    }

    /// The `modules:` banner text for a transport.
    #[must_use]
    pub fn advertisement(&self, transport: Transport) -> String {
        self.modules(transport)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A transport-tagged address a console can attach to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    transport: Transport,
    address: String,
    apis: String,
}

impl Endpoint {
    /// IPC endpoint at a socket path or pipe name.
    #[must_use]
    pub fn ipc(path: impl Into<String>, modules: &ModuleConfig) -> Self {
        Self {
            transport: Transport::Ipc,
            address: path.into(),
            apis: modules.advertisement(Transport::Ipc),
        }
    }

    /// HTTP endpoint on a localhost port.
    #[must_use]
    pub fn http(port: u16, modules: &ModuleConfig) -> Self {
        Self {
            transport: Transport::Http,
            address: format!("http://localhost:{port}"),
            apis: modules.advertisement(Transport::Http),
        }
    }

    /// WebSocket endpoint on a localhost port.
    #[must_use]
    pub fn ws(port: u16, modules: &ModuleConfig) -> Self {
        Self {
            transport: Transport::Ws,
            address: format!("ws://localhost:{port}"),
            apis: modules.advertisement(Transport::Ws),
        }
    }

    /// Transport kind.
    #[must_use]
    pub const fn transport(&self) -> Transport {
        self.transport
    }

    /// Path (IPC) or URL (HTTP/WS).
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Expected `modules:` advertisement for this endpoint.
    #[must_use]
    pub fn apis(&self) -> &str {
        &self.apis
    }

    /// Host and port of a URL endpoint. `None` for IPC or a malformed URL.
    #[must_use]
    pub fn host_port(&self) -> Option<(&str, u16)> {
        if self.transport == Transport::Ipc {
            return None;
        }
        let (_, rest) = self.address.split_once("://")?;
        let authority = rest.split('/').next()?;
        let (host, port) = authority.rsplit_once(':')?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        Some((host, port.parse().ok()?))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.transport, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_advertisements() {
        let config = ModuleConfig::default();
        assert_eq!(
            config.advertisement(Transport::Ipc),
            "admin:1.0 debug:1.0 eth:1.0 miner:1.0 net:1.0 personal:1.0 rpc:1.0 shh:1.0 txpool:1.0 web3:1.0"
        );
        assert_eq!(
            config.advertisement(Transport::Http),
            "eth:1.0 net:1.0 rpc:1.0 web3:1.0"
        );
        assert_eq!(
            config.advertisement(Transport::Http),
            config.advertisement(Transport::Ws)
        );
    }

    #[test]
    fn test_ipc_is_superset_of_remote() {
        let config = ModuleConfig::default();
        assert_eq!(config.modules(Transport::Ipc).len(), 10);
        assert_eq!(config.modules(Transport::Http).len(), 4);
        for module in config.modules(Transport::Http) {
            assert!(config.modules(Transport::Ipc).contains(module));
        }
    }

    #[test]
    fn test_module_config_from_json() {
        let json = r#"{
            "ipc": [{"name": "admin", "version": "1.0"}, {"name": "eth", "version": "1.0"}],
            "http": [{"name": "eth", "version": "1.0"}],
            "ws": []
        }"#;
        let config = ModuleConfig::from_json(json).unwrap();
        assert_eq!(config.advertisement(Transport::Ipc), "admin:1.0 eth:1.0");
        assert_eq!(config.advertisement(Transport::Ws), "");
    }

    #[test]
    fn test_endpoint_addresses() {
        let config = ModuleConfig::default();
        let http = Endpoint::http(8545, &config);
        assert_eq!(http.address(), "http://localhost:8545");
        assert_eq!(http.host_port(), Some(("localhost", 8545)));
        assert_eq!(http.apis(), "eth:1.0 net:1.0 rpc:1.0 web3:1.0");

        let ws = Endpoint::ws(8546, &config);
        assert_eq!(ws.address(), "ws://localhost:8546");
        assert_eq!(ws.transport(), Transport::Ws);

        let ipc = Endpoint::ipc("/tmp/x/net.ipc", &config);
        assert_eq!(ipc.address(), "/tmp/x/net.ipc");
        assert_eq!(ipc.host_port(), None);
        assert!(ipc.apis().contains("shh:1.0"));
    }

    #[test]
    fn test_transport_serialization() {
        let json = serde_json::to_string(&Transport::Ws).unwrap();
        assert_eq!(json, "\"ws\"");
    }
}
