//! Daemon command construction.

use std::{io, path::PathBuf};

use console_harness_process::{SpawnRequest, WorkDir};
use thiserror::Error;

const DATADIR_FLAGS: [&str; 2] = ["--datadir", "-datadir"];
const ACCOUNT_FLAGS: [&str; 2] = ["--neterbase", "-neterbase"];

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Base command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Base command is empty after parsing")]
    EmptyCommand,
    #[error("Failed to prepare data directory: {0}")]
    DataDir(#[from] io::Error),
}

/// Builder for daemon invocations.
///
/// `base` is a command line (program plus any fixed leading arguments), so
/// wrappers like `cargo run -q --bin net --` work as well as a plain path.
#[derive(Debug, Clone)]
pub struct DaemonCommand {
    base: String,
    params: Vec<String>,
}

impl DaemonCommand {
    /// Create a builder around a base command line.
    #[must_use]
    pub fn new<S: Into<String>>(base: S) -> Self {
        Self {
            base: base.into(),
            params: Vec::new(),
        }
    }

    /// Append one raw argument.
    #[must_use]
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.params.push(arg.into());
        self
    }

    /// Append raw arguments.
    #[must_use]
    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.params.extend(args.into_iter().map(Into::into));
        self
    }

    fn flag(self, name: &str, value: impl ToString) -> Self {
        self.arg(name).arg(value.to_string())
    }

    /// `--port <port>`.
    #[must_use]
    pub fn port(self, port: u16) -> Self {
        self.flag("--port", port)
    }

    /// `--maxpeers <n>`.
    #[must_use]
    pub fn maxpeers(self, n: u32) -> Self {
        self.flag("--maxpeers", n)
    }

    /// `--nodiscover`.
    #[must_use]
    pub fn nodiscover(self) -> Self {
        self.arg("--nodiscover")
    }

    /// `--nat <mode>`.
    #[must_use]
    pub fn nat(self, mode: &str) -> Self {
        self.flag("--nat", mode)
    }

    /// The flags every scenario uses to keep the daemon off the network:
    /// `--port 0 --maxpeers 0 --nodiscover --nat none`.
    #[must_use]
    pub fn isolated(self) -> Self {
        self.port(0).maxpeers(0).nodiscover().nat("none")
    }

    /// `--neterbase <address>`, the daemon's default account.
    #[must_use]
    pub fn neterbase(self, address: &str) -> Self {
        self.flag("--neterbase", address)
    }

    /// `--shh`.
    #[must_use]
    pub fn shh(self) -> Self {
        self.arg("--shh")
    }

    /// `--datadir <path>`.
    #[must_use]
    pub fn datadir(self, path: impl Into<PathBuf>) -> Self {
        self.flag("--datadir", path.into().display())
    }

    /// `--ipcpath <path>`.
    #[must_use]
    pub fn ipcpath(self, path: &str) -> Self {
        self.flag("--ipcpath", path)
    }

    /// `--rpc --rpcport <port>`.
    #[must_use]
    pub fn rpc(self, port: u16) -> Self {
        self.arg("--rpc").flag("--rpcport", port)
    }

    /// `--ws --wsport <port>`.
    #[must_use]
    pub fn ws(self, port: u16) -> Self {
        self.arg("--ws").flag("--wsport", port)
    }

    /// The `console` subcommand.
    #[must_use]
    pub fn console(self) -> Self {
        self.arg("console")
    }

    /// The `attach <endpoint>` subcommand.
    #[must_use]
    pub fn attach(self, endpoint: &str) -> Self {
        self.arg("attach").arg(endpoint)
    }

    /// Turn the builder into a spawn request.
    ///
    /// The data directory and default account are read back from the flags.
    /// Without `--datadir` a temporary directory is created, passed to the
    /// daemon, and owned by the resulting session.
    ///
    /// # Errors
    /// Returns error if the base command is invalid or the data directory
    /// cannot be created.
    pub fn build(&self) -> Result<SpawnRequest, CommandBuildError> {
        let mut parts = split_command_line(&self.base)?;
        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }
        let program = parts.remove(0);

        let datadir = flag_value(&self.params, &DATADIR_FLAGS);
        let account = flag_value(&self.params, &ACCOUNT_FLAGS);

        let workdir = if let Some(dir) = datadir {
            let dir = PathBuf::from(dir);
            std::fs::create_dir_all(&dir)?;
            WorkDir::Path(dir)
        } else {
            let dir = tempfile::Builder::new().prefix("net-harness-").tempdir()?;
            parts.push("--datadir".to_string());
            parts.push(dir.path().display().to_string());
            WorkDir::Temp(dir)
        };
        parts.extend(self.params.iter().cloned());

        Ok(SpawnRequest {
            program,
            args: parts,
            workdir,
            account,
        })
    }
}

fn flag_value(params: &[String], names: &[&str]) -> Option<String> {
    params
        .windows(2)
        .find(|pair| names.contains(&pair[0].as_str()))
        .map(|pair| pair[1].clone())
}

fn split_command_line(input: &str) -> Result<Vec<String>, CommandBuildError> {
    #[cfg(windows)]
    {
        let parts = winsplit::split(input);
        if parts.is_empty() {
            Err(CommandBuildError::EmptyCommand)
        } else {
            Ok(parts)
        }
    }

    #[cfg(not(windows))]
    {
        shlex::split(input).ok_or_else(|| CommandBuildError::InvalidBase(input.to_string()))
    }
}
