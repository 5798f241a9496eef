//! Shared scenario plumbing: configuration, daemon commands, templates.

#![allow(dead_code)]

use console_harness_attach::{AttachDriver, wait_ready};
use console_harness_console::{DaemonCommand, expect, expect_exit};
use console_harness_core::{Bindings, Endpoint, HarnessConfig, Template};
use console_harness_process::Session;

pub const COINBASE: &str = "0x8605cdbbdb6d264aa742e77020dcbc58fcdce182";

pub const CONSOLE_WELCOME: &str = r"
Welcome to the Net JavaScript console!

instance: Net/v{{version}}/{{os}}-{{arch}}/{{toolchain}}
coinbase: {{.Account}}
at block: 0 ({{niltime}})
 datadir: {{.Datadir}}
 modules: {{apis}}

> exit
";

pub const ATTACH_WELCOME: &str = r"
Welcome to the Net JavaScript console!

instance: Net/v{{version}}/{{os}}-{{arch}}/{{toolchain}}
coinbase: {{neterbase}}
at block: 0 ({{niltime}}){{if ipc}}
 datadir: {{datadir}}{{end}}
 modules: {{apis}}

> exit
";

pub fn config() -> HarnessConfig {
    HarnessConfig::from_env()
}

/// Command line of the daemon under test.
pub fn base_command(config: &HarnessConfig) -> String {
    config
        .binary
        .clone()
        .unwrap_or_else(|| quote(env!("CARGO_BIN_EXE_net-stub")))
}

#[cfg(not(windows))]
fn quote(path: &str) -> String {
    shlex::try_quote(path).map_or_else(|_| path.to_string(), |q| q.into_owned())
}

#[cfg(windows)]
fn quote(path: &str) -> String {
    format!("\"{path}\"")
}

/// A daemon cut off from the network, with the test coinbase.
pub fn daemon(config: &HarnessConfig) -> DaemonCommand {
    DaemonCommand::new(base_command(config))
        .isolated()
        .neterbase(COINBASE)
}

/// Standard bindings with the version and toolchain the daemon reports.
pub fn bindings(config: &HarnessConfig) -> Bindings {
    Bindings::standard(
        config
            .version
            .clone()
            .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string()),
        config
            .toolchain
            .clone()
            .unwrap_or_else(|| env!("NET_TOOLCHAIN").to_string()),
    )
}

/// Interrupt a daemon and expect a clean exit. Without signals the
/// interrupt is a kill, so only the kill is checked there.
pub async fn stop(config: &HarnessConfig, daemon: &mut Session) {
    daemon.interrupt().unwrap();
    if cfg!(unix) {
        expect_exit(daemon, config.exit_timeout).await.unwrap();
    } else {
        daemon.kill().await;
    }
}

/// Attach a console to `daemon` through `endpoint`, close its input and
/// check the welcome banner and a clean exit.
pub async fn attach_welcome(
    config: &HarnessConfig,
    daemon: &Session,
    endpoint: &Endpoint,
) -> anyhow::Result<()> {
    wait_ready(endpoint, config.ready_timeout, config.ready_poll).await?;

    let driver = AttachDriver::new(DaemonCommand::new(base_command(config)));
    let mut attach = driver.attach_to(endpoint).await?;
    attach.close_input();

    let bindings = bindings(config)
        .endpoint(endpoint)
        .value("neterbase", daemon.context().account().unwrap_or_default())
        .value("datadir", daemon.workdir().display().to_string());
    let template = Template::parse(ATTACH_WELCOME, &bindings)?;

    expect(&mut attach, &template, config.expect_timeout).await?;
    expect_exit(&mut attach, config.exit_timeout).await?;
    Ok(())
}
