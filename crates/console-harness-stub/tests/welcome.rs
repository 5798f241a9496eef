//! Console welcome scenarios: direct console boot and attach over every
//! transport.

mod common;

use std::time::Duration;

use common::{CONSOLE_WELCOME, attach_welcome, bindings, config, daemon, stop};
use console_harness_attach::{AttachError, wait_ready};
use console_harness_console::{MatchError, expect, expect_exit};
use console_harness_core::{
    Bindings, Endpoint, HarnessConfig, ModuleConfig, Template, Transport, allocate_port,
    ipc_endpoint_path,
};
use console_harness_process::{Session, SessionState};

/// A console runs inside the node and sees the IPC module set.
fn console_bindings(config: &HarnessConfig) -> Bindings {
    bindings(config).value("apis", ModuleConfig::default().advertisement(Transport::Ipc))
}

fn console_template(config: &HarnessConfig) -> Template {
    Template::parse(CONSOLE_WELCOME, &console_bindings(config)).unwrap()
}

#[tokio::test]
async fn console_welcome() {
    let config = config();
    let request = daemon(&config).shh().console().build().unwrap();
    let mut net = Session::spawn(request).await.unwrap();

    net.write_input("exit\n").await.unwrap();
    let template = console_template(&config);
    expect(&mut net, &template, config.expect_timeout)
        .await
        .unwrap();
    expect_exit(&mut net, config.exit_timeout).await.unwrap();
    assert_eq!(net.state(), SessionState::Exited(Some(0)));
}

#[tokio::test]
async fn console_exits_when_input_closes() {
    let config = config();
    let request = daemon(&config).shh().console().build().unwrap();
    let mut net = Session::spawn(request).await.unwrap();

    net.close_input();
    let template = console_template(&config);
    expect(&mut net, &template, config.expect_timeout)
        .await
        .unwrap();
    expect_exit(&mut net, config.exit_timeout).await.unwrap();
}

#[tokio::test]
async fn console_reports_wrong_os() {
    let config = config();
    let request = daemon(&config).shh().console().build().unwrap();
    let mut net = Session::spawn(request).await.unwrap();
    net.close_input();

    let bindings = console_bindings(&config).value("os", "plan9");
    let template = Template::parse(CONSOLE_WELCOME, &bindings).unwrap();
    let err = expect(&mut net, &template, config.expect_timeout)
        .await
        .unwrap_err();
    match err {
        MatchError::OutputMismatch {
            segment,
            expected,
            actual,
        } => {
            assert_eq!(segment, "{{os}}");
            assert_eq!(expected, "plan9");
            assert_eq!(actual, std::env::consts::OS);
        }
        other => panic!("unexpected error: {other}"),
    }
    net.kill().await;
}

#[tokio::test]
async fn sessions_own_distinct_data_directories() {
    let config = config();
    let template = console_template(&config);
    let mut first = Session::spawn(daemon(&config).shh().console().build().unwrap())
        .await
        .unwrap();
    let mut second = Session::spawn(daemon(&config).shh().console().build().unwrap())
        .await
        .unwrap();

    let first_dir = first.workdir().to_path_buf();
    assert_ne!(first_dir, second.workdir());
    assert!(first_dir.is_dir());

    for net in [&mut first, &mut second] {
        net.close_input();
        expect(net, &template, config.expect_timeout).await.unwrap();
        expect_exit(net, config.exit_timeout).await.unwrap();
    }

    drop(first);
    assert!(!first_dir.exists());
    drop(second);
}

#[tokio::test]
async fn ipc_attach_welcome() {
    let config = config();
    let sockets = tempfile::tempdir().unwrap();
    let ipc = ipc_endpoint_path(sockets.path()).unwrap();
    let endpoint = Endpoint::ipc(ipc.clone(), &ModuleConfig::default());

    // shh is part of the default IPC module list.
    let request = daemon(&config).shh().ipcpath(&ipc).build().unwrap();
    let mut net = Session::spawn(request).await.unwrap();

    attach_welcome(&config, &net, &endpoint).await.unwrap();

    stop(&config, &mut net).await;
}

#[tokio::test]
async fn http_attach_welcome() {
    let config = config();
    let port = allocate_port().unwrap();
    let endpoint = Endpoint::http(port, &ModuleConfig::default());
    assert_eq!(endpoint.transport(), Transport::Http);

    let request = daemon(&config).rpc(port).build().unwrap();
    let mut net = Session::spawn(request).await.unwrap();

    attach_welcome(&config, &net, &endpoint).await.unwrap();

    stop(&config, &mut net).await;
}

#[tokio::test]
async fn ws_attach_welcome() {
    let config = config();
    let port = allocate_port().unwrap();
    let endpoint = Endpoint::ws(port, &ModuleConfig::default());

    let request = daemon(&config).ws(port).build().unwrap();
    let mut net = Session::spawn(request).await.unwrap();

    attach_welcome(&config, &net, &endpoint).await.unwrap();

    stop(&config, &mut net).await;
}

#[tokio::test]
async fn attach_fails_when_endpoint_never_opens() {
    let config = config();
    let sockets = tempfile::tempdir().unwrap();
    let ipc = Endpoint::ipc(
        ipc_endpoint_path(sockets.path()).unwrap(),
        &ModuleConfig::default(),
    );
    // No --rpc: the daemon is up but never listens on the HTTP port.
    let request = daemon(&config).ipcpath(ipc.address()).build().unwrap();
    let mut net = Session::spawn(request).await.unwrap();
    tokio_test::assert_ok!(wait_ready(&ipc, config.ready_timeout, config.ready_poll).await);

    let http = Endpoint::http(allocate_port().unwrap(), &ModuleConfig::default());
    let err = wait_ready(&http, Duration::from_millis(300), config.ready_poll)
        .await
        .unwrap_err();
    assert!(matches!(err, AttachError::EndpointNotReady { .. }));

    stop(&config, &mut net).await;
}
