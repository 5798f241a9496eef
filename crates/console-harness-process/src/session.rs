//! Spawned process sessions.

use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use command_group::{AsyncCommandGroup, AsyncGroupChild};
use console_harness_core::SessionContext;
use tempfile::TempDir;
use thiserror::Error;
use tokio::{io::AsyncWriteExt, process::ChildStdin, process::Command};

use crate::{
    output::{OutputStream, pump},
    resolve::resolve_executable_path,
};

/// How long to wait for a killed process group to be reaped.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);
const REAP_POLL: Duration = Duration::from_millis(10);

/// Session error.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Process did not exit within {0:?}")]
    ExitTimeout(Duration),
    #[error("Process exited with {}", describe_exit(*.0))]
    UnexpectedExitCode(Option<i32>),
}

fn describe_exit(code: Option<i32>) -> String {
    code.map_or_else(|| "no status (killed by a signal)".to_string(), |c| format!("status {c}"))
}

/// Lifecycle of a session's process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    InterruptSent,
    /// Exit code, `None` when the process died to a signal.
    Exited(Option<i32>),
}

/// Working directory of a session.
#[derive(Debug)]
pub enum WorkDir {
    /// A directory the caller owns.
    Path(PathBuf),
    /// A temporary directory removed when the session is dropped.
    Temp(TempDir),
}

impl WorkDir {
    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Path(p) => p,
            Self::Temp(t) => t.path(),
        }
    }
}

/// Everything needed to start a session.
#[derive(Debug)]
pub struct SpawnRequest {
    /// Program name or path.
    pub program: String,
    /// Arguments after the program.
    pub args: Vec<String>,
    /// Working directory of the child.
    pub workdir: WorkDir,
    /// Default account the child is started with, if any.
    pub account: Option<String>,
}

/// One supervised process.
///
/// Owns the process group, its stdin, its merged output and its working
/// directory. Dropping a session kills a still-running group and removes a
/// temporary working directory.
pub struct Session {
    child: AsyncGroupChild,
    program: PathBuf,
    stdin: Option<ChildStdin>,
    output: OutputStream,
    context: SessionContext,
    state: SessionState,
    // Dropped last so the directory outlives the process.
    _workdir: WorkDir,
}

impl Session {
    /// Spawn a process in its own process group.
    ///
    /// # Errors
    /// Returns `SessionError::Spawn` if the executable cannot be found or the
    /// OS refuses to start it.
    pub async fn spawn(request: SpawnRequest) -> Result<Self, SessionError> {
        let SpawnRequest {
            program,
            args,
            workdir,
            account,
        } = request;

        let executable = resolve_executable_path(&program)
            .await
            .ok_or_else(|| SessionError::Spawn {
                program: program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "executable not found"),
            })?;

        let mut command = Command::new(&executable);
        command
            .args(&args)
            .current_dir(workdir.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .group_spawn()
            .map_err(|source| SessionError::Spawn { program, source })?;

        let (tx, output) = OutputStream::channel();
        let inner = child.inner();
        let stdin = inner.stdin.take();
        if let Some(stdout) = inner.stdout.take() {
            pump(stdout, tx.clone());
        }
        if let Some(stderr) = inner.stderr.take() {
            pump(stderr, tx);
        }

        tracing::info!(
            pid = child.id(),
            program = %executable.display(),
            ?args,
            workdir = %workdir.path().display(),
            "Spawned session"
        );

        let context = match account {
            Some(account) => SessionContext::with_account(workdir.path().to_path_buf(), account),
            None => SessionContext::new(workdir.path().to_path_buf()),
        };

        Ok(Self {
            child,
            program: executable,
            stdin,
            output,
            context,
            state: SessionState::Running,
            _workdir: workdir,
        })
    }

    /// OS process id, while the process has not been reaped.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Resolved executable path.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Attributes fixed at spawn.
    #[must_use]
    pub const fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Working directory of the process.
    #[must_use]
    pub fn workdir(&self) -> &Path {
        self.context.working_dir()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// The merged output stream.
    pub const fn output_mut(&mut self) -> &mut OutputStream {
        &mut self.output
    }

    /// Write text to the process's stdin. No acknowledgment is awaited.
    ///
    /// # Errors
    /// Returns error if input was closed or the pipe is broken.
    pub async fn write_input(&mut self, text: &str) -> Result<(), SessionError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "input already closed").into());
        };
        stdin.write_all(text.as_bytes()).await?;
        stdin.flush().await?;
        tracing::trace!(pid = self.pid(), input = text, "Wrote session input");
        Ok(())
    }

    /// Close stdin, signalling end-of-input.
    pub fn close_input(&mut self) {
        if self.stdin.take().is_some() {
            tracing::debug!(pid = self.pid(), "Closed session input");
        }
    }

    /// Ask the process to stop: SIGINT to the process group on Unix, a kill
    /// elsewhere. Does nothing once the process has exited.
    ///
    /// # Errors
    /// Returns error if the signal cannot be delivered.
    pub fn interrupt(&mut self) -> Result<(), SessionError> {
        if matches!(self.state, SessionState::Exited(_)) {
            return Ok(());
        }
        if let Some(status) = self.child.try_wait()? {
            self.state = SessionState::Exited(status.code());
            return Ok(());
        }

        #[cfg(unix)]
        {
            use command_group::{Signal, UnixChildExt};
            self.child.signal(Signal::SIGINT)?;
        }
        #[cfg(not(unix))]
        self.child.start_kill()?;

        self.state = SessionState::InterruptSent;
        tracing::debug!(pid = self.pid(), "Interrupted session");
        Ok(())
    }

    /// Wait for the process to exit with status 0.
    ///
    /// On timeout the process group is killed before returning.
    ///
    /// # Errors
    /// Returns `ExitTimeout` if the process outlives `timeout` and
    /// `UnexpectedExitCode` for any status other than 0.
    pub async fn wait_exit(&mut self, timeout: Duration) -> Result<(), SessionError> {
        let code = if let SessionState::Exited(code) = self.state {
            code
        } else {
            let pid = self.pid();
            match tokio::time::timeout(timeout, self.child.wait()).await {
                Ok(status) => {
                    let code = status?.code();
                    self.state = SessionState::Exited(code);
                    tracing::info!(pid, ?code, "Session exited");
                    code
                }
                Err(_) => {
                    tracing::warn!(pid, ?timeout, "Session did not exit in time, killing");
                    self.kill().await;
                    return Err(SessionError::ExitTimeout(timeout));
                }
            }
        };

        if code == Some(0) {
            Ok(())
        } else {
            Err(SessionError::UnexpectedExitCode(code))
        }
    }

    /// Kill the process group and reap it.
    pub async fn kill(&mut self) {
        if matches!(self.state, SessionState::Exited(_)) {
            return;
        }
        if let Err(err) = self.child.start_kill() {
            tracing::warn!(pid = self.pid(), ?err, "Failed to kill process group");
        }
        let code = match tokio::time::timeout(REAP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => status.code(),
            _ => None,
        };
        self.state = SessionState::Exited(code);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if matches!(self.state, SessionState::Exited(_)) {
            return;
        }
        if let Ok(None) = self.child.try_wait() {
            if let Err(err) = self.child.start_kill() {
                tracing::warn!(pid = self.pid(), ?err, "Failed to kill process group on drop");
                return;
            }
            tracing::debug!(pid = self.pid(), "Killed process group on drop");
            self.reap_blocking();
        }
    }
}

impl Session {
    /// Wait for a killed child so the work directory is not removed under it.
    fn reap_blocking(&mut self) {
        let deadline = std::time::Instant::now() + REAP_TIMEOUT;
        while std::time::Instant::now() < deadline {
            match self.child.try_wait() {
                Ok(None) => std::thread::sleep(REAP_POLL),
                Ok(Some(_)) => return,
                Err(err) => {
                    tracing::warn!(?err, "Failed to reap process group on drop");
                    return;
                }
            }
        }
        tracing::warn!(pid = self.pid(), "Process group still running after kill");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("pid", &self.child.id())
            .field("program", &self.program)
            .field("context", &self.context)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use tokio::time::Instant;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn sh(script: &str) -> SpawnRequest {
        SpawnRequest {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            workdir: WorkDir::Temp(TempDir::new().unwrap()),
            account: None,
        }
    }

    async fn all_output(session: &mut Session) -> String {
        let bytes = session
            .output_mut()
            .read_to_end(Instant::now() + TIMEOUT)
            .await;
        String::from_utf8(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_spawn_and_exit_cleanly() {
        let mut session = Session::spawn(sh("echo hello")).await.unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(all_output(&mut session).await, "hello\n");
        assert_ok!(session.wait_exit(TIMEOUT).await);
        assert_eq!(session.state(), SessionState::Exited(Some(0)));
    }

    #[tokio::test]
    async fn test_stdout_and_stderr_are_merged() {
        let mut session = Session::spawn(sh("echo out; echo err 1>&2")).await.unwrap();
        let output = all_output(&mut session).await;
        assert!(output.contains("out\n"));
        assert!(output.contains("err\n"));
        assert_ok!(session.wait_exit(TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_runs_in_workdir() {
        let mut session = Session::spawn(sh("pwd -P")).await.unwrap();
        let expected = session.workdir().canonicalize().unwrap();
        let output = all_output(&mut session).await;
        assert_eq!(output.trim_end(), expected.display().to_string());
    }

    #[tokio::test]
    async fn test_input_round_trip() {
        let mut session = Session::spawn(sh("cat")).await.unwrap();
        session.write_input("exit\n").await.unwrap();
        session.close_input();
        assert_eq!(all_output(&mut session).await, "exit\n");
        assert_ok!(session.wait_exit(TIMEOUT).await);

        let err = session.write_input("late\n").await.unwrap_err();
        assert!(matches!(err, SessionError::Io(_)));
    }

    #[tokio::test]
    async fn test_unexpected_exit_code() {
        let mut session = Session::spawn(sh("exit 3")).await.unwrap();
        let err = session.wait_exit(TIMEOUT).await.unwrap_err();
        assert!(matches!(err, SessionError::UnexpectedExitCode(Some(3))));
    }

    #[tokio::test]
    async fn test_exit_timeout_kills_process() {
        let mut session = Session::spawn(sh("sleep 30")).await.unwrap();
        let err = session
            .wait_exit(Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::ExitTimeout(_)));
        assert!(matches!(session.state(), SessionState::Exited(_)));
    }

    #[tokio::test]
    async fn test_interrupt() {
        let mut session = Session::spawn(sh("trap 'exit 0' INT; while :; do sleep 0.05; done"))
            .await
            .unwrap();
        // Give the shell a moment to install its trap.
        tokio::time::sleep(Duration::from_millis(200)).await;
        session.interrupt().unwrap();
        assert_eq!(session.state(), SessionState::InterruptSent);
        assert_ok!(session.wait_exit(TIMEOUT).await);

        // Idempotent once exited.
        assert_ok!(session.interrupt());
        assert_eq!(session.state(), SessionState::Exited(Some(0)));
    }

    #[tokio::test]
    async fn test_interrupt_without_handler_is_reported() {
        let mut session = Session::spawn(sh("sleep 30")).await.unwrap();
        session.interrupt().unwrap();
        assert_err!(session.wait_exit(TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_spawn_missing_executable() {
        let request = SpawnRequest {
            program: "net-harness-no-such-binary".to_string(),
            args: Vec::new(),
            workdir: WorkDir::Temp(TempDir::new().unwrap()),
            account: None,
        };
        let err = Session::spawn(request).await.unwrap_err();
        assert!(matches!(err, SessionError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_drop_removes_temp_workdir() {
        let session = Session::spawn(sh("sleep 30")).await.unwrap();
        let dir = session.workdir().to_path_buf();
        assert!(dir.is_dir());
        drop(session);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_drop_reaps_before_removing_workdir() {
        let session = Session::spawn(sh("while :; do echo x >> busy.log; done"))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let dir = session.workdir().to_path_buf();
        let pid = session.pid().unwrap().to_string();
        assert!(dir.join("busy.log").is_file());

        drop(session);
        // A killed but unreaped child would still answer signal 0 as a zombie.
        let alive = std::process::Command::new("kill")
            .args(["-0", &pid])
            .stderr(Stdio::null())
            .status()
            .unwrap();
        assert!(!alive.success());
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_account_is_exposed() {
        let mut request = sh("true");
        request.account = Some("0x8605cdbbdb6d264aa742e77020dcbc58fcdce182".to_string());
        let mut session = Session::spawn(request).await.unwrap();
        assert_eq!(
            session.context().account(),
            Some("0x8605cdbbdb6d264aa742e77020dcbc58fcdce182")
        );
        assert_ok!(session.wait_exit(TIMEOUT).await);
    }

    #[tokio::test]
    async fn test_parallel_sessions_get_distinct_workdirs() {
        let a = Session::spawn(sh("true")).await.unwrap();
        let b = Session::spawn(sh("true")).await.unwrap();
        assert_ne!(a.workdir(), b.workdir());
    }
}
