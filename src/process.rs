//! Process seam between the orchestrator and the `sendtx` executable.
//!
//! [`Launcher`] starts invocations and hands back [`WorkerProcess`] handles.
//! [`ProcessLauncher`] does so with real OS processes; tests swap in a
//! simulated launcher.

use async_trait::async_trait;
use std::io;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::debug;

use crate::command::Invocation;

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitOutcome {
    /// Exit code, `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ExitOutcome {
    pub fn from_code(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn signalled() -> Self {
        Self { code: None }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<ExitStatus> for ExitOutcome {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// A started process: its identity plus a way to await or end it.
#[async_trait]
pub trait WorkerProcess: Send {
    /// OS process id, if the process is still known to the OS.
    fn id(&self) -> Option<u32>;

    /// Wait until the process exits.
    async fn wait(&mut self) -> io::Result<ExitOutcome>;

    /// Terminate the process and reap it.
    async fn kill(&mut self) -> io::Result<()>;
}

pub trait Launcher: Send + Sync {
    /// Start `invocation` without waiting for it to finish.
    fn spawn(&self, invocation: &Invocation) -> io::Result<Box<dyn WorkerProcess>>;
}

/// Launches invocations as child processes of the orchestrator.
///
/// Children inherit stdout/stderr so their progress output stays visible.
/// They are killed if their handle is dropped, so an orchestrator that
/// unwinds never leaves workers behind.
#[derive(Debug, Default, Clone)]
pub struct ProcessLauncher;

impl ProcessLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl Launcher for ProcessLauncher {
    fn spawn(&self, invocation: &Invocation) -> io::Result<Box<dyn WorkerProcess>> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = invocation.working_dir() {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn()?;
        debug!(pid = ?child.id(), mode = ?invocation.mode, "Spawned child process");
        Ok(Box::new(ChildProcess { child }))
    }
}

/// [`WorkerProcess`] backed by a tokio child.
pub struct ChildProcess {
    child: Child,
}

#[async_trait]
impl WorkerProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    async fn wait(&mut self) -> io::Result<ExitOutcome> {
        self.child.wait().await.map(ExitOutcome::from)
    }

    async fn kill(&mut self) -> io::Result<()> {
        self.child.kill().await
    }
}
