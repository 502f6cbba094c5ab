//! Launching and supervising the external generation process.

use crate::config::GeneratorConfig;

use std::future::Future;
use std::io;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ProcessExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Lifecycle of a launched generation process.
pub trait ProcessHandle: Send + 'static {
    /// Non-blocking status check, `Ok(None)` while still running.
    fn try_exit(&mut self) -> io::Result<Option<ProcessExit>>;

    /// Resolves when the process exits. Must be cancel safe.
    fn wait(&mut self) -> impl Future<Output = io::Result<ProcessExit>> + Send;

    /// Forcibly terminates the process and reaps it.
    fn kill(&mut self) -> impl Future<Output = io::Result<ProcessExit>> + Send;
}

pub trait Launcher: Send + 'static {
    type Handle: ProcessHandle;

    fn launch(self) -> io::Result<Self::Handle>;
}

impl<F, H> Launcher for F
where
    F: FnOnce() -> io::Result<H> + Send + 'static,
    H: ProcessHandle,
{
    type Handle = H;

    fn launch(self) -> io::Result<H> {
        self()
    }
}

/// Spawns the configured generator command.
#[derive(Clone, Debug)]
pub struct CommandLauncher {
    config: GeneratorConfig,
    label: String,
}

impl CommandLauncher {
    pub fn new(config: GeneratorConfig) -> Self {
        Self {
            label: config.program.clone(),
            config,
        }
    }

    /// Prefix used for the forwarded output lines.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl Launcher for CommandLauncher {
    type Handle = ChildProcess;

    fn launch(self) -> io::Result<ChildProcess> {
        let mut cmd = Command::new(&self.config.program);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn()?;
        log::info!(
            "[{}] launched `{} {}` (pid {:?})",
            self.label,
            self.config.program,
            self.config.args.join(" "),
            child.id()
        );

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_output(stdout, self.label.clone(), false));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_output(stderr, self.label, true));
        }

        Ok(ChildProcess { child })
    }
}

async fn forward_output<R: AsyncRead + Unpin>(stream: R, label: String, is_stderr: bool) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if is_stderr => log::warn!("[{label}][STDERR] {line}"),
            Ok(Some(line)) => log::debug!("[{label}][STDOUT] {line}"),
            Ok(None) => break,
            Err(e) => {
                log::debug!("[{label}] output stream closed - {e}");
                break;
            }
        }
    }
}

pub struct ChildProcess {
    child: Child,
}

impl ChildProcess {
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }
}

impl ProcessHandle for ChildProcess {
    fn try_exit(&mut self) -> io::Result<Option<ProcessExit>> {
        Ok(self.child.try_wait()?.map(ProcessExit::from))
    }

    fn wait(&mut self) -> impl Future<Output = io::Result<ProcessExit>> + Send {
        async move { self.child.wait().await.map(ProcessExit::from) }
    }

    fn kill(&mut self) -> impl Future<Output = io::Result<ProcessExit>> + Send {
        async move {
            if let Some(exit) = self.try_exit()? {
                return Ok(exit);
            }
            self.child.start_kill()?;
            self.child.wait().await.map(ProcessExit::from)
        }
    }
}
