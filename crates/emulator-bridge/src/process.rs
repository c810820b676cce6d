//! Process Execution
//!
//! Runs SDK tools and spawns emulator processes. The rest of the crate only
//! sees the `CommandRunner` and `ProcessHandle` traits; `TokioCommandRunner`
//! is the implementation backed by `tokio::process`.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, trace};

/// Process errors
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Empty command line")]
    EmptyCommand,
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Captured result of a finished command.
///
/// A non-zero exit is data, not an error: each caller decides whether it
/// means "no output" or "operation failed".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: Vec::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failed(code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            status: Some(code),
            stdout: Vec::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Trimmed stderr, or stdout when stderr is empty
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr_text();
        if stderr.trim().is_empty() {
            self.stdout_text().trim().to_string()
        } else {
            stderr.trim().to_string()
        }
    }
}

/// Render an argument vector as a copy-pasteable shell line
pub fn render_command(argv: &[String]) -> String {
    shlex::try_join(argv.iter().map(String::as_str)).unwrap_or_else(|_| argv.join(" "))
}

/// A live child process
#[async_trait]
pub trait ProcessHandle: Send {
    /// OS process id, `None` once reaped
    fn id(&self) -> Option<u32>;

    /// Non-blocking exit check
    fn has_exited(&mut self) -> Result<bool, ProcessError>;

    /// Wait for exit and return the exit code
    async fn wait(&mut self) -> Result<Option<i32>, ProcessError>;

    /// Forcibly terminate and wait for exit
    async fn kill(&mut self) -> Result<(), ProcessError>;
}

/// Runs external commands
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, capturing stdout and stderr.
    ///
    /// Must return once `timeout` elapses; the child is killed and
    /// `ProcessError::Timeout` is returned.
    async fn run(
        &self,
        argv: &[String],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ProcessError>;

    /// Spawn without waiting
    fn spawn(&self, argv: &[String]) -> Result<Box<dyn ProcessHandle>, ProcessError>;
}

/// `CommandRunner` backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self
    }

    fn command(argv: &[String]) -> Result<Command, ProcessError> {
        let (program, args) = argv.split_first().ok_or(ProcessError::EmptyCommand)?;

        let mut cmd = if needs_cmd_wrapper(Path::new(program)) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/c").arg(program);
            cmd
        } else {
            Command::new(program)
        };
        cmd.args(args);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

/// On Windows, files without a binary suffix (`avdmanager.bat`) go through `cmd /c`
fn needs_cmd_wrapper(program: &Path) -> bool {
    if !cfg!(windows) || !program.is_file() {
        return false;
    }
    let ext = program
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    !matches!(ext.as_deref(), Some("exe") | Some("com"))
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        argv: &[String],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ProcessError> {
        let rendered = render_command(argv);
        debug!("$ {}", rendered);

        let mut cmd = Self::command(argv)?;
        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| ProcessError::Timeout {
                    command: rendered.clone(),
                    timeout: limit,
                })?,
            None => cmd.output().await,
        }
        .map_err(|source| ProcessError::Spawn {
            command: rendered.clone(),
            source,
        })?;

        if !output.status.success() {
            debug!("`{}` exited with {:?}", rendered, output.status.code());
        }

        Ok(CommandOutput {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn spawn(&self, argv: &[String]) -> Result<Box<dyn ProcessHandle>, ProcessError> {
        let rendered = render_command(argv);
        debug!("$ {} &", rendered);

        // The emulator outlives a dropped handle; only `kill` stops it
        let mut child = Self::command(argv)?
            .kill_on_drop(false)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        // Drain the pipes so a chatty emulator never blocks on a full buffer
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, "stderr");
        }

        Ok(Box::new(TokioProcess { child }))
    }
}

fn forward_lines<R>(stream: R, name: &'static str)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            trace!(target: "avdkit::emulator", "[{}] {}", name, line);
        }
    });
}

/// Child process spawned by `TokioCommandRunner`
struct TokioProcess {
    child: Child,
}

#[async_trait]
impl ProcessHandle for TokioProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn has_exited(&mut self) -> Result<bool, ProcessError> {
        Ok(self.child.try_wait()?.is_some())
    }

    async fn wait(&mut self) -> Result<Option<i32>, ProcessError> {
        let status = self.child.wait().await?;
        Ok(status.code())
    }

    async fn kill(&mut self) -> Result<(), ProcessError> {
        self.child.kill().await?;
        Ok(())
    }
}
