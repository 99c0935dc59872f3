// src/server/process.rs
use crate::error::{Error, Result};
use async_process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use futures_lite::StreamExt;
use futures_lite::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

const OUTPUT_TAIL_LINES: usize = 200;
const POLL_STEP: Duration = Duration::from_millis(100);
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
const CONSOLE_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Unique identifier for one process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(Uuid);

impl HandleId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What to execute for a server
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Program to execute, looked up in PATH if not absolute
    pub program: String,
    /// Command-line arguments
    pub args: Vec<String>,
    /// Extra environment variables, combined with the inherited environment
    pub env: HashMap<String, String>,
}

/// How a termination request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The process was already gone
    AlreadyExited,
    /// The process exited within the grace period
    Graceful,
    /// The process had to be killed
    Forced,
}

#[derive(Debug, Default)]
struct OutputTail {
    console: VecDeque<String>,
    errors: VecDeque<String>,
}

impl OutputTail {
    fn push(&mut self, line: String, is_stderr: bool) {
        if is_stderr {
            push_bounded(&mut self.errors, line.clone());
        }
        push_bounded(&mut self.console, line);
    }
}

fn push_bounded(buf: &mut VecDeque<String>, line: String) {
    if buf.len() == OUTPUT_TAIL_LINES {
        buf.pop_front();
    }
    buf.push_back(line);
}

struct ChildState {
    child: Child,
    exit: Option<ExitStatus>,
}

/// Handle to a spawned server process.
///
/// The handle is the only owner of the OS process. Output is drained by
/// background tasks into a bounded tail, and the process is killed if the
/// handle is dropped while it is still running.
pub struct ProcessHandle {
    id: HandleId,
    name: String,
    pid: u32,
    state: AsyncMutex<ChildState>,
    stdin: AsyncMutex<Option<ChildStdin>>,
    output: Arc<Mutex<OutputTail>>,
    stderr_reader: AsyncMutex<Option<JoinHandle<()>>>,
}

impl ProcessHandle {
    /// Spawn `launch` with `server_dir` as working directory.
    ///
    /// Must be called from within a tokio runtime; the output readers are
    /// spawned onto it.
    pub fn spawn(name: &str, server_dir: &Path, launch: &LaunchSpec) -> Result<Self> {
        let mut command = Command::new(&launch.program);
        command
            .args(&launch.args)
            .envs(&launch.env)
            .current_dir(server_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            Error::ProcessSpawnFailed(format!("Failed to launch '{}': {}", launch.program, e))
        })?;

        let pid = child.id();
        let output = Arc::new(Mutex::new(OutputTail::default()));
        let stdin = child.stdin.take();

        if let Some(stdout) = child.stdout.take() {
            // Detached; ends at EOF.
            spawn_reader(name.to_string(), stdout, Arc::clone(&output), false);
        }
        let stderr_reader = child
            .stderr
            .take()
            .map(|stderr| spawn_reader(name.to_string(), stderr, Arc::clone(&output), true));

        tracing::debug!(server = %name, pid, program = %launch.program, "Spawned server process");

        Ok(Self {
            id: HandleId::new(),
            name: name.to_string(),
            pid,
            state: AsyncMutex::new(ChildState { child, exit: None }),
            stdin: AsyncMutex::new(stdin),
            output,
            stderr_reader: AsyncMutex::new(stderr_reader),
        })
    }

    /// Get the handle ID
    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Get the server name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the OS process ID
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit status if the process has exited, without blocking.
    pub async fn try_exit_status(&self) -> Result<Option<ExitStatus>> {
        let mut state = self.state.lock().await;
        if state.exit.is_some() {
            return Ok(state.exit);
        }

        let status = state
            .child
            .try_status()
            .map_err(|e| Error::Process(format!("Failed to query process {}: {}", self.pid, e)))?;
        state.exit = status;
        Ok(status)
    }

    /// Liveness query
    pub async fn is_alive(&self) -> bool {
        matches!(self.try_exit_status().await, Ok(None))
    }

    /// Request graceful shutdown, wait up to `grace`, then kill.
    pub async fn terminate(&self, grace: Duration) -> Result<Termination> {
        if self.try_exit_status().await?.is_some() {
            return Ok(Termination::AlreadyExited);
        }

        if self.request_shutdown() {
            if self.wait_for_exit(grace).await? {
                return Ok(Termination::Graceful);
            }
            tracing::warn!(server = %self.name, pid = self.pid, "Grace period elapsed, killing process");
        }

        self.kill().await?;
        Ok(Termination::Forced)
    }

    /// Wait up to `timeout` for the process to exit on its own.
    ///
    /// Returns whether it exited.
    pub async fn wait_for_exit(&self, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_exit_status().await?.is_some() {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_STEP.min(deadline - now)).await;
        }
    }

    /// Forcefully kill the process and reap it.
    pub async fn kill(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.exit.is_some() {
            return Ok(());
        }

        if let Err(e) = state.child.kill() {
            // Lost a race with a natural exit.
            if let Ok(Some(status)) = state.child.try_status() {
                state.exit = Some(status);
                return Ok(());
            }
            return Err(Error::Process(format!("Failed to kill process {}: {}", self.pid, e)));
        }

        let status = state
            .child
            .status()
            .await
            .map_err(|e| Error::Process(format!("Failed to reap process {}: {}", self.pid, e)))?;
        state.exit = Some(status);
        Ok(())
    }

    #[cfg(unix)]
    fn request_shutdown(&self) -> bool {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        match kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(server = %self.name, pid = self.pid, error = %e, "Failed to send SIGTERM");
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn request_shutdown(&self) -> bool {
        false
    }

    /// Append `line` plus a newline to the process's standard input.
    ///
    /// Gives up once the write, including the wait for other writers, takes
    /// longer than two seconds; a process that stops reading its console
    /// would otherwise block every later writer.
    pub async fn write_console(&self, line: &str) -> Result<()> {
        if self.try_exit_status().await?.is_some() {
            return Err(Error::ProcessNotRunning);
        }

        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');

        let written = tokio::time::timeout(CONSOLE_WRITE_TIMEOUT, async {
            let mut stdin = self.stdin.lock().await;
            let Some(pipe) = stdin.as_mut() else {
                return Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
            };
            pipe.write_all(&data).await?;
            pipe.flush().await
        })
        .await
        .map_err(|_| {
            tracing::warn!(server = %self.name, pid = self.pid, "Console write timed out");
            Error::Process(format!(
                "Timed out writing to stdin of process {}",
                self.pid
            ))
        })?;

        written.map_err(|e| match e.kind() {
            std::io::ErrorKind::BrokenPipe => Error::ProcessNotRunning,
            _ => Error::Process(format!("Failed to write to stdin: {}", e)),
        })
    }

    /// Most recent `limit` lines of combined stdout/stderr.
    pub fn console_tail(&self, limit: usize) -> Vec<String> {
        match self.output.lock() {
            Ok(tail) => {
                let skip = tail.console.len().saturating_sub(limit);
                tail.console.iter().skip(skip).cloned().collect()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Captured stderr, waiting briefly for the reader to reach EOF.
    pub async fn error_output(&self) -> String {
        if let Some(reader) = self.stderr_reader.lock().await.take() {
            let _ = tokio::time::timeout(READER_DRAIN_TIMEOUT, reader).await;
        }

        match self.output.lock() {
            Ok(tail) => tail.errors.iter().cloned().collect::<Vec<_>>().join("\n"),
            Err(_) => String::new(),
        }
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pid", &self.pid)
            .finish()
    }
}

fn spawn_reader<R>(
    name: String,
    stream: R,
    output: Arc<Mutex<OutputTail>>,
    is_stderr: bool,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Some(line) = lines.next().await {
            let Ok(line) = line else { break };
            tracing::debug!(server = %name, stderr = is_stderr, "{}", line);
            if let Ok(mut tail) = output.lock() {
                tail.push(line, is_stderr);
            }
        }
    })
}
