/// Server management module for MC Runner.
///
/// This module holds the per-server building blocks the fleet manager
/// orchestrates: the persisted descriptor, the process supervisor handle,
/// the exit monitor and the lifecycle state machine.
///
/// # Components
///
/// * `descriptor` - Persisted server records and read-only summaries
/// * `lifecycle` - Status transition table, event history and crash notification
/// * `monitor` - Polling exit detection for a running process
/// * `process` - Spawning, console input and termination of a server process
///
/// # Examples
///
/// Supervising a process directly:
///
/// ```no_run
/// use mc_runner::server::{LaunchSpec, ProcessHandle};
/// use std::collections::HashMap;
/// use std::time::Duration;
///
/// # async fn run() -> mc_runner::Result<()> {
/// let launch = LaunchSpec {
///     program: "java".to_string(),
///     args: vec!["-jar".to_string(), "server.jar".to_string(), "nogui".to_string()],
///     env: HashMap::new(),
/// };
/// let handle = ProcessHandle::spawn("alpha", "/srv/mc/alpha".as_ref(), &launch)?;
/// handle.write_console("say hello").await?;
/// handle.terminate(Duration::from_secs(30)).await?;
/// # Ok(())
/// # }
/// ```
///
/// Watching for an exit:
///
/// ```no_run
/// use mc_runner::server::{ProcessHandle, ServerMonitor, ServerMonitorConfig};
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
///
/// # async fn run(handle: ProcessHandle) {
/// let (tx, mut rx) = mpsc::unbounded_channel();
/// let _monitor = ServerMonitor::spawn(Arc::new(handle), &ServerMonitorConfig::default(), tx);
/// if let Some(report) = rx.recv().await {
///     println!("{} exited with {:?}", report.name, report.exit_code);
/// }
/// # }
/// ```
pub mod descriptor;
pub mod lifecycle;
pub mod monitor;
mod process;

pub use descriptor::{ServerDescriptor, ServerStatus, ServerSummary};
pub use lifecycle::{
    CrashNotifier, CrashReport, EventLog, LogNotifier, ServerEvent, ServerLifecycleEvent,
};
pub use monitor::{ExitReport, ServerMonitor, ServerMonitorConfig};
pub use process::{HandleId, LaunchSpec, ProcessHandle, Termination};
