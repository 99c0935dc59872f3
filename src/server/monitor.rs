use crate::server::process::{HandleId, ProcessHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

/// Server monitor configuration
#[derive(Debug, Clone)]
pub struct ServerMonitorConfig {
    /// Check interval
    pub check_interval: Duration,
}

impl Default for ServerMonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(5),
        }
    }
}

/// Terminal event of a monitored process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitReport {
    /// Server name
    pub name: String,
    /// Process lifetime the report belongs to
    pub handle_id: HandleId,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
}

/// Polls one process until it exits and reports the exit exactly once.
///
/// Dropping or cancelling the monitor aborts the polling task; no report is
/// sent afterwards.
#[derive(Debug)]
pub struct ServerMonitor {
    handle_id: HandleId,
    task: JoinHandle<()>,
}

impl ServerMonitor {
    /// Start monitoring `handle`, sending its exit to `reports`.
    pub fn spawn(
        handle: Arc<ProcessHandle>,
        config: &ServerMonitorConfig,
        reports: mpsc::UnboundedSender<ExitReport>,
    ) -> Self {
        let handle_id = handle.id();
        let check_interval = config.check_interval;

        let task = tokio::spawn(async move {
            let mut interval = time::interval(check_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;

                let exit_code = match handle.try_exit_status().await {
                    Ok(None) => continue,
                    Ok(Some(status)) => status.code(),
                    Err(e) => {
                        tracing::warn!(server = %handle.name(), error = %e, "Liveness query failed, treating process as gone");
                        None
                    }
                };

                tracing::debug!(server = %handle.name(), pid = handle.pid(), ?exit_code, "Monitored process exited");
                let report = ExitReport {
                    name: handle.name().to_string(),
                    handle_id: handle.id(),
                    exit_code,
                };
                if reports.send(report).is_err() {
                    tracing::debug!(server = %handle.name(), "Exit report receiver closed");
                }
                break;
            }
        });

        Self { handle_id, task }
    }

    /// The process lifetime being watched
    pub fn handle_id(&self) -> HandleId {
        self.handle_id
    }

    /// Stop the monitor
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Whether the monitor has finished (reported or cancelled)
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ServerMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}
