use crate::error::{Error, Result};
use crate::server::descriptor::{ServerDescriptor, ServerStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

const EVENT_HISTORY_LIMIT: usize = 1000;

/// Whether a descriptor may move from `from` to `to`.
///
/// ```text
/// STOPPED -> STARTING -> RUNNING -> STOPPING -> STOPPED
///            STARTING -> CRASHED <- RUNNING
/// CRASHED -> STARTING, ERROR -> STARTING, any -> ERROR
/// STARTING/RUNNING -> STOPPED (boot reconciliation reset)
/// ```
pub fn is_valid_transition(from: ServerStatus, to: ServerStatus) -> bool {
    use ServerStatus::*;

    match (from, to) {
        (_, Error) => true,
        (Stopped | Crashed | Error, Starting) => true,
        (Starting, Running | Crashed | Stopped) => true,
        (Running, Stopping | Crashed | Stopped) => true,
        (Stopping, Stopped) => true,
        _ => false,
    }
}

/// Move `server` to `to`, clearing the process id when it leaves a live state.
pub fn transition(server: &mut ServerDescriptor, to: ServerStatus) -> Result<()> {
    if !is_valid_transition(server.status, to) {
        return Err(Error::Other(format!(
            "Server '{}' cannot move from {} to {}",
            server.name, server.status, to
        )));
    }

    tracing::debug!(server = %server.name, from = %server.status, to = %to, "Status transition");
    server.status = to;
    if !to.is_live() {
        server.pid = None;
    }
    Ok(())
}

/// Server lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerLifecycleEvent {
    /// Server created
    Created,
    /// Server started
    Started,
    /// Server stopped
    Stopped,
    /// Server crashed
    Crashed,
    /// Server restarted
    Restarted,
    /// Server deleted
    Deleted,
    /// An operation failed
    Failed,
}

/// Server lifecycle event
#[derive(Debug, Clone)]
pub struct ServerEvent {
    /// Server name
    pub name: String,
    /// Event type
    pub event: ServerLifecycleEvent,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Event details
    pub details: Option<String>,
}

/// Bounded history of lifecycle events across the fleet
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<VecDeque<ServerEvent>>,
}

impl EventLog {
    /// Create an empty event log
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a server event
    pub fn record(&self, name: &str, event: ServerLifecycleEvent, details: Option<String>) {
        let server_event = ServerEvent {
            name: name.to_string(),
            event,
            timestamp: Utc::now(),
            details,
        };

        match self.events.lock() {
            Ok(mut events) => {
                if events.len() == EVENT_HISTORY_LIMIT {
                    events.pop_front();
                }
                events.push_back(server_event);
            }
            Err(_) => tracing::warn!("Failed to lock event log, dropping event"),
        }
    }

    /// Recent events for a server, newest first
    pub fn server_events(&self, name: &str, limit: Option<usize>) -> Result<Vec<ServerEvent>> {
        let events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock event log".to_string()))?;

        Ok(events
            .iter()
            .rev()
            .filter(|e| e.name == name)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    /// All events, newest first
    pub fn all_events(&self, limit: Option<usize>) -> Result<Vec<ServerEvent>> {
        let events = self
            .events
            .lock()
            .map_err(|_| Error::Other("Failed to lock event log".to_string()))?;

        Ok(events
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

/// An unexpected process exit observed by a monitor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashReport {
    /// Server name
    pub name: String,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Crash count after this crash
    pub crash_count: u32,
    /// When the crash was handled
    pub at: DateTime<Utc>,
}

impl CrashReport {
    /// Operator-facing notification text
    pub fn message(&self) -> String {
        format!(
            "Server '{}' crashed! Crash count: {}",
            self.name, self.crash_count
        )
    }
}

/// Receives crash reports from the fleet manager
#[async_trait]
pub trait CrashNotifier: Send + Sync {
    /// Called once per handled crash
    async fn server_crashed(&self, report: &CrashReport);
}

/// Notifier that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl CrashNotifier for LogNotifier {
    async fn server_crashed(&self, report: &CrashReport) {
        tracing::warn!(server = %report.name, exit_code = ?report.exit_code, crash_count = report.crash_count, "{}", report.message());
    }
}
