use crate::artifact::SourceSpec;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Status of a managed server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// No process, not expected to run
    Stopped,
    /// Process spawned, inside the confirmation window
    Starting,
    /// Process confirmed alive
    Running,
    /// Termination in progress
    Stopping,
    /// Process exited unexpectedly
    Crashed,
    /// An operation could not complete and left the server non-operable
    Error,
}

impl ServerStatus {
    /// Whether a descriptor in this status holds a port claim.
    pub fn is_live(self) -> bool {
        matches!(self, ServerStatus::Starting | ServerStatus::Running)
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerStatus::Stopped => "stopped",
            ServerStatus::Starting => "starting",
            ServerStatus::Running => "running",
            ServerStatus::Stopping => "stopping",
            ServerStatus::Crashed => "crashed",
            ServerStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Persisted record of one managed server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Unique alphanumeric name, also the directory name
    pub name: String,
    /// Where the server files came from
    pub source: SourceSpec,
    /// Heap size in MB
    pub memory_mb: u32,
    /// Assigned port
    pub port: u16,
    /// Lifecycle status
    pub status: ServerStatus,
    /// OS process id while a backing process is believed to exist
    pub pid: Option<u32>,
    /// When the current or last process was spawned
    pub last_started_at: Option<DateTime<Utc>>,
    /// Successful explicit restarts
    pub restart_count: u32,
    /// Observed unexpected terminations
    pub crash_count: u32,
}

impl ServerDescriptor {
    /// A freshly created, stopped server.
    pub fn new(name: impl Into<String>, source: SourceSpec, memory_mb: u32, port: u16) -> Self {
        Self {
            name: name.into(),
            source,
            memory_mb,
            port,
            status: ServerStatus::Stopped,
            pid: None,
            last_started_at: None,
            restart_count: 0,
            crash_count: 0,
        }
    }

    /// Time since the last start, only while running.
    pub fn uptime(&self, now: DateTime<Utc>) -> Option<Duration> {
        if self.status != ServerStatus::Running {
            return None;
        }
        self.last_started_at
            .and_then(|started| (now - started).to_std().ok())
    }
}

/// Read-only projection of a descriptor for listings and status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerSummary {
    /// Server name
    pub name: String,
    /// Current lifecycle status
    pub status: ServerStatus,
    /// Version tag or pack URL the server was created from
    pub source: String,
    /// Port the server listens on
    pub port: u16,
    /// Heap size in MB
    pub memory_mb: u32,
    /// Time since the last start, only while RUNNING
    pub uptime: Option<Duration>,
    /// OS process ID while a process is live
    pub pid: Option<u32>,
    /// Unexpected exits so far
    pub crash_count: u32,
    /// Completed restarts so far
    pub restart_count: u32,
}

impl ServerSummary {
    /// Summarize `descriptor`, measuring uptime up to `now`.
    pub fn from_descriptor(descriptor: &ServerDescriptor, now: DateTime<Utc>) -> Self {
        Self {
            name: descriptor.name.clone(),
            status: descriptor.status,
            source: descriptor.source.label().to_string(),
            port: descriptor.port,
            memory_mb: descriptor.memory_mb,
            uptime: descriptor.uptime(now),
            pid: descriptor.pid,
            crash_count: descriptor.crash_count,
            restart_count: descriptor.restart_count,
        }
    }
}

/// Check that `name` can be used as a server name and directory.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::InvalidArgument(format!(
            "Server name '{}' must be alphanumeric",
            name
        )));
    }
    Ok(())
}
