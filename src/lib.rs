/*!
 # MC Runner

 A Rust library for running a fleet of Minecraft server processes on a single host.

 ## Overview

 MC Runner provides functionality to:
 - Create servers from a version tag or a mod-pack reference
 - Start, stop, restart and delete server processes
 - Detect crashes and forward them to a notifier
 - Send console commands and read recent console output
 - Persist the fleet across restarts of the manager itself

 ## Basic Usage

 ```no_run
 use mc_runner::artifact::HttpArtifactProvider;
 use mc_runner::server::LogNotifier;
 use mc_runner::{Config, FleetManager, Result};
 use std::sync::Arc;

 #[tokio::main]
 async fn main() -> Result<()> {
     let config = Config::from_file("config.yaml")?;
     let provider = Arc::new(HttpArtifactProvider::new(config.artifacts.clone()));
     let manager = FleetManager::open(config, provider, Arc::new(LogNotifier)).await?;

     // Resume servers that were running before the last shutdown
     manager.reconcile_on_boot().await;

     manager.create("survival", "1.20.4".parse()?, Some(4096)).await?;
     manager.start("survival").await?;
     manager.send_console_command("survival", "say hello").await?;

     for server in manager.list()? {
         println!("{} {} port {}", server.name, server.status, server.port);
     }

     manager.shutdown().await;
     Ok(())
 }
 ```

 ## Features

 - **Port Allocation**: Lowest-first ports from a configured range, unique among live servers
 - **Crash Detection**: Polling monitors with exactly-once crash handling
 - **Durable State**: The fleet is rewritten atomically after every mutation
 - **Configuration**: Configure the manager through YAML config files
 - **Async Support**: Full async/await support
*/

pub mod artifact;
pub mod config;
pub mod error;
pub mod ports;
pub mod properties;
pub mod server;
pub mod state;

pub use artifact::{ArtifactProvider, SourceSpec};
pub use config::Config;
pub use error::{Error, Result};
pub use server::{ServerDescriptor, ServerStatus, ServerSummary};

use artifact::AcquireError;
use chrono::Utc;
use ports::PortAllocator;
use properties::{PROPERTIES_FILE, SERVER_PORT_KEY};
use server::descriptor::validate_name;
use server::lifecycle::transition;
use server::{
    CrashNotifier, CrashReport, EventLog, ExitReport, LaunchSpec, ProcessHandle, ServerEvent,
    ServerLifecycleEvent, ServerMonitor, ServerMonitorConfig, Termination,
};
use state::{FleetState, StateStore};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::{Mutex, OwnedMutexGuard, mpsc};

const EULA_FILE: &str = "eula.txt";

/// Mutable fleet state, guarded by the fleet lock.
struct Fleet {
    servers: FleetState,
    ports: PortAllocator,
    processes: HashMap<String, Arc<ProcessHandle>>,
    monitors: HashMap<String, ServerMonitor>,
}

impl Fleet {
    fn count(&self, pred: impl Fn(ServerStatus) -> bool) -> usize {
        self.servers.values().filter(|s| pred(s.status)).count()
    }

    /// Release `port` only if `name` is the one holding it.
    fn release_port(&mut self, name: &str, port: u16) {
        if self.ports.owner(port) == Some(name) {
            self.ports.release(port);
        }
    }

    /// Drop the process handle and monitor for `name`.
    fn detach(&mut self, name: &str) -> Option<Arc<ProcessHandle>> {
        if let Some(monitor) = self.monitors.remove(name) {
            monitor.cancel();
        }
        self.processes.remove(name)
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut ServerDescriptor> {
        descriptor_mut(&mut self.servers, name)
    }
}

fn descriptor_mut<'a>(servers: &'a mut FleetState, name: &str) -> Result<&'a mut ServerDescriptor> {
    servers
        .get_mut(name)
        .ok_or_else(|| Error::NotFound(name.to_string()))
}

struct Inner {
    config: Config,
    store: StateStore,
    provider: Arc<dyn ArtifactProvider>,
    notifier: Arc<dyn CrashNotifier>,
    fleet: Mutex<Fleet>,
    name_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    snapshot: RwLock<Arc<FleetState>>,
    events: EventLog,
    monitor_config: ServerMonitorConfig,
    exits: mpsc::UnboundedSender<ExitReport>,
}

/// Lifecycle manager for a fleet of servers.
///
/// Operations on the same server name are serialized; the fleet lock guarding
/// descriptors, ports and persistence is only held for the short bookkeeping
/// steps, so operations on different servers make progress independently.
/// Read-only queries are answered from a snapshot swapped in after every
/// committed mutation.
///
/// Cloning is cheap; all clones share the same fleet.
/// All public methods are instrumented with `tracing` spans.
#[derive(Clone)]
pub struct FleetManager {
    inner: Arc<Inner>,
}

impl FleetManager {
    /// Load the persisted fleet and start the crash dispatcher.
    ///
    /// Servers persisted as STARTING or RUNNING get their ports claimed but are
    /// not started; see [`reconcile_on_boot`](Self::reconcile_on_boot).
    /// Must be called from within a tokio runtime.
    #[tracing::instrument(skip_all, fields(directory = %config.servers.directory.display()))]
    pub async fn open(
        config: Config,
        provider: Arc<dyn ArtifactProvider>,
        notifier: Arc<dyn CrashNotifier>,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&config.servers.directory).await?;

        let store = StateStore::new(config.state_file());
        let mut servers = store.load()?;
        let mut ports = PortAllocator::new(config.servers.port_range);
        let mut normalized = false;

        for server in servers.values_mut() {
            match server.status {
                ServerStatus::Starting | ServerStatus::Running => {
                    if !ports.claim(server.port, &server.name) {
                        tracing::warn!(server = %server.name, port = server.port, "Persisted port is unavailable, it will be reassigned on start");
                    }
                }
                ServerStatus::Stopping => {
                    // The manager went away mid-stop; the process is gone.
                    server.status = ServerStatus::Stopped;
                    server.pid = None;
                    normalized = true;
                }
                _ => {}
            }
        }

        if normalized {
            store.save(&servers)?;
        }

        tracing::info!(servers = servers.len(), ports_claimed = ports.claimed(), "Fleet loaded");

        let (exits, reports) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            monitor_config: ServerMonitorConfig {
                check_interval: config.monitoring.check_interval(),
            },
            snapshot: RwLock::new(Arc::new(servers.clone())),
            fleet: Mutex::new(Fleet {
                servers,
                ports,
                processes: HashMap::new(),
                monitors: HashMap::new(),
            }),
            name_locks: Mutex::new(HashMap::new()),
            events: EventLog::new(),
            config,
            store,
            provider,
            notifier,
            exits,
        });

        tokio::spawn(dispatch_exits(Arc::downgrade(&inner), reports));

        Ok(Self { inner })
    }

    /// The configuration the manager was opened with
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Create a new STOPPED server and populate its directory.
    ///
    /// A port is reserved while the artifact is acquired. If acquisition
    /// fails the reservation is dropped and no descriptor is kept; the
    /// directory is left for inspection.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self, source), fields(server_name = %name, source = %source))]
    pub async fn create(
        &self,
        name: &str,
        source: SourceSpec,
        memory_mb: Option<u32>,
    ) -> Result<ServerSummary> {
        validate_name(name)?;
        let memory_mb = memory_mb.unwrap_or(self.inner.config.servers.default_memory);
        if memory_mb == 0 {
            return Err(Error::InvalidArgument(
                "Memory must be a positive number of MB".to_string(),
            ));
        }

        let _guard = self.inner.lock_name(name).await;

        let port = {
            let mut fleet = self.inner.fleet.lock().await;
            if fleet.servers.contains_key(name) {
                return Err(Error::AlreadyExists(name.to_string()));
            }

            let max = self.inner.config.servers.max_concurrent;
            if fleet.count(|s| s == ServerStatus::Running) >= max {
                return Err(Error::ConcurrencyLimitReached(max));
            }

            let port = fleet.ports.allocate().ok_or_else(|| self.inner.no_ports())?;
            fleet.ports.claim(port, name);
            port
        };
        tracing::debug!(port, "Reserved port");

        if let Err(e) = self.inner.populate(name, &source, port).await {
            self.inner.fleet.lock().await.release_port(name, port);
            tracing::error!(error = %e, "Failed to create server");
            self.inner
                .events
                .record(name, ServerLifecycleEvent::Failed, Some(e.to_string()));
            return Err(e);
        }

        let descriptor = ServerDescriptor::new(name, source, memory_mb, port);
        let summary = ServerSummary::from_descriptor(&descriptor, Utc::now());
        let inserted = {
            let mut fleet = self.inner.fleet.lock().await;
            fleet.release_port(name, port);
            self.inner.update(&mut fleet, |servers| {
                servers.insert(name.to_string(), descriptor);
                Ok(())
            })
        };
        if let Err(e) = inserted {
            tracing::error!(error = %e, "Failed to persist new server");
            self.inner
                .events
                .record(name, ServerLifecycleEvent::Failed, Some(e.to_string()));
            return Err(e);
        }

        self.inner.events.record(
            name,
            ServerLifecycleEvent::Created,
            Some(format!("port {}, {} MB", port, memory_mb)),
        );
        tracing::info!(port, memory_mb, "Server created");
        Ok(summary)
    }

    /// Start a server and wait out the confirmation window.
    ///
    /// Permitted from STOPPED, CRASHED and ERROR. A process that exits
    /// within the window leaves the server CRASHED and the call fails with
    /// its captured error output.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn start(&self, name: &str) -> Result<()> {
        let _guard = self.inner.lock_name(name).await;
        self.inner.start_locked(name).await
    }

    /// Stop a running server.
    ///
    /// Sends the configured stop command, waits for the grace period and
    /// kills the process if it is still alive. Ends STOPPED either way.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn stop(&self, name: &str) -> Result<()> {
        let _guard = self.inner.lock_name(name).await;
        self.inner.stop_locked(name).await
    }

    /// Stop, wait for the settle delay, then start.
    ///
    /// A failed stop fails the restart without attempting the start.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn restart(&self, name: &str) -> Result<()> {
        let _guard = self.inner.lock_name(name).await;

        self.inner.stop_locked(name).await?;
        tokio::time::sleep(self.inner.config.lifecycle.settle_delay()).await;
        self.inner.start_locked(name).await?;

        let restart_count = {
            let mut fleet = self.inner.fleet.lock().await;
            self.inner.update(&mut fleet, |servers| {
                let server = descriptor_mut(servers, name)?;
                server.restart_count += 1;
                Ok(server.restart_count)
            })?
        };

        self.inner.events.record(
            name,
            ServerLifecycleEvent::Restarted,
            Some(format!("restart count {}", restart_count)),
        );
        tracing::info!(restart_count, "Server restarted");
        Ok(())
    }

    /// Remove a server, its directory and its port.
    ///
    /// A running server is stopped first.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self), fields(server_name = %name))]
    pub async fn delete(&self, name: &str) -> Result<()> {
        let _guard = self.inner.lock_name(name).await;

        let status = self.inner.status_of(name).await?;
        if status == ServerStatus::Running {
            tracing::debug!("Stopping server before deletion");
            self.inner.stop_locked(name).await?;
        }

        let leftover = self.inner.fleet.lock().await.detach(name);
        if let Some(handle) = leftover {
            tracing::warn!(pid = handle.pid(), "Killing leftover process");
            handle.kill().await?;
        }

        let server_dir = self.inner.config.server_dir(name);
        match tokio::fs::remove_dir_all(&server_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(dir = %server_dir.display(), "Server directory already gone");
            }
            Err(e) => return Err(e.into()),
        }

        {
            let mut fleet = self.inner.fleet.lock().await;
            let removed = self
                .inner
                .update(&mut fleet, |servers| Ok(servers.remove(name)))?;
            if let Some(server) = removed {
                fleet.release_port(name, server.port);
            }
        }

        self.inner
            .events
            .record(name, ServerLifecycleEvent::Deleted, None);
        tracing::info!("Server deleted");
        Ok(())
    }

    /// Write `text` plus a line terminator to a running server's console.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self, text), fields(server_name = %name))]
    pub async fn send_console_command(&self, name: &str, text: &str) -> Result<()> {
        let handle = {
            let fleet = self.inner.fleet.lock().await;
            let server = fleet
                .servers
                .get(name)
                .ok_or_else(|| Error::NotFound(name.to_string()))?;
            if server.status != ServerStatus::Running {
                return Err(Error::NotRunning(name.to_string()));
            }
            fleet
                .processes
                .get(name)
                .cloned()
                .ok_or_else(|| Error::NotRunning(name.to_string()))?
        };

        // Bounded by the console write timeout; a child that stops reading
        // stdin cannot hold the pipe forever.
        handle.write_console(text).await.map_err(|e| match e {
            Error::ProcessNotRunning => Error::NotRunning(name.to_string()),
            other => other,
        })?;

        tracing::debug!(command = %text, "Console command sent");
        Ok(())
    }

    /// Set `key` in the server's `server.properties`.
    ///
    /// Takes effect on the next start.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self, value), fields(server_name = %name))]
    pub async fn update_property(&self, name: &str, key: &str, value: &str) -> Result<()> {
        let _guard = self.inner.lock_name(name).await;
        self.inner.status_of(name).await?;

        let path = self.inner.config.server_dir(name).join(PROPERTIES_FILE);
        properties::update_property(&path, key, value)?;

        tracing::info!(key, "Server property updated");
        Ok(())
    }

    /// Summaries of all servers, ordered by name.
    pub fn list(&self) -> Result<Vec<ServerSummary>> {
        let snapshot = self.inner.snapshot()?;
        let now = Utc::now();
        Ok(snapshot
            .values()
            .map(|d| ServerSummary::from_descriptor(d, now))
            .collect())
    }

    /// Summary of one server, including uptime while running.
    pub fn status(&self, name: &str) -> Result<ServerSummary> {
        let snapshot = self.inner.snapshot()?;
        snapshot
            .get(name)
            .map(|d| ServerSummary::from_descriptor(d, Utc::now()))
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Most recent `limit` console lines of the server's current process.
    ///
    /// Empty when the server has no process.
    pub async fn console_output(&self, name: &str, limit: usize) -> Result<Vec<String>> {
        let fleet = self.inner.fleet.lock().await;
        if !fleet.servers.contains_key(name) {
            return Err(Error::NotFound(name.to_string()));
        }
        Ok(fleet
            .processes
            .get(name)
            .map(|handle| handle.console_tail(limit))
            .unwrap_or_default())
    }

    /// Lifecycle events recorded for a server, newest first.
    pub fn events(&self, name: &str, limit: Option<usize>) -> Result<Vec<ServerEvent>> {
        self.inner.events.server_events(name, limit)
    }

    /// Restart every server persisted as STARTING or RUNNING.
    ///
    /// Does nothing when `auto_start_on_boot` is disabled; such servers keep
    /// their persisted status until the next operator action. Returns the
    /// outcome per server.
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_on_boot(&self) -> HashMap<String, Result<()>> {
        if !self.inner.config.servers.auto_start_on_boot {
            tracing::info!("Auto-start on boot disabled, leaving persisted statuses as-is");
            return HashMap::new();
        }

        let names: Vec<String> = match self.inner.snapshot() {
            Ok(snapshot) => snapshot
                .values()
                .filter(|d| d.status.is_live())
                .map(|d| d.name.clone())
                .collect(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to read fleet snapshot");
                return HashMap::new();
            }
        };
        tracing::info!(servers = ?names, "Resuming servers");

        let resumes = names.into_iter().map(|name| async move {
            let result = self.inner.resume(&name).await;
            if let Err(e) = &result {
                tracing::error!(server_name = %name, error = %e, "Failed to resume server");
            }
            (name, result)
        });

        futures::future::join_all(resumes).await.into_iter().collect()
    }

    /// Terminate every process without touching persisted statuses.
    ///
    /// Servers that were running are resumed by the next
    /// [`reconcile_on_boot`](Self::reconcile_on_boot).
    ///
    /// This method is instrumented with `tracing`.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        let handles: Vec<Arc<ProcessHandle>> = {
            let mut fleet = self.inner.fleet.lock().await;
            for (_, monitor) in fleet.monitors.drain() {
                monitor.cancel();
            }
            fleet.processes.drain().map(|(_, handle)| handle).collect()
        };
        tracing::info!(processes = handles.len(), "Shutting down server processes");

        let stops = handles.iter().map(|handle| async move {
            match self.inner.end_process(handle).await {
                Ok(termination) => {
                    tracing::info!(server_name = %handle.name(), ?termination, "Server process ended")
                }
                Err(e) => {
                    tracing::error!(server_name = %handle.name(), error = %e, "Failed to end server process")
                }
            }
        });
        futures::future::join_all(stops).await;
    }
}

impl Inner {
    async fn lock_name(&self, name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.name_locks.lock().await;
            // Entries only the map refers to are neither held nor awaited.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(name.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Apply `change` to a copy of the fleet, persist the copy, then adopt it.
    ///
    /// When `change` or the write fails the fleet is left untouched.
    fn update<R>(
        &self,
        fleet: &mut Fleet,
        change: impl FnOnce(&mut FleetState) -> Result<R>,
    ) -> Result<R> {
        let mut servers = fleet.servers.clone();
        let out = change(&mut servers)?;
        self.store.save(&servers)?;
        fleet.servers = servers;
        self.publish(&fleet.servers);
        Ok(out)
    }

    /// Publish and persist changes already made to the fleet.
    ///
    /// Used to record what happened to a process that is already gone, so
    /// readers see the change even when it cannot be written.
    fn settle(&self, fleet: &Fleet) -> Result<()> {
        self.publish(&fleet.servers);
        self.store.save(&fleet.servers)
    }

    fn publish(&self, servers: &FleetState) {
        match self.snapshot.write() {
            Ok(mut snapshot) => *snapshot = Arc::new(servers.clone()),
            Err(_) => tracing::warn!("Failed to lock fleet snapshot"),
        }
    }

    fn snapshot(&self) -> Result<Arc<FleetState>> {
        self.snapshot
            .read()
            .map(|snapshot| Arc::clone(&snapshot))
            .map_err(|_| Error::Other("Failed to lock fleet snapshot".to_string()))
    }

    async fn status_of(&self, name: &str) -> Result<ServerStatus> {
        self.fleet
            .lock()
            .await
            .servers
            .get(name)
            .map(|s| s.status)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    fn no_ports(&self) -> Error {
        let range = self.config.servers.port_range;
        Error::NoPortsAvailable {
            min: range.min,
            max: range.max,
        }
    }

    /// Create the server directory, fetch its files and write its port.
    async fn populate(&self, name: &str, source: &SourceSpec, port: u16) -> Result<()> {
        let server_dir = self.config.server_dir(name);
        tokio::fs::create_dir_all(&server_dir).await?;

        let artifact = self
            .provider
            .acquire(&server_dir, source)
            .await
            .map_err(acquisition_failed)?;
        tracing::debug!(files = artifact.files.len(), "Server files acquired");

        properties::set_property(
            &server_dir.join(PROPERTIES_FILE),
            SERVER_PORT_KEY,
            &port.to_string(),
        )
    }

    /// Reset a server persisted as live and start it again.
    async fn resume(&self, name: &str) -> Result<()> {
        let _guard = self.lock_name(name).await;
        {
            let mut fleet = self.fleet.lock().await;
            if !fleet.get_mut(name)?.status.is_live() {
                return Ok(());
            }
            let port = self.update(&mut fleet, |servers| {
                let server = descriptor_mut(servers, name)?;
                transition(server, ServerStatus::Stopped)?;
                Ok(server.port)
            })?;
            fleet.release_port(name, port);
        }
        self.start_locked(name).await
    }

    async fn start_locked(&self, name: &str) -> Result<()> {
        let (port, reassigned, memory_mb) = {
            let mut guard = self.fleet.lock().await;
            let fleet = &mut *guard;
            let server = fleet
                .servers
                .get(name)
                .ok_or_else(|| Error::NotFound(name.to_string()))?;
            if server.status.is_live() {
                return Err(Error::AlreadyRunning(name.to_string()));
            }

            let max = self.config.servers.max_concurrent;
            if fleet.count(ServerStatus::is_live) >= max {
                return Err(Error::ConcurrencyLimitReached(max));
            }

            let (port, memory_mb) = (server.port, server.memory_mb);
            if fleet.ports.claim(port, name) {
                (port, false, memory_mb)
            } else {
                let free = fleet.ports.allocate().ok_or_else(|| self.no_ports())?;
                fleet.ports.claim(free, name);
                tracing::warn!(old_port = port, new_port = free, "Port in use, reassigning");
                (free, true, memory_mb)
            }
        };

        let handle = match self.launch(name, port, reassigned, memory_mb).await {
            Ok(handle) => Arc::new(handle),
            Err(e) => {
                tracing::error!(error = %e, "Failed to launch server");
                self.abandon_start(name, port, &e).await;
                return Err(e);
            }
        };

        let recorded = {
            let mut fleet = self.fleet.lock().await;
            let (pid, started_at) = (handle.pid(), Utc::now());
            let recorded = self.update(&mut fleet, |servers| {
                let server = descriptor_mut(servers, name)?;
                transition(server, ServerStatus::Starting)?;
                server.port = port;
                server.pid = Some(pid);
                server.last_started_at = Some(started_at);
                Ok(())
            });
            if recorded.is_ok() {
                let monitor =
                    ServerMonitor::spawn(Arc::clone(&handle), &self.monitor_config, self.exits.clone());
                fleet.monitors.insert(name.to_string(), monitor);
                fleet.processes.insert(name.to_string(), Arc::clone(&handle));
            }
            recorded
        };
        if let Err(e) = recorded {
            tracing::error!(error = %e, pid = handle.pid(), "Failed to record server start, killing process");
            self.discard(&handle).await;
            self.abandon_start(name, port, &e).await;
            return Err(e);
        }
        tracing::info!(pid = handle.pid(), port, "Server process spawned, awaiting confirmation");

        tokio::time::sleep(self.config.lifecycle.confirmation_window()).await;

        let exited = handle.try_exit_status().await?;
        let confirmed = {
            let mut guard = self.fleet.lock().await;
            let fleet = &mut *guard;
            let current = fleet
                .processes
                .get(name)
                .is_some_and(|h| h.id() == handle.id());

            match (exited, current) {
                (None, true) => {
                    let running = self.update(fleet, |servers| {
                        transition(descriptor_mut(servers, name)?, ServerStatus::Running)
                    });
                    if running.is_err() {
                        fleet.detach(name);
                    }
                    running.map(|()| true)
                }
                (Some(status), true) => {
                    fleet.detach(name);
                    fleet.release_port(name, port);
                    let server = fleet.get_mut(name)?;
                    transition(server, ServerStatus::Crashed)?;
                    server.crash_count += 1;
                    if let Err(e) = self.settle(fleet) {
                        tracing::error!(error = %e, "Failed to persist startup crash");
                    }
                    self.events.record(
                        name,
                        ServerLifecycleEvent::Crashed,
                        Some(format!("exited during startup with {}", status)),
                    );
                    Ok(false)
                }
                // The monitor already recorded the exit.
                (_, false) => Ok(false),
            }
        };
        let confirmed = match confirmed {
            Ok(confirmed) => confirmed,
            Err(e) => {
                tracing::error!(error = %e, pid = handle.pid(), "Failed to record server running, killing process");
                self.discard(&handle).await;
                self.abandon_start(name, port, &e).await;
                return Err(e);
            }
        };

        if !confirmed {
            let stderr = handle.error_output().await;
            let reason = if stderr.trim().is_empty() {
                "process exited during startup".to_string()
            } else {
                stderr
            };
            tracing::error!(reason = %reason, "Server exited during startup");
            return Err(Error::ProcessSpawnFailed(reason));
        }

        self.events.record(
            name,
            ServerLifecycleEvent::Started,
            Some(format!("pid {}, port {}", handle.pid(), port)),
        );
        tracing::info!(pid = handle.pid(), port, "Server running");
        Ok(())
    }

    /// Free the port of a start that did not go through and leave the server
    /// in ERROR.
    async fn abandon_start(&self, name: &str, port: u16, cause: &Error) {
        let mut fleet = self.fleet.lock().await;
        fleet.release_port(name, port);
        let marked = match fleet.get_mut(name) {
            Ok(server) => transition(server, ServerStatus::Error),
            Err(e) => Err(e),
        };
        if let Err(e) = marked.and_then(|()| self.settle(&fleet)) {
            tracing::error!(error = %e, "Failed to record server error");
        }
        self.events
            .record(name, ServerLifecycleEvent::Failed, Some(cause.to_string()));
    }

    /// Kill a process the fleet no longer tracks.
    async fn discard(&self, handle: &ProcessHandle) {
        if let Err(e) = handle.kill().await {
            tracing::warn!(pid = handle.pid(), error = %e, "Failed to kill untracked process");
        }
    }

    /// Prepare the server directory and spawn its process.
    async fn launch(
        &self,
        name: &str,
        port: u16,
        reassigned: bool,
        memory_mb: u32,
    ) -> Result<ProcessHandle> {
        let server_dir = self.config.server_dir(name);
        if reassigned {
            properties::set_property(
                &server_dir.join(PROPERTIES_FILE),
                SERVER_PORT_KEY,
                &port.to_string(),
            )?;
        }
        accept_eula(&server_dir).await?;

        let (program, args) = self.config.jvm.launch_command(memory_mb);
        let launch = LaunchSpec {
            program,
            args,
            env: HashMap::new(),
        };
        ProcessHandle::spawn(name, &server_dir, &launch)
    }

    async fn stop_locked(&self, name: &str) -> Result<()> {
        let handle = {
            let mut fleet = self.fleet.lock().await;
            if fleet.get_mut(name)?.status != ServerStatus::Running {
                return Err(Error::NotRunning(name.to_string()));
            }
            self.update(&mut fleet, |servers| {
                transition(descriptor_mut(servers, name)?, ServerStatus::Stopping)
            })?;
            fleet.detach(name)
        };

        let termination = match &handle {
            Some(handle) => match self.end_process(handle).await {
                Ok(termination) => termination,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to terminate server process");
                    let mut fleet = self.fleet.lock().await;
                    let server = fleet.get_mut(name)?;
                    transition(server, ServerStatus::Error)?;
                    let port = server.port;
                    fleet.release_port(name, port);
                    if let Err(save_err) = self.settle(&fleet) {
                        tracing::error!(error = %save_err, "Failed to record server error");
                    }
                    self.events
                        .record(name, ServerLifecycleEvent::Failed, Some(e.to_string()));
                    return Err(e);
                }
            },
            None => {
                tracing::warn!("No live process for running server, marking stopped");
                Termination::AlreadyExited
            }
        };

        {
            let mut fleet = self.fleet.lock().await;
            let server = fleet.get_mut(name)?;
            transition(server, ServerStatus::Stopped)?;
            let port = server.port;
            fleet.release_port(name, port);
            self.settle(&fleet)?;
        }

        self.events.record(
            name,
            ServerLifecycleEvent::Stopped,
            Some(format!("{:?}", termination)),
        );
        tracing::info!(?termination, "Server stopped");
        Ok(())
    }

    /// Ask the process to exit via its console, then escalate.
    async fn end_process(&self, handle: &ProcessHandle) -> Result<Termination> {
        let grace = self.config.lifecycle.grace_period();

        if let Some(command) = &self.config.lifecycle.stop_command {
            match tokio::time::timeout(grace, handle.write_console(command)).await {
                Ok(Ok(())) => {
                    if handle.wait_for_exit(grace).await? {
                        return Ok(Termination::Graceful);
                    }
                    tracing::warn!(server_name = %handle.name(), "Stop command timed out, killing process");
                    handle.kill().await?;
                    return Ok(Termination::Forced);
                }
                Ok(Err(Error::ProcessNotRunning)) => return Ok(Termination::AlreadyExited),
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "Stop command not delivered, signalling instead");
                }
                Err(_) => {
                    tracing::warn!(server_name = %handle.name(), "Console blocked, signalling instead");
                }
            }
        }

        handle.terminate(grace).await
    }

    /// Apply a monitor's exit report. Stale and duplicate reports are ignored.
    async fn handle_exit(&self, report: ExitReport) {
        let crash = {
            let mut guard = self.fleet.lock().await;
            let fleet = &mut *guard;

            let current = fleet
                .processes
                .get(&report.name)
                .is_some_and(|h| h.id() == report.handle_id);
            let Some(server) = fleet.servers.get_mut(&report.name) else {
                return;
            };
            if !current || !server.status.is_live() {
                tracing::debug!(server_name = %report.name, handle = %report.handle_id, "Ignoring stale exit report");
                return;
            }

            let was_running = server.status == ServerStatus::Running;
            if let Err(e) = transition(server, ServerStatus::Crashed) {
                tracing::error!(server_name = %report.name, error = %e, "Failed to mark server crashed");
                return;
            }
            server.crash_count += 1;
            let (port, crash_count) = (server.port, server.crash_count);

            fleet.detach(&report.name);
            fleet.release_port(&report.name, port);
            if let Err(e) = self.settle(fleet) {
                tracing::error!(server_name = %report.name, error = %e, "Failed to persist crash");
            }

            // A boot failure is reported to the caller of start instead.
            was_running.then(|| CrashReport {
                name: report.name.clone(),
                exit_code: report.exit_code,
                crash_count,
                at: Utc::now(),
            })
        };

        tracing::warn!(server_name = %report.name, exit_code = ?report.exit_code, "Server process exited unexpectedly");
        self.events.record(
            &report.name,
            ServerLifecycleEvent::Crashed,
            Some(match report.exit_code {
                Some(code) => format!("exit code {}", code),
                None => "terminated by signal".to_string(),
            }),
        );

        if let Some(crash) = crash {
            if self.config.servers.crash_notification {
                self.notifier.server_crashed(&crash).await;
            }
        }
    }
}

async fn dispatch_exits(inner: Weak<Inner>, mut reports: mpsc::UnboundedReceiver<ExitReport>) {
    while let Some(report) = reports.recv().await {
        let Some(inner) = inner.upgrade() else { break };
        inner.handle_exit(report).await;
    }
    tracing::debug!("Exit dispatcher finished");
}

fn acquisition_failed(e: AcquireError) -> Error {
    if e.needs_specific_source() {
        Error::ArtifactAcquisitionFailed(format!(
            "{}. Retry with the direct server pack URL (a link ending in .zip)",
            e
        ))
    } else {
        Error::ArtifactAcquisitionFailed(e.to_string())
    }
}

async fn accept_eula(server_dir: &Path) -> Result<()> {
    let path = server_dir.join(EULA_FILE);
    if !tokio::fs::try_exists(&path).await? {
        tokio::fs::write(&path, "eula=true\n").await?;
    }
    Ok(())
}
