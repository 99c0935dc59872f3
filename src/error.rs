/// Error handling module for MC Runner.
///
/// This module defines the error types used throughout the library.
/// Every fallible fleet operation returns one of these as a value; the
/// `Display` text of each variant is short enough to be shown verbatim to
/// an operator.
///
/// # Example
///
/// ```
/// use mc_runner::error::{Error, Result};
///
/// fn describe(result: Result<()>) -> String {
///     match result {
///         Ok(_) => "done".to_string(),
///         Err(Error::NotFound(name)) => format!("no server called {}", name),
///         Err(Error::NoPortsAvailable { .. }) => "port range exhausted".to_string(),
///         Err(e) => e.to_string(),
///     }
/// }
/// ```
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the mc-runner library.
///
/// The first group of variants is the operator-facing taxonomy of the
/// lifecycle manager. The remaining variants cover configuration, state
/// persistence and OS-level failures.
#[derive(Error, Debug)]
pub enum Error {
    /// No server descriptor exists with the given name.
    #[error("Server '{0}' does not exist")]
    NotFound(String),

    /// A server descriptor with the given name already exists.
    #[error("Server '{0}' already exists")]
    AlreadyExists(String),

    /// The server is already starting or running.
    ///
    /// This error occurs when:
    /// - Attempting to start a server whose status is STARTING or RUNNING
    #[error("Server '{0}' is already running")]
    AlreadyRunning(String),

    /// The server is not running.
    ///
    /// This error occurs when:
    /// - Attempting to stop or restart a server that isn't RUNNING
    /// - Sending a console command to a server without a live process
    #[error("Server '{0}' is not running")]
    NotRunning(String),

    /// The configured ceiling of simultaneously running servers was reached.
    #[error("Maximum concurrent servers ({0}) reached")]
    ConcurrencyLimitReached(usize),

    /// Every port in the configured range is claimed by a live server.
    #[error("No available ports in configured range {min}-{max}")]
    NoPortsAvailable {
        /// Lower bound of the range
        min: u16,
        /// Upper bound of the range
        max: u16,
    },

    /// The artifact provider could not populate the server directory.
    #[error("Failed to acquire server files: {0}")]
    ArtifactAcquisitionFailed(String),

    /// The server process could not be spawned or exited during the
    /// confirmation window. Carries the captured error output.
    #[error("Server failed to start: {0}")]
    ProcessSpawnFailed(String),

    /// A per-server configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    FileMissing(PathBuf),

    /// The backing process of a handle has already exited.
    #[error("Process is not running")]
    ProcessNotRunning,

    /// An argument supplied by the caller failed validation.
    ///
    /// This error occurs when:
    /// - A server name is empty or not alphanumeric
    /// - A memory override is zero
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Failed to parse configuration from a file or string.
    ///
    /// This error occurs when:
    /// - The configuration YAML is malformed
    /// - Field types are incorrect
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parses but contains invalid values.
    ///
    /// This error occurs when:
    /// - The port range is empty or inverted
    /// - The concurrency ceiling or default memory is zero
    /// - No launch command can be derived
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    /// Error reading, writing or decoding the persisted fleet state.
    #[error("State store error: {0}")]
    State(String),

    /// OS-level process error not covered by the taxonomy above.
    #[error("Server process error: {0}")]
    Process(String),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error not covered by the above categories.
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for mc-runner operations.
pub type Result<T> = std::result::Result<T, Error>;
