//! Configuration module for MC Runner.
//!
//! This module handles parsing, validation, and access to the settings of
//! the fleet manager: where servers live, which ports they may use, how
//! they are launched and how long the lifecycle waits are. Configurations
//! are loaded from YAML files or strings.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use mc_runner::config::{Config, validate_config};
//!
//! let config = Config::from_file("config.yaml").unwrap();
//! validate_config(&config).unwrap();
//! println!("Managing servers under {}", config.servers.directory.display());
//! ```
//!
//! Creating a configuration programmatically:
//!
//! ```
//! use mc_runner::config::{Config, PortRange, ServersConfig};
//!
//! let config = Config {
//!     servers: ServersConfig {
//!         directory: "/srv/mc".into(),
//!         port_range: PortRange { min: 30000, max: 30004 },
//!         ..ServersConfig::default()
//!     },
//!     ..Config::default()
//! };
//! assert_eq!(config.server_dir("alpha"), std::path::PathBuf::from("/srv/mc/alpha"));
//! ```
mod parser;
pub mod validator;

pub use parser::{
    ArtifactsConfig, Config, JvmConfig, LifecycleConfig, LoggingConfig, MonitoringConfig,
    PortRange, ServersConfig,
};
pub use validator::validate_config;
