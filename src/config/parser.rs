use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Inclusive range of ports handed out to servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    /// Lowest port in the range.
    pub min: u16,
    /// Highest port in the range.
    pub max: u16,
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            min: 25565,
            max: 25575,
        }
    }
}

/// Fleet-wide settings for managed servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServersConfig {
    /// Root directory. Each server lives in `<directory>/<name>` and the
    /// persisted fleet state sits next to them.
    pub directory: PathBuf,
    /// Maximum number of simultaneously running servers.
    pub max_concurrent: usize,
    /// Heap size in MB used when `create` gets no memory override.
    pub default_memory: u32,
    /// Ports available to servers.
    pub port_range: PortRange,
    /// Restart servers persisted as running when the manager boots.
    pub auto_start_on_boot: bool,
    /// Forward crash reports to the notifier.
    pub crash_notification: bool,
}

impl Default for ServersConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./servers"),
            max_concurrent: 3,
            default_memory: 2048,
            port_range: PortRange::default(),
            auto_start_on_boot: true,
            crash_notification: true,
        }
    }
}

/// How server processes are launched.
///
/// By default a server is started as
/// `<java_path> -Xmx<mem>M -Xms<mem>M <java_args...> -jar <server_jar> nogui`.
/// Setting `command` replaces that invocation entirely; every `{memory}`
/// inside it expands to the server's memory in MB.
///
/// # Examples
///
/// ```
/// use mc_runner::config::JvmConfig;
///
/// let jvm = JvmConfig::default();
/// let (program, args) = jvm.launch_command(1024);
/// assert_eq!(program, "java");
/// assert_eq!(args[0], "-Xmx1024M");
/// assert_eq!(args.last().map(String::as_str), Some("nogui"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JvmConfig {
    /// Java executable.
    pub java_path: String,
    /// Extra JVM flags, whitespace separated.
    pub java_args: String,
    /// Jar file inside the server directory.
    pub server_jar: String,
    /// Full launch command override.
    pub command: Option<Vec<String>>,
}

impl Default for JvmConfig {
    fn default() -> Self {
        Self {
            java_path: "java".to_string(),
            java_args: String::new(),
            server_jar: "server.jar".to_string(),
            command: None,
        }
    }
}

impl JvmConfig {
    /// Builds the program and argument list for a server with `memory_mb` of heap.
    pub fn launch_command(&self, memory_mb: u32) -> (String, Vec<String>) {
        if let Some(command) = self.command.as_ref().filter(|c| !c.is_empty()) {
            let expand = |part: &String| part.replace("{memory}", &memory_mb.to_string());
            let program = expand(&command[0]);
            let args = command[1..].iter().map(expand).collect();
            return (program, args);
        }

        let mut args = vec![format!("-Xmx{}M", memory_mb), format!("-Xms{}M", memory_mb)];
        args.extend(self.java_args.split_whitespace().map(str::to_string));
        args.push("-jar".to_string());
        args.push(self.server_jar.clone());
        args.push("nogui".to_string());
        (self.java_path.clone(), args)
    }
}

/// Crash monitor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Liveness polling interval in milliseconds.
    pub check_interval_ms: u64,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 5_000,
        }
    }
}

impl MonitoringConfig {
    /// Polling interval as a `Duration`.
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }
}

/// Fixed waits used by start, stop and restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long a freshly spawned process must stay alive to count as started.
    pub confirmation_window_ms: u64,
    /// How long `stop` waits after the graceful request before killing.
    pub grace_period_ms: u64,
    /// Pause between the stop and start halves of a restart.
    pub settle_delay_ms: u64,
    /// Console line written before signalling the process on stop.
    pub stop_command: Option<String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            confirmation_window_ms: 5_000,
            grace_period_ms: 30_000,
            settle_delay_ms: 5_000,
            stop_command: Some("stop".to_string()),
        }
    }
}

impl LifecycleConfig {
    pub fn confirmation_window(&self) -> Duration {
        Duration::from_millis(self.confirmation_window_ms)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Where server artifacts are downloaded from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Download URL template for version tags; `{version}` is substituted.
    pub version_url: String,
    /// Origin prepended to relative links resolved from mod-pack pages.
    pub page_base_url: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            version_url: "https://launcher.mojang.com/v1/objects/{version}/server.jar".to_string(),
            page_base_url: "https://www.curseforge.com".to_string(),
        }
    }
}

/// Log output settings for the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Optional log file written alongside stdout.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Main configuration for the fleet manager.
///
/// Every section is optional in the YAML source and falls back to its
/// defaults.
///
/// # YAML Layout
///
/// ```yaml
/// servers:
///   directory: ./servers
///   max_concurrent: 3
///   default_memory: 2048
///   port_range: { min: 25565, max: 25575 }
///   auto_start_on_boot: true
///   crash_notification: true
/// jvm:
///   java_path: java
///   java_args: "-XX:+UseG1GC"
/// monitoring:
///   check_interval_ms: 5000
/// lifecycle:
///   confirmation_window_ms: 5000
///   grace_period_ms: 30000
///   settle_delay_ms: 5000
///   stop_command: stop
/// logging:
///   level: info
///   file: ./logs/mc-runner.log
/// ```
///
/// # Examples
///
/// ```
/// use mc_runner::config::Config;
///
/// let config = Config::parse_from_str("servers:\n  max_concurrent: 5\n").unwrap();
/// assert_eq!(config.servers.max_concurrent, 5);
/// assert_eq!(config.servers.port_range.min, 25565);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub servers: ServersConfig,
    pub jvm: JvmConfig,
    pub monitoring: MonitoringConfig,
    pub lifecycle: LifecycleConfig,
    pub artifacts: ArtifactsConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads a configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// * The file cannot be read
    /// * The file contents are not valid YAML
    /// * The YAML does not conform to the expected schema
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        Self::parse_from_str(&content)
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }

    /// Location of the persisted fleet state file.
    pub fn state_file(&self) -> PathBuf {
        self.servers.directory.join("server_states.json")
    }

    /// Directory of a single server.
    pub fn server_dir(&self, name: &str) -> PathBuf {
        self.servers.directory.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config_str = r#"
servers:
  directory: /srv/mc
  max_concurrent: 2
  default_memory: 4096
  port_range:
    min: 30000
    max: 30010
  auto_start_on_boot: false
jvm:
  java_path: /usr/bin/java
  java_args: "-XX:+UseG1GC -Dfile.encoding=UTF-8"
monitoring:
  check_interval_ms: 250
lifecycle:
  stop_command: null
"#;

        let config = Config::parse_from_str(config_str).unwrap();

        assert_eq!(config.servers.directory, PathBuf::from("/srv/mc"));
        assert_eq!(config.servers.max_concurrent, 2);
        assert_eq!(config.servers.port_range, PortRange { min: 30000, max: 30010 });
        assert!(!config.servers.auto_start_on_boot);
        assert!(config.servers.crash_notification);
        assert_eq!(config.monitoring.check_interval(), Duration::from_millis(250));
        assert_eq!(config.lifecycle.stop_command, None);
        assert_eq!(config.lifecycle.grace_period_ms, 30_000);

        let (program, args) = config.jvm.launch_command(4096);
        assert_eq!(program, "/usr/bin/java");
        assert_eq!(
            args,
            vec![
                "-Xmx4096M",
                "-Xms4096M",
                "-XX:+UseG1GC",
                "-Dfile.encoding=UTF-8",
                "-jar",
                "server.jar",
                "nogui"
            ]
        );
    }

    #[test]
    fn test_command_override_expands_memory() {
        let jvm = JvmConfig {
            command: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                "echo {memory}".to_string(),
            ]),
            ..JvmConfig::default()
        };

        let (program, args) = jvm.launch_command(512);
        assert_eq!(program, "sh");
        assert_eq!(args, vec!["-c", "echo 512"]);
    }
}
