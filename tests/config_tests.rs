use assert_fs::prelude::*;
use mc_runner::config::{Config, PortRange, validate_config};
use mc_runner::error::{Error, Result};
use std::path::PathBuf;

#[test]
fn test_parse_config() -> Result<()> {
    let config_str = r#"
servers:
  directory: /srv/minecraft
  max_concurrent: 4
  default_memory: 3072
  port_range:
    min: 25565
    max: 25570
  crash_notification: false
jvm:
  java_path: /opt/java/bin/java
  server_jar: paper.jar
lifecycle:
  confirmation_window_ms: 10000
  stop_command: "save-all"
artifacts:
  version_url: "https://mirror.example.com/{version}/server.jar"
logging:
  level: debug
"#;

    let config = Config::parse_from_str(config_str)?;

    assert_eq!(config.servers.directory, PathBuf::from("/srv/minecraft"));
    assert_eq!(config.servers.max_concurrent, 4);
    assert_eq!(config.servers.default_memory, 3072);
    assert_eq!(config.servers.port_range, PortRange { min: 25565, max: 25570 });
    assert!(config.servers.auto_start_on_boot);
    assert!(!config.servers.crash_notification);
    assert_eq!(config.lifecycle.confirmation_window_ms, 10_000);
    assert_eq!(config.lifecycle.stop_command.as_deref(), Some("save-all"));
    assert_eq!(config.lifecycle.settle_delay_ms, 5_000);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.file, None);
    assert_eq!(config.state_file(), PathBuf::from("/srv/minecraft/server_states.json"));

    let (program, args) = config.jvm.launch_command(3072);
    assert_eq!(program, "/opt/java/bin/java");
    assert_eq!(args, vec!["-Xmx3072M", "-Xms3072M", "-jar", "paper.jar", "nogui"]);

    validate_config(&config)?;
    Ok(())
}

#[test]
fn test_empty_config_uses_defaults() -> Result<()> {
    let config = Config::parse_from_str("{}")?;

    assert_eq!(config.servers.max_concurrent, 3);
    assert_eq!(config.servers.port_range, PortRange { min: 25565, max: 25575 });
    assert_eq!(config.monitoring.check_interval_ms, 5_000);
    assert_eq!(config.lifecycle.grace_period_ms, 30_000);
    validate_config(&config)?;
    Ok(())
}

#[test]
fn test_config_from_file() -> Result<()> {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("config.yaml");
    file.write_str("servers:\n  max_concurrent: 1\n").unwrap();

    let config = Config::from_file(file.path())?;
    assert_eq!(config.servers.max_concurrent, 1);

    let missing = Config::from_file(temp.child("missing.yaml").path());
    assert!(matches!(missing, Err(Error::ConfigParse(_))));
    Ok(())
}

#[test]
fn test_invalid_yaml() {
    let result = Config::parse_from_str("servers: [not, a, map]");
    assert!(matches!(result, Err(Error::ConfigParse(_))));
}

#[test]
fn test_validate_config() {
    let mut config = Config::default();
    config.servers.port_range = PortRange { min: 25570, max: 25565 };
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));

    let mut config = Config::default();
    config.servers.port_range = PortRange { min: 0, max: 10 };
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));

    let mut config = Config::default();
    config.servers.max_concurrent = 0;
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));

    let mut config = Config::default();
    config.servers.default_memory = 0;
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));

    let mut config = Config::default();
    config.jvm.command = Some(vec![]);
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));

    let mut config = Config::default();
    config.jvm.java_path = String::new();
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));

    // A command override makes java_path irrelevant
    config.jvm.command = Some(vec!["./start.sh".to_string()]);
    assert!(validate_config(&config).is_ok());

    let mut config = Config::default();
    config.monitoring.check_interval_ms = 0;
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));

    let mut config = Config::default();
    config.artifacts.version_url = "https://example.com/server.jar".to_string();
    assert!(matches!(validate_config(&config), Err(Error::ConfigInvalid(_))));
}

#[test]
fn test_single_port_range_is_valid() {
    let mut config = Config::default();
    config.servers.port_range = PortRange { min: 30000, max: 30000 };
    assert!(validate_config(&config).is_ok());
}
