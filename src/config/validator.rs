use crate::config::{Config, JvmConfig, PortRange};
use crate::error::{Error, Result};

/// Validates the port range
pub fn validate_port_range(range: &PortRange) -> Result<()> {
    if range.min == 0 {
        return Err(Error::ConfigInvalid("Port range must start above 0".to_string()));
    }

    if range.min > range.max {
        return Err(Error::ConfigInvalid(format!(
            "Port range {}-{} is inverted",
            range.min, range.max
        )));
    }

    Ok(())
}

/// Validates the launch settings
pub fn validate_jvm_config(jvm: &JvmConfig) -> Result<()> {
    match &jvm.command {
        Some(command) if command.is_empty() || command[0].trim().is_empty() => Err(
            Error::ConfigInvalid("Launch command override is empty".to_string()),
        ),
        Some(_) => Ok(()),
        None if jvm.java_path.trim().is_empty() => {
            Err(Error::ConfigInvalid("java_path is empty".to_string()))
        }
        None => Ok(()),
    }
}

/// Full configuration validation
pub fn validate_config(config: &Config) -> Result<()> {
    validate_port_range(&config.servers.port_range)?;

    if config.servers.max_concurrent == 0 {
        return Err(Error::ConfigInvalid("max_concurrent must be at least 1".to_string()));
    }

    if config.servers.default_memory == 0 {
        return Err(Error::ConfigInvalid("default_memory must be positive".to_string()));
    }

    validate_jvm_config(&config.jvm)?;

    if config.monitoring.check_interval_ms == 0 {
        return Err(Error::ConfigInvalid(
            "check_interval_ms must be positive".to_string(),
        ));
    }

    if !config.artifacts.version_url.contains("{version}") {
        return Err(Error::ConfigInvalid(
            "version_url must contain a {version} placeholder".to_string(),
        ));
    }

    Ok(())
}
