use std::path::{Path, PathBuf};

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};

use sa_common::tracing::TracingSettings;

pub const CONFIG_FILE_NAME: &str = "sa.config";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SaConfig {
    /// follow park blockers to ownable synchronizers
    pub concurrent_locks: bool,
    pub log_level: String,
    pub tracing: TracingSettings,
    pub print_java_stacks_for_deadlocks: bool,
}

impl Default for SaConfig {
    fn default() -> Self {
        Self {
            concurrent_locks: true,
            log_level: "warn".to_string(),
            tracing: TracingSettings::disabled(),
            print_java_stacks_for_deadlocks: true,
        }
    }
}

pub fn default_config_path(working_dir: &Path) -> PathBuf {
    working_dir.join(CONFIG_FILE_NAME)
}

pub fn load_config(config_path: &Path) -> anyhow::Result<Option<SaConfig>> {
    if config_path.exists() {
        let config_string = std::fs::read_to_string(config_path)?;
        return Ok(Some(ron::from_str(config_string.as_str())?));
    }
    Ok(None)
}

pub fn load_config_or_default(config_path: &Path) -> anyhow::Result<SaConfig> {
    Ok(load_config(config_path)?.unwrap_or_default())
}

pub fn load_or_create_config(config_path: &Path) -> anyhow::Result<SaConfig> {
    match load_config(config_path)? {
        None => {
            let config = SaConfig::default();
            write_config(config_path, &config)?;
            Ok(config)
        }
        Some(config) => Ok(config),
    }
}

pub fn write_config(config_path: &Path, config: &SaConfig) -> anyhow::Result<()> {
    std::fs::write(config_path, ron::ser::to_string_pretty(config, PrettyConfig::default())?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::config::SaConfig;

    #[test]
    fn missing_fields_take_defaults() {
        let config: SaConfig = ron::from_str("(concurrent_locks: false)").unwrap();
        assert!(!config.concurrent_locks);
        assert_eq!(config.log_level, "warn");
        assert!(config.print_java_stacks_for_deadlocks);
        assert!(!config.tracing.trace_stack_walk);
    }

    #[test]
    fn tracing_flags_are_read_individually() {
        let config: SaConfig = ron::from_str("(tracing: (trace_deadlock_search: true))").unwrap();
        assert!(config.tracing.trace_deadlock_search);
        assert!(!config.tracing.trace_vframe_creation);
        assert!(config.concurrent_locks);
    }
}
