use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::buffer::{Exchange, DEFAULT_INITIAL_CAPACITY, DEFAULT_MAX_CAPACITY};
use crate::device::EnumerationOptions;
use crate::error::{DeviceError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExchangeConfig {
    pub initial_capacity: usize,
    pub max_capacity: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_capacity: DEFAULT_MAX_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnumerationConfig {
    pub include_properties: bool,
    /// Remote machine whose device namespace is enumerated.
    pub host: Option<String>,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            include_properties: true,
            host: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TopologyConfig {
    pub include_volumes: bool,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            include_volumes: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiskweaveConfig {
    pub exchange: ExchangeConfig,
    pub enumeration: EnumerationConfig,
    pub topology: TopologyConfig,
    pub log: LogConfig,
}

impl DiskweaveConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)?;
        let config: DiskweaveConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.exchange.initial_capacity == 0 {
            return Err(DeviceError::Config(
                "exchange.initial_capacity must be greater than zero".to_string(),
            ));
        }
        if self.exchange.max_capacity < self.exchange.initial_capacity {
            return Err(DeviceError::Config(format!(
                "exchange.max_capacity ({}) is below exchange.initial_capacity ({})",
                self.exchange.max_capacity, self.exchange.initial_capacity
            )));
        }
        if let Some(host) = &self.enumeration.host {
            if host.trim().is_empty() {
                return Err(DeviceError::Config(
                    "enumeration.host must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn exchange(&self) -> Exchange {
        Exchange::new(self.exchange.initial_capacity).with_max_capacity(self.exchange.max_capacity)
    }

    pub fn enumeration_options(&self) -> EnumerationOptions {
        EnumerationOptions {
            host: self.enumeration.host.clone(),
            include_properties: self.enumeration.include_properties,
            exchange: self.exchange(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config: DiskweaveConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, DiskweaveConfig::default());
        assert_eq!(config.exchange.initial_capacity, 512);
        assert_eq!(config.exchange.max_capacity, 64 * 1024 * 1024);
        assert!(config.enumeration.include_properties);
        assert!(config.topology.include_volumes);
        assert_eq!(config.log.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: DiskweaveConfig = serde_json::from_str(
            r#"{ "exchange": { "max_capacity": 4096 }, "enumeration": { "host": "srv-02" } }"#,
        )
        .unwrap();
        assert_eq!(config.exchange.initial_capacity, 512);
        assert_eq!(config.exchange().max_capacity(), 4096);
        let options = config.enumeration_options();
        assert_eq!(options.host.as_deref(), Some("srv-02"));
        assert!(options.include_properties);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = serde_json::from_str::<DiskweaveConfig>(r#"{ "exchange": { "initial": 1 } }"#);
        assert!(err.is_err());
    }

    #[test]
    fn validation_rejects_bad_capacities() {
        let mut config = DiskweaveConfig::default();
        config.exchange.initial_capacity = 0;
        assert!(matches!(config.validate(), Err(DeviceError::Config(_))));

        config.exchange.initial_capacity = 1024;
        config.exchange.max_capacity = 512;
        assert!(matches!(config.validate(), Err(DeviceError::Config(_))));

        config.exchange.max_capacity = 1024;
        config.enumeration.host = Some("  ".to_string());
        assert!(matches!(config.validate(), Err(DeviceError::Config(_))));
    }

    #[test]
    fn load_reports_parse_errors() {
        let dir = std::env::temp_dir().join(format!("diskweave-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            DiskweaveConfig::load(&path),
            Err(DeviceError::ConfigParse(_))
        ));

        std::fs::write(&path, r#"{ "log": { "level": "debug" } }"#).unwrap();
        assert_eq!(DiskweaveConfig::load(&path).unwrap().log.level, "debug");

        assert!(matches!(
            DiskweaveConfig::load(dir.join("missing.json")),
            Err(DeviceError::Io(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
