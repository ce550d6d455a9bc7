//! TOML config file loading and validation.
//!
//! Every field has a default, so the node runs out of the box against a
//! local broker with the sim sensors; a missing file is not an error.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub broker: BrokerConfig,
    pub sampling: SamplingConfig,
    pub thresholds: ThresholdConfig,
    pub alarms: AlarmConfig,
    pub pins: PinConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Client id prefix; the full client id is `device_name + device_id`.
    pub device_name: String,
    pub device_id: String,
    /// Prefix every topic with `/<client_id>` so several devices can share
    /// one broker.
    pub unique_topic: bool,
    pub keep_alive_s: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            username: None,
            password: None,
            device_name: "station".to_string(),
            device_id: "0001".to_string(),
            unique_topic: false,
            keep_alive_s: 60,
        }
    }
}

impl BrokerConfig {
    pub fn client_id(&self) -> String {
        format!("{}{}", self.device_name, self.device_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub light_interval_ms: u64,
    pub climate_interval_ms: u64,
    pub rain_interval_ms: u64,
    pub publish_interval_ms: u64,
    /// Sleep quantum between loop passes.
    pub tick_ms: u64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            light_interval_ms: 2000,
            climate_interval_ms: 3000,
            rain_interval_ms: 2000,
            publish_interval_ms: 10_000,
            tick_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub temp_min_c: f32,
    pub temp_max_c: f32,
    pub humidity_min_pct: f32,
    pub humidity_max_pct: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            temp_min_c: 10.0,
            temp_max_c: 35.0,
            humidity_min_pct: 30.0,
            humidity_max_pct: 70.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    pub critical_interval_ms: u64,
    pub rain_interval_ms: u64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            critical_interval_ms: 250,
            rain_interval_ms: 600,
        }
    }
}

/// BCM pin assignments and bus addresses, used by the `gpio` feature.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PinConfig {
    pub red_led: u8,
    pub green_led: u8,
    pub blue_led: u8,
    pub rain_sensor: u8,
    pub climate_sensor: u8,
    pub light_sensor_addr: u16,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            red_led: 13,
            green_led: 11,
            blue_led: 12,
            rain_sensor: 17,
            climate_sensor: 16,
            light_sensor_addr: 0x23,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all entries. Returns `Ok(())` or an error describing every
    /// violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.broker.host.trim().is_empty() {
            errors.push("broker.host is empty".to_string());
        }
        if self.broker.port == 0 {
            errors.push("broker.port must be non-zero".to_string());
        }
        if self.broker.device_name.trim().is_empty() {
            errors.push("broker.device_name is empty".to_string());
        }
        if self.broker.keep_alive_s == 0 {
            errors.push("broker.keep_alive_s must be positive".to_string());
        }

        for (name, value) in [
            ("sampling.light_interval_ms", self.sampling.light_interval_ms),
            (
                "sampling.climate_interval_ms",
                self.sampling.climate_interval_ms,
            ),
            ("sampling.rain_interval_ms", self.sampling.rain_interval_ms),
            (
                "sampling.publish_interval_ms",
                self.sampling.publish_interval_ms,
            ),
            ("sampling.tick_ms", self.sampling.tick_ms),
            ("alarms.critical_interval_ms", self.alarms.critical_interval_ms),
            ("alarms.rain_interval_ms", self.alarms.rain_interval_ms),
        ] {
            if value == 0 {
                errors.push(format!("{name} must be positive"));
            }
        }

        if self.thresholds.temp_min_c >= self.thresholds.temp_max_c {
            errors.push(format!(
                "thresholds: temp_min_c ({}) must be below temp_max_c ({})",
                self.thresholds.temp_min_c, self.thresholds.temp_max_c
            ));
        }
        if self.thresholds.humidity_min_pct >= self.thresholds.humidity_max_pct {
            errors.push(format!(
                "thresholds: humidity_min_pct ({}) must be below humidity_max_pct ({})",
                self.thresholds.humidity_min_pct, self.thresholds.humidity_max_pct
            ));
        }
        for (name, value) in [
            ("humidity_min_pct", self.thresholds.humidity_min_pct),
            ("humidity_max_pct", self.thresholds.humidity_max_pct),
        ] {
            if !(0.0..=100.0).contains(&value) {
                errors.push(format!(
                    "thresholds: {name} {value} out of range [0.0, 100.0]"
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file. A missing file yields the
/// defaults.
pub fn load(path: &str) -> Result<Config> {
    if !Path::new(path).exists() {
        warn!(path, "config file not found, using defaults");
        return Ok(Config::default());
    }
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing -----------------------------------------------------------

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.broker.host, "127.0.0.1");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.sampling.climate_interval_ms, 3000);
        assert_eq!(config.thresholds.temp_max_c, 35.0);
        assert_eq!(config.alarms.critical_interval_ms, 250);
        config.validate().unwrap();
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let config: Config = toml::from_str(
            r#"
[broker]
host = "broker.lan"
username = "station"
password = "secret"
unique_topic = true

[thresholds]
temp_max_c = 40.0
"#,
        )
        .unwrap();
        assert_eq!(config.broker.host, "broker.lan");
        assert_eq!(config.broker.username.as_deref(), Some("station"));
        assert!(config.broker.unique_topic);
        assert_eq!(config.thresholds.temp_max_c, 40.0);
        // Untouched sections keep their defaults.
        assert_eq!(config.sampling.tick_ms, 100);
        assert_eq!(config.pins.red_led, 13);
    }

    #[test]
    fn client_id_concatenates_name_and_id() {
        let broker = BrokerConfig::default();
        assert_eq!(broker.client_id(), "station0001");
    }

    // -- Validation --------------------------------------------------------

    #[test]
    fn default_config_passes() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn empty_host_rejected() {
        let mut cfg = Config::default();
        cfg.broker.host = "  ".to_string();
        assert_validation_err(&cfg, "broker.host is empty");
    }

    #[test]
    fn zero_port_rejected() {
        let mut cfg = Config::default();
        cfg.broker.port = 0;
        assert_validation_err(&cfg, "broker.port");
    }

    #[test]
    fn empty_device_name_rejected() {
        let mut cfg = Config::default();
        cfg.broker.device_name = String::new();
        assert_validation_err(&cfg, "device_name is empty");
    }

    #[test]
    fn zero_interval_rejected() {
        let mut cfg = Config::default();
        cfg.sampling.light_interval_ms = 0;
        assert_validation_err(&cfg, "sampling.light_interval_ms must be positive");
    }

    #[test]
    fn zero_tick_rejected() {
        let mut cfg = Config::default();
        cfg.sampling.tick_ms = 0;
        assert_validation_err(&cfg, "sampling.tick_ms must be positive");
    }

    #[test]
    fn inverted_temperature_thresholds_rejected() {
        let mut cfg = Config::default();
        cfg.thresholds.temp_min_c = 40.0;
        assert_validation_err(&cfg, "temp_min_c");
    }

    #[test]
    fn inverted_humidity_thresholds_rejected() {
        let mut cfg = Config::default();
        cfg.thresholds.humidity_min_pct = 90.0;
        assert_validation_err(&cfg, "humidity_min_pct");
    }

    #[test]
    fn humidity_out_of_range_rejected() {
        let mut cfg = Config::default();
        cfg.thresholds.humidity_max_pct = 140.0;
        assert_validation_err(&cfg, "out of range");
    }

    #[test]
    fn all_violations_reported_together() {
        let mut cfg = Config::default();
        cfg.broker.port = 0;
        cfg.sampling.tick_ms = 0;
        cfg.thresholds.temp_min_c = 99.0;
        let msg = format!("{:#}", cfg.validate().unwrap_err());
        assert!(msg.contains("3 errors"), "got: {msg}");
    }
}
