use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::MeterModel;
use crate::telemetry::utils::{ENC_KEY_LEN, MAC_KEY_LEN};
use crate::telemetry::TelemetryKeys;

pub const CONFIG_ENV: &str = "PM_CONFIG";
const CONFIG_PATHS: [&str; 2] = ["config/power-meter.yaml", "power-meter.yaml"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read {0}: {1}")]
    Io(String, std::io::Error),
    #[error("Unable to parse config: {0}")]
    Yaml(#[from] serde_yml::Error),
    #[error("No config file found, tried {0}")]
    NotFound(String),
    #[error("Invalid {name}: {reason}")]
    Key { name: &'static str, reason: String },
}

fn meter_address_default() -> u8 { return 1 }
fn meter_password_default() -> u32 { return 0 }
fn meter_reset_energy_default() -> bool { return false }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct MeterConfig {
    pub model: MeterModel,
    /// Modbus unit id
    #[serde(default="meter_address_default")]
    pub address: u8,
    #[serde(default="meter_password_default")]
    pub password: u32,
    /// For meters that cannot report one
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default="meter_reset_energy_default")]
    pub reset_energy_on_start: bool,
}

fn bus_timeout_ms_default() -> u64 { return 1000 }

/// Modbus RTU framing tunnelled through a TCP serial server.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BusConfig {
    pub host: String,
    pub port: u16,
    #[serde(default="bus_timeout_ms_default")]
    pub timeout_ms: u64,
}

fn telemetry_port_default() -> u16 { return 16021 }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct TelemetryConfig {
    pub host: String,
    #[serde(default="telemetry_port_default")]
    pub port: u16,
    #[serde(default="telemetry_port_default")]
    pub bind_port: u16,
    /// 32 hex digits
    pub enc_key: String,
    /// 64 hex digits
    pub mac_key: String,
}

fn status_enabled_default() -> bool { return true }
fn status_group_default() -> Ipv4Addr { return Ipv4Addr::new(239, 192, 160, 217) }
fn status_port_default() -> u16 { return 16021 }
fn status_ttl_default() -> u32 { return 1 }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct StatusConfig {
    #[serde(default="status_enabled_default")]
    pub enabled: bool,
    #[serde(default="status_group_default")]
    pub group: Ipv4Addr,
    #[serde(default="status_port_default")]
    pub port: u16,
    #[serde(default="status_ttl_default")]
    pub ttl: u32,
}

fn status_default() -> StatusConfig {
    return StatusConfig {
        enabled: status_enabled_default(),
        group: status_group_default(),
        port: status_port_default(),
        ttl: status_ttl_default(),
    };
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    pub meter: MeterConfig,
    pub bus: BusConfig,
    pub telemetry: TelemetryConfig,
    #[serde(default="status_default")]
    pub status: StatusConfig,
}

fn decode_key<const N: usize>(name: &'static str, text: &str) -> Result<[u8; N], ConfigError> {
    let bytes = hex::decode(text.trim()).map_err(|e| ConfigError::Key { name, reason: e.to_string() })?;

    return <[u8; N]>::try_from(bytes.as_slice()).map_err(|_| ConfigError::Key {
        name,
        reason: format!("expected {} bytes, got {}", N, bytes.len()),
    });
}

impl TelemetryConfig {
    pub fn keys(&self) -> Result<TelemetryKeys, ConfigError> {
        return Ok(TelemetryKeys {
            enc_key: decode_key::<ENC_KEY_LEN>("enc_key", &self.enc_key)?,
            mac_key: decode_key::<MAC_KEY_LEN>("mac_key", &self.mac_key)?,
        });
    }
}

impl Config {
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yml::from_str(contents)?;

        /* fail on bad keys now rather than on the first transmission */
        config.telemetry.keys()?;
        return Ok(config);
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
        debug!("Parsing config {}", path.display());
        return Config::parse(&contents);
    }

    /// Load from `$PM_CONFIG`, or the first of the default locations that exists.
    pub fn load() -> Result<Self, ConfigError> {
        let candidates: Vec<PathBuf> = match std::env::var(CONFIG_ENV) {
            Ok(path) => vec![PathBuf::from(path)],
            Err(_) => CONFIG_PATHS.iter().map(PathBuf::from).collect(),
        };

        for path in candidates.iter() {
            if path.exists() {
                info!("Using config {}", path.display());
                return Config::from_file(path);
            }
        }

        let tried: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
        return Err(ConfigError::NotFound(tried.join(", ")));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = "
meter:
  model: Pzem004t100A
bus:
  host: 192.168.1.20
  port: 4001
telemetry:
  host: collector.example.org
  enc_key: 000102030405060708090a0b0c0d0e0f
  mac_key: a0a1a2a3a4a5a6a7a8a9aaabacadaeafb0b1b2b3b4b5b6b7b8b9babbbcbdbebf
";

    #[test]
    fn test_defaults() {
        let config = Config::parse(MINIMAL).unwrap();

        assert_eq!(config.meter.model, MeterModel::Pzem004t100A);
        assert_eq!(config.meter.address, 1);
        assert_eq!(config.meter.password, 0);
        assert_eq!(config.meter.serial_number, None);
        assert!(!config.meter.reset_energy_on_start);
        assert_eq!(config.bus.timeout_ms, 1000);
        assert_eq!(config.telemetry.port, 16021);
        assert_eq!(config.telemetry.bind_port, 16021);
        assert_eq!(config.status, status_default());
        assert_eq!(config.status.group, Ipv4Addr::new(239, 192, 160, 217));

        let keys = config.telemetry.keys().unwrap();
        assert_eq!(keys.enc_key[15], 0x0f);
        assert_eq!(keys.mac_key[0], 0xa0);
        assert_eq!(keys.mac_key[31], 0xbf);
    }

    #[test]
    fn test_full() {
        let config = Config::parse("
meter:
  model: RiD1980C
  address: 7
  password: 12345678
  reset_energy_on_start: true
bus:
  host: ttyd.local
  port: 502
  timeout_ms: 250
telemetry:
  host: 10.0.0.1
  port: 1234
  bind_port: 0
  enc_key: 000102030405060708090A0B0C0D0E0F
  mac_key: a0a1a2a3a4a5a6a7a8a9aaabacadaeafb0b1b2b3b4b5b6b7b8b9babbbcbdbebf
status:
  enabled: false
  group: 239.1.2.3
  ttl: 4
").unwrap();

        assert_eq!(config.meter.model, MeterModel::RiD1980C);
        assert_eq!(config.meter.address, 7);
        assert_eq!(config.meter.password, 12345678);
        assert!(config.meter.reset_energy_on_start);
        assert_eq!(config.bus.timeout_ms, 250);
        assert_eq!(config.telemetry.bind_port, 0);
        assert!(!config.status.enabled);
        assert_eq!(config.status.group, Ipv4Addr::new(239, 1, 2, 3));
        assert_eq!(config.status.port, 16021);
        assert_eq!(config.status.ttl, 4);
    }

    #[test]
    fn test_bad_keys() {
        let short = MINIMAL.replace("0e0f\n", "0e\n");
        assert!(matches!(Config::parse(&short), Err(ConfigError::Key { name: "enc_key", .. })));

        let not_hex = MINIMAL.replace("mac_key: a0", "mac_key: zz");
        assert!(matches!(Config::parse(&not_hex), Err(ConfigError::Key { name: "mac_key", .. })));
    }

    #[test]
    fn test_missing_section() {
        assert!(matches!(Config::parse("meter:\n  model: RiD1980C\n"), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.bus.host, "192.168.1.20");
        assert_eq!(config.bus.port, 4001);

        let missing = file.path().with_extension("missing");
        assert!(matches!(Config::from_file(&missing), Err(ConfigError::Io(_, _))));
    }
}
