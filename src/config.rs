//! # Configuration Management

//! This module handles the configuration loading for the bisecur2mqtt bridge.
//! It leverages the `config` crate to merge settings from several sources:

//! * YAML configuration files (`default.yaml` plus an optional `development.yaml` / `production.yaml`)
//! * Environment variables prefixed with `APP` (e.g. `APP__GATEWAY__IP`)

//! The core of this module is the `Settings` struct, which encapsulates every setting the bridge needs.

use serde::Deserialize;
use config::{Config, Environment, File};
use std::{env, fmt};
use std::path::{Path, PathBuf};
use std::time::Duration;
use secrecy::{ExposeSecret, Secret};
use tracing::debug;
use url::Url;
use crate::errors::{BridgeError, BridgeResult};

/// Represents the complete set of configuration settings for the bridge.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Settings for the MQTT broker connection and topic layout
    pub mqtt: MqttSettings,
    /// Settings for the BiSecur gateway
    pub gateway: GatewaySettings,
    /// Door ports and tracking timings
    #[serde(default)]
    pub doors: DoorSettings,
    /// Settings for application logging
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Holds the configuration settings required to connect to the MQTT broker.
#[derive(Debug, Deserialize, Clone)]
pub struct MqttSettings {
    /// Hostname, IP address or `mqtt://` / `mqtts://` URL of the broker
    #[serde(default = "default_broker")]
    pub broker: String,
    /// The port number on which the broker is listening
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    /// Client identifier; defaults to `bisecur2mqtt-{pid}`
    pub client_id: Option<String>,
    /// The username for broker authentication
    pub username: Option<String>,
    /// The password for broker authentication
    #[serde(default, deserialize_with = "deserialize_optional_secret")]
    pub password: Option<Secret<String>>,
    /// Whether to connect using TLS
    #[serde(default)]
    pub tls: bool,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    /// Prefix for every topic the bridge publishes or subscribes to
    #[serde(default = "default_topic_base")]
    pub topic_base: String,
    /// Prefix for the Home Assistant discovery topics
    #[serde(default = "default_discovery_topic")]
    pub discovery_topic: String,
    /// Delay before the event loop is polled again after a connection error
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

/// Holds the configuration settings for the BiSecur gateway and its login.
#[derive(Debug, Deserialize, Clone)]
pub struct GatewaySettings {
    /// The IP address of the gateway
    pub ip: Option<String>,
    /// The TCP port of the gateway's MCP service
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// MAC address of the gateway, with or without `:` separators
    pub mac: Option<String>,
    /// MAC address the bridge identifies itself with
    #[serde(default = "default_src_mac")]
    pub src_mac: String,
    /// The gateway user to log in as
    pub user: String,
    /// The password of the gateway user
    #[serde(default, deserialize_with = "deserialize_optional_secret")]
    pub password: Option<Secret<String>>,
    /// The socket timeout (in milliseconds) for a single gateway request
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// The maximum number of attempts for a status read while the session reports an error
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// The delay (in milliseconds) between two status read attempts
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Resolved gateway addressing, with MAC addresses normalized to bare hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayAddress {
    pub ip: String,
    pub port: u16,
    pub mac: String,
    pub src_mac: String,
}

impl GatewaySettings {
    /// Resolves the addressing needed to open a gateway session.
    ///
    /// # Returns
    ///
    /// * `Ok(GatewayAddress)` with `:` separators stripped from both MAC addresses
    /// * `Err(BridgeError::MissingAddressing)` if the IP or the gateway MAC is absent or empty
    pub fn address(&self) -> BridgeResult<GatewayAddress> {
        let ip = self.ip.as_deref().map(str::trim).unwrap_or_default();
        let mac = self.mac.as_deref().map(normalize_mac).unwrap_or_default();
        if ip.is_empty() || mac.is_empty() {
            return Err(BridgeError::MissingAddressing);
        }
        Ok(GatewayAddress {
            ip: ip.to_string(),
            port: self.port,
            mac,
            src_mac: normalize_mac(&self.src_mac),
        })
    }

    pub fn password(&self) -> &str {
        self.password.as_ref().map(|p| p.expose_secret().as_str()).unwrap_or_default()
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Door ports handled by the bridge and the timings of the position tracking loop.
#[derive(Debug, Deserialize, Clone)]
pub struct DoorSettings {
    /// Gateway ports, one per physical door
    #[serde(default = "default_ports")]
    pub ports: Vec<u8>,
    /// Interval between two status reads while a door is tracked
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Granularity of the wait for a superseded tracking task
    #[serde(default = "default_supersede_poll_ms")]
    pub supersede_poll_ms: u64,
    /// Number of waits before a superseded tracking task is abandoned
    #[serde(default = "default_supersede_max_polls")]
    pub supersede_max_polls: u32,
    /// Upper bound on status reads for a door that never settles
    #[serde(default = "default_max_tracking_polls")]
    pub max_tracking_polls: u32,
}

impl Default for DoorSettings {
    fn default() -> Self {
        Self {
            ports: default_ports(),
            poll_interval_ms: default_poll_interval_ms(),
            supersede_poll_ms: default_supersede_poll_ms(),
            supersede_max_polls: default_supersede_max_polls(),
            max_tracking_polls: default_max_tracking_polls(),
        }
    }
}

impl DoorSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn supersede_poll(&self) -> Duration {
        Duration::from_millis(self.supersede_poll_ms)
    }
}

/// Holds the configuration settings for application logging
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingSettings {
    /// The logging level used when `RUST_LOG` is not set (e.g., "info", "debug")
    pub level: Option<String>,
    /// The directory path where log files will be stored (optional)
    pub path: Option<PathBuf>,
}

fn default_broker() -> String { "localhost".to_string() }
fn default_mqtt_port() -> u16 { 1883 }
fn default_keep_alive() -> u64 { 60 }
fn default_topic_base() -> String { "bisecur2mqtt".to_string() }
fn default_discovery_topic() -> String { "homeassistant".to_string() }
fn default_reconnect_delay() -> u64 { 5 }
fn default_gateway_port() -> u16 { 4000 }
fn default_src_mac() -> String { "FF:FF:FF:FF:FF:FF".to_string() }
fn default_timeout_ms() -> u64 { 5000 }
fn default_max_retries() -> u32 { 5 }
fn default_retry_delay_ms() -> u64 { 800 }
fn default_ports() -> Vec<u8> { vec![0, 1] }
fn default_poll_interval_ms() -> u64 { 2000 }
fn default_supersede_poll_ms() -> u64 { 500 }
fn default_supersede_max_polls() -> u32 { 15 }
fn default_max_tracking_polls() -> u32 { 150 }

/// Strips `:` separators and surrounding whitespace from a MAC address.
pub fn normalize_mac(mac: &str) -> String {
    mac.trim().replace(':', "")
}

impl MqttSettings {
    /// Resolves the broker host, port and TLS flag.
    ///
    /// A plain hostname is combined with `port` and `tls`. A URL (`mqtt://host:1883`,
    /// `mqtts://host`) overrides both, with `mqtts`/`ssl` schemes enabling TLS.
    pub fn endpoint(&self) -> BridgeResult<(String, u16, bool)> {
        if !self.broker.contains("://") {
            return Ok((self.broker.clone(), self.port, self.tls));
        }
        let url = Url::parse(&self.broker)
            .map_err(|e| BridgeError::ConfigError(format!("Invalid MQTT broker URL '{}': {}", self.broker, e)))?;
        let tls = matches!(url.scheme(), "mqtts" | "ssl");
        let host = url.host_str()
            .ok_or_else(|| BridgeError::ConfigError(format!("MQTT broker URL '{}' has no host", self.broker)))?
            .to_string();
        let port = url.port().unwrap_or(if tls { 8883 } else { self.port });
        Ok((host, port, tls || self.tls))
    }

    pub fn client_id(&self) -> String {
        self.client_id.clone()
            .unwrap_or_else(|| format!("bisecur2mqtt-{}", std::process::id()))
    }

    pub fn credentials(&self) -> Option<(String, String)> {
        self.username.as_ref().map(|user| {
            let password = self.password.as_ref()
                .map(|p| p.expose_secret().clone())
                .unwrap_or_default();
            (user.clone(), password)
        })
    }
}

/// # Settings Initialization
impl Settings {
    /// Loads and constructs the application settings from various configuration sources.
    ///
    /// This function reads configuration settings from the following sources, in order of precedence:
    ///
    /// 1. `default.yaml`: Contains default settings for the application
    /// 2. Environment-specific YAML file (e.g., `development.yaml` or `production.yaml`) based on the `RUN_MODE` environment variable
    /// 3. Environment variables prefixed with `APP` (e.g., `APP__GATEWAY__IP`)
    ///
    /// The `CONFIG_DIR` environment variable can be used to specify the directory where the YAML configuration files are located (defaults to "config").
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)`: If the settings were loaded and constructed successfully
    /// * `Err(BridgeError)`: If there was an error during the loading or construction process
    pub fn new() -> Result<Self, BridgeError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let config_dir = env::var("CONFIG_DIR").unwrap_or_else(|_| "config".into());
        debug!("Run Mode: {:?}, Config Dir: {:?}", run_mode, config_dir);
        Self::from_dir(Path::new(&config_dir), &run_mode)
    }

    /// Loads the settings from an explicit configuration directory and run mode.
    pub fn from_dir(config_dir: &Path, run_mode: &str) -> Result<Self, BridgeError> {
        let s = Config::builder()
            .add_source(File::with_name(&config_dir.join("default").to_string_lossy()))
            .add_source(File::with_name(&config_dir.join(run_mode).to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        let mut s: Self = s.try_deserialize::<Settings>()
            .map_err(BridgeError::from)?;

        if let Some(ref mut path) = s.logging.path {
            if path.is_relative() {
                *path = env::current_dir()?.join(path.clone());
            }
        }

        Ok(s)
    }
}

/// Deserializes an optional secret string from configuration into a `Secret<String>`
fn deserialize_optional_secret<'de, D>(deserializer: D) -> Result<Option<Secret<String>>, D::Error>
    where
        D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.map(Secret::new))
}

impl fmt::Display for GatewaySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GatewaySettings {{ ip: {:?}, port: {}, mac: {:?}, src_mac: {}, user: {}, timeout_ms: {}, max_retries: {} }}",
            self.ip, self.port, self.mac, self.src_mac, self.user, self.timeout_ms, self.max_retries
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway(ip: Option<&str>, mac: Option<&str>) -> GatewaySettings {
        GatewaySettings {
            ip: ip.map(String::from),
            port: 4000,
            mac: mac.map(String::from),
            src_mac: "FF:FF:FF:FF:FF:FF".to_string(),
            user: "admin".to_string(),
            password: None,
            timeout_ms: 5000,
            max_retries: 5,
            retry_delay_ms: 800,
        }
    }

    #[test]
    fn address_normalizes_mac_addresses() {
        let address = gateway(Some("192.168.1.20"), Some("54:10:EC:00:11:22")).address().unwrap();
        assert_eq!(address.ip, "192.168.1.20");
        assert_eq!(address.mac, "5410EC001122");
        assert_eq!(address.src_mac, "FFFFFFFFFFFF");
    }

    #[test]
    fn address_requires_ip_and_mac() {
        assert!(matches!(gateway(None, Some("5410EC001122")).address(), Err(BridgeError::MissingAddressing)));
        assert!(matches!(gateway(Some("10.0.0.2"), None).address(), Err(BridgeError::MissingAddressing)));
        assert!(matches!(gateway(Some(" "), Some("aa")).address(), Err(BridgeError::MissingAddressing)));
    }

    #[test]
    fn broker_url_overrides_port_and_tls() {
        let mut mqtt = MqttSettings {
            broker: "mqtts://broker.local".to_string(),
            port: 1883,
            client_id: None,
            username: None,
            password: None,
            tls: false,
            keep_alive_secs: 60,
            topic_base: "bisecur2mqtt".to_string(),
            discovery_topic: "homeassistant".to_string(),
            reconnect_delay_secs: 5,
        };
        assert_eq!(mqtt.endpoint().unwrap(), ("broker.local".to_string(), 8883, true));

        mqtt.broker = "mqtt://10.1.1.1:1884".to_string();
        assert_eq!(mqtt.endpoint().unwrap(), ("10.1.1.1".to_string(), 1884, false));

        mqtt.broker = "localhost".to_string();
        assert_eq!(mqtt.endpoint().unwrap(), ("localhost".to_string(), 1883, false));
    }

    #[test]
    fn settings_load_from_yaml_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.yaml"),
            "mqtt:\n  broker: broker.local\n  topic_base: garage\ngateway:\n  ip: 192.168.1.20\n  mac: \"54:10:EC:00:11:22\"\n  user: admin\n  password: secret\n",
        ).unwrap();

        let settings = Settings::from_dir(dir.path(), "test").unwrap();
        assert_eq!(settings.mqtt.broker, "broker.local");
        assert_eq!(settings.mqtt.topic_base, "garage");
        assert_eq!(settings.mqtt.discovery_topic, "homeassistant");
        assert_eq!(settings.gateway.password(), "secret");
        assert_eq!(settings.gateway.max_retries, 5);
        assert_eq!(settings.doors.ports, vec![0, 1]);
        assert_eq!(settings.doors.supersede_max_polls, 15);
    }
}
