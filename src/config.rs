//! Device configuration documents.
//!
//! [`DeviceConfig`] is the JSON document a device keeps locally and receives
//! over the remote configuration topics. Its `mqtt` section,
//! [`MqttConfig`], holds everything needed to build a session. Fields
//! missing from a document take their defaults, so an older document still
//! loads.
//!
//! ```rust
//! use esp_sensors::config::DeviceConfig;
//!
//! let json = br#"{
//!     "device_id": "livingroom",
//!     "version": 3,
//!     "mqtt": { "enabled": true, "broker": "10.0.0.2", "username": "" }
//! }"#;
//! let config = DeviceConfig::from_json(json).unwrap();
//! let options = config.mqtt.options();
//! assert_eq!(options.host, "10.0.0.2");
//! assert_eq!(options.username, None);
//! ```

use core::fmt;

use heapless::String;
use serde::{Deserialize, Serialize};

use crate::network::application::mqtt::telemetry::DEFAULT_DATA_PREFIX;
use crate::network::application::mqtt::{
    DEFAULT_ACK_TIMEOUT_MS, Options, ReconnectPolicy, Topic, Versioned,
};

/// Capacity of short identifiers and credentials.
pub const SHORT_STRING_LEN: usize = 64;

/// A short configuration string.
pub type ShortString = String<SHORT_STRING_LEN>;

/// Failure to read or write a configuration document.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// The JSON is malformed or does not match the document layout.
    InvalidJson,
    /// The output buffer is too small for the document.
    BufferTooSmall,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidJson => f.write_str("invalid configuration JSON"),
            ConfigError::BufferTooSmall => f.write_str("configuration buffer too small"),
        }
    }
}

/// The `mqtt` section of the device configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Whether the device talks to a broker at all.
    pub enabled: bool,
    /// Broker host name or address.
    pub broker: ShortString,
    /// Broker port.
    pub port: u16,
    /// MQTT client identifier.
    pub client_id: ShortString,
    /// User name, empty for none.
    pub username: ShortString,
    /// Password, empty for none.
    pub password: ShortString,
    /// Keepalive interval in seconds.
    pub keepalive: u16,
    /// Whether the broker is reached over TLS.
    pub ssl: bool,
    /// Whether to fetch configuration updates from the broker.
    pub load_config_from_mqtt: bool,
    /// Topic announcing the current configuration version.
    pub topic_config_version: Option<Topic>,
    /// Topic carrying the configuration document.
    pub topic_config_data: Option<Topic>,
    /// Prefix of sensor data topics.
    pub topic_data_prefix: Topic,
    /// Wait per configuration topic read, in seconds.
    pub config_wait_time: f32,
    /// Reconnection policy and its persisted state.
    pub reconnect: ReconnectPolicy,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            broker: literal("mqtt.example.com"),
            port: 1883,
            client_id: ShortString::new(),
            username: ShortString::new(),
            password: ShortString::new(),
            keepalive: 60,
            ssl: false,
            load_config_from_mqtt: true,
            topic_config_version: None,
            topic_config_data: None,
            topic_data_prefix: literal(DEFAULT_DATA_PREFIX),
            config_wait_time: 1.0,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl MqttConfig {
    /// Connection parameters for a session. Empty credentials are left out.
    pub fn options(&self) -> Options<'_> {
        Options {
            client_id: &self.client_id,
            host: &self.broker,
            port: self.port,
            username: non_empty(&self.username),
            password: non_empty(&self.password),
            keep_alive_seconds: self.keepalive,
            secure: self.ssl,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
        }
    }

    /// `config_wait_time` in milliseconds; negative or NaN waits are 0.
    pub fn config_wait_ms(&self) -> u32 {
        if self.config_wait_time > 0.0 {
            (self.config_wait_time * 1000.0) as u32
        } else {
            0
        }
    }

    /// The data topic prefix, or the default one when unset.
    pub fn data_prefix(&self) -> &str {
        if self.topic_data_prefix.is_empty() {
            DEFAULT_DATA_PREFIX
        } else {
            self.topic_data_prefix.as_str()
        }
    }
}

/// The device configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Stable device identifier.
    pub device_id: ShortString,
    /// Human readable name.
    pub device_name: ShortString,
    /// Document version; a remote document replaces this one only when newer.
    /// A document without one is version 0.
    #[serde(default)]
    pub version: u32,
    /// Seconds between sensor readings.
    pub update_interval: u32,
    /// Broker settings.
    pub mqtt: MqttConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_id: literal("livingroom"),
            device_name: literal("Wohnzimmer"),
            version: 1,
            update_interval: 60,
            mqtt: MqttConfig::default(),
        }
    }
}

impl DeviceConfig {
    /// Parse a JSON document.
    pub fn from_json(json: &[u8]) -> Result<Self, ConfigError> {
        serde_json_core::from_slice(json)
            .map(|(config, _)| config)
            .map_err(|_| ConfigError::InvalidJson)
    }

    /// Write the document as JSON into `buf`, returning the length written.
    pub fn to_json(&self, buf: &mut [u8]) -> Result<usize, ConfigError> {
        serde_json_core::to_slice(self, buf).map_err(|_| ConfigError::BufferTooSmall)
    }
}

impl Versioned for DeviceConfig {
    fn version(&self) -> u32 {
        self.version
    }
}

fn literal<const N: usize>(s: &str) -> String<N> {
    let mut out = String::new();
    let pushed = out.push_str(s);
    debug_assert!(pushed.is_ok(), "{s:?} exceeds {N} bytes");
    out
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}
