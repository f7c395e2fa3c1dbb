//! # esp-sensors
//!
//! The networking core of a sensor node: an MQTT 3.1.1 client written
//! directly against a byte stream, and the session logic a battery-powered
//! device needs on top of it.
//!
//! ## Features
//!
//! - **Wire codec**: CONNECT, PUBLISH, SUBSCRIBE, PINGREQ, DISCONNECT and
//!   their acknowledgements, with the variable-length remaining length.
//! - **Session**: handshake, QoS 0/1 publishing, subscriptions, keepalive and
//!   an inbound poll that tolerates short reads.
//! - **Synchronous reads**: wait a bounded time for a message on a topic.
//! - **Reconnection policy**: exponential backoff that can be persisted.
//! - **Remote configuration**: version-then-data sync of a JSON document.
//! - **Transports**: TCP under the `std` feature, and an in-memory loopback
//!   broker for simulation and tests.
//!
//! The crate is `no_std` unless the `std` feature is enabled and never
//! allocates: topics, payloads and tables use `heapless` collections.
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! esp-sensors = { version = "0.1.0", features = ["std"] }
//! ```
//!
//! ### Reading sensor configuration over MQTT
//!
//! ```rust,no_run
//! # #[cfg(feature = "std")]
//! # fn main() {
//! use esp_sensors::config::DeviceConfig;
//! use esp_sensors::network::application::mqtt::{Client, ConfigSync, SensorReading};
//! use esp_sensors::network::tcp::TcpConnector;
//! use esp_sensors::time::StdClock;
//!
//! let config = DeviceConfig::default();
//! let mut policy = config.mqtt.reconnect;
//! let mut client = Client::new(TcpConnector::new(), config.mqtt.options(), StdClock::new());
//!
//! if client.connect_with_policy(&mut policy).is_ok() {
//!     let reading = SensorReading { temperature: 21.5, humidity: 40.0, uptime: 12, unit: "C" };
//!     let _ = client.publish_reading(config.mqtt.data_prefix(), "dht22", &reading);
//!
//!     if let Some(sync) = ConfigSync::from_config(&config.mqtt) {
//!         let updated = sync.check_config_update(&mut client, config.clone());
//!         // persist `updated` when its version changed
//! #       let _ = updated;
//!     }
//!     client.disconnect();
//! }
//! // persist `policy` so backoff survives a restart
//! # }
//! # #[cfg(not(feature = "std"))]
//! # fn main() {}
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(missing_docs)]
#![warn(missing_debug_implementations)]

/// Device configuration documents.
pub mod config;

/// Transport abstraction and the protocols built on it.
///
/// Holds the byte-stream traits, the TCP and loopback transports and the
/// MQTT session.
pub mod network;

/// Time sources for bounded waits.
pub mod time;
