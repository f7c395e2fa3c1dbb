//! MQTT 3.1.1 client session for sensor nodes.
//!
//! The protocol is spoken directly over any [`Transport`](crate::network::Transport);
//! no external MQTT library is involved. The module is layered bottom-up:
//!
//! - [`codec`]: packet encoding and decoding, no I/O.
//! - [`client`]: the session. Owns the connection, runs the CONNECT/CONNACK
//!   handshake, PUBLISH/PUBACK and SUBSCRIBE/SUBACK exchanges, keepalive
//!   pings and the inbound poll.
//! - [`store`]: most recent payload per topic and the synchronous
//!   [`read_topic`](client::Client::read_topic) built on polling.
//! - [`reconnect`]: exponential backoff between connection attempts.
//! - [`config_sync`]: version-then-data remote configuration protocol.
//! - [`telemetry`]: publishing sensor readings as JSON.
//!
//! Everything is single-threaded and cooperative: every wait is bounded by a
//! timeout measured on the session's [`Clock`](crate::time::Clock), and the
//! `&mut self` API rules out overlapping requests.
//!
//! ```rust,no_run
//! use core::cell::RefCell;
//! use esp_sensors::network::loopback::{LoopbackBroker, LoopbackConnector};
//! use esp_sensors::network::application::mqtt::{Client, Options, QoS};
//! # use esp_sensors::time::Clock;
//! # struct Ticks(u64);
//! # impl Clock for Ticks {
//! #     fn now_ms(&self) -> u64 { self.0 }
//! #     fn unix_time(&self) -> u64 { self.0 / 1000 }
//! #     fn sleep_ms(&mut self, ms: u32) { self.0 += u64::from(ms) }
//! # }
//!
//! let broker = RefCell::new(LoopbackBroker::new());
//! let options = Options::new("livingroom", "mqtt.example.com");
//! let mut client = Client::new(LoopbackConnector::new(&broker), options, Ticks(0));
//!
//! client.connect().unwrap();
//! client.publish("/homecontrol/livingroom/data", b"23.5", false, QoS::AtLeastOnce).unwrap();
//! let version = client.read_topic("/homecontrol/livingroom/config/version", 1_000).unwrap();
//! client.disconnect();
//! ```

/// Session: connection lifecycle and request/response exchanges.
pub mod client;

/// Packet encoding and decoding.
pub mod codec;

/// Remote configuration synchronization.
pub mod config_sync;

/// Error taxonomy.
pub mod error;

/// Reconnection backoff policy.
pub mod reconnect;

/// Message store and synchronous topic reads.
pub mod store;

/// Sensor reading publication.
pub mod telemetry;

pub use client::{Client, Message, Options, SessionState};
pub use codec::QoS;
pub use config_sync::{ConfigSync, ConfigSyncError, ConfigUpdate, Versioned, check_config_update};
pub use error::{ConnectReturnCode, ConnectionError, Error, ProtocolError, Timeout};
pub use reconnect::ReconnectPolicy;
pub use store::MessageStore;
pub use telemetry::SensorReading;

/// Longest topic the session can store or subscribe to, in bytes.
pub const MAX_TOPIC_LEN: usize = 128;

/// Largest application payload the session can send or receive, in bytes.
pub const MAX_PAYLOAD_LEN: usize = 2048;

/// Largest encoded packet: payload, topic and headers.
pub const MAX_PACKET_LEN: usize = MAX_PAYLOAD_LEN + MAX_TOPIC_LEN + 16;

/// Capacity of the message store and the subscription table.
pub const MAX_TOPICS: usize = 8;

/// Default bound on waiting for CONNACK, PUBACK, SUBACK and PINGRESP.
pub const DEFAULT_ACK_TIMEOUT_MS: u32 = 1_000;

/// Receive timeout of a single poll inside `read_topic`.
pub const POLL_SLICE_MS: u32 = 100;

/// Sleep between polls inside `read_topic`.
pub const POLL_INTERVAL_MS: u32 = 100;

/// A topic name.
pub type Topic = heapless::String<MAX_TOPIC_LEN>;

/// An application payload.
pub type Payload = heapless::Vec<u8, MAX_PAYLOAD_LEN>;

/// Copy `topic` into a [`Topic`].
pub fn topic(topic: &str) -> Result<Topic, ProtocolError> {
    Topic::try_from(topic).map_err(|_| ProtocolError::TopicTooLong)
}
