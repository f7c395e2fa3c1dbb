//! # Application Layer Protocols
//!
//! Protocols spoken over the transport traits of [`network`](crate::network).
//! They never open sockets themselves: a connector chosen by the caller hands
//! them a byte stream, so the same code runs over TCP, a platform TLS stream
//! or the in-memory loopback broker.
//!
//! - **[`mqtt`]**: MQTT 3.1.1 session with synchronous topic reads,
//!   reconnection backoff and remote configuration sync.

/// MQTT client implementation.
///
/// Provides an MQTT 3.1.1 session for lightweight publish-subscribe messaging
/// between sensor nodes and a broker.
pub mod mqtt;
