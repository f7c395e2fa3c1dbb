//! MQTT 3.1.1 session over a byte stream.
//!
//! A [`Client`] owns a connector, chosen at construction, and at most one
//! open connection. It drives the CONNECT/CONNACK handshake, PUBLISH/PUBACK
//! and SUBSCRIBE/SUBACK exchanges, keepalive pings and the inbound poll.
//!
//! # Receiving
//!
//! Inbound bytes are framed in a fixed receive buffer. A short read is not an
//! error: the partial packet stays buffered until the rest arrives. A packet
//! larger than the buffer is skipped byte for byte and reported as
//! [`ProtocolError::PacketTooLarge`], so the stream stays in sync.
//!
//! PUBLISH packets that arrive while the session waits for an acknowledgement
//! are recorded in the message store and acknowledged as usual.
//!
//! # Failure handling
//!
//! Every transport failure releases the connection and moves the session to
//! [`SessionState::Disconnected`], so later calls fail fast with
//! [`ConnectionError::NotConnected`] until [`Client::connect`] succeeds again.
//!
//! # Examples
//!
//! ```rust,no_run
//! use core::cell::RefCell;
//! use esp_sensors::network::application::mqtt::{Client, Options, QoS};
//! use esp_sensors::network::loopback::{LoopbackBroker, LoopbackConnector};
//! # use esp_sensors::time::Clock;
//! # struct Ticks(u64);
//! # impl Clock for Ticks {
//! #     fn now_ms(&self) -> u64 { self.0 }
//! #     fn unix_time(&self) -> u64 { self.0 / 1000 }
//! #     fn sleep_ms(&mut self, ms: u32) { self.0 += u64::from(ms) }
//! # }
//!
//! let broker = RefCell::new(LoopbackBroker::new());
//! let options = Options {
//!     username: Some("sensor"),
//!     password: Some("secret"),
//!     keep_alive_seconds: 120,
//!     ..Options::new("weather_station", "localhost")
//! };
//! let mut client = Client::new(LoopbackConnector::new(&broker), options, Ticks(0));
//!
//! client.connect().unwrap();
//! client.subscribe("commands/weather_station", QoS::AtLeastOnce).unwrap();
//! while let Ok(Some(message)) = client.poll_incoming(100) {
//!     // handle message.topic / message.payload
//! #   let _ = message;
//! }
//! ```

use core::fmt::{self, Write as _};

use heapless::{FnvIndexMap, String, Vec};
use log::{debug, info, warn};

use super::codec::{self, FixedHeader, PacketIds, QoS};
use super::error::{ConnectReturnCode, ConnectionError, Error, ProtocolError, Timeout};
use super::store::MessageStore;
use super::{DEFAULT_ACK_TIMEOUT_MS, MAX_PACKET_LEN, MAX_TOPICS, Payload, Topic};
use crate::network::error::Error as NetworkError;
use crate::network::{Close, Connect, Read, ReadTimeout, Transport, write_all};
use crate::time::Clock;

/// Receive buffer size; inbound packets larger than this are discarded.
const RX_LEN: usize = MAX_PACKET_LEN;

/// Bytes requested from the transport per read.
const READ_CHUNK: usize = 256;

/// Capacity of the `host:port` string handed to the connector.
const REMOTE_LEN: usize = 96;

/// Default MQTT port without TLS.
pub const DEFAULT_PORT: u16 = 1883;

/// Connection parameters. Fixed for the lifetime of a [`Client`].
///
/// ```rust
/// use esp_sensors::network::application::mqtt::Options;
///
/// let options = Options {
///     port: 8883,
///     secure: true,
///     ..Options::new("my_iot_device", "broker.local")
/// };
/// assert_eq!(options.keep_alive_seconds, 60);
/// assert_eq!(options.username, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options<'a> {
    /// The client identifier, must be unique within the broker.
    pub client_id: &'a str,
    /// Broker host name or address.
    pub host: &'a str,
    /// Broker port.
    pub port: u16,
    /// Optional user name, sent in CONNECT when present.
    pub username: Option<&'a str>,
    /// Optional password, sent in CONNECT when present.
    pub password: Option<&'a str>,
    /// Keepalive interval in seconds. 0 disables keepalive pings.
    pub keep_alive_seconds: u16,
    /// Whether the transport is secured.
    ///
    /// Informational: the connector handed to [`Client::new`] decides the
    /// actual transport.
    pub secure: bool,
    /// Bound on waiting for CONNACK, PUBACK, SUBACK and PINGRESP.
    pub ack_timeout_ms: u32,
}

impl<'a> Options<'a> {
    /// Options with no credentials, port 1883 and a 60 second keepalive.
    pub fn new(client_id: &'a str, host: &'a str) -> Self {
        Self {
            client_id,
            host,
            port: DEFAULT_PORT,
            username: None,
            password: None,
            keep_alive_seconds: 60,
            secure: false,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
        }
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    /// No connection. Initial state, and the state after any failure.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// CONNACK accepted.
    Connected,
}

/// An application message received from the broker.
///
/// ```rust
/// use esp_sensors::network::application::mqtt::{Message, topic};
/// use heapless::Vec;
///
/// let message = Message {
///     topic: topic("sensors/temperature").unwrap(),
///     payload: Vec::from_slice(b"23.5").unwrap(),
/// };
/// assert_eq!(message.topic.as_str(), "sensors/temperature");
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Message {
    /// The topic the message was published on.
    pub topic: Topic,
    /// The message payload.
    pub payload: Payload,
}

/// A decoded inbound packet, detached from the receive buffer.
#[derive(Debug)]
enum Inbound {
    ConnAck(Option<ConnectReturnCode>),
    Publish {
        message: Message,
        packet_id: Option<u16>,
    },
    PubAck(u16),
    SubAck {
        packet_id: u16,
        code: u8,
    },
    PingResp,
    Other(u8),
}

impl Inbound {
    fn header(&self) -> u8 {
        match self {
            Inbound::ConnAck(_) => codec::CONNACK,
            Inbound::Publish { .. } => codec::PUBLISH,
            Inbound::PubAck(_) => codec::PUBACK,
            Inbound::SubAck { .. } => codec::SUBACK,
            Inbound::PingResp => codec::PINGRESP,
            Inbound::Other(header) => *header,
        }
    }
}

/// An MQTT 3.1.1 session.
///
/// # Type Parameters
///
/// * `N` - The connector used to open the byte stream
/// * `K` - The clock every bounded wait is measured on
pub struct Client<'a, N, K>
where
    N: Connect<Error = NetworkError>,
    N::Connection: Transport,
    K: Clock,
{
    connector: N,
    clock: K,
    options: Options<'a>,
    connection: Option<N::Connection>,
    state: SessionState,
    packet_ids: PacketIds,
    last_activity_ms: u64,
    subscriptions: FnvIndexMap<Topic, QoS, MAX_TOPICS>,
    pub(crate) store: MessageStore,
    rx: Vec<u8, RX_LEN>,
    discard: usize,
}

impl<N, K> fmt::Debug for Client<'_, N, K>
where
    N: Connect<Error = NetworkError>,
    N::Connection: Transport,
    K: Clock,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("options", &self.options)
            .field("state", &self.state)
            .field("packet_ids", &self.packet_ids)
            .field("subscriptions", &self.subscriptions.len())
            .field("buffered", &self.rx.len())
            .finish()
    }
}

impl<'a, N, K> Client<'a, N, K>
where
    N: Connect<Error = NetworkError>,
    N::Connection: Transport,
    K: Clock,
{
    /// Create a disconnected session. No I/O happens until [`connect`](Self::connect).
    pub fn new(connector: N, options: Options<'a>, clock: K) -> Self {
        Self {
            connector,
            clock,
            options,
            connection: None,
            state: SessionState::Disconnected,
            packet_ids: PacketIds::new(),
            last_activity_ms: 0,
            subscriptions: FnvIndexMap::new(),
            store: MessageStore::new(),
            rx: Vec::new(),
            discard: 0,
        }
    }

    /// The connection parameters.
    pub fn options(&self) -> &Options<'a> {
        &self.options
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session is `Connected`.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected && self.connection.is_some()
    }

    /// The most recently allocated packet identifier (0 before the first).
    pub fn last_packet_id(&self) -> u16 {
        self.packet_ids.last()
    }

    /// The session clock.
    pub fn clock(&self) -> &K {
        &self.clock
    }

    /// The session clock, mutably.
    pub fn clock_mut(&mut self) -> &mut K {
        &mut self.clock
    }

    /// The connector.
    pub fn connector(&self) -> &N {
        &self.connector
    }

    /// Whether a SUBACK confirmed `topic` during the current connection.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        Topic::try_from(topic).is_ok_and(|key| self.subscriptions.contains_key(&key))
    }

    /// Confirmed subscriptions with their requested QoS.
    pub fn subscriptions(&self) -> impl Iterator<Item = (&str, QoS)> + '_ {
        self.subscriptions
            .iter()
            .map(|(topic, qos)| (topic.as_str(), *qos))
    }

    /// Most recent payloads received per topic.
    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    /// Open the byte stream and perform the CONNECT/CONNACK handshake.
    ///
    /// An existing connection is released first. The session is clean: no
    /// subscription survives a reconnect.
    ///
    /// # Errors
    ///
    /// * [`ConnectionError::Network`] - The stream could not be opened or written
    /// * [`ConnectionError::ConnackTimeout`] - No CONNACK within the ack timeout
    /// * [`ConnectionError::UnexpectedPacket`] - The broker answered with another packet
    /// * [`ConnectionError::Refused`] - The CONNACK carried a refusal code
    /// * [`Error::Protocol`] - The CONNECT could not be encoded or the CONNACK is malformed
    ///
    /// The session is `Disconnected` after any error.
    pub fn connect(&mut self) -> Result<(), Error> {
        if self.connection.is_some() {
            self.drop_connection();
        }

        let mut remote: String<REMOTE_LEN> = String::new();
        write!(remote, "{}:{}", self.options.host, self.options.port)
            .map_err(|_| ConnectionError::Network(NetworkError::InvalidAddress))?;

        self.state = SessionState::Connecting;
        info!(
            "connecting to {} as {} (secure: {})",
            remote, self.options.client_id, self.options.secure
        );
        let connection = match self.connector.connect(&remote) {
            Ok(connection) => connection,
            Err(e) => {
                warn!("unable to open {}: {}", remote, e);
                self.state = SessionState::Disconnected;
                return Err(ConnectionError::Network(e).into());
            }
        };
        self.connection = Some(connection);
        self.rx.clear();
        self.discard = 0;

        match self.handshake() {
            Ok(()) => {
                self.state = SessionState::Connected;
                self.last_activity_ms = self.clock.now_ms();
                info!("connected to {}", remote);
                Ok(())
            }
            Err(e) => {
                warn!("connect to {} failed: {}", remote, e);
                self.drop_connection();
                Err(e)
            }
        }
    }

    fn handshake(&mut self) -> Result<(), Error> {
        let packet = codec::encode_connect(&self.options)?;
        self.send(&packet)?;
        match self.recv_packet(self.options.ack_timeout_ms)? {
            Some(Inbound::ConnAck(None)) => Ok(()),
            Some(Inbound::ConnAck(Some(code))) => Err(ConnectionError::Refused(code).into()),
            Some(other) => Err(ConnectionError::UnexpectedPacket {
                expected: codec::CONNACK,
                received: other.header(),
            }
            .into()),
            None => Err(ConnectionError::ConnackTimeout.into()),
        }
    }

    /// Send DISCONNECT if connected, then release the stream.
    ///
    /// Send failures are ignored. The session is always `Disconnected` afterwards.
    pub fn disconnect(&mut self) {
        if self.is_connected() {
            if let Some(connection) = self.connection.as_mut() {
                if let Err(e) = write_all(connection, &codec::DISCONNECT_PACKET) {
                    debug!("DISCONNECT not sent: {}", e);
                }
            }
            info!("disconnected from {}", self.options.host);
        }
        self.drop_connection();
    }

    /// Send PINGREQ and wait for PINGRESP.
    ///
    /// # Errors
    ///
    /// * [`Timeout::PingResp`] - No answer in time; the connection is kept
    /// * [`ConnectionError::UnexpectedPacket`] - Another packet type answered;
    ///   the session is `Disconnected`
    pub fn ping(&mut self) -> Result<(), Error> {
        self.ensure_connected()?;
        self.send(&codec::PINGREQ_PACKET)?;
        match self.await_ack()? {
            Some(Inbound::PingResp) => {
                debug!("PINGRESP received");
                Ok(())
            }
            Some(other) => {
                let received = other.header();
                warn!("expected PINGRESP, got {:#04x}; dropping connection", received);
                self.drop_connection();
                Err(ConnectionError::UnexpectedPacket {
                    expected: codec::PINGRESP,
                    received,
                }
                .into())
            }
            None => {
                warn!("no PINGRESP within {} ms", self.options.ack_timeout_ms);
                Err(Timeout::PingResp.into())
            }
        }
    }

    /// Ping if nothing was sent for longer than the keepalive interval.
    ///
    /// A ping timeout is logged and swallowed.
    pub fn keep_alive(&mut self) -> Result<(), Error> {
        self.ensure_connected()?;
        let interval = u64::from(self.options.keep_alive_seconds) * 1000;
        let idle = self.clock.now_ms().saturating_sub(self.last_activity_ms);
        if interval == 0 || idle <= interval {
            return Ok(());
        }
        debug!("idle for {} ms, pinging", idle);
        match self.ping() {
            Err(Error::Timeout(_)) => Ok(()),
            other => other,
        }
    }

    /// Publish `payload` to `topic`.
    ///
    /// For [`QoS::AtLeastOnce`] this waits for the matching PUBACK. A missing
    /// or mismatched PUBACK is reported but keeps the connection, so the
    /// caller may retry.
    pub fn publish(&mut self, topic: &str, payload: &[u8], retain: bool, qos: QoS) -> Result<(), Error> {
        self.ensure_connected()?;
        self.keep_alive()?;

        let packet_id = match qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce => Some(self.packet_ids.next_id()),
        };
        let packet = codec::encode_publish(topic, payload, retain, qos, packet_id)?;
        self.send(&packet)?;
        debug!("PUBLISH {} ({} bytes, {:?})", topic, payload.len(), qos);

        let Some(expected) = packet_id else {
            return Ok(());
        };
        match self.await_ack()? {
            Some(Inbound::PubAck(received)) if received == expected => Ok(()),
            Some(Inbound::PubAck(received)) => {
                warn!("PUBACK for {} while waiting for {}", received, expected);
                Err(ProtocolError::PacketIdMismatch { expected, received }.into())
            }
            Some(other) => Err(ProtocolError::UnexpectedPacket(other.header()).into()),
            None => {
                warn!("no PUBACK for {} on {}", expected, topic);
                Err(Timeout::PubAck.into())
            }
        }
    }

    /// Subscribe to `topic` and wait for the SUBACK.
    ///
    /// The topic is added to the subscription table only once the SUBACK
    /// confirms it.
    pub fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), Error> {
        self.ensure_connected()?;
        self.keep_alive()?;

        let key = super::topic(topic)?;
        if !self.subscriptions.contains_key(&key) && self.subscriptions.len() == MAX_TOPICS {
            return Err(ProtocolError::BufferOverflow.into());
        }

        let packet_id = self.packet_ids.next_id();
        let packet = codec::encode_subscribe(topic, qos, packet_id)?;
        self.send(&packet)?;
        debug!("SUBSCRIBE {} ({:?}, id {})", topic, qos, packet_id);

        match self.await_ack()? {
            Some(Inbound::SubAck { packet_id: received, .. }) if received != packet_id => {
                Err(ProtocolError::PacketIdMismatch {
                    expected: packet_id,
                    received,
                }
                .into())
            }
            Some(Inbound::SubAck { code: codec::SUBACK_FAILURE, .. }) => {
                warn!("broker rejected subscription to {}", topic);
                Err(Error::SubscriptionRejected)
            }
            Some(Inbound::SubAck { .. }) => {
                self.subscriptions
                    .insert(key, qos)
                    .map_err(|_| ProtocolError::BufferOverflow)?;
                info!("subscribed to {}", topic);
                Ok(())
            }
            Some(other) => Err(ProtocolError::UnexpectedPacket(other.header()).into()),
            None => {
                warn!("no SUBACK for {}", topic);
                Err(Timeout::SubAck.into())
            }
        }
    }

    /// Receive at most one packet, waiting up to `timeout_ms`.
    ///
    /// A PUBLISH is recorded in the message store, acknowledged when it is
    /// QoS 1, and returned. Any other packet type is dropped. `Ok(None)` means
    /// nothing complete arrived in time.
    pub fn poll_incoming(&mut self, timeout_ms: u32) -> Result<Option<Message>, Error> {
        self.ensure_connected()?;
        match self.recv_packet(timeout_ms)? {
            Some(Inbound::Publish { message, packet_id }) => {
                self.handle_publish(&message, packet_id)?;
                Ok(Some(message))
            }
            Some(other) => {
                debug!("ignoring packet {:#04x}", other.header());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub(crate) fn ensure_connected(&self) -> Result<(), ConnectionError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ConnectionError::NotConnected)
        }
    }

    fn handle_publish(&mut self, message: &Message, packet_id: Option<u16>) -> Result<(), Error> {
        debug!(
            "PUBLISH received on {} ({} bytes)",
            message.topic,
            message.payload.len()
        );
        self.store.insert(&message.topic, &message.payload);
        if let Some(id) = packet_id {
            self.send(&codec::encode_puback(id))?;
        }
        Ok(())
    }

    /// Wait up to the ack timeout for a non-PUBLISH packet.
    ///
    /// PUBLISH packets seen meanwhile go to the store; malformed packets are
    /// logged and skipped.
    fn await_ack(&mut self) -> Result<Option<Inbound>, Error> {
        let timeout = u64::from(self.options.ack_timeout_ms);
        let start = self.clock.now_ms();
        loop {
            let remaining = timeout.saturating_sub(self.clock.now_ms().saturating_sub(start));
            if remaining == 0 {
                return Ok(None);
            }
            match self.recv_packet(clamp_ms(remaining)) {
                Ok(Some(Inbound::Publish { message, packet_id })) => {
                    self.handle_publish(&message, packet_id)?;
                }
                Ok(inbound) => return Ok(inbound),
                Err(Error::Protocol(e)) => warn!("dropping inbound packet: {}", e),
                Err(e) => return Err(e),
            }
        }
    }

    /// Return the next complete packet, reading for up to `timeout_ms`.
    fn recv_packet(&mut self, timeout_ms: u32) -> Result<Option<Inbound>, Error> {
        let start = self.clock.now_ms();
        let mut waited = false;
        loop {
            if let Some(inbound) = self.take_frame()? {
                return Ok(Some(inbound));
            }
            let elapsed = self.clock.now_ms().saturating_sub(start);
            if waited && elapsed >= u64::from(timeout_ms) {
                return Ok(None);
            }
            waited = true;
            let remaining = u64::from(timeout_ms).saturating_sub(elapsed);
            if !self.fill(clamp_ms(remaining).max(1))? {
                return Ok(None);
            }
        }
    }

    /// One bounded read into the receive buffer. `false` on read timeout.
    fn fill(&mut self, timeout_ms: u32) -> Result<bool, Error> {
        let connection = self
            .connection
            .as_mut()
            .ok_or(ConnectionError::NotConnected)?;
        let mut chunk = [0u8; READ_CHUNK];
        let space = READ_CHUNK.min(RX_LEN - self.rx.len());

        let read = connection
            .set_read_timeout(Some(timeout_ms))
            .and_then(|()| connection.read(&mut chunk[..space]));
        match read {
            Ok(0) => {
                warn!("broker closed the connection");
                self.drop_connection();
                Err(ConnectionError::ConnectionLost.into())
            }
            Ok(n) => {
                let mut bytes = &chunk[..n];
                if self.discard > 0 {
                    let skip = self.discard.min(bytes.len());
                    self.discard -= skip;
                    bytes = &bytes[skip..];
                }
                self.rx
                    .extend_from_slice(bytes)
                    .map_err(|_| ProtocolError::BufferOverflow)?;
                Ok(true)
            }
            Err(NetworkError::Timeout) => Ok(false),
            Err(e) => {
                warn!("read failed: {}", e);
                self.drop_connection();
                Err(ConnectionError::Network(e).into())
            }
        }
    }

    /// Decode and consume the packet at the front of the receive buffer.
    fn take_frame(&mut self) -> Result<Option<Inbound>, Error> {
        let header = match codec::decode_fixed_header(&self.rx) {
            Ok(Some(header)) => header,
            Ok(None) => return Ok(None),
            Err(e) => {
                self.rx.clear();
                return Err(e.into());
            }
        };

        let total = header.total_len();
        if total > RX_LEN {
            warn!("discarding {} byte packet {:#04x}", total, header.header);
            let unacked = publish_packet_id(&header, &self.rx[header.header_len..]);
            self.discard = total - self.rx.len();
            self.rx.clear();
            self.ack_dropped(unacked)?;
            return Err(ProtocolError::PacketTooLarge.into());
        }
        if self.rx.len() < total {
            return Ok(None);
        }

        let body = &self.rx[header.header_len..total];
        let inbound = decode_inbound(&header, body);
        let unacked = match inbound {
            Err(_) => publish_packet_id(&header, body),
            Ok(_) => None,
        };
        let len = self.rx.len();
        self.rx.copy_within(total.., 0);
        self.rx.truncate(len - total);
        self.ack_dropped(unacked)?;
        Ok(Some(inbound?))
    }

    /// Acknowledge a QoS 1 PUBLISH that could not be stored, so the broker
    /// does not redeliver it.
    fn ack_dropped(&mut self, packet_id: Option<u16>) -> Result<(), Error> {
        if let Some(id) = packet_id {
            debug!("PUBACK for dropped PUBLISH {}", id);
            self.send(&codec::encode_puback(id))?;
        }
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), Error> {
        let connection = self
            .connection
            .as_mut()
            .ok_or(ConnectionError::NotConnected)?;
        if let Err(e) = write_all(connection, bytes) {
            warn!("write failed: {}", e);
            self.drop_connection();
            return Err(ConnectionError::Network(e).into());
        }
        self.last_activity_ms = self.clock.now_ms();
        Ok(())
    }

    fn drop_connection(&mut self) {
        if let Some(connection) = self.connection.take() {
            if let Err(e) = connection.close() {
                debug!("close failed: {}", e);
            }
        }
        self.state = SessionState::Disconnected;
        self.subscriptions.clear();
        self.rx.clear();
        self.discard = 0;
    }
}

fn decode_inbound(header: &FixedHeader, body: &[u8]) -> Result<Inbound, ProtocolError> {
    Ok(match header.packet_type() {
        codec::CONNACK => Inbound::ConnAck(codec::decode_connack(body)?),
        codec::PUBLISH => {
            let publish = codec::decode_publish(body, header.qos()?)?;
            Inbound::Publish {
                message: Message {
                    topic: super::topic(publish.topic)?,
                    payload: Payload::from_slice(publish.payload)
                        .map_err(|_| ProtocolError::PacketTooLarge)?,
                },
                packet_id: publish.packet_id,
            }
        }
        codec::PUBACK => Inbound::PubAck(codec::decode_puback(body)?),
        codec::SUBACK => {
            let (packet_id, code) = codec::decode_suback(body)?;
            Inbound::SubAck { packet_id, code }
        }
        codec::PINGRESP => Inbound::PingResp,
        _ => Inbound::Other(header.header),
    })
}

/// Packet id of a QoS 1 PUBLISH, read from the variable header alone.
fn publish_packet_id(header: &FixedHeader, body: &[u8]) -> Option<u16> {
    if header.packet_type() != codec::PUBLISH || header.qos().ok()? != QoS::AtLeastOnce {
        return None;
    }
    let topic_len = usize::from(codec::read_u16(body, 0).ok()?);
    codec::read_u16(body, 2 + topic_len).ok()
}

fn clamp_ms(ms: u64) -> u32 {
    u32::try_from(ms).unwrap_or(u32::MAX)
}
