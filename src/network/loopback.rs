//! An in-memory broker reachable through the transport traits.
//!
//! [`LoopbackBroker`] speaks just enough MQTT 3.1.1 to stand in for a real
//! broker: it answers CONNECT, SUBSCRIBE, PUBLISH and PINGREQ, keeps
//! retained messages and echoes publishes to exact-topic subscribers. Its
//! public switches script misbehaviour: refusing connections, staying
//! silent, misnumbering acknowledgements, hanging up or handing out bytes a
//! few at a time.
//!
//! The broker lives in a [`RefCell`] so the test or simulation driving it can
//! inspect and script it while a session holds the connection:
//!
//! ```rust
//! use core::cell::RefCell;
//! use esp_sensors::network::loopback::{LoopbackBroker, LoopbackConnector};
//! use esp_sensors::network::{Connect, Read};
//! use esp_sensors::network::error::Error;
//!
//! let broker = RefCell::new(LoopbackBroker::new());
//! let mut connection = LoopbackConnector::new(&broker).connect("localhost:1883").unwrap();
//!
//! let mut buf = [0u8; 4];
//! // Nothing queued yet: the read times out.
//! assert_eq!(connection.read(&mut buf), Err(Error::Timeout));
//!
//! broker.borrow_mut().hang_up();
//! assert_eq!(connection.read(&mut buf), Ok(0));
//! ```

use core::cell::RefCell;

use heapless::{Deque, FnvIndexMap, String, Vec};
use log::debug;

use super::application::mqtt::codec::{self, FixedHeader, PacketIds, QoS};
use super::application::mqtt::{
    MAX_PACKET_LEN, MAX_TOPICS, Message, Payload, ProtocolError, Topic, topic,
};
use super::error::Error;
use super::{Close, Connect, Connection, Read, ReadTimeout, Write};

/// Capacity of the broker → client byte queue.
pub const OUTBOUND_LEN: usize = 8192;

/// Scriptable in-memory MQTT broker for a single client.
#[derive(Debug)]
pub struct LoopbackBroker {
    /// CONNACK return code; 0 accepts.
    pub connack_code: u8,
    /// When false, opening a connection fails with [`Error::ConnectionRefused`].
    pub accept_connections: bool,
    /// When false, CONNECT is never answered.
    pub respond_to_connect: bool,
    /// When false, PINGREQ is never answered.
    pub answer_pings: bool,
    /// When false, QoS 1 publishes are never acknowledged.
    pub ack_publishes: bool,
    /// When false, SUBSCRIBE is never answered.
    pub ack_subscribes: bool,
    /// When true, PUBACK and SUBACK carry the wrong packet identifier.
    pub misnumber_acks: bool,
    /// When true, SUBACK carries the failure code 0x80.
    pub reject_subscriptions: bool,
    /// Most bytes handed out per read.
    pub read_chunk: usize,

    inbound: Vec<u8, MAX_PACKET_LEN>,
    outbound: Deque<u8, OUTBOUND_LEN>,
    subscriptions: FnvIndexMap<Topic, QoS, MAX_TOPICS>,
    retained: FnvIndexMap<Topic, Payload, MAX_TOPICS>,
    packet_ids: PacketIds,
    last_published: Option<Message>,
    client_id: String<64>,
    connected: bool,
    hung_up: bool,
    connections: u32,
    pings: u32,
    disconnects: u32,
    publishes: u32,
    pubacks: u32,
}

impl Default for LoopbackBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBroker {
    /// A well-behaved broker.
    pub fn new() -> Self {
        Self {
            connack_code: 0,
            accept_connections: true,
            respond_to_connect: true,
            answer_pings: true,
            ack_publishes: true,
            ack_subscribes: true,
            misnumber_acks: false,
            reject_subscriptions: false,
            read_chunk: usize::MAX,
            inbound: Vec::new(),
            outbound: Deque::new(),
            subscriptions: FnvIndexMap::new(),
            retained: FnvIndexMap::new(),
            packet_ids: PacketIds::new(),
            last_published: None,
            client_id: String::new(),
            connected: false,
            hung_up: false,
            connections: 0,
            pings: 0,
            disconnects: 0,
            publishes: 0,
            pubacks: 0,
        }
    }

    /// Keep `payload` as the retained message of `topic`; an empty payload clears it.
    pub fn retain(&mut self, name: &str, payload: &[u8]) -> Result<(), ProtocolError> {
        let key = topic(name)?;
        if payload.is_empty() {
            self.retained.remove(&key);
            return Ok(());
        }
        let payload = Payload::from_slice(payload).map_err(|_| ProtocolError::BufferOverflow)?;
        self.retained
            .insert(key, payload)
            .map_err(|_| ProtocolError::BufferOverflow)?;
        Ok(())
    }

    /// Send a PUBLISH to the client if it subscribed to `name`.
    ///
    /// Returns whether anything was queued.
    pub fn deliver(&mut self, name: &str, payload: &[u8]) -> Result<bool, ProtocolError> {
        let key = topic(name)?;
        let Some(&qos) = self.subscriptions.get(&key) else {
            return Ok(false);
        };
        if !self.connected {
            return Ok(false);
        }
        self.queue_publish(name, payload, false, qos)?;
        Ok(true)
    }

    /// What a third-party publisher would cause: optionally retain, then deliver.
    pub fn publish(&mut self, name: &str, payload: &[u8], retain: bool) -> Result<bool, ProtocolError> {
        if retain {
            self.retain(name, payload)?;
        }
        self.deliver(name, payload)
    }

    /// Queue raw bytes for the client.
    pub fn inject(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.queue(bytes).map_err(|_| ProtocolError::BufferOverflow)
    }

    /// Close the stream from the broker side.
    ///
    /// Bytes already queued are still delivered; after that reads return 0
    /// and writes fail.
    pub fn hang_up(&mut self) {
        self.hung_up = true;
        self.connected = false;
    }

    /// Whether a client completed the handshake and has not gone away.
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Whether the client holds a subscription to `name`.
    pub fn is_subscribed(&self, name: &str) -> bool {
        topic(name).is_ok_and(|key| self.subscriptions.contains_key(&key))
    }

    /// Client id of the last CONNECT.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Accepted handshakes.
    pub fn connections(&self) -> u32 {
        self.connections
    }

    /// PINGREQs received.
    pub fn pings(&self) -> u32 {
        self.pings
    }

    /// DISCONNECTs received.
    pub fn disconnects(&self) -> u32 {
        self.disconnects
    }

    /// PUBLISHes received from the client.
    pub fn publishes(&self) -> u32 {
        self.publishes
    }

    /// PUBACKs received from the client.
    pub fn pubacks(&self) -> u32 {
        self.pubacks
    }

    /// The last PUBLISH received from the client.
    pub fn last_published(&self) -> Option<&Message> {
        self.last_published.as_ref()
    }

    /// Bytes queued for the client and not read yet.
    pub fn pending(&self) -> usize {
        self.outbound.len()
    }

    fn open(&mut self) {
        self.inbound.clear();
        self.outbound.clear();
        self.subscriptions.clear();
        self.connected = false;
        self.hung_up = false;
    }

    fn queue(&mut self, bytes: &[u8]) -> Result<(), Error> {
        if self.outbound.capacity() - self.outbound.len() < bytes.len() {
            return Err(Error::WriteError);
        }
        for &byte in bytes {
            self.outbound.push_back(byte).map_err(|_| Error::WriteError)?;
        }
        Ok(())
    }

    fn queue_publish(&mut self, name: &str, payload: &[u8], retain: bool, qos: QoS) -> Result<(), ProtocolError> {
        let packet_id = match qos {
            QoS::AtMostOnce => None,
            QoS::AtLeastOnce => Some(self.packet_ids.next_id()),
        };
        let packet = codec::encode_publish(name, payload, retain, qos, packet_id)?;
        self.queue(&packet).map_err(|_| ProtocolError::BufferOverflow)
    }

    fn ack_id(&self, packet_id: u16) -> u16 {
        if self.misnumber_acks {
            packet_id.wrapping_add(1)
        } else {
            packet_id
        }
    }

    fn receive(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.inbound
            .extend_from_slice(bytes)
            .map_err(|_| Error::WriteError)?;
        loop {
            let header = match codec::decode_fixed_header(&self.inbound) {
                Ok(Some(header)) if header.total_len() <= self.inbound.len() => header,
                Ok(_) => return Ok(()),
                Err(_) => return Err(Error::ProtocolError),
            };
            let total = header.total_len();
            let frame: Vec<u8, MAX_PACKET_LEN> =
                Vec::from_slice(&self.inbound[..total]).map_err(|_| Error::ProtocolError)?;
            let len = self.inbound.len();
            self.inbound.copy_within(total.., 0);
            self.inbound.truncate(len - total);

            self.handle(&header, &frame[header.header_len..])?;
        }
    }

    fn handle(&mut self, header: &FixedHeader, body: &[u8]) -> Result<(), Error> {
        match header.packet_type() {
            codec::CONNECT => self.on_connect(body),
            codec::PUBLISH => self.on_publish(header, body),
            codec::PUBACK => {
                self.pubacks += 1;
                Ok(())
            }
            // The SUBSCRIBE constant carries its reserved flags.
            t if t == codec::SUBSCRIBE & 0xF0 => self.on_subscribe(body),
            codec::PINGREQ => {
                self.pings += 1;
                if self.answer_pings {
                    self.queue(&[codec::PINGRESP, 0])?;
                }
                Ok(())
            }
            codec::DISCONNECT => {
                self.disconnects += 1;
                self.connected = false;
                Ok(())
            }
            other => {
                debug!("loopback ignoring packet {:#04x}", other);
                Ok(())
            }
        }
    }

    fn on_connect(&mut self, body: &[u8]) -> Result<(), Error> {
        // Protocol name, then level, flags and keepalive.
        let (_, offset) = codec::read_string(body, 0).map_err(|_| Error::ProtocolError)?;
        let (client_id, _) =
            codec::read_string(body, offset + 4).map_err(|_| Error::ProtocolError)?;
        self.client_id.clear();
        let _ = self.client_id.push_str(client_id);

        if !self.respond_to_connect {
            return Ok(());
        }
        self.queue(&[codec::CONNACK, 2, 0, self.connack_code])?;
        if self.connack_code == 0 {
            self.connected = true;
            self.connections += 1;
        }
        Ok(())
    }

    fn on_publish(&mut self, header: &FixedHeader, body: &[u8]) -> Result<(), Error> {
        let qos = header.qos().map_err(|_| Error::ProtocolError)?;
        let publish = codec::decode_publish(body, qos).map_err(|_| Error::ProtocolError)?;
        let message = Message {
            topic: topic(publish.topic).map_err(|_| Error::ProtocolError)?,
            payload: Payload::from_slice(publish.payload).map_err(|_| Error::ProtocolError)?,
        };
        self.publishes += 1;

        if header.retain() {
            self.retain(&message.topic, &message.payload)
                .map_err(|_| Error::ProtocolError)?;
        }
        if let Some(id) = publish.packet_id.filter(|_| self.ack_publishes) {
            let [hi, lo] = self.ack_id(id).to_be_bytes();
            self.queue(&[codec::PUBACK, 2, hi, lo])?;
        }
        self.deliver(&message.topic, &message.payload)
            .map_err(|_| Error::WriteError)?;
        self.last_published = Some(message);
        Ok(())
    }

    fn on_subscribe(&mut self, body: &[u8]) -> Result<(), Error> {
        let (packet_id, name, requested) =
            codec::decode_subscribe(body).map_err(|_| Error::ProtocolError)?;
        let key = topic(name).map_err(|_| Error::ProtocolError)?;
        if !self.ack_subscribes {
            return Ok(());
        }

        let [hi, lo] = self.ack_id(packet_id).to_be_bytes();
        if self.reject_subscriptions {
            return self.queue(&[codec::SUBACK, 3, hi, lo, codec::SUBACK_FAILURE]);
        }
        let granted = if requested == 0 { QoS::AtMostOnce } else { QoS::AtLeastOnce };
        self.queue(&[codec::SUBACK, 3, hi, lo, granted as u8])?;
        self.subscriptions
            .insert(key.clone(), granted)
            .map_err(|_| Error::WriteError)?;

        if let Some(payload) = self.retained.get(&key).cloned() {
            self.queue_publish(&key, &payload, true, granted)
                .map_err(|_| Error::WriteError)?;
        }
        Ok(())
    }
}

/// Opens connections to a [`LoopbackBroker`].
#[derive(Debug, Clone, Copy)]
pub struct LoopbackConnector<'b> {
    broker: &'b RefCell<LoopbackBroker>,
}

impl<'b> LoopbackConnector<'b> {
    /// A connector for `broker`.
    pub fn new(broker: &'b RefCell<LoopbackBroker>) -> Self {
        Self { broker }
    }
}

impl<'b> Connect for LoopbackConnector<'b> {
    type Connection = LoopbackConnection<'b>;
    type Error = Error;

    fn connect(&mut self, remote: &str) -> Result<LoopbackConnection<'b>, Error> {
        let mut broker = self.broker.borrow_mut();
        if !broker.accept_connections {
            debug!("loopback refusing {}", remote);
            return Err(Error::ConnectionRefused);
        }
        broker.open();
        Ok(LoopbackConnection {
            broker: self.broker,
        })
    }
}

/// Client end of a loopback stream.
#[derive(Debug)]
pub struct LoopbackConnection<'b> {
    broker: &'b RefCell<LoopbackBroker>,
}

impl Connection for LoopbackConnection<'_> {}

impl Read for LoopbackConnection<'_> {
    type Error = Error;

    /// Hands out queued bytes. With nothing queued the read times out at once,
    /// or returns 0 once the broker hung up.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut broker = self.broker.borrow_mut();
        if broker.outbound.is_empty() {
            return if broker.hung_up { Ok(0) } else { Err(Error::Timeout) };
        }
        let n = buf
            .len()
            .min(broker.read_chunk.max(1))
            .min(broker.outbound.len());
        for slot in &mut buf[..n] {
            *slot = broker.outbound.pop_front().ok_or(Error::ReadError)?;
        }
        Ok(n)
    }
}

impl Write for LoopbackConnection<'_> {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        let mut broker = self.broker.borrow_mut();
        if broker.hung_up {
            return Err(Error::WriteError);
        }
        broker.receive(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

impl Close for LoopbackConnection<'_> {
    type Error = Error;

    fn close(self) -> Result<(), Error> {
        self.broker.borrow_mut().connected = false;
        Ok(())
    }
}

impl ReadTimeout for LoopbackConnection<'_> {
    type Error = Error;

    fn set_read_timeout(&mut self, _timeout_ms: Option<u32>) -> Result<(), Error> {
        Ok(())
    }
}
