//! MQTT 3.1.1 packet encoding and decoding.
//!
//! Pure functions between packet values and bytes. Nothing here performs I/O;
//! the session frames inbound bytes with [`decode_fixed_header`] and hands the
//! packet body to the matching `decode_*` function.
//!
//! Every decoder bounds-checks before it indexes. A truncated or hostile body
//! produces a [`ProtocolError`], never a panic.

use heapless::Vec;

use super::MAX_PACKET_LEN;
use super::client::Options;
use super::error::{ConnectReturnCode, ProtocolError};

// MQTT Control Packet types (fixed header byte, flags included where fixed)
/// CONNECT fixed header.
pub const CONNECT: u8 = 0x10;
/// CONNACK fixed header.
pub const CONNACK: u8 = 0x20;
/// PUBLISH packet type; the low nibble carries DUP, QoS and RETAIN.
pub const PUBLISH: u8 = 0x30;
/// PUBACK fixed header.
pub const PUBACK: u8 = 0x40;
/// SUBSCRIBE fixed header (reserved flags 0b0010).
pub const SUBSCRIBE: u8 = 0x82;
/// SUBACK fixed header.
pub const SUBACK: u8 = 0x90;
/// PINGREQ fixed header.
pub const PINGREQ: u8 = 0xC0;
/// PINGRESP fixed header.
pub const PINGRESP: u8 = 0xD0;
/// DISCONNECT fixed header.
pub const DISCONNECT: u8 = 0xE0;

/// A complete PINGREQ packet.
pub const PINGREQ_PACKET: [u8; 2] = [PINGREQ, 0];
/// A complete DISCONNECT packet.
pub const DISCONNECT_PACKET: [u8; 2] = [DISCONNECT, 0];

/// Largest value the 4-byte remaining length field can carry.
pub const MAX_REMAINING_LENGTH: usize = 268_435_455;

/// SUBACK return code for a refused subscription.
pub const SUBACK_FAILURE: u8 = 0x80;

const PROTOCOL_NAME: &str = "MQTT";
const PROTOCOL_LEVEL: u8 = 4; // MQTT 3.1.1

const USERNAME_FLAG: u8 = 0x80;
const PASSWORD_FLAG: u8 = 0x40;
const CLEAN_SESSION_FLAG: u8 = 0x02;
const RETAIN_FLAG: u8 = 0x01;

/// An encoded packet, fixed header included.
pub type Packet = Vec<u8, MAX_PACKET_LEN>;

/// Quality of Service levels implemented by this client.
///
/// ```rust
/// use esp_sensors::network::application::mqtt::QoS;
///
/// assert_eq!(QoS::AtMostOnce as u8, 0);
/// assert_eq!(QoS::try_from(1), Ok(QoS::AtLeastOnce));
/// assert!(QoS::try_from(2).is_err());
/// ```
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QoS {
    /// **QoS 0**: fire and forget.
    AtMostOnce = 0,
    /// **QoS 1**: acknowledged with PUBACK, duplicates possible.
    AtLeastOnce = 1,
}

impl TryFrom<u8> for QoS {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            other => Err(ProtocolError::UnsupportedQoS(other)),
        }
    }
}

/// Packet identifier counter.
///
/// Wraps from 65535 to 0. Identifiers are not tracked as outstanding, so an
/// identifier can be reused while an old acknowledgement is still missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketIds {
    last: u16,
}

impl PacketIds {
    /// A counter whose first identifier is 1.
    pub const fn new() -> Self {
        Self { last: 0 }
    }

    /// A counter whose next identifier follows `last`.
    pub const fn starting_after(last: u16) -> Self {
        Self { last }
    }

    /// Allocate the next identifier.
    pub fn next_id(&mut self) -> u16 {
        self.last = self.last.wrapping_add(1);
        self.last
    }

    /// The most recently allocated identifier.
    pub fn last(&self) -> u16 {
        self.last
    }
}

/// Fixed header of a packet: type byte and decoded remaining length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    /// First byte: packet type and flags.
    pub header: u8,
    /// Bytes taken by the type byte and the remaining length field.
    pub header_len: usize,
    /// Body length.
    pub remaining_length: usize,
}

impl FixedHeader {
    /// Packet type with the flag nibble cleared.
    pub fn packet_type(&self) -> u8 {
        self.header & 0xF0
    }

    /// Header plus body length.
    pub fn total_len(&self) -> usize {
        self.header_len + self.remaining_length
    }

    /// QoS bits of a PUBLISH header.
    pub fn qos(&self) -> Result<QoS, ProtocolError> {
        QoS::try_from((self.header >> 1) & 0x03)
    }

    /// RETAIN bit of a PUBLISH header.
    pub fn retain(&self) -> bool {
        self.header & RETAIN_FLAG != 0
    }
}

/// A decoded PUBLISH body borrowing from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Publish<'a> {
    /// Topic name.
    pub topic: &'a str,
    /// Identifier, present for QoS 1.
    pub packet_id: Option<u16>,
    /// Application payload.
    pub payload: &'a [u8],
}

/// Encode `len` as an MQTT variable-length integer.
///
/// ```rust
/// use esp_sensors::network::application::mqtt::codec::encode_remaining_length;
///
/// assert_eq!(&encode_remaining_length(128).unwrap()[..], &[0x80, 0x01]);
/// ```
pub fn encode_remaining_length(len: usize) -> Result<Vec<u8, 4>, ProtocolError> {
    if len > MAX_REMAINING_LENGTH {
        return Err(ProtocolError::RemainingLengthTooLarge);
    }
    let mut out = Vec::new();
    let mut len = len;
    loop {
        let mut byte = (len % 128) as u8;
        len /= 128;
        if len > 0 {
            byte |= 0x80;
        }
        out.push(byte)
            .map_err(|_| ProtocolError::RemainingLengthTooLarge)?;
        if len == 0 {
            break;
        }
    }
    Ok(out)
}

/// Decode a variable-length integer from a byte source, one byte at a time.
///
/// Returns the value and the number of bytes consumed, or `None` when the
/// source ran out before the last byte (more bytes are needed). At most four
/// bytes are consumed.
pub fn decode_remaining_length<I>(source: I) -> Result<Option<(usize, usize)>, ProtocolError>
where
    I: IntoIterator<Item = u8>,
{
    let mut value = 0usize;
    let mut multiplier = 1usize;
    for (i, byte) in source.into_iter().take(4).enumerate() {
        value += usize::from(byte & 0x7F) * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((value, i + 1)));
        }
        if i == 3 {
            return Err(ProtocolError::MalformedRemainingLength);
        }
        multiplier *= 128;
    }
    Ok(None)
}

/// Decode the fixed header at the start of `buf`.
///
/// `None` means `buf` does not hold the whole fixed header yet. The body may
/// still be incomplete when a header is returned; compare
/// [`FixedHeader::total_len`] with the buffered length.
pub fn decode_fixed_header(buf: &[u8]) -> Result<Option<FixedHeader>, ProtocolError> {
    let Some((&header, rest)) = buf.split_first() else {
        return Ok(None);
    };
    Ok(decode_remaining_length(rest.iter().copied())?.map(|(remaining_length, n)| {
        FixedHeader {
            header,
            header_len: 1 + n,
            remaining_length,
        }
    }))
}

/// Append a length-prefixed UTF-8 string.
pub fn encode_string<const N: usize>(buf: &mut Vec<u8, N>, s: &str) -> Result<(), ProtocolError> {
    let len = u16::try_from(s.len()).map_err(|_| ProtocolError::StringTooLong)?;
    put(buf, &len.to_be_bytes())?;
    put(buf, s.as_bytes())
}

/// Encode a CONNECT packet for `options`. The clean-session flag is always set.
pub fn encode_connect(options: &Options<'_>) -> Result<Packet, ProtocolError> {
    let mut flags = CLEAN_SESSION_FLAG;
    let mut remaining = string_len(PROTOCOL_NAME)? + 4 + string_len(options.client_id)?;
    if let Some(username) = options.username {
        flags |= USERNAME_FLAG;
        remaining += string_len(username)?;
    }
    if let Some(password) = options.password {
        flags |= PASSWORD_FLAG;
        remaining += string_len(password)?;
    }

    let mut packet = start_packet(CONNECT, remaining)?;
    // --- Variable Header ---
    encode_string(&mut packet, PROTOCOL_NAME)?;
    put(&mut packet, &[PROTOCOL_LEVEL, flags])?;
    put(&mut packet, &options.keep_alive_seconds.to_be_bytes())?;
    // --- Payload ---
    encode_string(&mut packet, options.client_id)?;
    if let Some(username) = options.username {
        encode_string(&mut packet, username)?;
    }
    if let Some(password) = options.password {
        encode_string(&mut packet, password)?;
    }
    Ok(packet)
}

/// Encode a PUBLISH packet.
///
/// `packet_id` is required for QoS 1 and ignored for QoS 0. The payload is
/// appended raw; its length is whatever follows the topic and identifier.
pub fn encode_publish(
    topic: &str,
    payload: &[u8],
    retain: bool,
    qos: QoS,
    packet_id: Option<u16>,
) -> Result<Packet, ProtocolError> {
    let mut header = PUBLISH | ((qos as u8) << 1);
    if retain {
        header |= RETAIN_FLAG;
    }
    let packet_id = match qos {
        QoS::AtMostOnce => None,
        QoS::AtLeastOnce => Some(packet_id.ok_or(ProtocolError::MissingPacketId)?),
    };

    let remaining = string_len(topic)? + packet_id.map_or(0, |_| 2) + payload.len();
    let mut packet = start_packet(header, remaining)?;
    encode_string(&mut packet, topic)?;
    if let Some(id) = packet_id {
        put(&mut packet, &id.to_be_bytes())?;
    }
    put(&mut packet, payload)?;
    Ok(packet)
}

/// Encode a SUBSCRIBE packet for a single topic.
pub fn encode_subscribe(topic: &str, qos: QoS, packet_id: u16) -> Result<Packet, ProtocolError> {
    let remaining = 2 + string_len(topic)? + 1;
    let mut packet = start_packet(SUBSCRIBE, remaining)?;
    put(&mut packet, &packet_id.to_be_bytes())?;
    encode_string(&mut packet, topic)?;
    put(&mut packet, &[qos as u8])?;
    Ok(packet)
}

/// Encode a PUBACK packet.
pub fn encode_puback(packet_id: u16) -> [u8; 4] {
    let [hi, lo] = packet_id.to_be_bytes();
    [PUBACK, 2, hi, lo]
}

/// Decode a PUBLISH body received with the given QoS.
pub fn decode_publish(body: &[u8], qos: QoS) -> Result<Publish<'_>, ProtocolError> {
    let (topic, mut offset) = read_string(body, 0)?;
    let packet_id = match qos {
        QoS::AtMostOnce => None,
        QoS::AtLeastOnce => {
            let id = read_u16(body, offset)?;
            offset += 2;
            Some(id)
        }
    };
    Ok(Publish {
        topic,
        packet_id,
        payload: &body[offset..],
    })
}

/// Decode a SUBSCRIBE body: identifier, first topic filter and requested QoS byte.
pub fn decode_subscribe(body: &[u8]) -> Result<(u16, &str, u8), ProtocolError> {
    let packet_id = read_u16(body, 0)?;
    let (topic, offset) = read_string(body, 2)?;
    let qos = *body.get(offset).ok_or(ProtocolError::Truncated)?;
    Ok((packet_id, topic, qos))
}

/// Decode a CONNACK body. `Ok(None)` means the connection was accepted.
pub fn decode_connack(body: &[u8]) -> Result<Option<ConnectReturnCode>, ProtocolError> {
    match body {
        [_session_present, code] => Ok(ConnectReturnCode::from_code(*code)),
        _ => Err(ProtocolError::MalformedConnack),
    }
}

/// Decode the packet identifier of a PUBACK body.
pub fn decode_puback(body: &[u8]) -> Result<u16, ProtocolError> {
    read_u16(body, 0)
}

/// Decode a SUBACK body: identifier and the first return code.
pub fn decode_suback(body: &[u8]) -> Result<(u16, u8), ProtocolError> {
    let packet_id = read_u16(body, 0)?;
    let code = *body.get(2).ok_or(ProtocolError::Truncated)?;
    Ok((packet_id, code))
}

pub(crate) fn read_u16(buf: &[u8], at: usize) -> Result<u16, ProtocolError> {
    match buf.get(at..).and_then(|rest| rest.get(..2)) {
        Some(&[hi, lo]) => Ok(u16::from_be_bytes([hi, lo])),
        _ => Err(ProtocolError::Truncated),
    }
}

pub(crate) fn read_string(buf: &[u8], at: usize) -> Result<(&str, usize), ProtocolError> {
    let len = usize::from(read_u16(buf, at)?);
    let start = at + 2;
    let end = start + len;
    let bytes = buf.get(start..end).ok_or(ProtocolError::Truncated)?;
    let s = core::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
    Ok((s, end))
}

fn string_len(s: &str) -> Result<usize, ProtocolError> {
    if s.len() > usize::from(u16::MAX) {
        return Err(ProtocolError::StringTooLong);
    }
    Ok(2 + s.len())
}

fn start_packet(header: u8, remaining: usize) -> Result<Packet, ProtocolError> {
    let mut packet = Packet::new();
    put(&mut packet, &[header])?;
    put(&mut packet, &encode_remaining_length(remaining)?)?;
    Ok(packet)
}

fn put<const N: usize>(buf: &mut Vec<u8, N>, bytes: &[u8]) -> Result<(), ProtocolError> {
    buf.extend_from_slice(bytes)
        .map_err(|_| ProtocolError::BufferOverflow)
}
