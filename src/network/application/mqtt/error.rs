//! Error taxonomy of the MQTT session.
//!
//! Errors are split by how far their damage reaches:
//!
//! * [`ProtocolError`] spoils a single packet. The session stays usable and
//!   the caller decides whether to drop the packet and carry on.
//! * [`ConnectionError`] ends the session. By the time it is returned the
//!   session is `Disconnected` and the caller has to reconnect.
//! * [`Timeout`] is a bounded wait for a ping or acknowledgement that ran
//!   out. The connection is kept; brief broker slowness should not cascade
//!   into a reconnect.

use core::fmt;

use crate::network::error::Error as NetworkError;

/// A malformed, truncated or oversized packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// A remaining length above 268,435,455 was requested.
    RemainingLengthTooLarge,
    /// A remaining length field still had its continuation bit set after 4 bytes.
    MalformedRemainingLength,
    /// A string longer than 65,535 bytes was requested.
    StringTooLong,
    /// A packet ended before a field it declares.
    Truncated,
    /// A topic or string field was not valid UTF-8.
    InvalidUtf8,
    /// A packet does not fit the fixed-capacity buffers.
    BufferOverflow,
    /// A topic is longer than the session's topic capacity.
    TopicTooLong,
    /// An inbound packet is larger than the receive buffer and was discarded.
    PacketTooLarge,
    /// A QoS 1 publish was encoded without a packet identifier.
    MissingPacketId,
    /// A QoS level this client does not implement.
    UnsupportedQoS(u8),
    /// A CONNACK whose body is not exactly two bytes.
    MalformedConnack,
    /// An acknowledgement carried a different packet identifier than the request.
    PacketIdMismatch {
        /// Identifier that was sent.
        expected: u16,
        /// Identifier that came back.
        received: u16,
    },
    /// A packet of the wrong type arrived while waiting for an acknowledgement.
    UnexpectedPacket(u8),
    /// An application payload could not be serialized.
    PayloadEncoding,
}

/// Return codes of a refused CONNACK.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReturnCode {
    /// 1: the broker does not support protocol level 4.
    UnacceptableProtocolVersion,
    /// 2: the client identifier is not allowed.
    IdentifierRejected,
    /// 3: the MQTT service is unavailable.
    ServerUnavailable,
    /// 4: the username or password is malformed or wrong.
    BadUsernameOrPassword,
    /// 5: the client is not authorized to connect.
    NotAuthorized,
    /// Any other non-zero code.
    Other(u8),
}

impl ConnectReturnCode {
    /// Map a CONNACK return code, `None` for 0 (accepted).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => None,
            1 => Some(Self::UnacceptableProtocolVersion),
            2 => Some(Self::IdentifierRejected),
            3 => Some(Self::ServerUnavailable),
            4 => Some(Self::BadUsernameOrPassword),
            5 => Some(Self::NotAuthorized),
            other => Some(Self::Other(other)),
        }
    }
}

/// A failure that ends (or prevents) the session.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionError {
    /// The operation needs a connected session.
    NotConnected,
    /// The transport failed to open, read or write.
    Network(NetworkError),
    /// The broker closed the stream.
    ConnectionLost,
    /// The broker refused the CONNECT.
    Refused(ConnectReturnCode),
    /// No CONNACK arrived within the acknowledgement timeout.
    ConnackTimeout,
    /// The broker answered a handshake or ping with the wrong packet type.
    UnexpectedPacket {
        /// Packet type that was expected.
        expected: u8,
        /// Fixed header byte that arrived.
        received: u8,
    },
    /// The reconnection policy is backing off; no attempt was made.
    Backoff {
        /// Seconds until the next attempt is allowed.
        retry_in: u64,
    },
}

/// A bounded wait that ran out without tearing the session down.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Timeout {
    /// No PINGRESP.
    PingResp,
    /// No PUBACK.
    PubAck,
    /// No SUBACK.
    SubAck,
}

/// Errors returned by the MQTT session.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// See [`ProtocolError`].
    Protocol(ProtocolError),
    /// See [`ConnectionError`].
    Connection(ConnectionError),
    /// See [`Timeout`].
    Timeout(Timeout),
    /// The broker answered a SUBSCRIBE with the failure code 0x80.
    SubscriptionRejected,
}

impl Error {
    /// Whether the session is gone after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<ConnectionError> for Error {
    fn from(e: ConnectionError) -> Self {
        Error::Connection(e)
    }
}

impl From<Timeout> for Error {
    fn from(e: Timeout) -> Self {
        Error::Timeout(e)
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::RemainingLengthTooLarge => f.write_str("remaining length too large"),
            ProtocolError::MalformedRemainingLength => f.write_str("malformed remaining length"),
            ProtocolError::StringTooLong => f.write_str("string longer than 65535 bytes"),
            ProtocolError::Truncated => f.write_str("truncated packet"),
            ProtocolError::InvalidUtf8 => f.write_str("invalid UTF-8"),
            ProtocolError::BufferOverflow => f.write_str("buffer overflow"),
            ProtocolError::TopicTooLong => f.write_str("topic too long"),
            ProtocolError::PacketTooLarge => f.write_str("packet too large"),
            ProtocolError::MissingPacketId => f.write_str("missing packet identifier"),
            ProtocolError::UnsupportedQoS(qos) => write!(f, "unsupported QoS {qos}"),
            ProtocolError::MalformedConnack => f.write_str("malformed CONNACK"),
            ProtocolError::PacketIdMismatch { expected, received } => {
                write!(f, "packet id mismatch (sent {expected}, got {received})")
            }
            ProtocolError::UnexpectedPacket(header) => {
                write!(f, "unexpected packet {header:#04x}")
            }
            ProtocolError::PayloadEncoding => f.write_str("payload encoding failed"),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::NotConnected => f.write_str("not connected"),
            ConnectionError::Network(e) => write!(f, "network: {e}"),
            ConnectionError::ConnectionLost => f.write_str("connection lost"),
            ConnectionError::Refused(code) => write!(f, "refused: {code:?}"),
            ConnectionError::ConnackTimeout => f.write_str("timed out waiting for CONNACK"),
            ConnectionError::UnexpectedPacket { expected, received } => {
                write!(f, "expected packet {expected:#04x}, got {received:#04x}")
            }
            ConnectionError::Backoff { retry_in } => {
                write!(f, "backing off, next attempt in {retry_in}s")
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Protocol(e) => write!(f, "protocol error: {e}"),
            Error::Connection(e) => write!(f, "connection error: {e}"),
            Error::Timeout(t) => write!(f, "timeout: {t:?}"),
            Error::SubscriptionRejected => f.write_str("subscription rejected"),
        }
    }
}
