use core::cell::RefCell;

use esp_sensors::network::application::mqtt::codec::{encode_publish, encode_remaining_length};
use esp_sensors::network::application::mqtt::{
    ConnectReturnCode, ConnectionError, Error, ProtocolError, QoS, SessionState, Timeout,
};
use esp_sensors::network::error::Error as NetworkError;
use esp_sensors::network::loopback::LoopbackBroker;

use crate::mock::{self, ScriptedConnector};

#[test]
fn test_connect() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::client(&broker);
    assert_eq!(client.state(), SessionState::Disconnected);

    client.connect().unwrap();
    assert_eq!(client.state(), SessionState::Connected);
    assert!(client.is_connected());
    assert_eq!(broker.borrow().connections(), 1);
    assert_eq!(broker.borrow().client_id(), "sensor-1");
}

#[test]
fn test_connect_refused_with_reason() {
    let broker = RefCell::new(LoopbackBroker::new());
    broker.borrow_mut().connack_code = 4;
    let mut client = mock::client(&broker);

    assert_eq!(
        client.connect(),
        Err(Error::Connection(ConnectionError::Refused(
            ConnectReturnCode::BadUsernameOrPassword
        )))
    );
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[test]
fn test_connect_without_connack_times_out() {
    let broker = RefCell::new(LoopbackBroker::new());
    broker.borrow_mut().respond_to_connect = false;
    let mut client = mock::client(&broker);

    assert_eq!(
        client.connect(),
        Err(Error::Connection(ConnectionError::ConnackTimeout))
    );
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[test]
fn test_connect_when_stream_cannot_open() {
    let broker = RefCell::new(LoopbackBroker::new());
    broker.borrow_mut().accept_connections = false;
    let mut client = mock::client(&broker);

    assert_eq!(
        client.connect(),
        Err(Error::Connection(ConnectionError::Network(
            NetworkError::ConnectionRefused
        )))
    );
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[test]
fn test_connect_answered_with_wrong_packet() {
    let mut client = mock::scripted(ScriptedConnector::new(&[0xD0, 0x00]));
    assert_eq!(
        client.connect(),
        Err(Error::Connection(ConnectionError::UnexpectedPacket {
            expected: 0x20,
            received: 0xD0,
        }))
    );
    assert!(!client.is_connected());
}

#[test]
fn test_connack_one_byte_at_a_time() {
    let mut connector = ScriptedConnector::new(&[0x20, 0x02, 0x00, 0x00]);
    connector.chunk = 1;
    let mut client = mock::scripted(connector);
    client.connect().unwrap();
    assert!(client.is_connected());
}

#[test]
fn test_connect_read_failure() {
    let mut connector = ScriptedConnector::new(&[]);
    connector.fail_reads = true;
    let mut client = mock::scripted(connector);
    assert_eq!(
        client.connect(),
        Err(Error::Connection(ConnectionError::Network(
            NetworkError::ReadError
        )))
    );
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[test]
fn test_operations_require_connection() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::client(&broker);
    let not_connected = Err(Error::Connection(ConnectionError::NotConnected));

    assert_eq!(client.publish("t", b"x", false, QoS::AtLeastOnce), not_connected);
    assert_eq!(client.subscribe("t", QoS::AtMostOnce), not_connected);
    assert_eq!(client.ping(), not_connected);
    assert_eq!(
        client.poll_incoming(10),
        Err(Error::Connection(ConnectionError::NotConnected))
    );
    assert_eq!(client.last_packet_id(), 0);
    assert_eq!(broker.borrow().publishes(), 0);
}

#[test]
fn test_publish_qos0() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);

    client
        .publish("sensors/temperature", b"23.5", false, QoS::AtMostOnce)
        .unwrap();

    let broker = broker.borrow();
    let message = broker.last_published().unwrap();
    assert_eq!(message.topic.as_str(), "sensors/temperature");
    assert_eq!(&message.payload[..], b"23.5");
    assert_eq!(client.last_packet_id(), 0);
}

#[test]
fn test_publish_qos1_waits_for_puback() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);

    client
        .publish("sensors/humidity", b"65", true, QoS::AtLeastOnce)
        .unwrap();
    client
        .publish("sensors/humidity", b"66", true, QoS::AtLeastOnce)
        .unwrap();
    assert_eq!(client.last_packet_id(), 2);
    assert_eq!(broker.borrow().publishes(), 2);
}

#[test]
fn test_missing_puback_keeps_connection() {
    let broker = RefCell::new(LoopbackBroker::new());
    broker.borrow_mut().ack_publishes = false;
    let mut client = mock::connected(&broker);

    assert_eq!(
        client.publish("t", b"x", false, QoS::AtLeastOnce),
        Err(Error::Timeout(Timeout::PubAck))
    );
    assert!(client.is_connected());
}

#[test]
fn test_mismatched_puback_keeps_connection() {
    let broker = RefCell::new(LoopbackBroker::new());
    broker.borrow_mut().misnumber_acks = true;
    let mut client = mock::connected(&broker);

    assert_eq!(
        client.publish("t", b"x", false, QoS::AtLeastOnce),
        Err(Error::Protocol(ProtocolError::PacketIdMismatch {
            expected: 1,
            received: 2,
        }))
    );
    assert!(client.is_connected());

    broker.borrow_mut().misnumber_acks = false;
    client.publish("t", b"y", false, QoS::AtLeastOnce).unwrap();
}

#[test]
fn test_subscribe_recorded_after_suback() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);

    client.subscribe("commands/sensor-1", QoS::AtLeastOnce).unwrap();
    assert!(client.is_subscribed("commands/sensor-1"));
    assert!(broker.borrow().is_subscribed("commands/sensor-1"));
    assert_eq!(
        client.subscriptions().collect::<Vec<_>>(),
        vec![("commands/sensor-1", QoS::AtLeastOnce)]
    );
}

#[test]
fn test_rejected_subscription_not_recorded() {
    let broker = RefCell::new(LoopbackBroker::new());
    broker.borrow_mut().reject_subscriptions = true;
    let mut client = mock::connected(&broker);

    assert_eq!(
        client.subscribe("secret", QoS::AtMostOnce),
        Err(Error::SubscriptionRejected)
    );
    assert!(!client.is_subscribed("secret"));
    assert!(client.is_connected());
}

#[test]
fn test_missing_suback_not_recorded() {
    let broker = RefCell::new(LoopbackBroker::new());
    broker.borrow_mut().ack_subscribes = false;
    let mut client = mock::connected(&broker);

    assert_eq!(
        client.subscribe("t", QoS::AtMostOnce),
        Err(Error::Timeout(Timeout::SubAck))
    );
    assert!(!client.is_subscribed("t"));
    assert!(client.is_connected());
}

#[test]
fn test_ping() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);

    client.ping().unwrap();
    assert_eq!(broker.borrow().pings(), 1);
}

#[test]
fn test_ping_timeout_is_soft() {
    let broker = RefCell::new(LoopbackBroker::new());
    broker.borrow_mut().answer_pings = false;
    let mut client = mock::connected(&broker);

    assert_eq!(client.ping(), Err(Error::Timeout(Timeout::PingResp)));
    assert!(client.is_connected());
    assert!(!Error::Timeout(Timeout::PingResp).is_fatal());
}

#[test]
fn test_ping_answered_with_wrong_packet_disconnects() {
    let broker = RefCell::new(LoopbackBroker::new());
    broker.borrow_mut().answer_pings = false;
    let mut client = mock::connected(&broker);
    broker.borrow_mut().inject(&[0x20, 0x02, 0x00, 0x00]).unwrap();

    let result = client.ping();
    assert_eq!(
        result,
        Err(Error::Connection(ConnectionError::UnexpectedPacket {
            expected: 0xD0,
            received: 0x20,
        }))
    );
    assert!(result.unwrap_err().is_fatal());
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[test]
fn test_publish_pings_after_idle_keepalive() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);

    client.clock_mut().advance(30_000);
    client.publish("t", b"1", false, QoS::AtMostOnce).unwrap();
    assert_eq!(broker.borrow().pings(), 0);

    client.clock_mut().advance(61_000);
    client.publish("t", b"2", false, QoS::AtMostOnce).unwrap();
    assert_eq!(broker.borrow().pings(), 1);
}

#[test]
fn test_keepalive_ping_timeout_does_not_block_publish() {
    let broker = RefCell::new(LoopbackBroker::new());
    broker.borrow_mut().answer_pings = false;
    let mut client = mock::connected(&broker);

    client.clock_mut().advance(61_000);
    client.publish("t", b"1", false, QoS::AtMostOnce).unwrap();
    assert_eq!(broker.borrow().pings(), 1);
    assert_eq!(broker.borrow().publishes(), 1);
}

#[test]
fn test_poll_receives_and_acknowledges() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);
    client.subscribe("commands", QoS::AtLeastOnce).unwrap();

    assert!(broker.borrow_mut().deliver("commands", b"reboot").unwrap());
    let message = client.poll_incoming(100).unwrap().unwrap();
    assert_eq!(message.topic.as_str(), "commands");
    assert_eq!(&message.payload[..], b"reboot");
    assert_eq!(broker.borrow().pubacks(), 1);
    assert_eq!(client.store().get("commands").map(|p| &p[..]), Some(&b"reboot"[..]));

    assert_eq!(client.poll_incoming(100), Ok(None));
}

#[test]
fn test_poll_drops_other_packets() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);
    broker.borrow_mut().inject(&[0xD0, 0x00]).unwrap();

    assert_eq!(client.poll_incoming(100), Ok(None));
    assert_eq!(broker.borrow().pending(), 0);
    assert!(client.is_connected());
}

#[test]
fn test_partial_packet_kept_between_polls() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);
    let packet = encode_publish("a/b", b"payload", false, QoS::AtMostOnce, None).unwrap();

    broker.borrow_mut().inject(&packet[..4]).unwrap();
    assert_eq!(client.poll_incoming(100), Ok(None));

    broker.borrow_mut().inject(&packet[4..]).unwrap();
    let message = client.poll_incoming(100).unwrap().unwrap();
    assert_eq!(message.topic.as_str(), "a/b");
    assert_eq!(&message.payload[..], b"payload");
}

#[test]
fn test_packets_dribbled_byte_by_byte() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);
    client.subscribe("t", QoS::AtLeastOnce).unwrap();
    broker.borrow_mut().read_chunk = 1;

    broker.borrow_mut().deliver("t", b"slow").unwrap();
    let message = client.poll_incoming(100).unwrap().unwrap();
    assert_eq!(&message.payload[..], b"slow");
    client.publish("t", b"ack", false, QoS::AtLeastOnce).unwrap();
}

#[test]
fn test_oversized_packet_is_skipped() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);

    let body_len = 5_000;
    let mut oversized = vec![0x30];
    oversized.extend_from_slice(&encode_remaining_length(body_len).unwrap());
    oversized.extend_from_slice(&[0x00, 0x03, b'b', b'i', b'g']);
    oversized.resize(oversized.len() + body_len - 5, 0xAB);
    broker.borrow_mut().inject(&oversized).unwrap();
    let next = encode_publish("small", b"ok", false, QoS::AtMostOnce, None).unwrap();
    broker.borrow_mut().inject(&next).unwrap();

    assert_eq!(
        client.poll_incoming(100),
        Err(Error::Protocol(ProtocolError::PacketTooLarge))
    );
    assert!(client.is_connected());

    let message = client.poll_incoming(100).unwrap().unwrap();
    assert_eq!(message.topic.as_str(), "small");
    assert_eq!(&message.payload[..], b"ok");
}

#[test]
fn test_unstorable_publish_is_still_acknowledged() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);

    let topic = "x".repeat(200);
    let packet = encode_publish(&topic, b"v", false, QoS::AtLeastOnce, Some(42)).unwrap();
    broker.borrow_mut().inject(&packet).unwrap();
    assert_eq!(
        client.poll_incoming(100),
        Err(Error::Protocol(ProtocolError::TopicTooLong))
    );
    assert_eq!(broker.borrow().pubacks(), 1);

    let payload = vec![0x5A; 2_100];
    let packet = encode_publish("t", &payload, false, QoS::AtLeastOnce, Some(43)).unwrap();
    broker.borrow_mut().inject(&packet).unwrap();
    assert_eq!(
        client.poll_incoming(100),
        Err(Error::Protocol(ProtocolError::PacketTooLarge))
    );
    assert_eq!(broker.borrow().pubacks(), 2);

    assert!(client.is_connected());
    assert!(client.store().is_empty());
    assert_eq!(client.poll_incoming(100), Ok(None));
    assert_eq!(broker.borrow().pubacks(), 2);
}

#[test]
fn test_discarded_qos1_publish_is_acknowledged() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);

    let body_len = 5_000;
    let mut oversized = vec![0x32];
    oversized.extend_from_slice(&encode_remaining_length(body_len).unwrap());
    oversized.extend_from_slice(&[0x00, 0x03, b'b', b'i', b'g', 0x00, 0x07]);
    oversized.resize(oversized.len() + body_len - 7, 0xAB);
    broker.borrow_mut().inject(&oversized).unwrap();

    assert_eq!(
        client.poll_incoming(100),
        Err(Error::Protocol(ProtocolError::PacketTooLarge))
    );
    assert_eq!(broker.borrow().pubacks(), 1);
    assert_eq!(client.poll_incoming(100), Ok(None));
    assert!(client.is_connected());
}

#[test]
fn test_malformed_publish_is_not_fatal() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);
    broker.borrow_mut().inject(&[0x30, 0x01, 0x00]).unwrap();

    let result = client.poll_incoming(100);
    assert_eq!(result, Err(Error::Protocol(ProtocolError::Truncated)));
    assert!(!result.unwrap_err().is_fatal());
    assert!(client.is_connected());
    client.ping().unwrap();
}

#[test]
fn test_publish_during_ack_wait_is_stored() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);
    let unsolicited = encode_publish("status", b"busy", false, QoS::AtMostOnce, None).unwrap();
    broker.borrow_mut().inject(&unsolicited).unwrap();

    client.publish("t", b"x", false, QoS::AtLeastOnce).unwrap();
    assert_eq!(client.store().get("status").map(|p| &p[..]), Some(&b"busy"[..]));
}

#[test]
fn test_connection_lost() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);
    broker.borrow_mut().hang_up();

    assert_eq!(
        client.poll_incoming(100),
        Err(Error::Connection(ConnectionError::ConnectionLost))
    );
    assert_eq!(client.state(), SessionState::Disconnected);
    assert_eq!(
        client.publish("t", b"x", false, QoS::AtMostOnce),
        Err(Error::Connection(ConnectionError::NotConnected))
    );
}

#[test]
fn test_write_failure_disconnects() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);
    broker.borrow_mut().hang_up();

    assert_eq!(
        client.publish("t", b"x", false, QoS::AtMostOnce),
        Err(Error::Connection(ConnectionError::Network(
            NetworkError::WriteError
        )))
    );
    assert_eq!(client.state(), SessionState::Disconnected);
}

#[test]
fn test_disconnect() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);

    client.disconnect();
    assert_eq!(client.state(), SessionState::Disconnected);
    assert_eq!(broker.borrow().disconnects(), 1);

    client.disconnect();
    assert_eq!(broker.borrow().disconnects(), 1);
}

#[test]
fn test_reconnect_starts_clean() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);
    client.subscribe("t", QoS::AtMostOnce).unwrap();

    client.connect().unwrap();
    assert!(!client.is_subscribed("t"));
    assert_eq!(broker.borrow().connections(), 2);
}

#[test]
fn test_topic_too_long() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);
    let topic = "t".repeat(200);

    assert_eq!(
        client.subscribe(&topic, QoS::AtMostOnce),
        Err(Error::Protocol(ProtocolError::TopicTooLong))
    );
    assert!(client.is_connected());
}
