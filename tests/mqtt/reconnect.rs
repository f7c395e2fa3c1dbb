use core::cell::RefCell;

use esp_sensors::network::application::mqtt::{ConnectionError, Error, ReconnectPolicy};
use esp_sensors::network::error::Error as NetworkError;
use esp_sensors::network::loopback::LoopbackBroker;

use crate::mock::{self, UNIX_BASE};

const REFUSED: Result<(), Error> = Err(Error::Connection(ConnectionError::Network(
    NetworkError::ConnectionRefused,
)));

#[test]
fn test_backoff_after_repeated_failures() {
    let broker = RefCell::new(LoopbackBroker::new());
    broker.borrow_mut().accept_connections = false;
    let mut client = mock::client(&broker);
    let mut policy = ReconnectPolicy::default();

    for attempt in 1..=3 {
        assert_eq!(client.connect_with_policy(&mut policy), REFUSED);
        assert_eq!(policy.attempt_count, attempt);
    }
    assert_eq!(policy.last_attempt_time, UNIX_BASE);

    assert_eq!(
        client.connect_with_policy(&mut policy),
        Err(Error::Connection(ConnectionError::Backoff { retry_in: 3_600 }))
    );
    assert_eq!(policy.attempt_count, 3);

    client.clock_mut().advance(1_800_000);
    assert_eq!(
        client.connect_with_policy(&mut policy),
        Err(Error::Connection(ConnectionError::Backoff { retry_in: 1_800 }))
    );

    client.clock_mut().advance(1_800_000);
    assert_eq!(client.connect_with_policy(&mut policy), REFUSED);
    assert_eq!(policy.attempt_count, 4);
    assert_eq!(policy.backoff_interval(), 7_200);
}

#[test]
fn test_success_resets_the_count() {
    let broker = RefCell::new(LoopbackBroker::new());
    broker.borrow_mut().accept_connections = false;
    let mut client = mock::client(&broker);
    let mut policy = ReconnectPolicy::default();

    for _ in 0..3 {
        let _ = client.connect_with_policy(&mut policy);
    }
    broker.borrow_mut().accept_connections = true;
    client.clock_mut().advance(3_600_000);

    client.connect_with_policy(&mut policy).unwrap();
    assert!(client.is_connected());
    assert_eq!(policy.attempt_count, 0);
    assert_eq!(policy.last_attempt_time, UNIX_BASE + 3_600);
}

#[test]
fn test_refused_handshake_counts_as_failure() {
    let broker = RefCell::new(LoopbackBroker::new());
    broker.borrow_mut().connack_code = 5;
    let mut client = mock::client(&broker);
    let mut policy = ReconnectPolicy::default();

    assert!(client.connect_with_policy(&mut policy).is_err());
    assert_eq!(policy.attempt_count, 1);
}

#[test]
fn test_disabled_policy_never_throttles() {
    let broker = RefCell::new(LoopbackBroker::new());
    broker.borrow_mut().accept_connections = false;
    let mut client = mock::client(&broker);
    let mut policy = ReconnectPolicy {
        enabled: false,
        ..ReconnectPolicy::default()
    };

    for _ in 0..10 {
        assert_eq!(client.connect_with_policy(&mut policy), REFUSED);
    }
    assert_eq!(policy.attempt_count, 0);
    assert_eq!(policy.last_attempt_time, 0);
}

#[test]
fn test_persisted_state_survives_restart() {
    let mut config = esp_sensors::config::DeviceConfig::default();
    config.mqtt.reconnect.attempt_count = 5;
    config.mqtt.reconnect.last_attempt_time = UNIX_BASE;

    let mut buf = [0u8; 1024];
    let len = config.to_json(&mut buf).unwrap();
    let restored = esp_sensors::config::DeviceConfig::from_json(&buf[..len]).unwrap();
    let mut policy = restored.mqtt.reconnect;
    assert_eq!(policy.backoff_interval(), 14_400);

    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::client(&broker);
    assert_eq!(
        client.connect_with_policy(&mut policy),
        Err(Error::Connection(ConnectionError::Backoff { retry_in: 14_400 }))
    );
    assert_eq!(broker.borrow().connections(), 0);
}
