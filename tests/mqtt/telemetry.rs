use core::cell::RefCell;

use esp_sensors::config::DeviceConfig;
use esp_sensors::network::application::mqtt::{ConnectionError, Error, SensorReading};
use esp_sensors::network::loopback::LoopbackBroker;

use crate::mock;

const READING: SensorReading<'static> = SensorReading {
    temperature: 22.5,
    humidity: 48.5,
    uptime: 3_600,
    unit: "C",
};

#[test]
fn test_reading_is_published_as_json() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);
    let config = DeviceConfig::default();

    client
        .publish_reading(config.mqtt.data_prefix(), "livingroom-dht22", &READING)
        .unwrap();

    let broker = broker.borrow();
    let message = broker.last_published().unwrap();
    assert_eq!(
        message.topic.as_str(),
        "/homecontrol/device/data/livingroom-dht22/data"
    );
    let json = core::str::from_utf8(&message.payload).unwrap();
    assert_eq!(
        json,
        r#"{"temperature":22.5,"humidity":48.5,"uptime":3600,"unit":"C"}"#
    );
    assert_eq!(client.last_packet_id(), 0);
}

#[test]
fn test_configured_prefix() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::connected(&broker);
    let mut config = DeviceConfig::default();
    config.mqtt.topic_data_prefix = "/home/kitchen".try_into().unwrap();

    client
        .publish_reading(config.mqtt.data_prefix(), "sht31", &READING)
        .unwrap();
    assert_eq!(
        broker.borrow().last_published().unwrap().topic.as_str(),
        "/home/kitchen/sht31/data"
    );
}

#[test]
fn test_reading_needs_connection() {
    let broker = RefCell::new(LoopbackBroker::new());
    let mut client = mock::client(&broker);

    assert_eq!(
        client.publish_reading("/p", "s", &READING),
        Err(Error::Connection(ConnectionError::NotConnected))
    );
    assert!(broker.borrow().last_published().is_none());
}
