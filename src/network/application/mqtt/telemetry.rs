//! Publishing sensor readings.

use core::fmt::Write as _;

use log::info;
use serde::Serialize;

use super::client::Client;
use super::codec::QoS;
use super::error::{Error, ProtocolError};
use super::Topic;
use crate::network::error::Error as NetworkError;
use crate::network::{Connect, Transport};
use crate::time::Clock;

/// Data topic prefix used when none is configured.
pub const DEFAULT_DATA_PREFIX: &str = "/homecontrol/device/data";

const READING_JSON_LEN: usize = 256;

/// One combined temperature and humidity sample, published as JSON.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SensorReading<'a> {
    /// Temperature in `unit`.
    pub temperature: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
    /// Device uptime in seconds.
    pub uptime: u64,
    /// Temperature unit, `"C"` or `"F"`.
    pub unit: &'a str,
}

/// `{prefix}/{sensor_id}/data`
pub fn data_topic(prefix: &str, sensor_id: &str) -> Result<Topic, ProtocolError> {
    let mut topic = Topic::new();
    write!(topic, "{prefix}/{sensor_id}/data").map_err(|_| ProtocolError::TopicTooLong)?;
    Ok(topic)
}

impl<N, K> Client<'_, N, K>
where
    N: Connect<Error = NetworkError>,
    N::Connection: Transport,
    K: Clock,
{
    /// Publish `reading` with QoS 0 to the data topic of `sensor_id`.
    pub fn publish_reading(
        &mut self,
        prefix: &str,
        sensor_id: &str,
        reading: &SensorReading<'_>,
    ) -> Result<(), Error> {
        let topic = data_topic(prefix, sensor_id)?;
        let mut json = [0u8; READING_JSON_LEN];
        let len = serde_json_core::to_slice(reading, &mut json)
            .map_err(|_| ProtocolError::PayloadEncoding)?;
        self.publish(&topic, &json[..len], false, QoS::AtMostOnce)?;
        info!("published reading to {}", topic);
        Ok(())
    }
}
