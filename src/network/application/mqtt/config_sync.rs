//! Remote configuration over two topics.
//!
//! A publisher keeps two retained messages per device: a decimal version
//! number on the *version* topic and the full JSON document on the *data*
//! topic. The device reads the cheap version first and fetches the document
//! only when the announced version is newer than its own. The document is
//! accepted only if its embedded `version` equals the announced one, which
//! catches a data topic that changed again between the two reads.
//!
//! Every failure falls back to the configuration already in use.

use core::fmt;

use log::{debug, info, warn};
use serde::de::DeserializeOwned;

use super::client::Client;
use super::codec::QoS;
use super::error::Error;
use super::Payload;
use crate::config::MqttConfig;
use crate::network::error::Error as NetworkError;
use crate::network::{Connect, Transport};
use crate::time::Clock;

/// A configuration document carrying its own version.
pub trait Versioned {
    /// The document version.
    fn version(&self) -> u32;
}

/// Why a remote configuration was not taken.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigSyncError {
    /// Nothing arrived on the version topic.
    NoVersion,
    /// The version topic did not hold a decimal integer.
    InvalidVersion,
    /// Nothing arrived on the data topic.
    NoDocument,
    /// The data topic did not hold a valid document.
    InvalidDocument,
    /// The document's version differs from the announced one.
    VersionMismatch {
        /// Version read from the version topic.
        announced: u32,
        /// Version embedded in the document.
        embedded: u32,
    },
    /// Reading a topic failed.
    Transport(Error),
}

impl From<Error> for ConfigSyncError {
    fn from(e: Error) -> Self {
        ConfigSyncError::Transport(e)
    }
}

impl fmt::Display for ConfigSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSyncError::NoVersion => f.write_str("no version published"),
            ConfigSyncError::InvalidVersion => f.write_str("version is not an integer"),
            ConfigSyncError::NoDocument => f.write_str("no configuration published"),
            ConfigSyncError::InvalidDocument => f.write_str("configuration is not valid JSON"),
            ConfigSyncError::VersionMismatch {
                announced,
                embedded,
            } => write!(f, "announced version {announced}, document has {embedded}"),
            ConfigSyncError::Transport(e) => write!(f, "read failed: {e}"),
        }
    }
}

/// A validated remote document and the bytes it was parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigUpdate<D> {
    /// The parsed document.
    pub document: D,
    /// The data topic payload, unchanged.
    pub raw: Payload,
}

/// The version and data topics plus the wait applied to each read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigSync<'a> {
    /// Topic carrying the decimal version.
    pub version_topic: &'a str,
    /// Topic carrying the JSON document.
    pub data_topic: &'a str,
    /// Wait per topic read, in milliseconds.
    pub wait_ms: u32,
}

impl<'a> ConfigSync<'a> {
    /// Sync over the given topics.
    pub fn new(version_topic: &'a str, data_topic: &'a str, wait_ms: u32) -> Self {
        Self {
            version_topic,
            data_topic,
            wait_ms,
        }
    }

    /// Sync as configured, or `None` when loading configuration over MQTT is
    /// off or a topic is missing.
    pub fn from_config(config: &'a MqttConfig) -> Option<Self> {
        if !config.load_config_from_mqtt {
            return None;
        }
        match (&config.topic_config_version, &config.topic_config_data) {
            (Some(version), Some(data)) if !version.is_empty() && !data.is_empty() => {
                Some(Self::new(version.as_str(), data.as_str(), config.config_wait_ms()))
            }
            _ => {
                info!("configuration version or data topic not set");
                None
            }
        }
    }

    /// Subscribe to the version topic.
    pub fn subscribe<N, K>(&self, client: &mut Client<'_, N, K>) -> Result<(), Error>
    where
        N: Connect<Error = NetworkError>,
        N::Connection: Transport,
        K: Clock,
    {
        client.subscribe(self.version_topic, QoS::AtMostOnce)
    }

    /// Fetch a document newer than `local_version`.
    ///
    /// `Ok(None)` means the announced version is not newer.
    pub fn fetch_update<D, N, K>(
        &self,
        client: &mut Client<'_, N, K>,
        local_version: u32,
    ) -> Result<Option<D>, ConfigSyncError>
    where
        D: DeserializeOwned + Versioned,
        N: Connect<Error = NetworkError>,
        N::Connection: Transport,
        K: Clock,
    {
        Ok(self
            .fetch_raw_update::<D, N, K>(client, local_version)?
            .map(|update| update.document))
    }

    /// [`fetch_update`](Self::fetch_update), keeping the data topic payload
    /// as received.
    ///
    /// Persist [`ConfigUpdate::raw`] rather than re-serializing the document
    /// when `D` does not model every section the publisher sends.
    pub fn fetch_raw_update<D, N, K>(
        &self,
        client: &mut Client<'_, N, K>,
        local_version: u32,
    ) -> Result<Option<ConfigUpdate<D>>, ConfigSyncError>
    where
        D: DeserializeOwned + Versioned,
        N: Connect<Error = NetworkError>,
        N::Connection: Transport,
        K: Clock,
    {
        let raw = client
            .read_topic(self.version_topic, self.wait_ms)?
            .ok_or(ConfigSyncError::NoVersion)?;
        let announced = parse_version(&raw)?;
        if announced <= local_version {
            debug!("remote version {} not newer than {}", announced, local_version);
            return Ok(None);
        }

        info!("remote version {} > {}, fetching {}", announced, local_version, self.data_topic);
        let raw = client
            .read_topic(self.data_topic, self.wait_ms)?
            .ok_or(ConfigSyncError::NoDocument)?;
        let (document, _): (D, usize) =
            serde_json_core::from_slice(&raw).map_err(|_| ConfigSyncError::InvalidDocument)?;

        let embedded = document.version();
        if embedded != announced {
            return Err(ConfigSyncError::VersionMismatch {
                announced,
                embedded,
            });
        }
        Ok(Some(ConfigUpdate { document, raw }))
    }

    /// Return a newer remote document, or `current` unchanged.
    pub fn check_config_update<D, N, K>(&self, client: &mut Client<'_, N, K>, current: D) -> D
    where
        D: DeserializeOwned + Versioned,
        N: Connect<Error = NetworkError>,
        N::Connection: Transport,
        K: Clock,
    {
        match self.fetch_update::<D, N, K>(client, current.version()) {
            Ok(Some(document)) => {
                info!("configuration updated to version {}", document.version());
                document
            }
            Ok(None) => current,
            Err(e) => {
                warn!("keeping configuration version {}: {}", current.version(), e);
                current
            }
        }
    }
}

/// [`ConfigSync::check_config_update`] without building a [`ConfigSync`].
pub fn check_config_update<D, N, K>(
    client: &mut Client<'_, N, K>,
    version_topic: &str,
    data_topic: &str,
    wait_ms: u32,
    current: D,
) -> D
where
    D: DeserializeOwned + Versioned,
    N: Connect<Error = NetworkError>,
    N::Connection: Transport,
    K: Clock,
{
    ConfigSync::new(version_topic, data_topic, wait_ms).check_config_update(client, current)
}

fn parse_version(raw: &[u8]) -> Result<u32, ConfigSyncError> {
    core::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or(ConfigSyncError::InvalidVersion)
}
