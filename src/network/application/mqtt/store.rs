//! Most recent payload per topic, and the synchronous topic read.

use heapless::FnvIndexMap;
use log::{debug, warn};

use super::client::Client;
use super::codec::QoS;
use super::error::Error;
use super::{MAX_TOPICS, POLL_INTERVAL_MS, POLL_SLICE_MS, Payload, Topic};
use crate::network::error::Error as NetworkError;
use crate::network::{Connect, Transport};
use crate::time::Clock;

/// Topic → most recently received payload.
///
/// Holds at most [`MAX_TOPICS`] topics. When full, storing a new topic
/// evicts one of the others.
#[derive(Debug, Default)]
pub struct MessageStore {
    entries: FnvIndexMap<Topic, Payload, MAX_TOPICS>,
}

impl MessageStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            entries: FnvIndexMap::new(),
        }
    }

    /// Record `payload` as the latest value of `topic`, replacing any previous one.
    pub fn insert(&mut self, topic: &Topic, payload: &Payload) {
        if !self.entries.contains_key(topic) && self.entries.len() == MAX_TOPICS {
            if let Some(evicted) = self.entries.keys().next().cloned() {
                debug!("store full, evicting {}", evicted);
                self.entries.remove(&evicted);
            }
        }
        if self.entries.insert(topic.clone(), payload.clone()).is_err() {
            warn!("store rejected payload for {}", topic);
        }
    }

    /// Latest payload for `topic`.
    pub fn get(&self, topic: &str) -> Option<&Payload> {
        let key = Topic::try_from(topic).ok()?;
        self.entries.get(&key)
    }

    /// Forget the payload for `topic`.
    pub fn clear(&mut self, topic: &str) -> Option<Payload> {
        let key = Topic::try_from(topic).ok()?;
        self.entries.remove(&key)
    }

    /// Number of topics with a stored payload.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N, K> Client<'_, N, K>
where
    N: Connect<Error = NetworkError>,
    N::Connection: Transport,
    K: Clock,
{
    /// Wait up to `wait_ms` for a message on `topic`.
    ///
    /// Any payload stored before the call is discarded first, so only a
    /// message arriving after the read began (a retained message delivered on
    /// subscription included) is returned. Subscribes with QoS 0 if the topic
    /// is not subscribed yet, then polls in short slices with a short sleep in
    /// between until the payload shows up or the time is up. A SUBACK that
    /// does not arrive in time does not end the wait.
    ///
    /// `Ok(None)` means nothing arrived in time. Malformed packets seen while
    /// waiting are logged and skipped; connection failures are returned.
    ///
    /// ```rust,no_run
    /// # use core::cell::RefCell;
    /// # use esp_sensors::network::application::mqtt::{Client, Options};
    /// # use esp_sensors::network::loopback::{LoopbackBroker, LoopbackConnector};
    /// # use esp_sensors::time::Clock;
    /// # struct Ticks(u64);
    /// # impl Clock for Ticks {
    /// #     fn now_ms(&self) -> u64 { self.0 }
    /// #     fn unix_time(&self) -> u64 { self.0 / 1000 }
    /// #     fn sleep_ms(&mut self, ms: u32) { self.0 += u64::from(ms) }
    /// # }
    /// # let broker = RefCell::new(LoopbackBroker::new());
    /// # let mut client = Client::new(LoopbackConnector::new(&broker), Options::new("id", "host"), Ticks(0));
    /// # client.connect().unwrap();
    /// match client.read_topic("/homecontrol/livingroom/config/version", 1_000) {
    ///     Ok(Some(version)) => { /* compare with the local version */ }
    ///     Ok(None) => { /* nobody published in time */ }
    ///     Err(e) => { /* reconnect */ }
    /// }
    /// ```
    pub fn read_topic(&mut self, topic: &str, wait_ms: u32) -> Result<Option<Payload>, Error> {
        self.ensure_connected()?;
        self.store.clear(topic);
        if !self.is_subscribed(topic) {
            match self.subscribe(topic, QoS::AtMostOnce) {
                Ok(()) => {}
                Err(Error::Timeout(_)) => debug!("polling {} without a SUBACK", topic),
                Err(e) => return Err(e),
            }
        }

        let start = self.clock().now_ms();
        loop {
            if let Some(payload) = self.store.get(topic) {
                return Ok(Some(payload.clone()));
            }
            let elapsed = self.clock().now_ms().saturating_sub(start);
            let remaining = u64::from(wait_ms).saturating_sub(elapsed);
            if remaining == 0 {
                debug!("nothing on {} within {} ms", topic, wait_ms);
                return Ok(None);
            }
            let remaining = u32::try_from(remaining).unwrap_or(u32::MAX);

            match self.poll_incoming(POLL_SLICE_MS.min(remaining)) {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(Error::Protocol(e)) => warn!("dropping inbound packet: {}", e),
                Err(e) => return Err(e),
            }
            self.clock_mut().sleep_ms(POLL_INTERVAL_MS.min(remaining));
        }
    }
}
