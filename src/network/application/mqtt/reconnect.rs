//! Exponential backoff between connection attempts.
//!
//! The first `max_attempts` attempts are made back to back. After that the
//! wait since the last attempt grows as
//! `min_interval * backoff_factor^(attempt_count - max_attempts)`, capped at
//! `max_interval`. All times are wall-clock seconds so the state can be
//! persisted and survive a deep-sleep or restart.

use log::info;
use serde::{Deserialize, Serialize};

use super::client::Client;
use super::error::{ConnectionError, Error};
use crate::network::error::Error as NetworkError;
use crate::network::{Connect, Transport};
use crate::time::Clock;

/// Reconnection state and its tuning.
///
/// ```rust
/// use esp_sensors::network::application::mqtt::ReconnectPolicy;
///
/// let mut policy = ReconnectPolicy::default();
/// for _ in 0..3 {
///     assert!(policy.should_attempt_connection(1_000));
///     policy.update_reconnection_state(false, 1_000);
/// }
/// assert!(!policy.should_attempt_connection(1_000));
/// assert!(policy.should_attempt_connection(1_000 + 3_600));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// When off, every attempt is allowed.
    pub enabled: bool,
    /// Consecutive failed attempts.
    pub attempt_count: u32,
    /// Unix time of the last attempt, in seconds.
    pub last_attempt_time: u64,
    /// Attempts allowed before backing off.
    pub max_attempts: u32,
    /// Growth factor of the interval per further failure.
    pub backoff_factor: u32,
    /// First backoff interval, in seconds.
    pub min_interval: u64,
    /// Upper bound of the interval, in seconds.
    pub max_interval: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            attempt_count: 0,
            last_attempt_time: 0,
            max_attempts: 3,
            backoff_factor: 2,
            min_interval: 3_600,
            max_interval: 21_600,
        }
    }
}

impl ReconnectPolicy {
    /// Current wait between attempts, in seconds. 0 while attempts remain.
    pub fn backoff_interval(&self) -> u64 {
        if self.attempt_count < self.max_attempts {
            return 0;
        }
        let exponent = self.attempt_count - self.max_attempts;
        let factor = u64::from(self.backoff_factor)
            .checked_pow(exponent)
            .unwrap_or(u64::MAX);
        self.min_interval
            .saturating_mul(factor)
            .min(self.max_interval)
    }

    /// Whether a connection attempt may be made at `now` (Unix seconds).
    pub fn should_attempt_connection(&self, now: u64) -> bool {
        !self.enabled
            || self.attempt_count < self.max_attempts
            || now.saturating_sub(self.last_attempt_time) >= self.backoff_interval()
    }

    /// Seconds until an attempt is allowed, 0 if one is allowed now.
    pub fn next_attempt_in(&self, now: u64) -> u64 {
        if self.should_attempt_connection(now) {
            0
        } else {
            self.backoff_interval() - now.saturating_sub(self.last_attempt_time)
        }
    }

    /// Record the outcome of an attempt made at `now`.
    pub fn update_reconnection_state(&mut self, success: bool, now: u64) {
        self.attempt_count = if success {
            0
        } else {
            self.attempt_count.saturating_add(1)
        };
        self.last_attempt_time = now;
    }
}

impl<N, K> Client<'_, N, K>
where
    N: Connect<Error = NetworkError>,
    N::Connection: Transport,
    K: Clock,
{
    /// [`connect`](Client::connect), unless `policy` says to wait.
    ///
    /// The outcome is recorded in `policy` unless it is disabled. A skipped attempt fails with
    /// [`ConnectionError::Backoff`] and leaves `policy` untouched.
    pub fn connect_with_policy(&mut self, policy: &mut ReconnectPolicy) -> Result<(), Error> {
        let now = self.clock().unix_time();
        if !policy.should_attempt_connection(now) {
            let retry_in = policy.next_attempt_in(now);
            info!(
                "skipping connection attempt after {} failures, next in {}s",
                policy.attempt_count, retry_in
            );
            return Err(ConnectionError::Backoff { retry_in }.into());
        }

        let result = self.connect();
        if !policy.enabled {
            return result;
        }
        policy.update_reconnection_state(result.is_ok(), now);
        if result.is_err() {
            info!(
                "connection attempt {} failed, next wait {}s",
                policy.attempt_count,
                policy.backoff_interval()
            );
        }
        result
    }
}
