//  Copyright 2024, The Tari Project
//
//  Redistribution and use in source and binary forms, with or without modification, are permitted provided that the
//  following conditions are met:
//
//  1. Redistributions of source code must retain the above copyright notice, this list of conditions and the following
//  disclaimer.
//
//  2. Redistributions in binary form must reproduce the above copyright notice, this list of conditions and the
//  following disclaimer in the documentation and/or other materials provided with the distribution.
//
//  3. Neither the name of the copyright holder nor the names of its contributors may be used to endorse or promote
//  products derived from this software without specific prior written permission.
//
//  THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES,
//  INCLUDING, BUT NOT LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR PURPOSE ARE
//  DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
//  SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR
//  SERVICES; LOSS OF USE, DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF LIABILITY,
//  WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE
//  USE OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

use std::time::Duration;

use config::Config;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Failed to load capabilities configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid capabilities configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapabilitiesConfig {
    /// The interval between periodic refreshes of the capability registry.
    /// Default: 30s
    #[serde(with = "serializers::seconds")]
    pub refresh_interval: Duration,
    /// Number of attempts to fetch the registry snapshot at start-up before giving up.
    /// Default: 5
    pub initial_fetch_max_attempts: usize,
    /// Delay before the second start-up fetch attempt. The delay doubles on every further attempt.
    /// Default: 1s
    #[serde(with = "serializers::seconds")]
    pub initial_fetch_backoff: Duration,
    /// Upper bound of the delay between start-up fetch attempts.
    /// Default: 30s
    #[serde(with = "serializers::seconds")]
    pub max_fetch_backoff: Duration,
    /// Number of consecutive failed refreshes after which the syncer reports degraded health.
    /// Default: 3
    pub soft_failure_threshold: usize,
    /// Deadline for any single call to the registry source, capabilities registry, dispatcher or peer.
    /// Default: 10s
    #[serde(with = "serializers::seconds")]
    pub call_timeout: Duration,
    /// Maximum time `close` waits for the refresh worker and an in-flight reconciliation.
    /// Default: 10s
    #[serde(with = "serializers::seconds")]
    pub shutdown_timeout: Duration,
    /// Capacity of the syncer event broadcast channel.
    /// Default: 100
    pub event_channel_size: usize,
}

impl CapabilitiesConfig {
    const MAIN_KEY_PREFIX: &'static str = "capabilities";

    /// Loads the `[capabilities]` section. Missing keys (or a missing section) take their default values.
    pub fn load_from(config: &Config) -> Result<Self, ConfigurationError> {
        match config.get::<Self>(Self::MAIN_KEY_PREFIX) {
            Ok(config) => Ok(config),
            Err(config::ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.initial_fetch_max_attempts == 0 {
            return Err(ConfigurationError::Invalid(
                "initial_fetch_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.refresh_interval.is_zero() {
            return Err(ConfigurationError::Invalid("refresh_interval must be non-zero".to_string()));
        }
        if self.call_timeout.is_zero() || self.shutdown_timeout.is_zero() {
            return Err(ConfigurationError::Invalid(
                "call_timeout and shutdown_timeout must be non-zero".to_string(),
            ));
        }
        if self.max_fetch_backoff < self.initial_fetch_backoff {
            return Err(ConfigurationError::Invalid(format!(
                "max_fetch_backoff ({:.2?}) is less than initial_fetch_backoff ({:.2?})",
                self.max_fetch_backoff, self.initial_fetch_backoff
            )));
        }
        if self.event_channel_size == 0 {
            return Err(ConfigurationError::Invalid("event_channel_size must be non-zero".to_string()));
        }
        Ok(())
    }
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        // NB: please remember to update field comments to reflect these defaults
        Self {
            refresh_interval: Duration::from_secs(30),
            initial_fetch_max_attempts: 5,
            initial_fetch_backoff: Duration::from_secs(1),
            max_fetch_backoff: Duration::from_secs(30),
            soft_failure_threshold: 3,
            call_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(10),
            event_channel_size: 100,
        }
    }
}

pub mod serializers {
    pub mod seconds {
        //! (De)serializes a `Duration` as a whole number of seconds.
        //! ```ignore
        //! #[serde(with = "serializers::seconds")]
        //! pub my_var: Duration
        //! ```
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
        where D: Deserializer<'de> {
            Ok(Duration::from_secs(u64::deserialize(deserializer)?))
        }

        pub fn serialize<S>(duration: &Duration, s: S) -> Result<S::Ok, S::Error>
        where S: Serializer {
            s.serialize_u64(duration.as_secs())
        }
    }
}
