/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Configuration for the reminder processor and scheduler.
//!
//! # Construction
//!
//! ```rust,ignore
//! let config = ProcessorConfig::builder()
//!     .max_attempts(5)
//!     .delivery_timeout(Duration::from_secs(30))
//!     .build();
//! ```
//!
//! Or from the environment (a `.env` file is loaded first if present):
//!
//! ```rust,ignore
//! let config = ProcessorConfig::from_env()?;
//! ```
//!
//! | Variable | Default |
//! |---|---|
//! | `NUDGE_BATCH_SIZE` | 100 |
//! | `NUDGE_MAX_ATTEMPTS` | 3 |
//! | `NUDGE_RETENTION_DAYS` | 30 |
//! | `NUDGE_DELIVERY_TIMEOUT_SECS` | 10 |
//! | `NUDGE_MAX_CONCURRENT_DELIVERIES` | 1 |
//! | `NUDGE_POLL_INTERVAL_SECS` | 60 |
//! | `NUDGE_TIMEZONE` | `UTC` |

use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::error::ConfigError;

/// Shortest trigger cadence; `tokio::time::interval` rejects a zero period.
pub(crate) const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Configuration for a [`ReminderProcessor`](crate::processor::ReminderProcessor).
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ProcessorConfig {
    batch_size: i64,
    max_attempts: u32,
    retention: chrono::Duration,
    delivery_timeout: Duration,
    max_concurrent_deliveries: usize,
    poll_interval: Duration,
    timezone: Tz,
}

impl ProcessorConfig {
    /// Creates a new configuration builder with default values.
    pub fn builder() -> ProcessorConfigBuilder {
        ProcessorConfigBuilder::default()
    }

    /// Loads configuration from `NUDGE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(value) = parse_var::<i64, _>(&lookup, "NUDGE_BATCH_SIZE")? {
            builder = builder.batch_size(positive("NUDGE_BATCH_SIZE", value)?);
        }
        if let Some(value) = parse_var::<u32, _>(&lookup, "NUDGE_MAX_ATTEMPTS")? {
            builder = builder.max_attempts(positive("NUDGE_MAX_ATTEMPTS", value)?);
        }
        if let Some(value) = parse_var::<i64, _>(&lookup, "NUDGE_RETENTION_DAYS")? {
            let days = positive("NUDGE_RETENTION_DAYS", value)?;
            builder = builder.retention(chrono::Duration::days(days));
        }
        if let Some(value) = parse_var::<u64, _>(&lookup, "NUDGE_DELIVERY_TIMEOUT_SECS")? {
            let secs = positive("NUDGE_DELIVERY_TIMEOUT_SECS", value)?;
            builder = builder.delivery_timeout(Duration::from_secs(secs));
        }
        if let Some(value) = parse_var::<usize, _>(&lookup, "NUDGE_MAX_CONCURRENT_DELIVERIES")? {
            builder = builder
                .max_concurrent_deliveries(positive("NUDGE_MAX_CONCURRENT_DELIVERIES", value)?);
        }
        if let Some(value) = parse_var::<u64, _>(&lookup, "NUDGE_POLL_INTERVAL_SECS")? {
            let secs = positive("NUDGE_POLL_INTERVAL_SECS", value)?;
            builder = builder.poll_interval(Duration::from_secs(secs));
        }
        if let Some(raw) = lookup("NUDGE_TIMEZONE") {
            let tz = Tz::from_str(raw.trim()).map_err(|e| ConfigError::InvalidValue {
                key: "NUDGE_TIMEZONE".to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            builder = builder.timezone(tz);
        }

        Ok(builder.build())
    }

    /// Maximum number of due entries fetched per pass.
    pub fn batch_size(&self) -> i64 {
        self.batch_size
    }

    /// Delivery attempts after which an entry is failed for good.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// How long terminal entries are kept.
    pub fn retention(&self) -> chrono::Duration {
        self.retention
    }

    /// Upper bound on a single Notifier call.
    pub fn delivery_timeout(&self) -> Duration {
        self.delivery_timeout
    }

    /// Deliveries in flight at once within one pass.
    pub fn max_concurrent_deliveries(&self) -> usize {
        self.max_concurrent_deliveries
    }

    /// Cadence of the [`PeriodicTrigger`](crate::trigger::PeriodicTrigger).
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Zone used for calendar-day lead times and message formatting.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfigBuilder::default().build()
    }
}

/// Builder for [`ProcessorConfig`].
#[derive(Debug, Clone)]
pub struct ProcessorConfigBuilder {
    config: ProcessorConfig,
}

impl Default for ProcessorConfigBuilder {
    fn default() -> Self {
        Self {
            config: ProcessorConfig {
                batch_size: 100,
                max_attempts: 3,
                retention: chrono::Duration::days(30),
                delivery_timeout: Duration::from_secs(10),
                max_concurrent_deliveries: 1,
                poll_interval: Duration::from_secs(60),
                timezone: Tz::UTC,
            },
        }
    }
}

impl ProcessorConfigBuilder {
    /// Sets the per-pass fetch limit; values below 1 are raised to 1.
    pub fn batch_size(mut self, value: i64) -> Self {
        self.config.batch_size = value.max(1);
        self
    }

    /// Sets the attempt ceiling.
    pub fn max_attempts(mut self, value: u32) -> Self {
        self.config.max_attempts = value;
        self
    }

    /// Sets the retention window for terminal entries.
    pub fn retention(mut self, value: chrono::Duration) -> Self {
        self.config.retention = value;
        self
    }

    /// Sets the Notifier timeout.
    pub fn delivery_timeout(mut self, value: Duration) -> Self {
        self.config.delivery_timeout = value;
        self
    }

    /// Sets the delivery concurrency; values below 1 are raised to 1.
    pub fn max_concurrent_deliveries(mut self, value: usize) -> Self {
        self.config.max_concurrent_deliveries = value.max(1);
        self
    }

    /// Sets the trigger cadence; a zero interval is raised to 1ms.
    pub fn poll_interval(mut self, value: Duration) -> Self {
        self.config.poll_interval = value.max(MIN_POLL_INTERVAL);
        self
    }

    /// Sets the calendar time zone.
    pub fn timezone(mut self, value: Tz) -> Self {
        self.config.timezone = value;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> ProcessorConfig {
        self.config
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
    }
}

fn positive<T>(key: &str, value: T) -> Result<T, ConfigError>
where
    T: PartialOrd + Default + std::fmt::Display,
{
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        })
    }
}
