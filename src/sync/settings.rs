//! Timing and retry configuration for synchronized lists.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::store::error::{invalid_argument, StoreError, StoreResult};
use crate::util::BackoffConfig;

/// Default idle time before coalesced edits are written (500 ms).
pub const DEFAULT_DEBOUNCE_MILLIS: u64 = 500;
/// Default upper bound between the first unflushed edit and its write (5 seconds).
pub const DEFAULT_MAX_WAIT_MILLIS: u64 = 5_000;

/// Debounce and retry behaviour of the write coordinator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncSettings {
    debounce_millis: u64,
    max_wait_millis: Option<u64>,
    retry: RetrySettings,
}

impl SyncSettings {
    /// Creates a new settings object after validating values.
    pub fn new(
        debounce_millis: u64,
        max_wait_millis: Option<u64>,
        retry: RetrySettings,
    ) -> StoreResult<Self> {
        let settings = Self {
            debounce_millis,
            max_wait_millis,
            retry,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Parses settings from JSON; absent keys keep their defaults.
    pub fn from_json_str(input: &str) -> StoreResult<Self> {
        let settings: Self = serde_json::from_str(input)
            .map_err(|err| invalid_argument(format!("invalid sync settings: {err}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_millis)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_millis.map(Duration::from_millis)
    }

    pub fn retry(&self) -> &RetrySettings {
        &self.retry
    }

    /// Applies a partial update, leaving the settings untouched when it is invalid.
    pub fn apply(&mut self, update: SyncSettingsUpdate) -> StoreResult<()> {
        let mut next = self.clone();
        if let Some(debounce) = update.debounce_millis {
            next.debounce_millis = debounce;
        }
        if let Some(max_wait) = update.max_wait_millis {
            next.max_wait_millis = max_wait;
        }
        if let Some(retry) = update.retry {
            next.retry = retry;
        }
        next.validate()?;
        *self = next;
        Ok(())
    }

    fn validate(&self) -> StoreResult<()> {
        if let Some(max_wait) = self.max_wait_millis {
            if max_wait < self.debounce_millis {
                return Err(invalid_argument(
                    "maxWaitMillis must not be shorter than debounceMillis",
                ));
            }
        }
        self.retry.validate()
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce_millis: DEFAULT_DEBOUNCE_MILLIS,
            max_wait_millis: Some(DEFAULT_MAX_WAIT_MILLIS),
            retry: RetrySettings::default(),
        }
    }
}

/// Partial update to apply on top of existing settings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncSettingsUpdate {
    pub debounce_millis: Option<u64>,
    pub max_wait_millis: Option<Option<u64>>,
    pub retry: Option<RetrySettings>,
}

impl SyncSettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.debounce_millis.is_none() && self.max_wait_millis.is_none() && self.retry.is_none()
    }
}

/// Automatic retry of failed writes. One attempt means failures surface immediately.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_millis: u64,
    pub multiplier: f64,
    pub max_delay_millis: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_millis: 200,
            multiplier: 2.0,
            max_delay_millis: 30_000,
        }
    }
}

impl RetrySettings {
    /// Whether a failure on zero-based `attempt` earns another try.
    pub fn should_retry(&self, attempt: u32, error: &StoreError) -> bool {
        error.is_transport() && attempt + 1 < self.max_attempts
    }

    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff().delay_for_attempt(attempt)
    }

    fn backoff(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: Duration::from_millis(self.initial_delay_millis),
            factor: self.multiplier,
            max_delay: Duration::from_millis(self.max_delay_millis),
            ..BackoffConfig::default()
        }
    }

    fn validate(&self) -> StoreResult<()> {
        if self.max_attempts == 0 {
            return Err(invalid_argument("retry.maxAttempts must be at least 1"));
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(invalid_argument("retry.multiplier must be at least 1.0"));
        }
        Ok(())
    }
}
