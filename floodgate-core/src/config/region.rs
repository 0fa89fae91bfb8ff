use std::{fmt::Display, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default drain timeout in seconds
pub const DEFAULT_DRAIN_TIMEOUT: i64 = 180;
/// Default reset timeout in seconds
pub const DEFAULT_RESET_TIMEOUT: i64 = 180;
/// Default maximum of consecutive reset attempts
pub const DEFAULT_MAX_CONSECUTIVE_RESET_ATTEMPTS: i64 = 5;
/// Largest allowed maximum of consecutive reset attempts
pub const MAX_RESET_ATTEMPTS_LIMIT: i64 = 0x7FFF_FFFF;

/// Period reported by regions which are not triggered periodically
const NO_PERIOD: i64 = -1;

/// How the drain/checkpoint cycle of a consistent region is triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Trigger {
    /// The start operator of the region decides when to checkpoint
    OperatorDriven,
    /// The coordinator checkpoints the region at a fixed period
    Periodic,
}

impl Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::OperatorDriven => write!(f, "OPERATOR_DRIVEN"),
            Trigger::Periodic => write!(f, "PERIODIC"),
        }
    }
}

/// Invalid configuration values. Nothing is ever clamped silently.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Period is zero or negative
    #[error("period must be greater than zero, got {0}")]
    InvalidPeriod(i64),
    /// Drain timeout is zero or negative
    #[error("drain timeout must be greater than zero, got {0}")]
    InvalidDrainTimeout(i64),
    /// Reset timeout is zero or negative
    #[error("reset timeout must be greater than zero, got {0}")]
    InvalidResetTimeout(i64),
    /// Reset attempts out of range
    #[error(
        "maximum consecutive reset attempts must be between 1 and {MAX_RESET_ATTEMPTS_LIMIT}, got {0}"
    )]
    InvalidResetAttempts(i64),
    /// Periodic trigger without a period
    #[error("a period must be specified for a periodic consistent region")]
    MissingPeriod,
    /// Operator-driven trigger with a period
    #[error("a period does not apply to an operator driven consistent region")]
    PeriodNotApplicable,
    /// Trigger name not recognized
    #[error("unknown trigger `{0}`, expected `operator_driven` or `periodic`")]
    UnknownTrigger(String),
}

/// Immutable definition of a consistent region.
///
/// All times are in seconds. The `with_*` methods return a new configuration with one field
/// changed and leave `self` untouched; they validate the new value like the constructors do.
///
/// ```rust
/// use floodgate::config::{ConsistentRegionConfig, Trigger};
///
/// let config = ConsistentRegionConfig::periodic(9)
///     .and_then(|c| c.with_max_consecutive_reset_attempts(10))
///     .unwrap();
/// assert_eq!(config.trigger(), Trigger::Periodic);
/// assert_eq!(config.period(), 9);
/// assert_eq!(config.drain_timeout(), 180);
/// assert_eq!(config.max_consecutive_reset_attempts(), 10);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsistentRegionConfig {
    trigger: Trigger,
    period: i64,
    drain_timeout: i64,
    reset_timeout: i64,
    max_consecutive_reset_attempts: u32,
}

impl Default for ConsistentRegionConfig {
    fn default() -> Self {
        Self::operator_driven()
    }
}

impl ConsistentRegionConfig {
    /// An operator-driven region with default timeouts and attempts
    pub fn operator_driven() -> Self {
        Self {
            trigger: Trigger::OperatorDriven,
            period: NO_PERIOD,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            reset_timeout: DEFAULT_RESET_TIMEOUT,
            // always within bounds
            max_consecutive_reset_attempts: DEFAULT_MAX_CONSECUTIVE_RESET_ATTEMPTS as u32,
        }
    }

    /// A region checkpointed every `period` seconds, with default timeouts and attempts
    pub fn periodic(period: i64) -> Result<Self, ConfigError> {
        if period <= 0 {
            return Err(ConfigError::InvalidPeriod(period));
        }
        Ok(Self {
            trigger: Trigger::Periodic,
            period,
            ..Self::operator_driven()
        })
    }

    /// Copy of this configuration with a different drain timeout
    pub fn with_drain_timeout(self, seconds: i64) -> Result<Self, ConfigError> {
        if seconds <= 0 {
            return Err(ConfigError::InvalidDrainTimeout(seconds));
        }
        Ok(Self {
            drain_timeout: seconds,
            ..self
        })
    }

    /// Copy of this configuration with a different reset timeout
    pub fn with_reset_timeout(self, seconds: i64) -> Result<Self, ConfigError> {
        if seconds <= 0 {
            return Err(ConfigError::InvalidResetTimeout(seconds));
        }
        Ok(Self {
            reset_timeout: seconds,
            ..self
        })
    }

    /// Copy of this configuration with a different maximum of consecutive reset attempts
    pub fn with_max_consecutive_reset_attempts(self, attempts: i64) -> Result<Self, ConfigError> {
        if !(1..=MAX_RESET_ATTEMPTS_LIMIT).contains(&attempts) {
            return Err(ConfigError::InvalidResetAttempts(attempts));
        }
        let attempts =
            u32::try_from(attempts).map_err(|_| ConfigError::InvalidResetAttempts(attempts))?;
        Ok(Self {
            max_consecutive_reset_attempts: attempts,
            ..self
        })
    }

    /// How checkpoints are triggered
    pub fn trigger(&self) -> Trigger {
        self.trigger
    }

    /// Trigger period in seconds, `-1` for operator-driven regions
    pub fn period(&self) -> i64 {
        self.period
    }

    /// Drain timeout in seconds
    pub fn drain_timeout(&self) -> i64 {
        self.drain_timeout
    }

    /// Reset timeout in seconds
    pub fn reset_timeout(&self) -> i64 {
        self.reset_timeout
    }

    /// Maximum of consecutive reset attempts before the region stops
    pub fn max_consecutive_reset_attempts(&self) -> u32 {
        self.max_consecutive_reset_attempts
    }

    /// The period as a duration, `None` for operator-driven regions
    pub fn period_duration(&self) -> Option<Duration> {
        match self.trigger {
            Trigger::Periodic => Some(seconds(self.period)),
            Trigger::OperatorDriven => None,
        }
    }

    /// The drain timeout as a duration
    pub fn drain_timeout_duration(&self) -> Duration {
        seconds(self.drain_timeout)
    }

    /// The reset timeout as a duration
    pub fn reset_timeout_duration(&self) -> Duration {
        seconds(self.reset_timeout)
    }
}

impl Display for ConsistentRegionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}(period={}s, drainTimeout={}s, resetTimeout={}s, maxConsecutiveResetAttempts={})",
            self.trigger,
            self.period,
            self.drain_timeout,
            self.reset_timeout,
            self.max_consecutive_reset_attempts
        )
    }
}

/// Fields are validated positive before they get here
#[inline]
fn seconds(value: i64) -> Duration {
    Duration::from_secs(value.unsigned_abs())
}
