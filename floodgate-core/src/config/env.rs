use std::str::FromStr;

use envconfig::Envconfig;

use super::region::{ConfigError, ConsistentRegionConfig, Trigger};

impl FromStr for Trigger {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "operator_driven" | "operatordriven" => Ok(Trigger::OperatorDriven),
            "periodic" => Ok(Trigger::Periodic),
            _ => Err(ConfigError::UnknownTrigger(s.to_string())),
        }
    }
}

/// Consistent region settings read from the environment.
///
/// Use [RegionEnvConfig::into_config] to turn the raw values into a validated
/// [ConsistentRegionConfig].
#[derive(Debug, Envconfig)]
pub struct RegionEnvConfig {
    /// `operator_driven` or `periodic`
    #[envconfig(from = "FLOODGATE_REGION_TRIGGER", default = "operator_driven")]
    pub trigger: String,

    /// Checkpoint period in seconds, required for periodic regions
    #[envconfig(from = "FLOODGATE_REGION_PERIOD")]
    pub period: Option<i64>,

    /// Drain timeout in seconds
    #[envconfig(from = "FLOODGATE_REGION_DRAIN_TIMEOUT", default = "180")]
    pub drain_timeout: i64,

    /// Reset timeout in seconds
    #[envconfig(from = "FLOODGATE_REGION_RESET_TIMEOUT", default = "180")]
    pub reset_timeout: i64,

    /// Consecutive resets allowed before the region stops
    #[envconfig(from = "FLOODGATE_REGION_MAX_RESET_ATTEMPTS", default = "5")]
    pub max_reset_attempts: i64,
}

impl RegionEnvConfig {
    /// Validate the raw values
    pub fn into_config(self) -> Result<ConsistentRegionConfig, ConfigError> {
        let base = match (self.trigger.parse::<Trigger>()?, self.period) {
            (Trigger::Periodic, Some(period)) => ConsistentRegionConfig::periodic(period)?,
            (Trigger::Periodic, None) => return Err(ConfigError::MissingPeriod),
            (Trigger::OperatorDriven, Some(_)) => return Err(ConfigError::PeriodNotApplicable),
            (Trigger::OperatorDriven, None) => ConsistentRegionConfig::operator_driven(),
        };
        base.with_drain_timeout(self.drain_timeout)?
            .with_reset_timeout(self.reset_timeout)?
            .with_max_consecutive_reset_attempts(self.max_reset_attempts)
    }
}
