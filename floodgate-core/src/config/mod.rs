//! Configuration of consistent regions and of the job they run in.
//!
//! Configuration is always explicit: values are built once, validated on construction and
//! then passed to whatever needs them. There is no process wide registry.
mod env;
mod params;
mod region;

pub use env::RegionEnvConfig;
pub use params::{ParameterError, SubmissionParameters, SubmissionParametersBuilder};
pub use region::{
    ConfigError, ConsistentRegionConfig, Trigger, DEFAULT_DRAIN_TIMEOUT,
    DEFAULT_MAX_CONSECUTIVE_RESET_ATTEMPTS, DEFAULT_RESET_TIMEOUT, MAX_RESET_ATTEMPTS_LIMIT,
};
