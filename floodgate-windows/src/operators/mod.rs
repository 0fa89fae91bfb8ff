//! Strategies turning a [WindowStore](crate::store::WindowStore) into a window operator
mod aggregate;
mod join;

pub use aggregate::{spawn_periodic, PeriodicAggregator, SetAggregator};
pub use join::{BuildSide, SlidingJoin};
