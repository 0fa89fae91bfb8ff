//! Eviction policies deciding when tuples enter and leave a window.
//!
//! A policy keeps its own copy of every window so it can name the evicted tuples. Policy and
//! store must therefore always see the same tuples in the same order, which a
//! [WindowStage](crate::WindowStage) takes care of.
use std::time::{SystemTime, UNIX_EPOCH};

use floodgate::snapshot::Checkpointable;

use crate::event::WindowEvent;

mod sliding;
mod time;
mod tumbling;

pub use sliding::SlidingCount;
pub use time::SlidingTime;
pub use tumbling::TumblingCount;

/// Turns incoming tuples into window events
pub trait WindowPolicy<K, T>: Checkpointable {
    /// Events caused by `tuple` arriving in partition `key`, in the order they must be applied
    fn admit(&mut self, key: K, tuple: T) -> Vec<WindowEvent<K, T>>;

    /// Events caused by processing time reaching `now_ms` without any new tuple.
    /// Count based policies never change on their own.
    fn advance(&mut self, _now_ms: u64) -> Vec<WindowEvent<K, T>> {
        Vec::new()
    }
}

/// Milliseconds since the UNIX epoch
pub(crate) fn processing_time() -> u64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    u64::try_from(since_epoch.as_millis()).unwrap_or(u64::MAX)
}
