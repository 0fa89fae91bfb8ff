//! Triggers deciding when an operator-driven region asks for a checkpoint.
use tokio::time::{Duration, Instant};

/// Evaluated by the source of an operator-driven region after each emitted record.
/// Returning `true` requests a drain/checkpoint cycle.
pub trait CheckpointTrigger: Send + 'static {
    /// Return true to request a checkpoint now
    fn should_trigger(&mut self) -> bool;
}
impl<F> CheckpointTrigger for F
where
    F: FnMut() -> bool + Send + 'static,
{
    fn should_trigger(&mut self) -> bool {
        self()
    }
}

/// Fires after every `n` records, e.g. every `n` messages consumed from an external system
pub struct EveryN {
    n: u64,
    seen: u64,
}

impl EveryN {
    /// Create a trigger firing every `n` records. An `n` of zero never fires.
    pub fn new(n: u64) -> Self {
        Self { n, seen: 0 }
    }
}

impl CheckpointTrigger for EveryN {
    fn should_trigger(&mut self) -> bool {
        if self.n == 0 {
            return false;
        }
        self.seen += 1;
        if self.seen >= self.n {
            self.seen = 0;
            true
        } else {
            false
        }
    }
}

/// A simple trigger which fires at constant interval based on system time
pub struct IntervalCheckpoints {
    interval: Duration,
    last_trigger: Instant,
}

impl IntervalCheckpoints {
    /// Create a new trigger of the given interval
    pub fn new(interval: Duration) -> Self {
        IntervalCheckpoints {
            interval,
            last_trigger: Instant::now(),
        }
    }
}
impl CheckpointTrigger for IntervalCheckpoints {
    fn should_trigger(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_trigger) > self.interval {
            self.last_trigger = now;
            true
        } else {
            false
        }
    }
}

/// Never requests a checkpoint
pub struct NoCheckpoints;
impl CheckpointTrigger for NoCheckpoints {
    #[inline(always)]
    fn should_trigger(&mut self) -> bool {
        false
    }
}
