use std::{
    sync::{
        atomic::{AtomicI32, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use bon::Builder;
use futures::stream::FuturesUnordered;
use indexmap::IndexMap;
use rand::Rng;
use tracing::{debug, error, info, warn};

use super::{failfast::FirstFinished, watchmap::WatchMap};
use crate::{
    config::Trigger,
    region::{RegionControl, RegionState},
};

/// Resets every region must receive before the resetter is satisfied, unless configured
pub const DEFAULT_MINIMUM_RESETS: u32 = 10;

/// Period in time units assumed for operator-driven regions when picking reset delays
pub const OPERATOR_DRIVEN_PERIOD: i64 = 10;

/// Observable progress of a [Resetter]. Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct ResetterStatus {
    valid: Arc<AtomicI32>,
    seq: Arc<AtomicU64>,
    fail: Arc<AtomicI32>,
    counts: WatchMap<String, u32>,
}

impl ResetterStatus {
    /// `1` once every region was reset often enough
    pub fn valid(&self) -> i32 {
        self.valid.load(Ordering::SeqCst)
    }

    /// Increases on every run and every completed reset
    pub fn seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// `1` if the resetter could not do its job
    pub fn fail(&self) -> i32 {
        self.fail.load(Ordering::SeqCst)
    }

    /// Completed resets per region name
    pub async fn reset_counts(&self) -> IndexMap<String, u32> {
        self.counts.entries().await
    }
}

/// Resets consistent regions at random intervals.
///
/// Each region is reset after a random delay below four times its period (or
/// [OPERATOR_DRIVEN_PERIOD] for operator-driven regions), measured in `time_unit`. A region
/// which reached its maximum of consecutive reset attempts is reset with force. Once every
/// region was reset at least `minimum_resets` times all pending resets are cancelled and the
/// status becomes valid. Region names must be unique.
///
/// ```rust
/// use std::time::Duration;
/// use floodgate::chaos::Resetter;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// // without any regions the resetter fails immediately
/// let resetter = Resetter::builder()
///     .condition_name("resets")
///     .regions(Vec::new())
///     .time_unit(Duration::from_millis(1))
///     .build();
/// resetter.run().await;
/// assert_eq!(resetter.status().fail(), 1);
/// # });
/// ```
#[derive(Builder)]
pub struct Resetter {
    #[builder(into)]
    condition_name: String,
    regions: Vec<Arc<dyn RegionControl>>,
    #[builder(default = DEFAULT_MINIMUM_RESETS)]
    minimum_resets: u32,
    #[builder(default = Duration::from_secs(1))]
    time_unit: Duration,
    #[builder(skip)]
    status: ResetterStatus,
}

impl Resetter {
    /// Handle to the progress counters
    pub fn status(&self) -> ResetterStatus {
        self.status.clone()
    }

    /// Reset regions until every one of them was reset `minimum_resets` times
    pub async fn run(&self) {
        self.status.seq.fetch_add(1, Ordering::SeqCst);
        if self.regions.is_empty() {
            error!("No consistent regions!");
            self.status.fail.store(1, Ordering::SeqCst);
            return;
        }

        let minimum = self.minimum_resets;
        let expected = self.regions.len();
        let counts = self.status.counts.clone();
        let satisfied = counts
            .wait_for(move |entries| {
                entries.len() == expected && entries.all(|(_, count)| *count >= minimum)
            })
            .await;
        for region in self.regions.iter() {
            counts.insert(region.name().to_string(), 0).await;
        }

        let tasks = FuturesUnordered::new();
        for region in self.regions.iter() {
            tasks.push(tokio::spawn(reset_loop(
                Arc::clone(region),
                counts.clone(),
                Arc::clone(&self.status.seq),
                self.time_unit,
            )));
        }
        tasks.push(tokio::spawn(async move {
            // an error means every reset loop ended
            let _ = satisfied.await;
        }));

        if let Some(Err(e)) = tasks.first_finished().await {
            error!("Resetter {} stopped unexpectedly: {e}", self.condition_name);
            self.status.fail.store(1, Ordering::SeqCst);
        }
        if self.status.fail() == 0 {
            self.status.valid.store(1, Ordering::SeqCst);
            info!(
                "Condition {} is valid, every region was reset at least {minimum} times",
                self.condition_name
            );
        }
    }
}

/// Upper bound of the random delay before resetting a region, in time units
fn delay_bound(region: &dyn RegionControl) -> i64 {
    let period = match region.trigger() {
        Trigger::Periodic => region.period(),
        Trigger::OperatorDriven => OPERATOR_DRIVEN_PERIOD,
    };
    4 * period.max(1)
}

async fn reset_loop(
    region: Arc<dyn RegionControl>,
    counts: WatchMap<String, u32>,
    seq: Arc<AtomicU64>,
    time_unit: Duration,
) {
    let bound = delay_bound(region.as_ref()) as f64;
    loop {
        let delay = {
            let units = rand::thread_rng().gen_range(0.0..bound);
            time_unit.mul_f64(units)
        };
        tokio::time::sleep(delay).await;

        let force = region.state() == RegionState::MaximumResetAttemptsReached;
        match region.reset(force).await {
            Ok(()) => {
                counts.update(region.name().to_string(), |c| *c += 1).await;
                seq.fetch_add(1, Ordering::SeqCst);
                debug!("Reset region {} (force={force})", region.name());
            }
            Err(e) => warn!("Resetting region {} failed: {e}", region.name()),
        }
    }
}
