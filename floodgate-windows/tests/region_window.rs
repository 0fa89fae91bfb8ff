//! Window stages inside a consistent region. A crash in front of the window must not change
//! what the window emits.
use std::{
    num::NonZeroUsize,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use floodgate::{
    config::ConsistentRegionConfig,
    pipeline::{CollectSink, OperatorError, Output, Pipeline, SequenceSource, Stage},
    region::{RegionControl, RegionCoordinator, RegionParticipant, RegionState},
    snapshot::{EveryN, InMemoryBackend},
    types::Unpartitioned,
};
use floodgate_windows::{
    operators::{PeriodicAggregator, SetAggregator},
    policy::{SlidingCount, TumblingCount},
    WindowStage,
};

struct CrashOnce {
    at: u64,
    crashed: Arc<AtomicBool>,
}

impl Stage<u64> for CrashOnce {
    fn process(&mut self, record: u64, output: &mut Output<u64>) -> Result<(), OperatorError> {
        if record == self.at && !self.crashed.swap(true, Ordering::SeqCst) {
            return Err(OperatorError::Failed(format!("crashed at {record}")));
        }
        output.send(record);
        Ok(())
    }
}

fn size(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

fn sliding_sums() -> impl Stage<u64> + 'static {
    WindowStage::new(
        Unpartitioned,
        SlidingCount::new(size(3)),
        SetAggregator::new(|w: &[u64]| Some(w.iter().sum::<u64>())),
    )
}

fn tumbling_max() -> impl Stage<u64> + 'static {
    WindowStage::new(
        |x: &u64| x % 3,
        TumblingCount::new(size(4)),
        PeriodicAggregator::new(|w: &[u64]| w.iter().max().copied()),
    )
}

/// What the window emits when nothing goes wrong
fn reference(mut stage: impl Stage<u64>, records: std::ops::Range<u64>) -> Vec<u64> {
    let mut output = Output::default();
    for r in records {
        stage.process(r, &mut output).unwrap();
    }
    output.into_records()
}

async fn run_with_crash(
    stage: impl Stage<u64> + 'static,
    records: std::ops::Range<u64>,
) -> Vec<u64> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let sink = CollectSink::new();
    let crashed = Arc::new(AtomicBool::new(false));
    let pipeline = Pipeline::builder("windowed", SequenceSource::new(records))
        .stage(
            "crash",
            CrashOnce {
                at: 100,
                crashed: Arc::clone(&crashed),
            },
        )
        .stage("window", stage)
        .stage("sink", sink.clone())
        .trigger(EveryN::new(25))
        .build();

    let region = RegionCoordinator::builder()
        .name("windowed")
        .config(ConsistentRegionConfig::operator_driven())
        .persistence(InMemoryBackend::default())
        .participants(vec![pipeline.clone() as Arc<dyn RegionParticipant>])
        .build()
        .start();

    pipeline.clone().run(region.clone()).await;

    assert!(crashed.load(Ordering::SeqCst));
    assert_eq!(region.state(), RegionState::Running);
    sink.values()
}

#[tokio::test]
async fn sliding_window_recovers_exactly() {
    let expected = reference(sliding_sums(), 0..300);
    let actual = run_with_crash(sliding_sums(), 0..300).await;
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn keyed_tumbling_window_recovers_exactly() {
    let expected = reference(tumbling_max(), 0..300);
    let actual = run_with_crash(tumbling_max(), 0..300).await;
    assert_eq!(actual, expected);
}
