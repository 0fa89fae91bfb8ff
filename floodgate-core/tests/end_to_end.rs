//! A source, a crashing stage and a sink inside one consistent region. Whatever the crash, the
//! sink must end up with every record exactly once.
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use floodgate::{
    config::ConsistentRegionConfig,
    pipeline::{CollectSink, OperatorError, Output, Pipeline, SequenceSource, Stage},
    region::{RegionControl, RegionCoordinator, RegionError, RegionParticipant, RegionState},
    snapshot::{EveryN, InMemoryBackend},
};

/// Fails once when it sees `at`. The flag lives outside the pipeline so replays pass.
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

#[tokio::test(start_paused = true)]
async fn periodic_region_survives_crash() {
    let sink = CollectSink::new();
    let crashed = Arc::new(AtomicBool::new(false));
    let pipeline = Pipeline::builder("numbers", SequenceSource::new(0..2000))
        .stage(
            "crash",
            CrashOnce {
                at: 1000,
                crashed: Arc::clone(&crashed),
            },
        )
        .stage("sink", sink.clone())
        .throttle(Duration::from_millis(10))
        .build();

    let region = RegionCoordinator::builder()
        .name("end-to-end")
        .config(ConsistentRegionConfig::periodic(2).unwrap())
        .persistence(InMemoryBackend::default())
        .participants(vec![pipeline.clone() as Arc<dyn RegionParticipant>])
        .build()
        .start();

    pipeline.clone().run(region.clone()).await;

    assert!(crashed.load(Ordering::SeqCst));
    assert_eq!(sink.values(), (0..2000).collect::<Vec<u64>>());
    assert_eq!(region.state(), RegionState::Running);
    assert!(region.runtime_state().last_checkpoint_id.unwrap() >= 5);
}

#[tokio::test]
async fn operator_driven_region_survives_crash() {
    let sink = CollectSink::new();
    let crashed = Arc::new(AtomicBool::new(false));
    let pipeline = Pipeline::builder("numbers", SequenceSource::new(0..500))
        .stage(
            "crash",
            CrashOnce {
                at: 250,
                crashed: Arc::clone(&crashed),
            },
        )
        .stage("sink", sink.clone())
        .trigger(EveryN::new(100))
        .build();

    let backend = InMemoryBackend::default();
    let region = RegionCoordinator::builder()
        .name("operator-driven")
        .config(ConsistentRegionConfig::operator_driven())
        .persistence(backend.clone())
        .participants(vec![pipeline.clone() as Arc<dyn RegionParticipant>])
        .build()
        .start();

    pipeline.clone().run(region.clone()).await;

    assert!(crashed.load(Ordering::SeqCst));
    assert_eq!(sink.values(), (0..500).collect::<Vec<u64>>());
    let state = region.runtime_state();
    // after 100 and 200 records, then the trigger keeps counting through the replay of
    // 200..250 and fires at 250, 350 and 450
    assert_eq!(state.last_checkpoint_id, Some(5));
    assert_eq!(state.consecutive_reset_count, 0);
    assert_eq!(backend.retained_versions(), 1);
}

#[tokio::test]
async fn checkpoint_queued_before_a_crash_report_resets_once() {
    let sink = CollectSink::new();
    let pipeline = Pipeline::builder("numbers", SequenceSource::new(0..10))
        .stage(
            "crash",
            CrashOnce {
                at: 1,
                crashed: Arc::new(AtomicBool::new(false)),
            },
        )
        .stage("sink", sink.clone())
        .build();
    let region = RegionCoordinator::builder()
        .name("one-crash")
        .config(
            ConsistentRegionConfig::operator_driven()
                .with_max_consecutive_reset_attempts(2)
                .unwrap(),
        )
        .persistence(InMemoryBackend::default())
        .participants(vec![pipeline.clone() as Arc<dyn RegionParticipant>])
        .build()
        .start();

    pipeline.step().await.unwrap();
    pipeline.step().await.unwrap_err();
    let failed_at = region.runtime_state().reset_epoch;

    // the cycle refuses the failed pipeline and resets the region
    assert!(matches!(
        region.checkpoint().await,
        Err(RegionError::CycleFailed { id: 1, .. })
    ));
    // the crash report arrives late and must not use up a second attempt
    region.report_failure_at(failed_at, "crashed at 1").await.unwrap();

    let state = region.runtime_state();
    assert_eq!(state.state, RegionState::Running);
    assert_eq!(state.consecutive_reset_count, 1);

    pipeline.clone().run(region.clone()).await;
    assert_eq!(sink.values(), (0..10).collect::<Vec<u64>>());
}
