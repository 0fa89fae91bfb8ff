//! Runs a consistent region over a counting pipeline while the chaos resetter keeps resetting
//! it. Without environment variables the region checkpoints every second, otherwise it is
//! configured from the environment. Operator-driven regions checkpoint once a second on request
//! of the pipeline, e.g.
//!
//! ```sh
//! FLOODGATE_REGION_TRIGGER=periodic FLOODGATE_REGION_PERIOD=1 \
//!     cargo run --example periodic_region
//! FLOODGATE_REGION_TRIGGER=operator_driven cargo run --example periodic_region
//! ```
use std::{sync::Arc, time::Duration};

use envconfig::Envconfig;
use floodgate::{
    chaos::Resetter,
    config::{ConsistentRegionConfig, RegionEnvConfig, SubmissionParameters, Trigger},
    pipeline::{CollectSink, MapStage, Pipeline, SequenceSource},
    region::{RegionControl, RegionCoordinator, RegionParticipant},
    snapshot::{InMemoryBackend, IntervalCheckpoints},
};
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let config = if std::env::var("FLOODGATE_REGION_TRIGGER").is_ok() {
        RegionEnvConfig::init_from_env()
            .expect("Region env vars should be numbers")
            .into_config()
            .expect("Invalid region configuration")
    } else {
        ConsistentRegionConfig::periodic(1).expect("Valid period")
    };
    let parameters = SubmissionParameters::builder()
        .set("minimumResets", 3)
        .build();

    let sink = CollectSink::new();
    let mut builder = Pipeline::builder("squares", SequenceSource::new(0..1000))
        .stage("square", MapStage::new(|x: u64| x * x))
        .stage("sink", sink.clone())
        .throttle(Duration::from_millis(5));
    if config.trigger() == Trigger::OperatorDriven {
        // nothing checkpoints an operator-driven region unless the pipeline asks
        builder = builder.trigger(IntervalCheckpoints::new(Duration::from_secs(1)));
    }
    let pipeline = builder.build();

    let region = RegionCoordinator::builder()
        .name("squares")
        .config(config)
        .persistence(InMemoryBackend::default())
        .participants(vec![pipeline.clone() as Arc<dyn RegionParticipant>])
        .parameters(parameters)
        .build()
        .start();

    let resetter = Resetter::builder()
        .condition_name("squares-resets")
        .regions(vec![Arc::new(region.clone()) as Arc<dyn RegionControl>])
        .minimum_resets(
            region
                .parameters()
                .parse_or("minimumResets", 3)
                .expect("minimumResets should be a number"),
        )
        .time_unit(Duration::from_millis(200))
        .build();
    let status = resetter.status();

    let chaos = tokio::spawn(async move { resetter.run().await });
    pipeline.clone().run(region.clone()).await;
    chaos.abort();

    info!(
        "Collected {} squares, resetter valid={} after {} resets, region at checkpoint {:?}",
        sink.len(),
        status.valid(),
        status.seq(),
        region.runtime_state().last_checkpoint_id
    );
}
