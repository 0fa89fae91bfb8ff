//! Partitioned window state for Floodgate.
//!
//! A [WindowStore](store::WindowStore) keeps one FIFO buffer of tuples per partition and applies
//! [WindowEvent]s to it. What happens after every change is decided by the store's
//! [WindowStrategy](store::WindowStrategy): aggregate the window, wait for a trigger, or serve as
//! the build side of a join. Eviction [policies](policy) turn incoming tuples into events, and a
//! [WindowStage] runs a policy and a store as one checkpointed stage of a pipeline.
pub mod error;
pub mod event;
pub mod functions;
pub mod operators;
pub mod policy;
mod stage;
pub mod store;

pub use error::WindowError;
pub use event::{EventKind, WindowEvent};
pub use stage::WindowStage;
