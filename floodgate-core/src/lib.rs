//! Floodgate freezes, checkpoints and rewinds the stateful operators of a consistent region.
//!
//! A region periodically (or when its source asks for it) drains all in-flight data, persists
//! the state of every participating operator and resumes. When an operator fails the region is
//! reset to the last committed checkpoint and the source replays from there.
pub mod chaos;
pub mod config;
pub mod errorhandling;
pub mod pipeline;
pub mod region;
pub mod snapshot;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;
