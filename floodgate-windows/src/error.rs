//! Window errors
use std::error::Error;

use thiserror::Error;

/// Errors raised while applying window events
#[derive(Debug, Error)]
pub enum WindowError {
    /// An eviction asked for more tuples than the window holds. The events given to the store
    /// are inconsistent, this is never recovered from.
    #[error("evicting {requested} tuples from window {key} holding only {buffered}")]
    EvictionUnderflow {
        /// Debug representation of the partition key
        key: String,
        /// Tuples the eviction tried to remove
        requested: usize,
        /// Tuples in the window
        buffered: usize,
    },
    /// A user supplied aggregation or join function failed
    #[error("user function failed: {0}")]
    UserLogic(#[source] Box<dyn Error + Send + Sync>),
}

impl WindowError {
    /// True for errors which must abort the operator
    pub fn is_fatal(&self) -> bool {
        matches!(self, WindowError::EvictionUnderflow { .. })
    }
}
