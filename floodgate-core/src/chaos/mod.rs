//! Fault injection for consistent regions.
//!
//! The [Resetter] keeps resetting regions at random intervals until every region has been
//! reset a minimum number of times. Jobs under test use it to prove that their output stays
//! correct across arbitrary resets.
mod failfast;
mod resetter;
mod watchmap;

pub use resetter::{Resetter, ResetterStatus, DEFAULT_MINIMUM_RESETS, OPERATOR_DRIVEN_PERIOD};
