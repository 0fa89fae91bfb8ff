//! Types and traits used accross Floodgate
mod data;
mod key;

pub use data::Data;
pub use key::{
    ConstantKey, Key, KeySelector, Keyable, KeyableSelector, Unpartitioned, UNPARTITIONED,
};

/// Identifies an operator's state inside a checkpoint
pub type OperatorId = str;
