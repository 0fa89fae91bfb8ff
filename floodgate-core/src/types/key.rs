//! Partition keys and the ways of deriving them from records.
use std::{fmt::Debug, hash::Hash};

/// Marker trait for partition keys.
///
/// A key identifies one window instance. It is opaque to Floodgate, which only
/// hashes and compares it.
pub trait Key: Hash + Eq + Clone + Debug + Send + Sync + 'static {}
impl<T: Hash + Eq + Clone + Debug + Send + Sync + 'static> Key for T {}

/// Key type of unpartitioned windows
pub type ConstantKey = u32;

/// The single key every record of an unpartitioned window maps to.
/// An unpartitioned window behaves like a partitioned window with exactly this one partition.
pub const UNPARTITIONED: ConstantKey = 0;

/// Records which carry their own partition key
pub trait Keyable {
    /// Type of the carried key
    type Key: Key;

    /// Return the key of this record
    fn key(&self) -> Self::Key;
}

/// Derives the partition key of a record
pub trait KeySelector<T>: Send + Sync + 'static {
    /// Type of the derived key
    type Key: Key;

    /// Derive the key of `value`
    fn select(&self, value: &T) -> Self::Key;
}

impl<T, K, F> KeySelector<T> for F
where
    K: Key,
    F: Fn(&T) -> K + Send + Sync + 'static,
{
    type Key = K;

    fn select(&self, value: &T) -> K {
        self(value)
    }
}

/// Maps every record to [UNPARTITIONED]
#[derive(Debug, Clone, Copy, Default)]
pub struct Unpartitioned;

impl<T> KeySelector<T> for Unpartitioned {
    type Key = ConstantKey;

    #[inline(always)]
    fn select(&self, _value: &T) -> ConstantKey {
        UNPARTITIONED
    }
}

/// Uses the key a [Keyable] record carries
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyableSelector;

impl<T: Keyable> KeySelector<T> for KeyableSelector {
    type Key = T::Key;

    fn select(&self, value: &T) -> T::Key {
        value.key()
    }
}
