//! User functions applied to windows.
//!
//! Plain closures returning `Option` can be used directly, returning `None` suppresses the
//! output. Closures which can fail are wrapped with [fallible].
use std::error::Error;

/// Error of a user function
pub type UserError = Box<dyn Error + Send + Sync>;

/// Computes a value from the tuples of a window, oldest first
pub trait Aggregate<T>: Send + Sync {
    /// Aggregation result
    type Output;

    /// Aggregate the window. `None` means nothing is emitted.
    fn aggregate(&self, tuples: &[T]) -> Result<Option<Self::Output>, UserError>;
}

impl<T, R, F> Aggregate<T> for F
where
    F: Fn(&[T]) -> Option<R> + Send + Sync,
{
    type Output = R;

    fn aggregate(&self, tuples: &[T]) -> Result<Option<R>, UserError> {
        Ok(self(tuples))
    }
}

/// Joins one probe tuple with the window of the build side
pub trait Join<T, U>: Send + Sync {
    /// Join result
    type Output;

    /// Join `probe` with `build`, which is empty if the build side has no window for the key.
    /// `None` means nothing is emitted.
    fn join(&self, probe: &T, build: &[U]) -> Result<Option<Self::Output>, UserError>;
}

impl<T, U, J, F> Join<T, U> for F
where
    F: Fn(&T, &[U]) -> Option<J> + Send + Sync,
{
    type Output = J;

    fn join(&self, probe: &T, build: &[U]) -> Result<Option<J>, UserError> {
        Ok(self(probe, build))
    }
}

/// Wraps a closure which joins with the newest build tuple only, see [last]
#[derive(Debug, Clone, Copy)]
pub struct JoinLast<F>(F);

/// Join each probe tuple with the most recent build tuple, or `None` if the build side
/// has no window for the key
///
/// ```rust
/// use floodgate_windows::functions::{last, Join};
///
/// let latest = last(|x: &u8, price: Option<&u8>| Some(price.map_or(0, |p| x * p)));
/// assert_eq!(latest.join(&2, &[3, 4]).unwrap(), Some(8));
/// assert_eq!(latest.join(&2, &[]).unwrap(), Some(0));
/// ```
pub fn last<F>(function: F) -> JoinLast<F> {
    JoinLast(function)
}

impl<T, U, J, F> Join<T, U> for JoinLast<F>
where
    F: Fn(&T, Option<&U>) -> Option<J> + Send + Sync,
{
    type Output = J;

    fn join(&self, probe: &T, build: &[U]) -> Result<Option<J>, UserError> {
        Ok((self.0)(probe, build.last()))
    }
}

/// Wraps a closure returning `Result<Option<_>, E>`, see [fallible]
#[derive(Debug, Clone, Copy)]
pub struct Fallible<F>(F);

/// Use a closure which may fail as an aggregation or join function
///
/// ```rust
/// use floodgate_windows::functions::{fallible, Aggregate};
///
/// let checked_sum = fallible(|xs: &[u8]| {
///     xs.iter()
///         .try_fold(0u8, |acc, x| acc.checked_add(*x))
///         .map(Some)
///         .ok_or("overflow")
/// });
/// assert_eq!(checked_sum.aggregate(&[1, 2]).unwrap(), Some(3));
/// assert!(checked_sum.aggregate(&[255, 1]).is_err());
/// ```
pub fn fallible<F>(function: F) -> Fallible<F> {
    Fallible(function)
}

impl<T, R, E, F> Aggregate<T> for Fallible<F>
where
    F: Fn(&[T]) -> Result<Option<R>, E> + Send + Sync,
    E: Into<UserError>,
{
    type Output = R;

    fn aggregate(&self, tuples: &[T]) -> Result<Option<R>, UserError> {
        (self.0)(tuples).map_err(Into::into)
    }
}

impl<T, U, J, E, F> Join<T, U> for Fallible<F>
where
    F: Fn(&T, &[U]) -> Result<Option<J>, E> + Send + Sync,
    E: Into<UserError>,
{
    type Output = J;

    fn join(&self, probe: &T, build: &[U]) -> Result<Option<J>, UserError> {
        (self.0)(probe, build).map_err(Into::into)
    }
}
