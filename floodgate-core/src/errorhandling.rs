//! Global error handling mechanisms.

/// Let Floodgate handle fatal errors in the process.
///
/// Fatal errors are internal invariant violations, for example a window eviction removing more
/// tuples than the window holds. They are never retried: the operator is aborted.
pub trait FloodgateFatal<T, E>: Sized + sealed::Sealed {
    /// Abort the computation as gracefully as possible due to a fatal non-recoverable error.
    fn floodgate_fatal(self) -> T;
}

impl<T, E> FloodgateFatal<T, E> for Result<T, E>
where
    E: std::fmt::Debug + std::error::Error + Send + Sync + 'static,
{
    fn floodgate_fatal(self) -> T {
        match self {
            Ok(x) => x,
            Err(e) => {
                let report = eyre::Report::new(e);
                tracing::error!("Fatal error, aborting operator: {report:?}");
                panic!("{report:?}")
            }
        }
    }
}

mod sealed {
    pub trait Sealed {}

    impl<T, E> Sealed for Result<T, E> {}
}
