//! Error type shared by every container in this crate.

use thiserror::Error;

/// Errors raised by the containers and their cursors.
///
/// Every error is raised synchronously by the call that violated a
/// precondition. A failed call never leaves a container half-mutated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A construction parameter or argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Two keys could not be ordered by the map's comparator.
    #[error("keys are not mutually comparable")]
    TypeMismatch,

    /// The container was structurally modified after the cursor last
    /// synchronised with it.
    #[error("container was modified during iteration")]
    StaleIterator,

    /// The container deliberately does not provide this operation.
    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    /// A cursor was advanced past its last element.
    #[error("no more elements")]
    NoSuchElement,

    /// A cursor operation was called in the wrong state.
    #[error("illegal state: {0}")]
    IllegalState(&'static str),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let err = Error::InvalidArgument("capacity too large".to_string());
        assert_eq!(err.to_string(), "invalid argument: capacity too large");

        let err = Error::NotSupported("replace");
        assert_eq!(err.to_string(), "operation not supported: replace");
    }

    #[test]
    fn implements_std_error() {
        fn assert_error<T: std::error::Error + Send + Sync + 'static>() {}
        assert_error::<Error>();
    }
}
