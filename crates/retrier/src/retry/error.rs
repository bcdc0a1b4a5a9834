//! Error types for the retry execution engine
//!
//! A retry run ends in exactly one of three ways: success, exhaustion of the
//! attempt gate, or cancellation. The two failure shapes are kept distinct so
//! callers can tell "gave up" from "was told to stop".

use std::time::Duration;
use thiserror::Error;

use super::cancel::CancelReason;

/// Errors returned by [`Retrier`](super::Retrier) runs
///
/// Generic over `E`, the error type of the operation being retried.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// The attempt gate refused another attempt after a failure
    ///
    /// Only the error from the final attempt is kept.
    #[error("failed after {attempts} attempts (elapsed {elapsed:?}): {source}")]
    Exhausted {
        /// Number of attempts made
        attempts: u32,
        /// Wall-clock time from the start of the run to giving up
        elapsed: Duration,
        /// The error from the final attempt
        #[source]
        source: E,
    },

    /// The cancellation handle fired before an attempt or during a delay
    #[error(transparent)]
    Cancelled(#[from] CancelReason),
}

impl<E> RetryError<E> {
    /// Create a new exhausted error
    pub fn exhausted(attempts: u32, elapsed: Duration, source: E) -> Self {
        RetryError::Exhausted {
            attempts,
            elapsed,
            source,
        }
    }

    /// Number of attempts made, if the run was exhausted
    pub fn attempts(&self) -> Option<u32> {
        match self {
            RetryError::Exhausted { attempts, .. } => Some(*attempts),
            RetryError::Cancelled(_) => None,
        }
    }

    /// Time spent before giving up, if the run was exhausted
    pub fn elapsed(&self) -> Option<Duration> {
        match self {
            RetryError::Exhausted { elapsed, .. } => Some(*elapsed),
            RetryError::Cancelled(_) => None,
        }
    }

    /// Check if this error indicates all attempts were used up
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// Check if this error indicates cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled(_))
    }

    /// Why the run was cancelled, if it was
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        match self {
            RetryError::Cancelled(reason) => Some(*reason),
            RetryError::Exhausted { .. } => None,
        }
    }

    /// Get a reference to the last operation error
    pub fn source_ref(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::Cancelled(_) => None,
        }
    }

    /// Get the last operation error, consuming this error
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::Cancelled(_) => None,
        }
    }

    /// Map the operation error type using a closure
    pub fn map_err<F, E2>(self, f: F) -> RetryError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            RetryError::Exhausted {
                attempts,
                elapsed,
                source,
            } => RetryError::Exhausted {
                attempts,
                elapsed,
                source: f(source),
            },
            RetryError::Cancelled(reason) => RetryError::Cancelled(reason),
        }
    }
}
