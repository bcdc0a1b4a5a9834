//! Retry execution engine with pluggable policies
//!
//! A [`Retrier`] pairs a [`DelayPolicy`] with an [`AttemptGate`] and re-runs a
//! fallible async operation until it succeeds, the gate refuses another
//! attempt, or a [`Cancellation`] fires.
//!
//! # Features
//!
//! - Fixed and progressive (linear) delays, plus any closure
//! - Composable jitter and max-delay combinators
//! - Attempt limiting via [`limit_attempts_count`]
//! - Optional cancellation with explicit cancel or deadline
//! - [`NoopRetrier`] for call sites that must not retry
//!
//! # Example
//!
//! ```rust,no_run
//! use retrier::retry::{Retrier, RetryError};
//! use std::time::Duration;
//!
//! async fn example() -> Result<String, RetryError<std::io::Error>> {
//!     let retrier = Retrier::progressive(3, Duration::from_millis(100), 2.0);
//!
//!     retrier.run(|| async {
//!         // Your fallible operation here
//!         Ok("success".to_string())
//!     }).await
//! }
//! ```

mod cancel;
mod error;
mod executor;
mod policy;

pub use cancel::{CancelReason, Cancellation};
pub use error::RetryError;
pub use executor::{NoopRetrier, Retrier, RetrierBuilder, Retry};
pub use policy::{
    fixed_delay, limit_attempts_count, progressive_delay, with_delay_jitter, with_max_delay,
    AttemptGate, DelayPolicy, DelayPolicyExt, FixedDelay, Jitter, LimitAttempts, MaxDelay,
    ProgressiveDelay,
};

#[cfg(test)]
mod tests;
