//! # retrier
//!
//! Policy-driven retry execution providing:
//! - A reusable [`Retrier`] that re-runs fallible async operations
//! - Composable delay policies (fixed, progressive, jitter, max-delay)
//! - Cancellation by explicit signal or deadline
//! - YAML-backed retry configuration

pub mod config;
pub mod error;
pub mod retry;

pub use config::{RetryConfig, RetryPoliciesConfig, RetryStrategy};
pub use error::{ConfigError, Result};
pub use retry::{Cancellation, NoopRetrier, Retrier, Retry, RetryError};
