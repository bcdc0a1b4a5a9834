//! Delay policies and attempt gates
//!
//! A [`DelayPolicy`] computes how long to wait before the next attempt and an
//! [`AttemptGate`] decides whether another attempt is allowed at all. Both are
//! consulted with the 1-indexed number of the attempt that just failed and the
//! delay applied before it.
//!
//! Plain closures implement both traits, so custom policies need no wrapper
//! type:
//!
//! ```rust
//! use retrier::retry::{fixed_delay, AttemptGate, DelayPolicy, DelayPolicyExt};
//! use std::time::Duration;
//!
//! let delay = fixed_delay(Duration::from_millis(100))
//!     .with_jitter()
//!     .with_max_delay(Duration::from_millis(150));
//! assert!(delay.delay(1, Duration::ZERO) <= Duration::from_millis(150));
//!
//! let only_fast = |_attempt: u32, last_delay: Duration| last_delay < Duration::from_secs(1);
//! assert!(only_fast.allow(3, Duration::from_millis(500)));
//! ```

use rand::Rng;
use std::time::Duration;

/// Computes the delay before the next attempt
pub trait DelayPolicy: Send + Sync {
    /// Delay to wait after `attempt` failed, given the delay used before it
    fn delay(&self, attempt: u32, last_delay: Duration) -> Duration;
}

impl<F> DelayPolicy for F
where
    F: Fn(u32, Duration) -> Duration + Send + Sync,
{
    fn delay(&self, attempt: u32, last_delay: Duration) -> Duration {
        self(attempt, last_delay)
    }
}

/// Decides whether another attempt may follow a failed one
pub trait AttemptGate: Send + Sync {
    /// Whether a further attempt is allowed after `attempt` failed
    fn allow(&self, attempt: u32, last_delay: Duration) -> bool;
}

impl<F> AttemptGate for F
where
    F: Fn(u32, Duration) -> bool + Send + Sync,
{
    fn allow(&self, attempt: u32, last_delay: Duration) -> bool {
        self(attempt, last_delay)
    }
}

/// Gate allowing a bounded number of attempts in total
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitAttempts {
    max_attempts: u32,
}

impl LimitAttempts {
    /// Total number of attempts this gate permits
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl AttemptGate for LimitAttempts {
    fn allow(&self, attempt: u32, _last_delay: Duration) -> bool {
        attempt < self.max_attempts
    }
}

/// Limit the total number of attempts
///
/// A limit of zero is raised to one: the first attempt always runs.
pub fn limit_attempts_count(max_attempts: u32) -> LimitAttempts {
    LimitAttempts {
        max_attempts: max_attempts.max(1),
    }
}

/// The same delay before every retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    delay: Duration,
}

impl DelayPolicy for FixedDelay {
    fn delay(&self, _attempt: u32, _last_delay: Duration) -> Duration {
        self.delay
    }
}

/// Wait `delay` before every retry
pub fn fixed_delay(delay: Duration) -> FixedDelay {
    FixedDelay { delay }
}

/// A delay growing linearly with the attempt number
///
/// The delay after attempt `n` is `initial * n * multiplier`, rounded to the
/// nearest nanosecond and saturating at [`Duration::MAX`]. Growth is linear,
/// not geometric: with `initial = 100ms` and `multiplier = 2.0` the delays are
/// 200ms, 400ms, 600ms and so on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressiveDelay {
    initial: Duration,
    multiplier: f64,
}

impl DelayPolicy for ProgressiveDelay {
    fn delay(&self, attempt: u32, _last_delay: Duration) -> Duration {
        let nanos = self.initial.as_nanos().saturating_mul(u128::from(attempt));
        scale_nanos(nanos, self.multiplier)
    }
}

/// Wait `initial * attempt * multiplier` before each retry
///
/// # Example
///
/// ```rust
/// use retrier::retry::{progressive_delay, DelayPolicy};
/// use std::time::Duration;
///
/// let policy = progressive_delay(Duration::from_millis(10), 2.0);
/// assert_eq!(policy.delay(1, Duration::ZERO), Duration::from_millis(20));
/// assert_eq!(policy.delay(3, Duration::ZERO), Duration::from_millis(60));
/// ```
pub fn progressive_delay(initial: Duration, multiplier: f64) -> ProgressiveDelay {
    ProgressiveDelay {
        initial,
        multiplier,
    }
}

/// Stretches the wrapped delay by a random factor in `[1, 2)`
///
/// Jitter only ever lengthens the delay, up to (but never reaching) double.
#[derive(Debug, Clone, Copy)]
pub struct Jitter<P> {
    inner: P,
}

impl<P: DelayPolicy> DelayPolicy for Jitter<P> {
    fn delay(&self, attempt: u32, last_delay: Duration) -> Duration {
        let base = self.inner.delay(attempt, last_delay);
        let jitter: f64 = rand::rng().random();
        // Rounding on very large bases must not leave [base, 2 * base)
        let ceiling = base.saturating_mul(2).saturating_sub(Duration::from_nanos(1));
        scale_nanos(base.as_nanos(), 1.0 + jitter)
            .min(ceiling)
            .max(base)
    }
}

/// Add random upward jitter to `policy`
pub fn with_delay_jitter<P: DelayPolicy>(policy: P) -> Jitter<P> {
    Jitter { inner: policy }
}

/// Caps the wrapped delay at a maximum
#[derive(Debug, Clone, Copy)]
pub struct MaxDelay<P> {
    inner: P,
    max_delay: Duration,
}

impl<P: DelayPolicy> DelayPolicy for MaxDelay<P> {
    fn delay(&self, attempt: u32, last_delay: Duration) -> Duration {
        self.inner.delay(attempt, last_delay).min(self.max_delay)
    }
}

/// Clamp the delays produced by `policy` to `max_delay`
pub fn with_max_delay<P: DelayPolicy>(policy: P, max_delay: Duration) -> MaxDelay<P> {
    MaxDelay {
        inner: policy,
        max_delay,
    }
}

/// Method-style access to the delay combinators
pub trait DelayPolicyExt: DelayPolicy + Sized {
    /// See [`with_delay_jitter`]
    fn with_jitter(self) -> Jitter<Self> {
        with_delay_jitter(self)
    }

    /// See [`with_max_delay`]
    fn with_max_delay(self, max_delay: Duration) -> MaxDelay<Self> {
        with_max_delay(self, max_delay)
    }
}

impl<P: DelayPolicy> DelayPolicyExt for P {}

/// Multiply `nanos` by `factor`, rounding to the nearest nanosecond.
///
/// Whole factors stay in integer arithmetic. Negative and NaN factors clamp to
/// zero; anything past [`Duration::MAX`] saturates.
fn scale_nanos(nanos: u128, factor: f64) -> Duration {
    if factor.is_nan() || factor <= 0.0 {
        return Duration::ZERO;
    }
    if factor.fract() == 0.0 {
        return duration_from_nanos(nanos.saturating_mul(factor as u128));
    }

    let product = nanos as f64 * factor;
    if !product.is_finite() {
        return Duration::MAX;
    }
    duration_from_nanos(product.round() as u128)
}

fn duration_from_nanos(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;

    match u64::try_from(nanos / NANOS_PER_SEC) {
        Ok(secs) => Duration::new(secs, (nanos % NANOS_PER_SEC) as u32),
        Err(_) => Duration::MAX,
    }
}
