//! Retry execution engine
//!
//! This module provides the retry loop and the retriers built on it. Both the
//! cancellation-aware and the plain entry points drive the same loop; they
//! only differ in whether a [`Cancellation`] is consulted.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, debug_span, Instrument};

use crate::error::{ConfigError, Result};

use super::cancel::{CancelReason, Cancellation};
use super::error::RetryError;
use super::policy::{
    fixed_delay, limit_attempts_count, progressive_delay, with_delay_jitter, AttemptGate,
    DelayPolicy,
};

/// Common interface over [`Retrier`] and [`NoopRetrier`]
///
/// The error type depends on the retrier: a [`Retrier`] wraps the operation
/// error in a [`RetryError`], while a [`NoopRetrier`] hands it back untouched.
///
/// # Example
///
/// ```rust,no_run
/// use retrier::retry::{NoopRetrier, Retrier, Retry};
/// use std::time::Duration;
///
/// async fn fetch<R: Retry>(retrier: &R) -> Result<u32, R::Error<std::io::Error>> {
///     retrier.run(|| async { Ok::<_, std::io::Error>(42) }).await
/// }
///
/// async fn example() {
///     let _ = fetch(&Retrier::linear(3, Duration::from_millis(100))).await;
///     let _ = fetch(&NoopRetrier::new()).await;
/// }
/// ```
pub trait Retry {
    /// Error returned for an operation failing with `E`
    type Error<E>;

    /// Execute an operation, retrying it on failure
    ///
    /// The returned future is `Send`, so a run can be handed to
    /// `tokio::spawn` from code generic over the retrier.
    fn run<F, Fut, T, E>(
        &self,
        op: F,
    ) -> impl Future<Output = std::result::Result<T, Self::Error<E>>> + Send
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
        T: Send,
        E: Send;

    /// Execute an operation, retrying it on failure until `cancel` fires
    fn run_with_cancel<F, Fut, T, E>(
        &self,
        cancel: &Cancellation,
        op: F,
    ) -> impl Future<Output = std::result::Result<T, Self::Error<E>>> + Send
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
        T: Send,
        E: Send;
}

/// A reusable retrier pairing a delay policy with an attempt gate
///
/// Cloning is cheap and every run keeps its own bookkeeping, so one retrier
/// can serve any number of concurrent runs.
///
/// # Example
///
/// ```rust,no_run
/// use retrier::retry::{limit_attempts_count, progressive_delay, DelayPolicyExt, Retrier};
/// use std::time::Duration;
///
/// async fn example() {
///     let retrier = Retrier::new(
///         progressive_delay(Duration::from_millis(50), 2.0)
///             .with_jitter()
///             .with_max_delay(Duration::from_secs(2)),
///         limit_attempts_count(5),
///     );
///
///     let result = retrier
///         .run(|| async { Ok::<_, std::io::Error>("success") })
///         .await;
/// }
/// ```
#[derive(Clone)]
pub struct Retrier {
    delay: Arc<dyn DelayPolicy>,
    gate: Arc<dyn AttemptGate>,
}

impl Retrier {
    /// Create a retrier from a delay policy and an attempt gate
    pub fn new<D, G>(delay: D, gate: G) -> Self
    where
        D: DelayPolicy + 'static,
        G: AttemptGate + 'static,
    {
        Self {
            delay: Arc::new(delay),
            gate: Arc::new(gate),
        }
    }

    /// Start building a retrier piece by piece
    pub fn builder() -> RetrierBuilder {
        RetrierBuilder::default()
    }

    /// Up to `attempts` attempts with a fixed `delay` between them
    pub fn linear(attempts: u32, delay: Duration) -> Self {
        Self::new(fixed_delay(delay), limit_attempts_count(attempts))
    }

    /// Up to `attempts` attempts with a jittered, linearly growing delay
    ///
    /// See [`progressive_delay`] for the growth formula.
    pub fn progressive(attempts: u32, initial: Duration, multiplier: f64) -> Self {
        Self::new(
            with_delay_jitter(progressive_delay(initial, multiplier)),
            limit_attempts_count(attempts),
        )
    }

    /// Execute an operation with retry logic
    ///
    /// # Returns
    ///
    /// The operation's value, or [`RetryError::Exhausted`] carrying the last
    /// failure once the gate refuses another attempt.
    pub async fn run<F, Fut, T, E>(&self, op: F) -> std::result::Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        run_session(&*self.delay, &*self.gate, None, op)
            .instrument(debug_span!("retry"))
            .await
    }

    /// Execute an operation with retry logic, stopping when `cancel` fires
    ///
    /// The handle is checked before each attempt and raced against each
    /// delay. A fired handle yields [`RetryError::Cancelled`].
    pub async fn run_with_cancel<F, Fut, T, E>(
        &self,
        cancel: &Cancellation,
        op: F,
    ) -> std::result::Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        run_session(&*self.delay, &*self.gate, Some(cancel), op)
            .instrument(debug_span!("retry", cancellable = true))
            .await
    }
}

impl fmt::Debug for Retrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrier").finish_non_exhaustive()
    }
}

impl Retry for Retrier {
    type Error<E> = RetryError<E>;

    fn run<F, Fut, T, E>(
        &self,
        op: F,
    ) -> impl Future<Output = std::result::Result<T, RetryError<E>>> + Send
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
        T: Send,
        E: Send,
    {
        Retrier::run(self, op)
    }

    fn run_with_cancel<F, Fut, T, E>(
        &self,
        cancel: &Cancellation,
        op: F,
    ) -> impl Future<Output = std::result::Result<T, RetryError<E>>> + Send
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
        T: Send,
        E: Send,
    {
        Retrier::run_with_cancel(self, cancel, op)
    }
}

/// Builder for configuring a [`Retrier`]
///
/// Both a delay policy and an attempt gate are required; [`build`] reports
/// whichever is missing.
///
/// [`build`]: RetrierBuilder::build
#[derive(Default)]
pub struct RetrierBuilder {
    delay: Option<Arc<dyn DelayPolicy>>,
    gate: Option<Arc<dyn AttemptGate>>,
}

impl RetrierBuilder {
    /// Set the delay policy
    pub fn delay<D: DelayPolicy + 'static>(mut self, delay: D) -> Self {
        self.delay = Some(Arc::new(delay));
        self
    }

    /// Set the attempt gate
    pub fn gate<G: AttemptGate + 'static>(mut self, gate: G) -> Self {
        self.gate = Some(Arc::new(gate));
        self
    }

    /// Build the retrier
    pub fn build(self) -> Result<Retrier> {
        Ok(Retrier {
            delay: self.delay.ok_or(ConfigError::MissingDelayPolicy)?,
            gate: self.gate.ok_or(ConfigError::MissingAttemptGate)?,
        })
    }
}

impl fmt::Debug for RetrierBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrierBuilder")
            .field("has_delay", &self.delay.is_some())
            .field("has_gate", &self.gate.is_some())
            .finish()
    }
}

/// A retrier that never retries
///
/// The operation runs exactly once and its result comes back verbatim; no
/// policy is consulted and errors are not wrapped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRetrier;

impl NoopRetrier {
    /// Create a no-op retrier
    pub fn new() -> Self {
        Self
    }

    /// Execute an operation once
    pub async fn run<F, Fut, T, E>(&self, mut op: F) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        op().await
    }

    /// Execute an operation once; the handle is not consulted
    pub async fn run_with_cancel<F, Fut, T, E>(
        &self,
        _cancel: &Cancellation,
        op: F,
    ) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.run(op).await
    }
}

impl Retry for NoopRetrier {
    type Error<E> = E;

    fn run<F, Fut, T, E>(
        &self,
        op: F,
    ) -> impl Future<Output = std::result::Result<T, E>> + Send
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
        T: Send,
        E: Send,
    {
        NoopRetrier::run(self, op)
    }

    fn run_with_cancel<F, Fut, T, E>(
        &self,
        cancel: &Cancellation,
        op: F,
    ) -> impl Future<Output = std::result::Result<T, E>> + Send
    where
        F: FnMut() -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
        T: Send,
        E: Send,
    {
        NoopRetrier::run_with_cancel(self, cancel, op)
    }
}

/// Per-run bookkeeping
struct RetrySession {
    attempt: u32,
    last_delay: Duration,
    started: Instant,
}

impl RetrySession {
    fn start() -> Self {
        Self {
            attempt: 0,
            last_delay: Duration::ZERO,
            started: Instant::now(),
        }
    }

    /// Count a new attempt; the counter sticks at `u32::MAX`
    fn begin_attempt(&mut self) -> u32 {
        self.attempt = self.attempt.saturating_add(1);
        self.attempt
    }

    fn exhausted<E>(&self, source: E) -> RetryError<E> {
        let elapsed = self.started.elapsed();
        debug!(
            attempts = self.attempt,
            elapsed_ms = elapsed.as_millis() as u64,
            "retry attempts exhausted"
        );
        RetryError::exhausted(self.attempt, elapsed, source)
    }

    fn cancelled<E>(&self, reason: CancelReason) -> RetryError<E> {
        debug!(attempt = self.attempt, reason = %reason, "retry cancelled");
        RetryError::Cancelled(reason)
    }
}

async fn run_session<F, Fut, T, E>(
    delay_policy: &dyn DelayPolicy,
    gate: &dyn AttemptGate,
    cancel: Option<&Cancellation>,
    mut op: F,
) -> std::result::Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
{
    let mut session = RetrySession::start();

    loop {
        if let Some(reason) = cancel.and_then(Cancellation::reason) {
            return Err(session.cancelled(reason));
        }

        session.begin_attempt();

        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !gate.allow(session.attempt, session.last_delay) {
            return Err(session.exhausted(err));
        }

        let delay = delay_policy.delay(session.attempt, session.last_delay);
        session.last_delay = delay;

        debug!(
            attempt = session.attempt,
            delay_ms = delay.as_millis() as u64,
            "attempt failed, will retry"
        );

        if delay.is_zero() {
            continue;
        }

        match cancel {
            Some(cancel) => {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    reason = cancel.cancelled() => return Err(session.cancelled(reason)),
                }
            }
            None => tokio::time::sleep(delay).await,
        }
    }
}
