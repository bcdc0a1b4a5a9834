//! Flow tests for the retry module
//!
//! These tests drive complete runs through the executor with the built-in
//! policies and check timing, attempt counts and error shapes.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::retry::cancel::{CancelReason, Cancellation};
use crate::retry::error::RetryError;
use crate::retry::executor::{NoopRetrier, Retrier, Retry};
use crate::retry::policy::{
    fixed_delay, limit_attempts_count, progressive_delay, with_max_delay, DelayPolicyExt,
};

const MS: Duration = Duration::from_millis(1);

fn test_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionRefused, "test error")
}

/// Run an always-failing operation and return the error and the call count
async fn fail_always(retrier: &Retrier) -> (RetryError<io::Error>, u32) {
    let calls = AtomicU32::new(0);
    let err = retrier
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(test_error()) }
        })
        .await
        .unwrap_err();
    (err, calls.load(Ordering::SeqCst))
}

// ============================================================================
// Attempt Counting
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_attempt_count_matches_limit() {
    for max_attempts in 1..=6 {
        let retrier = Retrier::linear(max_attempts, MS);

        let (err, calls) = fail_always(&retrier).await;

        assert_eq!(calls, max_attempts);
        assert_eq!(err.attempts(), Some(max_attempts));
    }
}

#[tokio::test]
async fn test_zero_attempts_coerced_to_one() {
    let retrier = Retrier::linear(0, Duration::ZERO);

    let (err, calls) = fail_always(&retrier).await;

    assert_eq!(calls, 1);
    assert_eq!(err.attempts(), Some(1));
    assert_eq!(err.source_ref().map(io::Error::kind), Some(io::ErrorKind::ConnectionRefused));
}

#[tokio::test(start_paused = true)]
async fn test_success_short_circuits_regardless_of_policy() {
    let retrier = Retrier::linear(10, Duration::from_secs(3600));
    let calls = AtomicU32::new(0);
    let start = Instant::now();

    let value = retrier
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, io::Error>(7) }
        })
        .await
        .unwrap();

    assert_eq!(value, 7);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

// ============================================================================
// Timing
// ============================================================================

#[tokio::test]
async fn test_linear_waits_between_attempts() {
    let retrier = Retrier::linear(3, 10 * MS);
    let start = std::time::Instant::now();

    let (err, _) = fail_always(&retrier).await;

    // Two delays for three attempts
    assert!(start.elapsed() >= 20 * MS);
    assert!(err.elapsed().unwrap() >= 20 * MS);
}

#[tokio::test]
async fn test_progressive_waits_between_attempts() {
    let retrier = Retrier::progressive(3, 5 * MS, 2.0);
    let start = std::time::Instant::now();

    let (err, calls) = fail_always(&retrier).await;

    // Unjittered delays are 10ms and 20ms; jitter only lengthens them
    assert_eq!(calls, 3);
    assert!(start.elapsed() >= 30 * MS);
    assert!(err.is_exhausted());
}

#[tokio::test(start_paused = true)]
async fn test_max_delay_bounds_total_wait() {
    let retrier = Retrier::new(
        with_max_delay(progressive_delay(5 * MS, 2.0), 10 * MS),
        limit_attempts_count(5),
    );
    let start = Instant::now();

    let (err, calls) = fail_always(&retrier).await;
    let took = start.elapsed();

    // Four delays, each capped at 10ms
    assert_eq!(calls, 5);
    assert!(took >= 40 * MS);
    assert!(took < 45 * MS);
    assert_eq!(err.attempts(), Some(5));
}

#[tokio::test(start_paused = true)]
async fn test_jittered_max_delay_bounds_total_wait() {
    let retrier = Retrier::new(
        progressive_delay(10 * MS, 1.0)
            .with_jitter()
            .with_max_delay(15 * MS),
        limit_attempts_count(4),
    );
    let start = Instant::now();

    fail_always(&retrier).await;

    assert!(start.elapsed() >= 10 * MS + 15 * MS + 15 * MS);
    assert!(start.elapsed() < 50 * MS);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_pre_cancelled_never_calls_operation() {
    let retrier = Retrier::linear(3, 10 * MS);
    let cancel = Cancellation::new();
    cancel.cancel();
    let calls = AtomicU32::new(0);

    let err = retrier
        .run_with_cancel(&cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(test_error()) }
        })
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.cancel_reason(), Some(CancelReason::Cancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_delay_cuts_wait_short() {
    let retrier = Retrier::linear(5, Duration::from_secs(60));
    let cancel = Cancellation::new();
    let trigger = cancel.clone();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let err = retrier
        .run_with_cancel(&cancel, || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(test_error()) }
        })
        .await
        .unwrap_err();

    assert_eq!(err.cancel_reason(), Some(CancelReason::Cancelled));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_during_delay() {
    let retrier = Retrier::linear(5, Duration::from_secs(10));
    let cancel = Cancellation::with_timeout(Duration::from_secs(25));
    let start = Instant::now();

    let (err, calls) = {
        let calls = AtomicU32::new(0);
        let err = retrier
            .run_with_cancel(&cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(test_error()) }
            })
            .await
            .unwrap_err();
        (err, calls.load(Ordering::SeqCst))
    };

    // Attempts at 0s, 10s and 20s; the third delay is cut at 25s
    assert_eq!(calls, 3);
    assert_eq!(err.cancel_reason(), Some(CancelReason::DeadlineExceeded));
    let took = start.elapsed();
    assert!(took >= Duration::from_secs(25));
    assert!(took < Duration::from_secs(26));
}

#[tokio::test(start_paused = true)]
async fn test_uncancelled_signal_behaves_like_plain_run() {
    let retrier = Retrier::linear(4, 5 * MS);
    let cancel = Cancellation::new();
    let calls = AtomicU32::new(0);

    let err = retrier
        .run_with_cancel(&cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(test_error()) }
        })
        .await
        .unwrap_err();

    let (plain_err, plain_calls) = fail_always(&retrier).await;

    assert_eq!(calls.load(Ordering::SeqCst), plain_calls);
    assert_eq!(err.attempts(), plain_err.attempts());
    assert!(err.is_exhausted() && plain_err.is_exhausted());
}

#[tokio::test]
async fn test_cancel_does_not_interrupt_running_attempt() {
    let retrier = Retrier::linear(3, Duration::ZERO);
    let cancel = Cancellation::new();
    let calls = AtomicU32::new(0);

    // The operation itself fires the signal; the attempt still completes
    let value = retrier
        .run_with_cancel(&cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            let cancel = cancel.clone();
            async move {
                cancel.cancel();
                Ok::<_, io::Error>("finished")
            }
        })
        .await
        .unwrap();

    assert_eq!(value, "finished");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// No-op Retrier
// ============================================================================

#[tokio::test]
async fn test_noop_success() {
    let result = NoopRetrier::new()
        .run(|| async { Ok::<_, io::Error>("ok") })
        .await;

    assert_eq!(result.unwrap(), "ok");
}

#[tokio::test]
async fn test_noop_failure_is_unwrapped() {
    let calls = AtomicU32::new(0);
    let start = std::time::Instant::now();

    let err = NoopRetrier::new()
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(test_error()) }
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    assert_eq!(err.to_string(), "test error");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < 100 * MS);
}

#[tokio::test]
async fn test_noop_ignores_cancellation() {
    let cancel = Cancellation::new();
    cancel.cancel();

    let result = NoopRetrier::new()
        .run_with_cancel(&cancel, || async { Ok::<_, io::Error>(1) })
        .await;

    assert_eq!(result.unwrap(), 1);
}

// ============================================================================
// Retry Trait
// ============================================================================

async fn count_calls<R: Retry>(retrier: &R) -> u32 {
    let calls = AtomicU32::new(0);
    let _ = retrier
        .run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(test_error()) }
        })
        .await;
    calls.load(Ordering::SeqCst)
}

#[tokio::test]
async fn test_retry_trait_dispatch() {
    assert_eq!(count_calls(&Retrier::linear(3, Duration::ZERO)).await, 3);
    assert_eq!(count_calls(&NoopRetrier::new()).await, 1);
}

/// Spawn a generic run onto the runtime and report how often it called the op
async fn spawn_failing_run<R>(retrier: R) -> u32
where
    R: Retry + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let calls = AtomicU32::new(0);
        let _ = retrier
            .run(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(test_error()) }
            })
            .await;
        calls.load(Ordering::SeqCst)
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_generic_runs_can_be_spawned() {
    let retrier = Retrier::linear(3, Duration::ZERO);

    assert_eq!(spawn_failing_run(retrier).await, 3);
    assert_eq!(spawn_failing_run(NoopRetrier::new()).await, 1);
}

#[tokio::test]
async fn test_retrier_is_reusable_across_tasks() {
    let retrier = Retrier::new(fixed_delay(MS), limit_attempts_count(3));
    let mut handles = Vec::new();

    for _ in 0..8 {
        let retrier = retrier.clone();
        handles.push(tokio::spawn(async move {
            let calls = Arc::new(AtomicU32::new(0));
            let counter = Arc::clone(&calls);
            let err = retrier
                .run(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    async { Err::<(), _>(test_error()) }
                })
                .await
                .unwrap_err();
            (err.attempts(), calls.load(Ordering::SeqCst))
        }));
    }

    for handle in handles {
        let (attempts, calls) = handle.await.unwrap();
        assert_eq!(attempts, Some(3));
        assert_eq!(calls, 3);
    }
}
