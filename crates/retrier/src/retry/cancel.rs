//! Cancellation handles for retry runs
//!
//! A [`Cancellation`] fires either when [`Cancellation::cancel`] is called or
//! when its optional deadline passes. The executor checks it before every
//! attempt and races it against the delay between attempts; an attempt that
//! is already running is never interrupted.

use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a retry run was cancelled
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The handle was cancelled explicitly
    #[error("operation cancelled")]
    Cancelled,

    /// The handle's deadline passed
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// A cloneable cancellation signal with an optional deadline
///
/// Clones share state: cancelling one cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// A handle that only fires when cancelled explicitly
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle that also fires once `timeout` has elapsed from now
    ///
    /// A timeout too large to represent as an instant sets no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::new(),
        }
    }

    /// A handle that also fires at `deadline`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A handle cancelled together with this one, but which can also be
    /// cancelled on its own without affecting the parent
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this handle and every clone and child of it
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The deadline, if one was set
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the handle has fired, or `None` if it has not
    ///
    /// An explicit cancel wins over an expired deadline.
    pub fn reason(&self) -> Option<CancelReason> {
        if self.token.is_cancelled() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Whether the handle has fired
    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Wait until the handle fires
    pub async fn cancelled(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => CancelReason::Cancelled,
                    () = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                CancelReason::Cancelled
            }
        }
    }
}

impl From<CancellationToken> for Cancellation {
    fn from(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }
}
