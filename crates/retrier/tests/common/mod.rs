//! Common test infrastructure for retrier integration tests
//!
//! # Usage
//!
//! In your test file, add:
//! ```ignore
//! mod common;
//! use common::*;
//! ```

#![allow(dead_code)]

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Install a test subscriber once; filter with `RUST_LOG`
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Load a fixture file from `tests/fixtures`
pub fn load_fixture(filename: &str) -> String {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(filename);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to load fixture '{}': {}", path.display(), e))
}

/// An operation failing a fixed number of times before succeeding
#[derive(Debug, Clone)]
pub struct FlakyOperation {
    failures: u32,
    calls: Arc<AtomicU32>,
}

impl FlakyOperation {
    /// Fail the first `failures` calls
    pub fn failing(failures: u32) -> Self {
        Self {
            failures,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Never succeed
    pub fn always_failing() -> Self {
        Self::failing(u32::MAX)
    }

    /// Number of calls made so far
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Perform one call, returning the 1-indexed call number on success
    pub async fn call(&self) -> Result<u32, io::Error> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                format!("call {} failed", call),
            ))
        } else {
            Ok(call)
        }
    }
}
