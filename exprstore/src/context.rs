// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Execution contexts and cancellation
//!
//! An execution context is the calling OS thread. Each thread is lazily given a
//! numeric identity from a process-wide counter; identities are never reused,
//! so two live threads can never share one.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_CONTEXT: ContextId = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
}

/// Opaque identity of an execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Identity of the calling thread
    pub fn current() -> Self {
        CURRENT_CONTEXT.with(|id| *id)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub(crate) fn from_raw(raw: u64) -> Self {
        ContextId(raw)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Cancellation signal shared between a connection manager and everything
/// blocked on its behalf.
///
/// Backends wait on the token instead of sleeping so that a cancel wakes them
/// immediately.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

#[derive(Debug, Default)]
struct TokenInner {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel and wake every waiter. Returns false if already cancelled.
    pub fn cancel(&self) -> bool {
        let mut cancelled = self.inner.cancelled.lock();
        if *cancelled {
            return false;
        }
        *cancelled = true;
        self.inner.wakeup.notify_all();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Block for up to `timeout`. Returns `true` if the wait ended because the
    /// token was cancelled, `false` if the full timeout elapsed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self
                .inner
                .wakeup
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                return *cancelled;
            }
        }
        true
    }
}
