// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scheduler capability forwarded to nodes and starter actions.
//!
//! Propagation itself is synchronous. Work that suspends (waiting on an
//! external computation, running off the caller's thread) goes through a
//! host-provided [`Scheduler`]. The engine never calls it; it only hands the
//! same scheduler to every [`PropagationContext`](crate::PropagationContext)
//! and child queue it creates.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

/// A unit of work handed to the scheduler.
pub type Work = Box<dyn FnOnce() + Send + 'static>;

/// A unit of work that observes a cancellation token.
pub type CancellableWork = Box<dyn FnOnce(&CancelToken) + Send + 'static>;

/// Shared cancellation flag.
///
/// Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Handle a suspended operation waits on until the host releases it.
///
/// Clones observe the same state.
#[derive(Clone, Debug, Default)]
pub struct Unblock {
    released: Arc<AtomicBool>,
}

impl Unblock {
    /// Creates a handle in the blocked state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Releases every holder of this handle.
    pub fn unblock(&self) {
        self.released.store(true, Ordering::Release);
    }

    /// Returns `true` once [`unblock`](Self::unblock) has been called.
    #[must_use]
    pub fn is_unblocked(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

/// Host scheduler contract.
pub trait Scheduler: Send + Sync {
    /// Creates a handle for a suspended operation to wait on.
    fn create_unblock(&self) -> Unblock {
        Unblock::new()
    }

    /// Runs `work`, which should stop early once `token` is cancelled.
    fn run_cancellable(&self, work: CancellableWork, token: CancelToken);

    /// Runs `work` off the caller's thread.
    fn run_detached(&self, work: Work);

    /// Delivers an asynchronous progress notification.
    fn dispatch(&self, work: Work);
}

impl fmt::Debug for dyn Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn Scheduler")
    }
}

/// Scheduler that runs everything immediately on the calling thread.
///
/// Suitable for synchronous hosts and tests.
#[derive(Copy, Clone, Debug, Default)]
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
    fn run_cancellable(&self, work: CancellableWork, token: CancelToken) {
        if !token.is_cancelled() {
            work(&token);
        }
    }

    fn run_detached(&self, work: Work) {
        work();
    }

    fn dispatch(&self, work: Work) {
        work();
    }
}
