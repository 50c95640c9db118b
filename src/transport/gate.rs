//! The `sending` flag shared by a transport's send and receive paths.
//!
//! Stored as `epoch << 1 | active` in one atomic. Each send opens a new epoch;
//! its guard clears the flag a settle delay after the send ends, but only if
//! no later send has opened since. Dropping the guard early (cancelled send)
//! schedules the same clear, so the transport never stays deaf.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

#[derive(Debug, Clone)]
pub struct SendGate {
    state: Arc<AtomicU64>,
    settle: Duration,
}

impl SendGate {
    pub fn new(settle: Duration) -> Self {
        Self {
            state: Arc::new(AtomicU64::new(0)),
            settle,
        }
    }

    /// Inbound audio must be discarded while this is true.
    pub fn is_sending(&self) -> bool {
        self.state.load(Ordering::Acquire) & 1 == 1
    }

    /// Mark a send as in progress until the guard is dropped and settled.
    pub fn open(&self) -> SendGuard {
        let mut current = self.state.load(Ordering::Acquire);
        let opened = loop {
            let next = (((current >> 1) + 1) << 1) | 1;
            match self
                .state
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => break next,
                Err(actual) => current = actual,
            }
        };
        SendGuard {
            state: Arc::clone(&self.state),
            opened,
            settle: self.settle,
        }
    }
}

#[must_use = "the send window closes when the guard is dropped"]
pub struct SendGuard {
    state: Arc<AtomicU64>,
    opened: u64,
    settle: Duration,
}

fn clear(state: &AtomicU64, opened: u64) {
    let cleared = state
        .compare_exchange(opened, opened & !1, Ordering::AcqRel, Ordering::Acquire)
        .is_ok();
    trace!(cleared, "Send window settled");
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        let state = Arc::clone(&self.state);
        let opened = self.opened;

        if self.settle.is_zero() {
            clear(&state, opened);
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let settle = self.settle;
                handle.spawn(async move {
                    tokio::time::sleep(settle).await;
                    clear(&state, opened);
                });
            }
            Err(_) => clear(&state, opened),
        }
    }
}
