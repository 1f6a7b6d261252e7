//! Outstanding-work tracking for the dispatcher's drain barrier.

use plugboard_core::{Context, DispatchError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

/// Counts scheduled-but-unfinished units of work and wakes waiters when the
/// count returns to zero.
#[derive(Debug)]
pub(crate) struct PendingWork {
    count: AtomicUsize,
    drained: watch::Sender<()>,
}

impl PendingWork {
    pub(crate) fn new() -> Self {
        let (drained, _) = watch::channel(());
        Self {
            count: AtomicUsize::new(0),
            drained,
        }
    }

    /// Register one unit of work. The returned guard completes it on drop.
    pub(crate) fn begin(self: &Arc<Self>) -> PendingGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        metrics::gauge!(crate::metrics::PENDING).increment(1.0);
        PendingGuard(Arc::clone(self))
    }

    pub(crate) fn current(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    fn finish(&self) {
        metrics::gauge!(crate::metrics::PENDING).decrement(1.0);
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            // Counter reached zero, notify waiters
            self.drained.send_replace(());
        }
    }

    /// Resolve once the count is zero, or fail when `ctx` is done first.
    pub(crate) async fn drained(&self, ctx: &Context) -> Result<(), DispatchError> {
        // Subscribe before reading the count so a drain in between is not missed.
        let mut rx = self.drained.subscribe();

        loop {
            if self.current() == 0 {
                return Ok(());
            }

            tokio::select! {
                biased;
                changed = rx.changed() => {
                    // The sender lives as long as `self`.
                    debug_assert!(changed.is_ok());
                },
                () = ctx.done() => {
                    return Err(DispatchError::Timeout { pending: self.current() });
                },
            }
        }
    }
}

/// RAII guard that completes one unit of pending work on drop.
///
/// Dropping happens whether the handler returned, failed or panicked, and
/// also when a job is discarded without running.
#[derive(Debug)]
pub(crate) struct PendingGuard(Arc<PendingWork>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}
