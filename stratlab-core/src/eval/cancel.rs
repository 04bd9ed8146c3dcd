use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, polled once per timestep.
///
/// Clones share the flag, so a UI thread can hold one clone and cancel a run
/// executing on another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<Inner>);

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    /// Polls left before the flag trips itself; `None` means unlimited.
    limit: Option<usize>,
    polls_left: AtomicUsize,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag that cancels itself once it has been polled `polls` times,
    /// capping a run at `polls` timesteps.
    pub fn with_poll_limit(polls: usize) -> Self {
        Self(Arc::new(Inner {
            cancelled: AtomicBool::new(false),
            limit: Some(polls),
            polls_left: AtomicUsize::new(polls),
        }))
    }

    pub fn cancel(&self) {
        self.0.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.0.cancelled.load(Ordering::Relaxed) {
            return true;
        }
        if self.0.limit.is_some() {
            let spent = self
                .0
                .polls_left
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
                .is_err();
            if spent {
                self.cancel();
                return true;
            }
        }
        false
    }

    /// Clear the flag (and restore any poll limit) so the same handle can
    /// drive another run.
    pub fn reset(&self) {
        if let Some(limit) = self.0.limit {
            self.0.polls_left.store(limit, Ordering::Relaxed);
        }
        self.0.cancelled.store(false, Ordering::Relaxed);
    }
}
