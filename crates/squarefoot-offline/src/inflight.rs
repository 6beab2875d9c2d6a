//! In-flight request accounting.

use tokio::sync::watch;

/// Counts requests currently being served so a cutover can wait for them.
#[derive(Debug)]
pub struct InFlightTracker {
    count: watch::Sender<usize>,
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InFlightTracker {
    pub fn new() -> Self {
        let (count, _) = watch::channel(0);
        Self { count }
    }

    /// Mark a request as started. It ends when the guard drops.
    pub fn begin(&self) -> InFlightGuard<'_> {
        self.count.send_modify(|n| *n += 1);
        InFlightGuard { tracker: self }
    }

    pub fn in_flight(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolve once no request is in flight.
    pub async fn wait_idle(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

/// Keeps one request counted while alive.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    tracker: &'a InFlightTracker,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.tracker.count.send_modify(|n| *n = n.saturating_sub(1));
    }
}
