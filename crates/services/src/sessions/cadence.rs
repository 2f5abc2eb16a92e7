use std::future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};

/// Why the cadence woke up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Firing {
    /// Regular tick while the session runs.
    Tick,
    /// One-shot refresh retry after a failed fetch.
    Retry,
}

/// Local clock of one session view.
///
/// Holds at most one repeating interval and at most one pending refresh
/// retry. Both are polled through [`Cadence::fired`], which is cancel safe
/// and can sit in a `tokio::select!` loop.
#[derive(Debug)]
pub struct Cadence {
    period: Duration,
    interval: Option<Interval>,
    retry: Option<Pin<Box<Sleep>>>,
    retry_limit: u32,
    retries_left: u32,
}

impl Cadence {
    #[must_use]
    pub fn new(period: Duration, retry_limit: u32) -> Self {
        Self {
            period,
            interval: None,
            retry: None,
            retry_limit,
            retries_left: retry_limit,
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Start ticking one period from now. Returns `false` if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> bool {
        if self.interval.is_some() {
            return false;
        }
        let mut interval = time::interval_at(Instant::now() + self.period, self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.interval = Some(interval);
        self.retry = None;
        true
    }

    /// Returns `false` if it was not running.
    pub fn stop(&mut self) -> bool {
        self.interval.take().is_some()
    }

    /// Arm a one-shot refresh retry, unless the cadence is running (its next
    /// tick refreshes anyway), a retry is already armed, or the budget is
    /// spent.
    pub fn schedule_retry(&mut self) -> bool {
        if self.interval.is_some() || self.retry.is_some() || self.retries_left == 0 {
            return false;
        }
        self.retries_left -= 1;
        self.retry = Some(Box::pin(time::sleep(self.period)));
        true
    }

    #[must_use]
    pub fn has_pending_retry(&self) -> bool {
        self.retry.is_some()
    }

    /// Forget any pending retry and restore the retry budget.
    pub fn reset_retries(&mut self) {
        self.retry = None;
        self.retries_left = self.retry_limit;
    }

    /// Stop everything.
    pub fn halt(&mut self) {
        self.interval = None;
        self.retry = None;
    }

    /// Wait for the next firing. Pending forever while nothing is armed.
    pub async fn fired(&mut self) -> Firing {
        if let Some(interval) = self.interval.as_mut() {
            interval.tick().await;
            return Firing::Tick;
        }
        if let Some(retry) = self.retry.as_mut() {
            retry.await;
            self.retry = None;
            return Firing::Retry;
        }
        future::pending().await
    }
}
