//! Bomb countdown timers
//!
//! Each live bomb owns a [`CountdownHandle`]. The scheduler behind it posts a
//! tick for the bomb once per interval until the handle is cancelled.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tracing::trace;

use crate::game::bomb::BombId;

type Canceller = Box<dyn FnOnce() + Send>;

/// Owned handle to a running countdown
///
/// Cancellation runs at most once. Dropping the handle cancels it.
#[derive(Default)]
pub struct CountdownHandle {
    cancel: Option<Canceller>,
}

impl CountdownHandle {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Handle with no timer behind it
    pub fn detached() -> Self {
        Self::default()
    }

    /// Stop the countdown. Returns true only on the first effective call.
    pub fn cancel(&mut self) -> bool {
        match self.cancel.take() {
            Some(cancel) => {
                cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.cancel.is_some()
    }
}

impl fmt::Debug for CountdownHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountdownHandle")
            .field("active", &self.is_active())
            .finish()
    }
}

impl Drop for CountdownHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Starts per-bomb countdowns
pub trait CountdownScheduler: Send {
    fn start(&mut self, bomb: &BombId) -> CountdownHandle;
}

/// Countdowns backed by tokio interval tasks that post ticks into a channel
pub struct TokioCountdowns {
    period: Duration,
    ticks: mpsc::UnboundedSender<BombId>,
}

impl TokioCountdowns {
    pub fn new(period: Duration, ticks: mpsc::UnboundedSender<BombId>) -> Self {
        Self { period, ticks }
    }

    /// Scheduler plus the receiving end of its tick channel
    pub fn channel(period: Duration) -> (Self, mpsc::UnboundedReceiver<BombId>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(period, tx), rx)
    }
}

impl CountdownScheduler for TokioCountdowns {
    fn start(&mut self, bomb: &BombId) -> CountdownHandle {
        let ticks = self.ticks.clone();
        let id = bomb.clone();
        let period = self.period;

        let task = tokio::spawn(async move {
            // First tick one full period after spawn
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if ticks.send(id.clone()).is_err() {
                    trace!("Tick receiver gone, stopping countdown for bomb {}", id);
                    break;
                }
            }
        });

        let abort = task.abort_handle();
        CountdownHandle::new(move || abort.abort())
    }
}

/// Scheduler that starts nothing and records starts and cancellations
#[derive(Debug, Default, Clone)]
pub struct ManualCountdowns {
    started: Arc<Mutex<Vec<BombId>>>,
    cancelled: Arc<Mutex<Vec<BombId>>>,
}

impl ManualCountdowns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn started(&self) -> Vec<BombId> {
        self.started.lock().clone()
    }

    pub fn cancelled(&self) -> Vec<BombId> {
        self.cancelled.lock().clone()
    }

    /// Times the countdown for `bomb` has been cancelled
    pub fn cancel_count(&self, bomb: &BombId) -> usize {
        self.cancelled.lock().iter().filter(|b| *b == bomb).count()
    }
}

impl CountdownScheduler for ManualCountdowns {
    fn start(&mut self, bomb: &BombId) -> CountdownHandle {
        self.started.lock().push(bomb.clone());
        let cancelled = Arc::clone(&self.cancelled);
        let id = bomb.clone();
        CountdownHandle::new(move || cancelled.lock().push(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;
    use tokio::time::{sleep, timeout};

    #[test]
    fn test_cancel_runs_once() {
        let mut countdowns = ManualCountdowns::new();
        let id = BombId::from("b1");
        let mut handle = countdowns.start(&id);

        assert!(handle.is_active());
        assert!(handle.cancel());
        assert!(!handle.cancel());
        drop(handle);

        assert_eq!(countdowns.cancel_count(&id), 1);
        assert_eq!(countdowns.started(), vec![id]);
    }

    #[test]
    fn test_drop_cancels() {
        let mut countdowns = ManualCountdowns::new();
        let id = BombId::from("b2");
        drop(countdowns.start(&id));
        assert_eq!(countdowns.cancelled(), vec![id]);
    }

    #[test]
    fn test_detached_handle() {
        let mut handle = CountdownHandle::detached();
        assert!(!handle.is_active());
        assert!(!handle.cancel());
    }

    #[tokio::test]
    async fn test_tokio_countdown_ticks_until_cancelled() {
        let (mut countdowns, mut rx) = TokioCountdowns::channel(Duration::from_millis(10));
        let id = BombId::from("b3");
        let mut handle = countdowns.start(&id);

        for _ in 0..2 {
            let tick = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
            assert_eq!(tick, Some(id.clone()));
        }

        assert!(handle.cancel());
        sleep(Duration::from_millis(30)).await;
        while rx.try_recv().is_ok() {}
        sleep(Duration::from_millis(50)).await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_tokio_countdown_stops_on_drop() {
        let (mut countdowns, mut rx) = TokioCountdowns::channel(Duration::from_millis(10));
        let handle = countdowns.start(&BombId::from("b4"));
        drop(handle);

        sleep(Duration::from_millis(30)).await;
        while rx.try_recv().is_ok() {}
        sleep(Duration::from_millis(50)).await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }
}
