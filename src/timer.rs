//! Timer services used to arm the deferred flush.
//!
//! The handler never spawns timers by itself; it is given a
//! [`TimerService`]. Production code uses [`TokioTimerService`]; tests use
//! [`ManualTimerService`] and advance time explicitly.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// Work run once when a timer expires.
pub type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// A scheduled timer that can be cancelled before it fires.
pub trait TimerHandle: Send + Sync {
    /// Prevent the task from running. No-op if it already ran.
    fn cancel(&self);
}

/// Port for scheduling a one-shot task after a delay.
pub trait TimerService: Send + Sync + fmt::Debug {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle>;
}

/// Timer service backed by `tokio::time::sleep` on a runtime handle.
#[derive(Debug, Clone)]
pub struct TokioTimerService {
    runtime: Handle,
}

impl TokioTimerService {
    pub fn new(runtime: Handle) -> Self {
        Self { runtime }
    }

    /// Use the runtime of the calling context, if any.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

struct TokioTimerHandle(JoinHandle<()>);

impl TimerHandle for TokioTimerHandle {
    fn cancel(&self) {
        self.0.abort();
    }
}

impl TimerService for TokioTimerService {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle> {
        let join = self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
        Box::new(TokioTimerHandle(join))
    }
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_id: u64,
    pending: BTreeMap<(Duration, u64), TimerTask>,
}

/// Deterministic timer service driven by [`advance`](Self::advance).
///
/// Time starts at zero. Clones share the same clock and pending tasks.
/// Due tasks run on the thread calling `advance`, in deadline order, with
/// the service's own lock released.
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
/// use tracing_delay_buffer::timer::{ManualTimerService, TimerService};
///
/// let timers = ManualTimerService::new();
/// let fired = Arc::new(AtomicBool::new(false));
/// let flag = fired.clone();
/// timers.schedule(Duration::from_secs(1), Box::new(move || flag.store(true, Ordering::SeqCst)));
///
/// assert_eq!(timers.advance(Duration::from_millis(999)), 0);
/// assert_eq!(timers.advance(Duration::from_millis(1)), 1);
/// assert!(fired.load(Ordering::SeqCst));
/// ```
#[derive(Clone, Default)]
pub struct ManualTimerService {
    state: Arc<Mutex<ManualState>>,
}

impl ManualTimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward and run every task that became due. Returns how
    /// many tasks ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.lock().now + by;
        let mut fired = 0;

        loop {
            let task = {
                let mut state = self.lock();
                let due = state
                    .pending
                    .keys()
                    .next()
                    .copied()
                    .filter(|(deadline, _)| *deadline <= target);
                match due {
                    Some(key) => {
                        state.now = key.0;
                        state.pending.remove(&key)
                    }
                    None => {
                        state.now = target;
                        None
                    }
                }
            };

            match task {
                Some(task) => {
                    task();
                    fired += 1;
                }
                None => return fired,
            }
        }
    }

    /// Time elapsed since the service was created.
    pub fn elapsed(&self) -> Duration {
        self.lock().now
    }

    /// Number of armed, not yet fired tasks.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ManualTimerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ManualTimerService")
            .field("now", &state.now)
            .field("pending", &state.pending.len())
            .finish()
    }
}

struct ManualTimerHandle {
    state: Arc<Mutex<ManualState>>,
    key: (Duration, u64),
}

impl TimerHandle for ManualTimerHandle {
    fn cancel(&self) {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .remove(&self.key);
    }
}

impl TimerService for ManualTimerService {
    fn schedule(&self, delay: Duration, task: TimerTask) -> Box<dyn TimerHandle> {
        let mut state = self.lock();
        let key = (state.now + delay, state.next_id);
        state.next_id += 1;
        state.pending.insert(key, task);
        Box::new(ManualTimerHandle {
            state: Arc::clone(&self.state),
            key,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_task(counter: &Arc<AtomicUsize>) -> TimerTask {
        let counter = Arc::clone(counter);
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn manual_timer_fires_in_deadline_order() {
        let timers = ManualTimerService::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (name, secs) in [("late", 3), ("early", 1), ("middle", 2)] {
            let order = Arc::clone(&order);
            timers.schedule(
                Duration::from_secs(secs),
                Box::new(move || order.lock().unwrap().push(name)),
            );
        }

        assert_eq!(timers.advance(Duration::from_secs(5)), 3);
        assert_eq!(*order.lock().unwrap(), vec!["early", "middle", "late"]);
        assert_eq!(timers.elapsed(), Duration::from_secs(5));
    }

    #[test]
    fn cancelled_manual_timer_never_fires() {
        let timers = ManualTimerService::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = timers.schedule(Duration::from_secs(1), counter_task(&counter));
        assert_eq!(timers.pending(), 1);
        handle.cancel();
        assert_eq!(timers.pending(), 0);

        timers.advance(Duration::from_secs(10));
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        // cancelling twice is harmless
        handle.cancel();
    }

    #[test]
    fn task_may_schedule_another_task() {
        let timers = ManualTimerService::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let inner = timers.clone();
        let c = Arc::clone(&counter);
        timers.schedule(
            Duration::from_secs(1),
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
                inner.schedule(Duration::from_secs(1), counter_task(&c));
            }),
        );

        assert_eq!(timers.advance(Duration::from_secs(1)), 1);
        assert_eq!(timers.pending(), 1);
        assert_eq!(timers.advance(Duration::from_secs(1)), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_timer_fires_after_delay() {
        let timers = TokioTimerService::try_current().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        timers.schedule(Duration::from_secs(2), counter_task(&counter));

        tokio::time::sleep(Duration::from_millis(1999)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_timer_cancel_aborts_task() {
        let timers = TokioTimerService::try_current().unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let handle = timers.schedule(Duration::from_secs(1), counter_task(&counter));
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
