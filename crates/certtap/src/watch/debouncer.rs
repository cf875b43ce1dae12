//! Burst coalescing for state-file change events.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task;
use tracing::{debug, trace, warn};

/// Debounce state machine.
///
/// ```text
/// Idle --event--> Pending --quiet interval--> Running --done--> Idle
///                   ▲  └─ further events absorbed          │
///                   └──────── event seen while running ────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebounceState {
    Idle,
    Pending,
    Running { rerun: bool },
}

/// Coalesces bursts of change events into single extraction passes.
///
/// Exactly one pass is ever in flight. An event arriving mid-pass is
/// remembered as a single flag, not a queue: any burst collapses to at
/// most one follow-up pass.
pub struct Debouncer {
    inner: Arc<Inner>,
}

struct Inner {
    /// The only shared mutable state in the core.
    state: Mutex<DebounceState>,
    quiet_interval: Duration,
    job: Box<dyn Fn() + Send + Sync>,
}

impl Debouncer {
    /// `job` is the blocking extraction pass; it runs on a blocking task
    /// thread once per quiet interval that follows a change.
    pub fn new(quiet_interval: Duration, job: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(DebounceState::Idle),
                quiet_interval,
                job: Box::new(job),
            }),
        }
    }

    /// Feed one relevant change event into the machine.
    ///
    /// Must be called from within a tokio runtime; the delayed run is
    /// spawned as a task.
    pub fn poke(&self) {
        let mut state = self.inner.state.lock();
        match *state {
            DebounceState::Idle => {
                *state = DebounceState::Pending;
                drop(state);
                trace!("change event: scheduling extraction");
                Inner::schedule(self.inner.clone());
            }
            DebounceState::Pending => {
                trace!("change event absorbed into pending extraction");
            }
            DebounceState::Running { ref mut rerun } => {
                trace!("change event during extraction; noting one follow-up");
                *rerun = true;
            }
        }
    }

    /// True while an extraction pass is executing.
    pub fn is_running(&self) -> bool {
        matches!(*self.inner.state.lock(), DebounceState::Running { .. })
    }

    /// True when nothing is scheduled or running.
    pub fn is_idle(&self) -> bool {
        *self.inner.state.lock() == DebounceState::Idle
    }

    /// Wait for scheduled and in-flight work to finish.
    ///
    /// Returns `true` if the machine reached idle within `max_wait`,
    /// `false` if work was still in flight when the deadline passed.
    pub async fn drain(&self, max_wait: Duration) -> bool {
        let start = tokio::time::Instant::now();
        while !self.is_idle() {
            if start.elapsed() > max_wait {
                warn!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "drain timeout reached with extraction still in flight"
                );
                return false;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        true
    }
}

impl Inner {
    /// Pending → (quiet interval) → Running → Idle, with one re-entry into
    /// Pending when changes arrived mid-run.
    fn schedule(inner: Arc<Inner>) {
        tokio::spawn(async move {
            tokio::time::sleep(inner.quiet_interval).await;

            *inner.state.lock() = DebounceState::Running { rerun: false };
            debug!("quiet interval elapsed; starting extraction pass");

            let run = inner.clone();
            if let Err(e) = task::spawn_blocking(move || (run.job)()).await {
                warn!(error = %e, "extraction task panicked");
            }

            let rerun = {
                let mut state = inner.state.lock();
                let rerun = matches!(*state, DebounceState::Running { rerun: true });
                *state = if rerun {
                    DebounceState::Pending
                } else {
                    DebounceState::Idle
                };
                rerun
            };

            if rerun {
                debug!("changes arrived mid-pass; scheduling follow-up extraction");
                Inner::schedule(inner);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_debouncer(quiet: Duration) -> (Debouncer, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let debouncer = Debouncer::new(quiet, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (debouncer, runs)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_burst_coalesces_to_one_pass() {
        let (debouncer, runs) = counting_debouncer(Duration::from_millis(50));

        for _ in 0..10 {
            debouncer.poke();
        }

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(debouncer.is_idle());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_no_events_no_passes() {
        let (debouncer, runs) = counting_debouncer(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_idle());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_event_mid_pass_triggers_exactly_one_follow_up() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let debouncer = Debouncer::new(Duration::from_millis(30), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(200));
        });

        debouncer.poke();
        // Land inside the first pass, then poke several times; they must
        // collapse into a single follow-up.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(debouncer.is_running());
        debouncer.poke();
        debouncer.poke();
        debouncer.poke();

        tokio::time::sleep(Duration::from_millis(800)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(debouncer.is_idle());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_separate_bursts_run_separately() {
        let (debouncer, runs) = counting_debouncer(Duration::from_millis(30));

        debouncer.poke();
        tokio::time::sleep(Duration::from_millis(200)).await;
        debouncer.poke();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drain_waits_for_in_flight_pass() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let debouncer = Debouncer::new(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(150));
        });

        debouncer.poke();
        assert!(debouncer.drain(Duration::from_secs(5)).await);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_drain_times_out_on_stuck_pass() {
        let debouncer = Debouncer::new(Duration::from_millis(10), move || {
            std::thread::sleep(Duration::from_millis(600));
        });

        debouncer.poke();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!debouncer.drain(Duration::from_millis(100)).await);
    }
}
