//! Timers driving auto-release and the reclaim sweep.
//!
//! Timers run on the tokio clock, so pausing and advancing time with
//! `tokio::time` drives them deterministically in tests.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Run `task` against `target` once `deadline` is reached.
///
/// The deadline is fixed by the caller, so the time the spawned task
/// takes to get polled does not stretch the delay. The timer holds only
/// a weak reference; if the target is gone at the deadline the task is
/// skipped.
pub(crate) fn run_at<T, F>(deadline: Instant, target: Weak<T>, task: F) -> JoinHandle<()>
where
    T: Send + Sync + 'static,
    F: FnOnce(Arc<T>) + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep_until(deadline).await;
        if let Some(target) = target.upgrade() {
            task(target);
        }
    })
}

/// Tracks the single outstanding reclaim sweep of a limiter.
#[derive(Debug, Default)]
pub(crate) struct SweepSchedule {
    armed: bool,
}

impl SweepSchedule {
    /// Arm the schedule. Returns `false` if a sweep is already outstanding.
    pub(crate) fn arm(&mut self) -> bool {
        if self.armed {
            return false;
        }
        self.armed = true;
        true
    }

    pub(crate) fn disarm(&mut self) {
        self.armed = false;
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self) -> bool {
        self.armed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_sweep_schedule_arms_once() {
        let mut schedule = SweepSchedule::default();

        assert!(schedule.arm());
        assert!(!schedule.arm());
        assert!(schedule.is_armed());

        schedule.disarm();
        assert!(!schedule.is_armed());
        assert!(schedule.arm());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_at_fires_at_deadline() {
        let counter = Arc::new(AtomicUsize::new(0));
        let deadline = Instant::now() + Duration::from_millis(100);
        let handle = run_at(deadline, Arc::downgrade(&counter), |c| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::advance(Duration::from_millis(99)).await;
        tokio::task::yield_now().await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(1)).await;
        handle.await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    // The timer task is first polled after the clock has already moved,
    // and must still fire on the deadline taken when it was scheduled.
    #[tokio::test(start_paused = true)]
    async fn test_run_at_counts_from_scheduling_not_first_poll() {
        let counter = Arc::new(AtomicUsize::new(0));
        let deadline = Instant::now() + Duration::from_millis(100);
        let _handle = run_at(deadline, Arc::downgrade(&counter), |c| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::advance(Duration::from_millis(100)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_at_skips_dropped_target() {
        let counter = Arc::new(AtomicUsize::new(0));
        let fired = Arc::new(AtomicUsize::new(0));
        let observed = fired.clone();
        let deadline = Instant::now() + Duration::from_millis(10);
        let handle = run_at(deadline, Arc::downgrade(&counter), move |_| {
            observed.fetch_add(1, Ordering::SeqCst);
        });
        drop(counter);

        tokio::time::advance(Duration::from_millis(10)).await;
        handle.await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
