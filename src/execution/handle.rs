//! Task handles and in-flight tracking shared by both pools.

use crate::{Error, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};

/// Pending result of a submitted unit of work.
///
/// The work runs whether or not the handle is polled; dropping the handle
/// detaches it.
#[derive(Debug)]
pub struct TaskHandle<T> {
    inner: JoinHandle<Result<T>>,
    label: &'static str,
}

impl<T> TaskHandle<T> {
    pub(crate) const fn new(inner: JoinHandle<Result<T>>, label: &'static str) -> Self {
        Self { inner, label }
    }

    /// Returns whether the work has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let label = this.label;
        Pin::new(&mut this.inner)
            .poll(cx)
            .map(|joined| joined.unwrap_or_else(|e| Err(join_error(label, &e))))
    }
}

pub(crate) fn join_error(label: &'static str, error: &JoinError) -> Error {
    let cause = if error.is_panic() {
        "worker panicked".to_string()
    } else {
        error.to_string()
    };
    Error::TaskFailed {
        task: label.to_string(),
        cause,
    }
}

/// Counts submitted-but-unfinished work so shutdown can wait for it.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub(crate) fn enter(self: &Arc<Self>) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            tracker: Arc::clone(self),
        }
    }

    /// Registers work unless `accepting` has been cleared.
    ///
    /// The unit is counted before the flag is read, so a concurrent shutdown
    /// either waits for it or it sees the flag cleared.
    pub(crate) fn admit(
        self: &Arc<Self>,
        accepting: &AtomicBool,
        pool: &str,
    ) -> Result<InFlightGuard> {
        let guard = self.enter();
        if accepting.load(Ordering::SeqCst) {
            Ok(guard)
        } else {
            Err(Error::ShuttingDown(pool.to_string()))
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Resolves once no work is in flight.
    pub(crate) async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

pub(crate) struct InFlightGuard {
    tracker: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.tracker.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_admit_refused_once_closed_leaves_no_count() {
        let tracker = Arc::new(InFlight::default());
        let accepting = AtomicBool::new(true);
        let admitted = tracker.admit(&accepting, "pool").unwrap();
        assert_eq!(tracker.count(), 1);

        accepting.store(false, Ordering::SeqCst);
        assert!(matches!(
            tracker.admit(&accepting, "pool"),
            Err(Error::ShuttingDown(_))
        ));
        assert_eq!(tracker.count(), 1);
        drop(admitted);
        assert_eq!(tracker.count(), 0);
    }

    #[tokio::test]
    async fn test_wait_idle_returns_after_last_guard() {
        let tracker = Arc::new(InFlight::default());
        let guard = tracker.enter();
        let second = tracker.enter();
        assert_eq!(tracker.count(), 2);

        let waiter = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move { tracker.wait_idle().await })
        };

        drop(guard);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(second);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("idle")
            .unwrap();
    }

    #[tokio::test]
    async fn test_task_handle_maps_panic() {
        let handle: TaskHandle<()> = TaskHandle::new(
            tokio::spawn(async {
                let poisoned = true;
                assert!(!poisoned, "boom");
                Ok(())
            }),
            "worker",
        );
        let err = handle.await.unwrap_err();
        assert!(matches!(err, Error::TaskFailed { ref task, .. } if task == "worker"));
    }
}
