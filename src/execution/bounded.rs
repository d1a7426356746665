//! Bounded runner for heavy import/export jobs.
//!
//! Limits how many jobs run at once so that process memory stays bounded.
//! Uses the semaphore approach of a bulkhead, except that by default work
//! beyond the ceiling waits in an unbounded FIFO queue instead of being
//! rejected:
//!
//! - **Submission never blocks**: `supply_async` returns a handle at once
//! - **Ceiling**: at most `max_concurrent` suppliers run on blocking threads
//! - **Queue**: optional bound (`max_pending`) and wait limit (`queue_timeout_ms`)
//!
//! # Usage
//!
//! ```rust,ignore
//! use netconv::execution::BoundedTaskRunner;
//! use netconv::config::TaskPoolConfig;
//!
//! let runner = BoundedTaskRunner::current(TaskPoolConfig::new().with_max_concurrent(2))?;
//! let handle = runner.supply_async(move || import(&path))?;
//! let network = handle.await?;
//! ```

use super::handle::{InFlight, TaskHandle, join_error};
use crate::config::TaskPoolConfig;
use crate::observability::{RequestContext, enter_request_context};
use crate::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::task::{Context, Poll, Waker};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

const ACTIVE_GAUGE: &str = "conversion.tasks.pool.current";
const PENDING_GAUGE: &str = "conversion.tasks.pool.pending";

/// Capacity-bounded task runner.
#[derive(Debug, Clone)]
pub struct BoundedTaskRunner {
    runtime: Handle,
    state: Arc<RunnerState>,
}

#[derive(Debug)]
struct RunnerState {
    config: TaskPoolConfig,
    semaphore: Arc<Semaphore>,
    active: AtomicUsize,
    pending: AtomicUsize,
    accepting: AtomicBool,
    in_flight: Arc<InFlight>,
}

impl RunnerState {
    #[allow(clippy::cast_precision_loss)]
    fn publish_gauges(&self) {
        metrics::gauge!(ACTIVE_GAUGE).set(self.active.load(Ordering::SeqCst) as f64);
        metrics::gauge!(PENDING_GAUGE).set(self.pending.load(Ordering::SeqCst) as f64);
    }

    const fn counter(&self, counter: Counter) -> &AtomicUsize {
        match counter {
            Counter::Active => &self.active,
            Counter::Pending => &self.pending,
        }
    }

    /// Takes a queue slot, failing when `max_pending` jobs already wait.
    fn reserve_pending(self: &Arc<Self>) -> Result<CountGuard> {
        let max_pending = self.config.max_pending;
        self.pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |waiting| {
                (max_pending == 0 || waiting < max_pending).then_some(waiting + 1)
            })
            .map_err(|_| {
                metrics::counter!("conversion.tasks.rejected", "reason" => "full").increment(1);
                Error::QueueSaturated(format!("{max_pending} jobs already waiting"))
            })?;
        self.publish_gauges();
        Ok(CountGuard {
            state: Arc::clone(self),
            counter: Counter::Pending,
        })
    }

    /// Waits for a queued permit, honouring the queue timeout.
    async fn wait_for_permit<F>(&self, acquire: F) -> Result<OwnedSemaphorePermit>
    where
        F: Future<Output = std::result::Result<OwnedSemaphorePermit, AcquireError>>,
    {
        let acquired = if self.config.queue_timeout_ms == 0 {
            acquire.await
        } else {
            let timeout = Duration::from_millis(self.config.queue_timeout_ms);
            tokio::time::timeout(timeout, acquire).await.map_err(|_| {
                metrics::counter!("conversion.tasks.rejected", "reason" => "timeout").increment(1);
                Error::QueueSaturated(format!(
                    "waited {}ms for one of {} workers",
                    self.config.queue_timeout_ms, self.config.max_concurrent
                ))
            })?
        };

        acquired.map_err(closed)
    }
}

fn closed(_: AcquireError) -> Error {
    Error::ShuttingDown("bounded task runner".to_string())
}

#[derive(Debug, Clone, Copy)]
enum Counter {
    Active,
    Pending,
}

/// Holds one unit of a counter; releases it and republishes the gauges on drop.
struct CountGuard {
    state: Arc<RunnerState>,
    counter: Counter,
}

impl CountGuard {
    fn enter(state: &Arc<RunnerState>, counter: Counter) -> Self {
        state.counter(counter).fetch_add(1, Ordering::SeqCst);
        state.publish_gauges();
        Self {
            state: Arc::clone(state),
            counter,
        }
    }
}

impl Drop for CountGuard {
    fn drop(&mut self) {
        self.state.counter(self.counter).fetch_sub(1, Ordering::SeqCst);
        self.state.publish_gauges();
    }
}

impl BoundedTaskRunner {
    /// Creates a runner spawning onto the given runtime.
    #[must_use]
    pub fn new(runtime: Handle, config: TaskPoolConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        tracing::info!(
            max_concurrent = config.max_concurrent.max(1),
            max_pending = config.max_pending,
            queue_timeout_ms = config.queue_timeout_ms,
            "Bounded task runner created"
        );
        Self {
            runtime,
            state: Arc::new(RunnerState {
                config,
                semaphore,
                active: AtomicUsize::new(0),
                pending: AtomicUsize::new(0),
                accepting: AtomicBool::new(true),
                in_flight: Arc::new(InFlight::default()),
            }),
        }
    }

    /// Creates a runner on the runtime of the calling thread.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a tokio runtime.
    pub fn current(config: TaskPoolConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| Error::OperationFailed {
            operation: "bounded_runner_init".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self::new(runtime, config))
    }

    /// Schedules a blocking supplier.
    ///
    /// Returns immediately. The supplier runs on a blocking thread once a
    /// worker slot frees up, inside the submitter's request context and span.
    /// Queued suppliers start in submission order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] after [`Self::shutdown`], and
    /// [`Error::QueueSaturated`] when a queue bound is configured and reached.
    pub fn supply_async<F, T>(&self, supplier: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = &self.state;
        let in_flight = state.in_flight.admit(&state.accepting, "bounded task runner")?;
        let queued = state.reserve_pending()?;

        // Polling once here joins the semaphore's FIFO wait list before the
        // caller can submit again.
        let mut acquire = Box::pin(Arc::clone(&state.semaphore).acquire_owned());
        let (granted, queued) = match acquire
            .as_mut()
            .poll(&mut Context::from_waker(Waker::noop()))
        {
            Poll::Ready(acquired) => {
                drop(queued);
                (Some(acquired.map_err(closed)?), None)
            },
            Poll::Pending => (None, Some(queued)),
        };

        let context = RequestContext::capture();
        let span = tracing::Span::current();
        let state = Arc::clone(state);
        let runtime = self.runtime.clone();

        let task = self.runtime.spawn(async move {
            let _in_flight = in_flight;

            let permit = match granted {
                Some(permit) => permit,
                None => {
                    let _queued = queued;
                    state.wait_for_permit(acquire).await?
                },
            };

            let running = CountGuard::enter(&state, Counter::Active);
            let joined = runtime
                .spawn_blocking(move || {
                    let _context = context.map(enter_request_context);
                    span.in_scope(supplier)
                })
                .await;
            drop(running);
            drop(permit);

            joined.unwrap_or_else(|e| Err(join_error("bounded_task_runner", &e)))
        });

        Ok(TaskHandle::new(task, "bounded_task_runner"))
    }

    /// Number of suppliers currently running.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.state.active.load(Ordering::SeqCst)
    }

    /// Number of submitted jobs waiting for a worker.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }

    /// Configured ceiling.
    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.state.config.max_concurrent.max(1)
    }

    /// Stops accepting jobs and waits until queued and running jobs finish.
    pub async fn shutdown(&self) {
        if self.state.accepting.swap(false, Ordering::SeqCst) {
            tracing::info!(
                active = self.active_count(),
                pending = self.pending_count(),
                "Bounded task runner draining"
            );
        }
        self.state.in_flight.wait_idle().await;
        self.state.semaphore.close();
        tracing::debug!("Bounded task runner drained");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::{current_request_id, scope_request_context};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_supplier_runs_with_submitter_context() {
        let runner = BoundedTaskRunner::current(TaskPoolConfig::new()).unwrap();
        let handle = scope_request_context(RequestContext::from_id("req-42"), async {
            runner.supply_async(|| Ok(current_request_id())).unwrap()
        })
        .await;

        assert_eq!(handle.await.unwrap().as_deref(), Some("req-42"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queue_bound_holds_for_back_to_back_burst() {
        let config = TaskPoolConfig::new()
            .with_max_concurrent(1)
            .with_max_pending(1);
        let runner = BoundedTaskRunner::current(config).unwrap();

        let (release, gate) = std::sync::mpsc::channel::<()>();
        let gate = Arc::new(std::sync::Mutex::new(gate));
        let results: Vec<_> = (0..5)
            .map(|_| {
                let gate = Arc::clone(&gate);
                runner.supply_async(move || {
                    let _ = gate.lock().unwrap().recv();
                    Ok(())
                })
            })
            .collect();

        assert_eq!(runner.pending_count(), 1);
        let (accepted, rejected): (Vec<_>, Vec<_>) =
            results.into_iter().partition(Result::is_ok);
        assert_eq!(accepted.len(), 2);
        assert_eq!(rejected.len(), 3);
        assert!(
            rejected
                .into_iter()
                .all(|r| matches!(r, Err(Error::QueueSaturated(_))))
        );

        release.send(()).unwrap();
        release.send(()).unwrap();
        for handle in accepted {
            handle.unwrap().await.unwrap();
        }
        assert_eq!(runner.pending_count(), 0);
        assert_eq!(runner.active_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_queued_jobs_start_in_submission_order() {
        let runner =
            BoundedTaskRunner::current(TaskPoolConfig::new().with_max_concurrent(1)).unwrap();
        let started = Arc::new(std::sync::Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let started = Arc::clone(&started);
                runner
                    .supply_async(move || {
                        started.lock().unwrap().push(i);
                        Ok(())
                    })
                    .unwrap()
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*started.lock().unwrap(), (0..16).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_submission_racing_shutdown_is_drained_or_refused() {
        let runner =
            BoundedTaskRunner::current(TaskPoolConfig::new().with_max_concurrent(2)).unwrap();
        let submitter = {
            let runner = runner.clone();
            tokio::task::spawn_blocking(move || {
                let mut accepted = Vec::new();
                loop {
                    match runner.supply_async(|| Ok(())) {
                        Ok(handle) => accepted.push(handle),
                        Err(Error::ShuttingDown(_)) => return accepted,
                        Err(e) => panic!("unexpected submission error: {e}"),
                    }
                }
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        runner.shutdown().await;
        let accepted = submitter.await.unwrap();

        for handle in accepted {
            handle.await.unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_queue_timeout_fails_waiting_job() {
        let config = TaskPoolConfig::new()
            .with_max_concurrent(1)
            .with_queue_timeout_ms(50);
        let runner = BoundedTaskRunner::current(config).unwrap();

        let blocker = runner
            .supply_async(|| {
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
            .unwrap();
        while runner.active_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let err = runner.supply_async(|| Ok(())).unwrap().await.unwrap_err();
        assert!(matches!(err, Error::QueueSaturated(_)));
        assert_eq!(runner.pending_count(), 0);
        blocker.await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_drains_queue_then_rejects() {
        let runner =
            BoundedTaskRunner::current(TaskPoolConfig::new().with_max_concurrent(1)).unwrap();
        let handles: Vec<_> = (0..3)
            .map(|i| {
                runner
                    .supply_async(move || {
                        std::thread::sleep(Duration::from_millis(20));
                        Ok(i)
                    })
                    .unwrap()
            })
            .collect();

        runner.shutdown().await;
        assert_eq!(runner.active_count(), 0);
        assert_eq!(runner.pending_count(), 0);
        assert!(matches!(
            runner.supply_async(|| Ok(())),
            Err(Error::ShuttingDown(_))
        ));

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert_eq!(results, vec![0, 1, 2]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_supplier_panic_reported_and_slot_released() {
        let runner =
            BoundedTaskRunner::current(TaskPoolConfig::new().with_max_concurrent(1)).unwrap();
        let err = runner
            .supply_async::<_, ()>(|| {
                let poisoned = true;
                assert!(!poisoned, "supplier failure");
                Ok(())
            })
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TaskFailed { .. }));

        assert_eq!(runner.supply_async(|| Ok(5)).unwrap().await.unwrap(), 5);
    }
}
