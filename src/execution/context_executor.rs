//! Unbounded executor that carries the submitter's context onto the worker.
//!
//! Used for redispatch: scheduling orchestration off the request path.
//! Heavy work belongs on [`super::BoundedTaskRunner`].

use super::handle::{InFlight, InFlightGuard, TaskHandle};
use crate::observability::{RequestContext, enter_request_context, scope_request_context};
use crate::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Handle;
use tracing::Instrument;

/// Context-propagating executor over the tokio runtime.
///
/// At submission the caller's [`RequestContext`] and current tracing span
/// are captured; the worker runs inside both and drops them when the work
/// ends, however it ends.
#[derive(Debug, Clone)]
pub struct ContextExecutor {
    runtime: Handle,
    accepting: Arc<AtomicBool>,
    in_flight: Arc<InFlight>,
}

impl ContextExecutor {
    /// Creates an executor spawning onto the given runtime.
    #[must_use]
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            accepting: Arc::new(AtomicBool::new(true)),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Creates an executor on the runtime of the calling thread.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a tokio runtime.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| Error::OperationFailed {
                operation: "context_executor_init".to_string(),
                cause: e.to_string(),
            })
    }

    /// Submits async work.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once [`Self::shutdown`] was called.
    pub fn submit<F, T>(&self, work: F) -> Result<TaskHandle<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.admit()?;
        let context = RequestContext::capture();
        let span = tracing::Span::current();

        let task = async move {
            let _guard = guard;
            match context {
                Some(context) => scope_request_context(context, work).await,
                None => work.await,
            }
        }
        .instrument(span);

        Ok(TaskHandle::new(self.runtime.spawn(task), "context_executor"))
    }

    /// Submits blocking work to the runtime's blocking pool.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once [`Self::shutdown`] was called.
    pub fn submit_blocking<F, T>(&self, work: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = self.admit()?;
        let context = RequestContext::capture();
        let span = tracing::Span::current();

        let task = self.runtime.spawn_blocking(move || {
            let _guard = guard;
            let _context = context.map(enter_request_context);
            span.in_scope(work)
        });

        Ok(TaskHandle::new(task, "context_executor"))
    }

    /// Number of submitted units that have not finished.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.count()
    }

    /// Stops accepting work and waits for in-flight work to finish.
    pub async fn shutdown(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            tracing::info!(in_flight = self.in_flight(), "Context executor draining");
        }
        self.in_flight.wait_idle().await;
        tracing::debug!("Context executor drained");
    }

    fn admit(&self) -> Result<InFlightGuard> {
        self.in_flight.admit(&self.accepting, "context executor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::current_request_id;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_submit_propagates_request_context() {
        let executor = ContextExecutor::current().unwrap();
        let handle = scope_request_context(RequestContext::from_id("req-42"), async {
            executor
                .submit(async { Ok(current_request_id()) })
                .unwrap()
        })
        .await;

        assert_eq!(handle.await.unwrap().as_deref(), Some("req-42"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_submit_blocking_propagates_and_tears_down() {
        let executor = ContextExecutor::current().unwrap();
        let guard = enter_request_context(RequestContext::from_id("req-7"));

        let observed = executor
            .submit_blocking(|| Ok((current_request_id(), std::thread::current().id())))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(observed.0.as_deref(), Some("req-7"));
        assert_ne!(observed.1, std::thread::current().id());

        // a reused blocking thread must not keep the previous context
        drop(guard);
        let leaked = executor
            .submit_blocking(|| Ok(current_request_id()))
            .unwrap()
            .await
            .unwrap();
        assert!(leaked.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_rejects() {
        let executor = ContextExecutor::current().unwrap();
        let handle = executor
            .submit(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(1)
            })
            .unwrap();

        executor.shutdown().await;
        assert_eq!(executor.in_flight(), 0);
        assert_eq!(handle.await.unwrap(), 1);

        let err = executor.submit(async { Ok(()) }).unwrap_err();
        assert!(matches!(err, Error::ShuttingDown(_)));
    }

    #[tokio::test]
    async fn test_failure_is_returned_through_handle() {
        let executor = ContextExecutor::current().unwrap();
        let err = executor
            .submit::<_, ()>(async { Err(Error::NotFound("n1".to_string())) })
            .unwrap()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
