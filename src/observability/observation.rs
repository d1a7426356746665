//! Observations around units of work.
//!
//! An observation is one measurement window: it starts before the work is
//! invoked and stops exactly once, with the outcome of the work. For
//! asynchronous work the stop is tied to the completion of the returned
//! future, not to the return of the call that produced it, so the recorded
//! duration covers the work itself rather than its scheduling.
//!
//! Recording goes through the [`ObservationRegistry`] port. The default
//! [`MetricsRegistry`] forwards to the `metrics` facade.
//!
//! ```rust,ignore
//! let observer = Observer::metrics();
//!
//! // Synchronous: start -> compute -> stop
//! let network = observer.observe("conversion.import.processing", "JSON", || import(&path))?;
//!
//! // Asynchronous: stop when the handle resolves
//! let pending = observer.observe_async("conversion.import.total", "JSON", || {
//!     runner.supply_async(move || import(&path))
//! })?;
//! let network = pending.await?;
//! ```

use crate::models::Direction;
use crate::observability::current_request_id;
use crate::{Error, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::{Duration, Instant};
use tracing::Instrument;

/// How an observed unit of work ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The work returned `Ok`.
    Success,
    /// The work returned an error.
    Failure {
        /// Stable error code.
        code: &'static str,
        /// Error message.
        message: String,
    },
    /// The observed future was dropped before it completed.
    Abandoned,
}

impl Outcome {
    /// Builds the failure outcome for an error.
    #[must_use]
    pub fn failure(error: &Error) -> Self {
        Self::Failure {
            code: error.code(),
            message: error.to_string(),
        }
    }

    /// Returns the tag value used in metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure { .. } => "error",
            Self::Abandoned => "abandoned",
        }
    }

    /// Returns whether the work succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Identity of one observation.
#[derive(Debug, Clone)]
pub struct ObservationInfo {
    /// Observation name, e.g. `conversion.export.total`.
    pub name: &'static str,
    /// Format tag.
    pub format: String,
    /// Request ID of the caller that started the observation.
    pub request_id: Option<String>,
}

/// Sink for observation data.
///
/// Implementations must be cheap; they run on the worker and on the
/// completing task.
pub trait ObservationRegistry: Send + Sync {
    /// Called when an observation starts.
    fn started(&self, _observation: &ObservationInfo) {}

    /// Called exactly once when an observation stops.
    ///
    /// # Errors
    ///
    /// A returned error never prevents the stop and never replaces the
    /// observed work's own error.
    fn stopped(
        &self,
        observation: &ObservationInfo,
        elapsed: Duration,
        outcome: &Outcome,
    ) -> Result<()>;

    /// Records the number of entities a successful conversion processed.
    ///
    /// # Errors
    ///
    /// Errors are logged by the caller.
    fn entity_count(&self, direction: Direction, format: &str, count: usize) -> Result<()>;

    /// Counts one finished request.
    ///
    /// # Errors
    ///
    /// Errors are logged by the caller.
    fn request_completed(&self, direction: Direction, format: &str, outcome: &Outcome)
    -> Result<()>;
}

/// Registry backed by the global `metrics` recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsRegistry;

impl ObservationRegistry for MetricsRegistry {
    fn stopped(
        &self,
        observation: &ObservationInfo,
        elapsed: Duration,
        outcome: &Outcome,
    ) -> Result<()> {
        metrics::histogram!(
            observation.name,
            "format" => observation.format.clone(),
            "outcome" => outcome.as_str()
        )
        .record(elapsed.as_secs_f64());
        Ok(())
    }

    #[allow(clippy::cast_precision_loss)]
    fn entity_count(&self, direction: Direction, format: &str, count: usize) -> Result<()> {
        metrics::histogram!(
            direction.entity_count_metric(),
            "format" => format.to_string(),
            "direction" => direction.as_str()
        )
        .record(count as f64);
        Ok(())
    }

    fn request_completed(
        &self,
        direction: Direction,
        format: &str,
        outcome: &Outcome,
    ) -> Result<()> {
        metrics::counter!(
            direction.request_metric(),
            "format" => format.to_string(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        Ok(())
    }
}

/// Results that carry a processed-entity count.
pub trait EntityCount {
    /// Number of processed entities, `None` when there is nothing to record.
    fn entity_count(&self) -> Option<usize>;
}

/// One running measurement window. Stops itself when dropped unstopped.
struct Observation {
    info: ObservationInfo,
    registry: Arc<dyn ObservationRegistry>,
    started_at: Instant,
    span: tracing::Span,
    stopped: bool,
}

impl Observation {
    fn start(registry: Arc<dyn ObservationRegistry>, name: &'static str, format: &str) -> Self {
        let info = ObservationInfo {
            name,
            format: format.to_string(),
            request_id: current_request_id(),
        };
        let span = tracing::debug_span!(
            "observation",
            name = name,
            format = %format,
            request_id = info.request_id.as_deref().unwrap_or("-")
        );
        registry.started(&info);
        Self {
            info,
            registry,
            started_at: Instant::now(),
            span,
            stopped: false,
        }
    }

    /// Stops the window; returns the registry failure, if any.
    fn stop(&mut self, outcome: &Outcome) -> Option<Error> {
        if self.stopped {
            return None;
        }
        self.stopped = true;
        let elapsed = self.started_at.elapsed();

        tracing::debug!(
            parent: &self.span,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            outcome = outcome.as_str(),
            "Observation stopped"
        );

        self.registry
            .stopped(&self.info, elapsed, outcome)
            .err()
            .map(|e| Error::Instrumentation {
                observation: self.info.name.to_string(),
                cause: e.to_string(),
            })
    }

    /// Stops with a failure and returns the error to propagate.
    fn fail(mut self, error: Error) -> Error {
        match self.stop(&Outcome::failure(&error)) {
            Some(instrumentation) => error.with_suppressed(instrumentation),
            None => error,
        }
    }

    /// Stops with the result's outcome and hands the result back.
    fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                if let Some(instrumentation) = self.stop(&Outcome::Success) {
                    tracing::warn!(
                        observation = self.info.name,
                        error = %instrumentation,
                        "Observation registry failed"
                    );
                }
                Ok(value)
            },
            Err(error) => Err(self.fail(error)),
        }
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        if self.stopped {
            return;
        }
        if let Some(instrumentation) = self.stop(&Outcome::Abandoned) {
            tracing::warn!(
                observation = self.info.name,
                error = %instrumentation,
                "Observation registry failed"
            );
        }
    }
}

/// Future returned by [`Observer::observe_async`].
///
/// Resolves to the wrapped future's result; the observation stops at that
/// point. Dropping it early stops the observation as abandoned.
#[must_use = "the observation only stops when the future completes or is dropped"]
pub struct ObservedFuture<T> {
    inner: Pin<Box<dyn Future<Output = Result<T>> + Send>>,
    observation: Option<Observation>,
}

impl<T> Future for ObservedFuture<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let result = ready!(this.inner.as_mut().poll(cx));
        Poll::Ready(match this.observation.take() {
            Some(observation) => observation.finish(result),
            None => result,
        })
    }
}

/// Entry point for observing work.
#[derive(Clone)]
pub struct Observer {
    registry: Arc<dyn ObservationRegistry>,
}

impl Observer {
    /// Creates an observer recording into the given registry.
    #[must_use]
    pub fn new(registry: Arc<dyn ObservationRegistry>) -> Self {
        Self { registry }
    }

    /// Creates an observer recording into the `metrics` facade.
    #[must_use]
    pub fn metrics() -> Self {
        Self::new(Arc::new(MetricsRegistry))
    }

    /// Observes a synchronous computation.
    ///
    /// # Errors
    ///
    /// Returns the computation's error, with any registry failure attached
    /// as suppressed detail.
    pub fn observe<T, F>(&self, name: &'static str, format: &str, op: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let observation = Observation::start(Arc::clone(&self.registry), name, format);
        let result = observation.span.in_scope(op);
        observation.finish(result)
    }

    /// Observes a computation that hands back a pending result.
    ///
    /// `op` runs immediately inside the observation's span. If it fails, the
    /// observation is stopped before the error is returned. Otherwise the
    /// returned [`ObservedFuture`] stops the observation when the pending
    /// result completes.
    ///
    /// # Errors
    ///
    /// Returns the error `op` failed with.
    pub fn observe_async<T, F, Fut>(
        &self,
        name: &'static str,
        format: &str,
        op: F,
    ) -> Result<ObservedFuture<T>>
    where
        T: 'static,
        F: FnOnce() -> Result<Fut>,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let observation = Observation::start(Arc::clone(&self.registry), name, format);
        let pending = {
            let _scope = observation.span.enter();
            op()
        };

        match pending {
            Ok(future) => {
                let span = observation.span.clone();
                Ok(ObservedFuture {
                    inner: Box::pin(future.instrument(span)),
                    observation: Some(observation),
                })
            },
            Err(error) => Err(observation.fail(error)),
        }
    }

    /// Records the entity count carried by a successful result.
    ///
    /// Results without a count are skipped.
    pub fn record_entity_count<R: EntityCount>(&self, direction: Direction, format: &str, result: &R) {
        let Some(count) = result.entity_count() else {
            tracing::debug!(direction = %direction, format = %format, "No entity count to record");
            return;
        };
        if let Err(e) = self.registry.entity_count(direction, format, count) {
            tracing::warn!(direction = %direction, format = %format, error = %e, "Failed to record entity count");
        }
    }

    /// Counts one finished request.
    pub fn record_request(&self, direction: Direction, format: &str, outcome: &Outcome) {
        if let Err(e) = self.registry.request_completed(direction, format, outcome) {
            tracing::warn!(direction = %direction, format = %format, error = %e, "Failed to count request");
        }
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Debug, Clone)]
    struct Stop {
        name: &'static str,
        elapsed: Duration,
        outcome: Outcome,
    }

    #[derive(Default)]
    struct RecordingRegistry {
        started: Mutex<Vec<&'static str>>,
        stops: Mutex<Vec<Stop>>,
        counts: Mutex<Vec<usize>>,
        fail: AtomicBool,
    }

    impl RecordingRegistry {
        fn failing() -> Self {
            let registry = Self::default();
            registry.fail.store(true, Ordering::SeqCst);
            registry
        }

        fn stops(&self) -> Vec<Stop> {
            self.stops.lock().unwrap().clone()
        }
    }

    impl ObservationRegistry for RecordingRegistry {
        fn started(&self, observation: &ObservationInfo) {
            self.started.lock().unwrap().push(observation.name);
        }

        fn stopped(
            &self,
            observation: &ObservationInfo,
            elapsed: Duration,
            outcome: &Outcome,
        ) -> Result<()> {
            self.stops.lock().unwrap().push(Stop {
                name: observation.name,
                elapsed,
                outcome: outcome.clone(),
            });
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::OperationFailed {
                    operation: "record".to_string(),
                    cause: "recorder offline".to_string(),
                });
            }
            Ok(())
        }

        fn entity_count(&self, _direction: Direction, _format: &str, count: usize) -> Result<()> {
            self.counts.lock().unwrap().push(count);
            Ok(())
        }

        fn request_completed(
            &self,
            _direction: Direction,
            _format: &str,
            _outcome: &Outcome,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn observer(registry: &Arc<RecordingRegistry>) -> Observer {
        Observer::new(Arc::clone(registry) as Arc<dyn ObservationRegistry>)
    }

    #[test]
    fn test_observe_success_stops_once() {
        let registry = Arc::new(RecordingRegistry::default());
        let value = observer(&registry)
            .observe("work", "JSON", || Ok(7))
            .unwrap();

        assert_eq!(value, 7);
        let stops = registry.stops();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].name, "work");
        assert_eq!(stops[0].outcome, Outcome::Success);
        assert_eq!(*registry.started.lock().unwrap(), vec!["work"]);
    }

    #[test]
    fn test_observe_failure_records_error() {
        let registry = Arc::new(RecordingRegistry::default());
        let err = observer(&registry)
            .observe::<(), _>("work", "JSON", || Err(Error::NotFound("n1".to_string())))
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        let stops = registry.stops();
        assert_eq!(stops.len(), 1);
        assert!(matches!(
            stops[0].outcome,
            Outcome::Failure { code: "NOT_FOUND", .. }
        ));
    }

    #[test]
    fn test_observe_async_synchronous_failure_stops_before_return() {
        let registry = Arc::new(RecordingRegistry::default());
        let result = observer(&registry).observe_async::<(), _, std::future::Ready<Result<()>>>(
            "work",
            "JSON",
            || Err(Error::ShuttingDown("runner".to_string())),
        );

        assert!(matches!(result, Err(Error::ShuttingDown(_))));
        let stops = registry.stops();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].outcome.as_str(), "error");
    }

    #[tokio::test]
    async fn test_observe_async_stop_waits_for_completion() {
        let registry = Arc::new(RecordingRegistry::default());
        let pending = observer(&registry)
            .observe_async("work", "JSON", || {
                Ok(async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(42)
                })
            })
            .unwrap();

        assert!(registry.stops().is_empty());

        let value = pending.await.unwrap();
        assert_eq!(value, 42);
        let stops = registry.stops();
        assert_eq!(stops.len(), 1);
        assert!(stops[0].elapsed >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_observe_async_async_failure_recorded() {
        let registry = Arc::new(RecordingRegistry::default());
        let pending = observer(&registry)
            .observe_async::<(), _, _>("work", "JSON", || {
                Ok(async { Err(Error::QueueSaturated("timeout".to_string())) })
            })
            .unwrap();

        let err = pending.await.unwrap_err();
        assert!(matches!(err, Error::QueueSaturated(_)));
        assert!(matches!(
            registry.stops()[0].outcome,
            Outcome::Failure { code: "QUEUE_SATURATED", .. }
        ));
    }

    #[tokio::test]
    async fn test_dropped_future_stops_as_abandoned() {
        let registry = Arc::new(RecordingRegistry::default());
        let pending = observer(&registry)
            .observe_async("work", "JSON", || Ok(std::future::pending::<Result<()>>()))
            .unwrap();
        drop(pending);

        let stops = registry.stops();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].outcome, Outcome::Abandoned);
    }

    #[test]
    fn test_registry_failure_is_suppressed_onto_primary() {
        let registry = Arc::new(RecordingRegistry::failing());
        let err = observer(&registry)
            .observe::<(), _>("work", "JSON", || Err(Error::NotFound("n1".to_string())))
            .unwrap_err();

        assert!(matches!(err.primary(), Error::NotFound(_)));
        assert!(matches!(
            err.suppressed(),
            Some(Error::Instrumentation { .. })
        ));
        assert_eq!(registry.stops().len(), 1);
    }

    #[tokio::test]
    async fn test_async_registry_failure_is_suppressed_onto_primary() {
        let registry = Arc::new(RecordingRegistry::failing());
        let pending = observer(&registry)
            .observe_async::<(), _, _>("work", "JSON", || {
                Ok(async {
                    tokio::task::yield_now().await;
                    Err(Error::NotFound("n1".to_string()))
                })
            })
            .unwrap();
        assert!(registry.stops().is_empty());

        let err = pending.await.unwrap_err();
        assert!(matches!(err.primary(), Error::NotFound(_)));
        assert!(matches!(
            err.suppressed(),
            Some(Error::Instrumentation { observation, .. }) if observation == "work"
        ));
        let stops = registry.stops();
        assert_eq!(stops.len(), 1);
        assert!(matches!(
            stops[0].outcome,
            Outcome::Failure { code: "NOT_FOUND", .. }
        ));
    }

    #[test]
    fn test_registry_failure_never_fails_successful_work() {
        let registry = Arc::new(RecordingRegistry::failing());
        let value = observer(&registry).observe("work", "JSON", || Ok("done"));
        assert_eq!(value.unwrap(), "done");
        assert_eq!(registry.stops().len(), 1);
    }

    #[test]
    fn test_entity_count_skipped_without_count() {
        struct Counted(Option<usize>);
        impl EntityCount for Counted {
            fn entity_count(&self) -> Option<usize> {
                self.0
            }
        }

        let registry = Arc::new(RecordingRegistry::default());
        let observer = observer(&registry);
        observer.record_entity_count(Direction::Import, "JSON", &Counted(None));
        observer.record_entity_count(Direction::Import, "JSON", &Counted(Some(12)));

        assert_eq!(*registry.counts.lock().unwrap(), vec![12]);
    }

    #[test]
    fn test_nested_windows_total_not_shorter_than_processing() {
        let registry = Arc::new(RecordingRegistry::default());
        let observer = observer(&registry);
        observer
            .observe("total", "JSON", || {
                observer.observe("processing", "JSON", || {
                    std::thread::sleep(Duration::from_millis(20));
                    Ok(())
                })
            })
            .unwrap();

        let stops = registry.stops();
        assert_eq!(stops[0].name, "processing");
        assert_eq!(stops[1].name, "total");
        assert!(stops[1].elapsed >= stops[0].elapsed);
    }
}
