//! Conversion pipeline integration tests.
//!
//! Exercises the service end to end, focusing on:
//! - Ceiling enforcement of the bounded runner under load
//! - Request context isolation between concurrently running jobs
//! - Total vs processing observations, queueing included
//! - Entity count and request metrics
//! - Artifact shape for each output cardinality

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used)]

use netconv::config::{ConversionConfig, TaskPoolConfig};
use netconv::execution::BoundedTaskRunner;
use netconv::io::{DataSink, FormatCatalog, FormatParameters, NetworkExporter};
use netconv::models::Direction;
use netconv::observability::{
    ObservationInfo, ObservationRegistry, Outcome, RequestContext, current_request_id,
    scope_request_context,
};
use netconv::{CaseFile, ConversionService, Error, ExportRequest, Network, Result};
use std::io::{Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Test Helpers
// ============================================================================

const CASE: &str = r#"{
    "name": "grid",
    "components": [
        {"id": "L1", "kind": "line"},
        {"id": "L2", "kind": "line"},
        {"id": "B1", "kind": "bus"}
    ]
}"#;

#[derive(Debug, Clone)]
struct Stop {
    name: &'static str,
    format: String,
    elapsed: Duration,
    success: bool,
}

#[derive(Default)]
struct RecordingRegistry {
    stops: Mutex<Vec<Stop>>,
    counts: Mutex<Vec<(Direction, String, usize)>>,
    requests: Mutex<Vec<(Direction, &'static str)>>,
}

impl RecordingRegistry {
    fn stops_named(&self, name: &str) -> Vec<Stop> {
        self.stops
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect()
    }
}

impl ObservationRegistry for RecordingRegistry {
    fn stopped(
        &self,
        observation: &ObservationInfo,
        elapsed: Duration,
        outcome: &Outcome,
    ) -> Result<()> {
        self.stops.lock().unwrap().push(Stop {
            name: observation.name,
            format: observation.format.clone(),
            elapsed,
            success: outcome.is_success(),
        });
        Ok(())
    }

    fn entity_count(&self, direction: Direction, format: &str, count: usize) -> Result<()> {
        self.counts
            .lock()
            .unwrap()
            .push((direction, format.to_string(), count));
        Ok(())
    }

    fn request_completed(
        &self,
        direction: Direction,
        _format: &str,
        outcome: &Outcome,
    ) -> Result<()> {
        self.requests
            .lock()
            .unwrap()
            .push((direction, outcome.as_str()));
        Ok(())
    }
}

/// Exporter that takes a while and writes one file.
struct SlowExporter {
    delay: Duration,
}

impl NetworkExporter for SlowExporter {
    fn format(&self) -> &str {
        "SLOW"
    }

    fn export(&self, network: &Network, _: &FormatParameters, sink: &mut DataSink) -> Result<()> {
        std::thread::sleep(self.delay);
        sink.create("network.slow")?
            .write_all(network.name.as_bytes())
            .unwrap();
        Ok(())
    }
}

fn config(temp_dir: &TempDir, max_concurrent: usize) -> ConversionConfig {
    ConversionConfig::new()
        .with_artifact_dir(temp_dir.path().join("artifacts"))
        .with_scratch_dir(temp_dir.path().join("scratch"))
        .with_tasks(TaskPoolConfig::new().with_max_concurrent(max_concurrent))
}

fn recorded_service(
    temp_dir: &TempDir,
    max_concurrent: usize,
) -> (ConversionService, Arc<RecordingRegistry>) {
    let registry = Arc::new(RecordingRegistry::default());
    let catalog = FormatCatalog::with_builtin_formats().with_exporter(Arc::new(SlowExporter {
        delay: Duration::from_millis(300),
    }));
    let service = ConversionService::builder(&config(temp_dir, max_concurrent))
        .registry(Arc::clone(&registry) as Arc<dyn ObservationRegistry>)
        .catalog(catalog)
        .build()
        .unwrap();
    (service, registry)
}

// ============================================================================
// Bounded Runner
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_runner_never_exceeds_ceiling() {
    const CEILING: usize = 2;
    const JOBS: usize = 8;

    let runner =
        BoundedTaskRunner::current(TaskPoolConfig::new().with_max_concurrent(CEILING)).unwrap();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..JOBS)
        .map(|i| {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            runner
                .supply_async(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(40));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                })
                .unwrap()
        })
        .collect();

    // Submission returned immediately; the excess is queued, not refused.
    assert_eq!(runner.pending_count(), JOBS - CEILING);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(runner.active_count() <= CEILING);

    let mut finished = Vec::new();
    for handle in handles {
        finished.push(handle.await.unwrap());
    }

    assert_eq!(finished, (0..JOBS).collect::<Vec<_>>());
    assert!(peak.load(Ordering::SeqCst) <= CEILING);
    assert_eq!(runner.active_count(), 0);
    assert_eq!(runner.pending_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_context_isolated_between_concurrent_jobs() {
    let runner = BoundedTaskRunner::current(TaskPoolConfig::new().with_max_concurrent(2)).unwrap();
    // Both suppliers must be running at the same time to pass the barrier.
    let barrier = Arc::new(Barrier::new(2));

    let submit = |id: &'static str| {
        let barrier = Arc::clone(&barrier);
        let runner = runner.clone();
        scope_request_context(RequestContext::from_id(id), async move {
            runner
                .supply_async(move || {
                    let before = current_request_id();
                    barrier.wait();
                    let after = current_request_id();
                    Ok((before, after))
                })
                .unwrap()
        })
    };

    let first = submit("req-42").await;
    let second = submit("req-7").await;

    let (before, after) = first.await.unwrap();
    assert_eq!(before.as_deref(), Some("req-42"));
    assert_eq!(after.as_deref(), Some("req-42"));

    let (before, after) = second.await.unwrap();
    assert_eq!(before.as_deref(), Some("req-7"));
    assert_eq!(after.as_deref(), Some("req-7"));

    assert_eq!(current_request_id(), None);
}

// ============================================================================
// Observations
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_import_records_both_windows_and_entity_count() {
    let temp_dir = TempDir::new().unwrap();
    let (service, registry) = recorded_service(&temp_dir, 2);

    let outcome = service
        .import_case(CaseFile::new("grid.json", CASE), None, None)
        .await
        .unwrap();
    assert_eq!(outcome.entity_count, 3);

    let total = registry.stops_named("conversion.import.total");
    let processing = registry.stops_named("conversion.import.processing");
    assert_eq!(total.len(), 1);
    assert_eq!(processing.len(), 1);
    assert_eq!(total[0].format, "JSON");
    assert!(total[0].success && processing[0].success);
    assert!(total[0].elapsed >= processing[0].elapsed);

    assert_eq!(
        *registry.counts.lock().unwrap(),
        vec![(Direction::Import, "JSON".to_string(), 3)]
    );
    assert_eq!(
        *registry.requests.lock().unwrap(),
        vec![(Direction::Import, "success")]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_total_window_includes_queueing() {
    let temp_dir = TempDir::new().unwrap();
    let (service, registry) = recorded_service(&temp_dir, 1);
    let id = service
        .import_case(CaseFile::new("grid.json", CASE), None, None)
        .await
        .unwrap()
        .network_id;

    let first = service.export_network(ExportRequest::new(id.clone(), "SLOW", "first"));
    let second = service.export_network(ExportRequest::new(id, "SLOW", "second"));
    let (first, second) = tokio::join!(first, second);
    first.unwrap();
    second.unwrap();

    let totals = registry.stops_named("conversion.export.total");
    let processing = registry.stops_named("conversion.export.processing");
    assert_eq!(totals.len(), 2);
    assert_eq!(processing.len(), 2);

    // With one worker, one of the two exports waited a full processing run.
    let slowest_total = totals.iter().map(|s| s.elapsed).max().unwrap();
    let slowest_processing = processing.iter().map(|s| s.elapsed).max().unwrap();
    assert!(slowest_processing >= Duration::from_millis(300));
    assert!(slowest_total >= Duration::from_millis(600));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_export_records_failure_outcome() {
    let temp_dir = TempDir::new().unwrap();
    let (service, registry) = recorded_service(&temp_dir, 2);
    let id = service
        .import_case(
            CaseFile::new("empty.json", r#"{"name": "empty"}"#),
            None,
            None,
        )
        .await
        .unwrap()
        .network_id;

    let err = service
        .export_network(ExportRequest::new(id, "JSON_PARTS", "empty"))
        .await
        .unwrap_err();
    assert!(matches!(err.primary(), Error::ExportFailed { .. }));

    let total = registry.stops_named("conversion.export.total");
    assert_eq!(total.len(), 1);
    assert!(!total[0].success);
    assert!(
        registry
            .requests
            .lock()
            .unwrap()
            .contains(&(Direction::Export, "error"))
    );
    // No entity count for a failed export.
    assert!(
        !registry
            .counts
            .lock()
            .unwrap()
            .iter()
            .any(|(direction, _, _)| *direction == Direction::Export)
    );
}

// ============================================================================
// Artifacts
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_and_bundled_artifacts() {
    let temp_dir = TempDir::new().unwrap();
    let (service, _registry) = recorded_service(&temp_dir, 2);
    let id = service
        .import_case(CaseFile::new("grid.json", CASE), None, None)
        .await
        .unwrap()
        .network_id;

    let single = service
        .export_network(
            ExportRequest::new(id.clone(), "JSON_PARTS", "lines").with_parameter("kinds", "line"),
        )
        .await
        .unwrap();
    assert_eq!(single.display_name, "lines.json");
    let lines: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&single.path).unwrap()).unwrap();
    assert_eq!(lines.as_array().unwrap().len(), 2);

    let bundle = service
        .export_network(ExportRequest::new(id, "JSON_PARTS", "grid"))
        .await
        .unwrap();
    assert_eq!(bundle.display_name, "grid.zip");

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&bundle.path).unwrap()).unwrap();
    let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(names, vec!["grid_bus.json", "grid_line.json"]);

    let mut bus = String::new();
    archive
        .by_name("grid_bus.json")
        .unwrap()
        .read_to_string(&mut bus)
        .unwrap();
    assert!(bus.contains("B1"));

    let scratch_left = std::fs::read_dir(temp_dir.path().join("scratch"))
        .unwrap()
        .count();
    assert_eq!(scratch_left, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_drains_scheduled_imports() {
    let temp_dir = TempDir::new().unwrap();
    let (service, _registry) = recorded_service(&temp_dir, 1);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            service
                .schedule_import(CaseFile::new(format!("grid-{i}.json"), CASE), None, None)
                .unwrap()
        })
        .collect();

    service.shutdown().await;
    assert_eq!(service.store().count().unwrap(), 4);
    for handle in handles {
        assert_eq!(handle.await.unwrap().entity_count, 3);
    }
}
