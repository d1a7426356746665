//! Conversion service.
//!
//! Orchestrates imports of case files into the network store and exports of
//! stored networks into artifacts. Every conversion runs on the bounded
//! runner under two observations:
//!
//! - `conversion.<direction>.total`: submission to completion, queueing included
//! - `conversion.<direction>.processing`: the decode or materialization itself

use crate::config::ConversionConfig;
use crate::execution::{BoundedTaskRunner, ContextExecutor, TaskHandle};
use crate::io::formats::validate_parameters;
use crate::io::{
    ExportArtifact, ExportFormatInfo, ExportMaterializer, FormatCatalog, FormatParameters,
    NetworkExporter, NetworkImporter, ScratchSpace,
};
use crate::models::{CaseFile, ConversionEvent, Direction, EventMeta, NetworkId};
use crate::observability::{
    EntityCount, EventBus, MetricsRegistry, ObservationRegistry, Observer, Outcome,
    current_request_id,
};
use crate::storage::{InMemoryNetworkStore, NetworkStore};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::instrument;

const EVENT_SOURCE: &str = "conversion_service";

/// Result of a successful import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    /// Id assigned by the network store.
    pub network_id: NetworkId,
    /// Format the case was decoded with.
    pub format: String,
    /// Number of imported elements.
    pub entity_count: usize,
}

impl EntityCount for ImportOutcome {
    fn entity_count(&self) -> Option<usize> {
        Some(self.entity_count)
    }
}

/// Request to export a stored network.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    /// Network to export.
    pub network_id: NetworkId,
    /// Target format tag.
    pub format: String,
    /// Artifact base name, without extension.
    pub destination_name: String,
    /// Format parameters.
    pub parameters: FormatParameters,
}

impl ExportRequest {
    /// Creates a request without parameters.
    #[must_use]
    pub fn new(
        network_id: NetworkId,
        format: impl Into<String>,
        destination_name: impl Into<String>,
    ) -> Self {
        Self {
            network_id,
            format: format.into(),
            destination_name: destination_name.into(),
            parameters: FormatParameters::new(),
        }
    }

    /// Adds a format parameter.
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }
}

/// Service importing and exporting networks.
///
/// Cheap to clone; clones share pools, store and event bus.
#[derive(Debug, Clone)]
pub struct ConversionService {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    store: Arc<dyn NetworkStore>,
    catalog: FormatCatalog,
    materializer: ExportMaterializer,
    scratch: ScratchSpace,
    runner: BoundedTaskRunner,
    executor: ContextExecutor,
    observer: Observer,
    events: EventBus,
}

/// Builder for [`ConversionService`].
#[must_use]
pub struct ConversionServiceBuilder {
    config: ConversionConfig,
    store: Option<Arc<dyn NetworkStore>>,
    registry: Option<Arc<dyn ObservationRegistry>>,
    catalog: Option<FormatCatalog>,
    events: Option<EventBus>,
    runtime: Option<Handle>,
}

impl ConversionServiceBuilder {
    /// Uses the given network store (default: in-memory).
    pub fn store(mut self, store: Arc<dyn NetworkStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Uses the given observation registry (default: `metrics` facade).
    pub fn registry(mut self, registry: Arc<dyn ObservationRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Uses the given format catalog (default: built-in formats).
    pub fn catalog(mut self, catalog: FormatCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Publishes onto the given event bus.
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Spawns work onto the given runtime (default: the current one).
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Builds the service.
    ///
    /// # Errors
    ///
    /// Returns an error if no runtime was given and none is running.
    pub fn build(self) -> Result<ConversionService> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current().map_err(|e| Error::OperationFailed {
                operation: "conversion_service_init".to_string(),
                cause: e.to_string(),
            })?,
        };
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(MetricsRegistry) as Arc<dyn ObservationRegistry>);

        let inner = Inner {
            store: self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryNetworkStore::new()) as Arc<dyn NetworkStore>),
            catalog: self
                .catalog
                .unwrap_or_else(FormatCatalog::with_builtin_formats),
            materializer: ExportMaterializer::from_config(&self.config),
            scratch: ScratchSpace::new(self.config.scratch_root()),
            runner: BoundedTaskRunner::new(runtime.clone(), self.config.tasks.clone()),
            executor: ContextExecutor::new(runtime),
            observer: Observer::new(registry),
            events: self.events.unwrap_or_default(),
        };
        tracing::info!(
            artifact_dir = %self.config.artifact_dir.display(),
            max_concurrent = self.config.tasks.max_concurrent,
            "Conversion service ready"
        );
        Ok(ConversionService {
            inner: Arc::new(inner),
        })
    }
}

impl ConversionService {
    /// Starts building a service from configuration.
    pub fn builder(config: &ConversionConfig) -> ConversionServiceBuilder {
        ConversionServiceBuilder {
            config: config.clone(),
            store: None,
            registry: None,
            catalog: None,
            events: None,
            runtime: None,
        }
    }

    /// Imports a case file and stores the resulting network.
    ///
    /// The importer is chosen by `format` when given, otherwise by the case
    /// file's extension. The case bytes are spooled to a scratch file that is
    /// removed before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unknown formats or bad parameters,
    /// or any decode, store or pool failure.
    #[instrument(
        skip(self, case, format, parameters),
        fields(operation = "import", case = %case.name, bytes = case.bytes.len())
    )]
    pub async fn import_case(
        &self,
        case: CaseFile,
        format: Option<String>,
        parameters: Option<FormatParameters>,
    ) -> Result<ImportOutcome> {
        let (tag, result) = match self.resolve_importer(&case, format.as_deref()) {
            Ok(importer) => {
                let tag = importer.format().to_string();
                let result = self
                    .run_import(importer, case, parameters.unwrap_or_default())
                    .await;
                (tag, result)
            },
            Err(e) => (format.unwrap_or_else(|| "UNKNOWN".to_string()), Err(e)),
        };

        self.conclude(Direction::Import, &tag, result, |outcome, meta| {
            ConversionEvent::Imported {
                meta,
                network_id: outcome.network_id.clone(),
                format: outcome.format.clone(),
                entity_count: outcome.entity_count,
            }
        })
    }

    /// Schedules an import in the background and returns at once.
    ///
    /// The import keeps the caller's request context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once the service is shutting down.
    pub fn schedule_import(
        &self,
        case: CaseFile,
        format: Option<String>,
        parameters: Option<FormatParameters>,
    ) -> Result<TaskHandle<ImportOutcome>> {
        let service = self.clone();
        self.inner
            .executor
            .submit(async move { service.import_case(case, format, parameters).await })
    }

    /// Exports a stored network into an artifact.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown networks,
    /// [`Error::InvalidInput`] for unknown formats or bad parameters,
    /// [`Error::ExportFailed`] when nothing usable was produced, or any pool
    /// or I/O failure.
    #[instrument(
        skip(self, request),
        fields(
            operation = "export",
            network_id = %request.network_id,
            format = %request.format,
            destination = %request.destination_name
        )
    )]
    pub async fn export_network(&self, request: ExportRequest) -> Result<ExportArtifact> {
        let network_id = request.network_id.clone();
        let (tag, result) = match self.inner.catalog.exporter(&request.format) {
            Ok(exporter) => {
                let tag = exporter.format().to_string();
                (tag, self.run_export(exporter, request).await)
            },
            Err(e) => (request.format, Err(e)),
        };

        self.conclude(Direction::Export, &tag, result, |artifact, meta| {
            ConversionEvent::Exported {
                meta,
                network_id,
                format: tag.clone(),
                artifact_name: artifact.display_name.clone(),
                byte_size: artifact.byte_size,
            }
        })
    }

    /// Lists export formats and their parameters.
    #[must_use]
    pub fn export_formats(&self) -> Vec<ExportFormatInfo> {
        self.inner.catalog.export_formats()
    }

    /// Returns the network store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn NetworkStore> {
        &self.inner.store
    }

    /// Returns the event bus conversions publish to.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Returns the bounded runner heavy work goes through.
    #[must_use]
    pub fn runner(&self) -> &BoundedTaskRunner {
        &self.inner.runner
    }

    /// Returns the context-propagating executor.
    #[must_use]
    pub fn executor(&self) -> &ContextExecutor {
        &self.inner.executor
    }

    /// Stops accepting work and waits for scheduled and running conversions.
    pub async fn shutdown(&self) {
        self.inner.executor.shutdown().await;
        self.inner.runner.shutdown().await;
        tracing::info!("Conversion service stopped");
    }

    fn resolve_importer(
        &self,
        case: &CaseFile,
        format: Option<&str>,
    ) -> Result<Arc<dyn NetworkImporter>> {
        if let Some(format) = format {
            return self.inner.catalog.importer(format);
        }
        let extension = case.extension().ok_or_else(|| {
            Error::InvalidInput(format!(
                "cannot determine format of '{}': no extension",
                case.name
            ))
        })?;
        self.inner.catalog.importer_for_extension(&extension)
    }

    async fn run_import(
        &self,
        importer: Arc<dyn NetworkImporter>,
        case: CaseFile,
        parameters: FormatParameters,
    ) -> Result<ImportOutcome> {
        let format = importer.format().to_string();
        validate_parameters(&format, &importer.parameters(), &parameters)?;

        let suffix = case
            .extension()
            .map(|extension| format!(".{extension}"))
            .unwrap_or_default();
        let observer = self.inner.observer.clone();
        let scratch = self.inner.scratch.clone();
        let store = Arc::clone(&self.inner.store);
        let runner = &self.inner.runner;
        let tag = format.clone();

        let total = self
            .inner
            .observer
            .observe_async(Direction::Import.total_metric(), &format, || {
                runner.supply_async(move || {
                    let network =
                        observer.observe(Direction::Import.processing_metric(), &tag, || {
                            scratch.with_temp_file("netconv-case-", &suffix, |path| {
                                std::fs::write(path, &case.bytes).map_err(|e| {
                                    Error::OperationFailed {
                                        operation: "spool_case_file".to_string(),
                                        cause: e.to_string(),
                                    }
                                })?;
                                importer.import(path, &parameters)
                            })
                        })?;
                    let entity_count = network.entity_count();
                    let network_id = store.save(network)?;
                    Ok(ImportOutcome {
                        network_id,
                        format: tag,
                        entity_count,
                    })
                })
            })?;
        total.await
    }

    async fn run_export(
        &self,
        exporter: Arc<dyn NetworkExporter>,
        request: ExportRequest,
    ) -> Result<ExportArtifact> {
        let format = exporter.format().to_string();
        validate_parameters(&format, &exporter.parameters(), &request.parameters)?;

        let network = self
            .inner
            .store
            .get(&request.network_id)?
            .ok_or_else(|| Error::NotFound(format!("network {}", request.network_id)))?;
        let observer = self.inner.observer.clone();
        let materializer = self.inner.materializer.clone();
        let runner = &self.inner.runner;
        let tag = format.clone();

        let total = self
            .inner
            .observer
            .observe_async(Direction::Export.total_metric(), &format, || {
                runner.supply_async(move || {
                    observer.observe(Direction::Export.processing_metric(), &tag, || {
                        materializer.materialize(
                            &network,
                            exporter.as_ref(),
                            &request.destination_name,
                            &request.parameters,
                        )
                    })
                })
            })?;
        total.await
    }

    /// Records request metrics and publishes the lifecycle event.
    fn conclude<T, E>(
        &self,
        direction: Direction,
        format: &str,
        result: Result<T>,
        event: E,
    ) -> Result<T>
    where
        T: EntityCount,
        E: FnOnce(&T, EventMeta) -> ConversionEvent,
    {
        let observer = &self.inner.observer;
        let meta = EventMeta::new(EVENT_SOURCE, current_request_id());

        match &result {
            Ok(value) => {
                observer.record_entity_count(direction, format, value);
                observer.record_request(direction, format, &Outcome::Success);
                tracing::info!(
                    direction = %direction,
                    format,
                    entity_count = value.entity_count(),
                    "Conversion completed"
                );
                self.inner.events.publish(event(value, meta));
            },
            Err(error) => {
                observer.record_request(direction, format, &Outcome::failure(error));
                tracing::error!(
                    direction = %direction,
                    format,
                    code = error.code(),
                    error = %error,
                    "Conversion failed"
                );
                self.inner.events.publish(ConversionEvent::Failed {
                    meta,
                    direction,
                    format: format.to_string(),
                    code: error.code(),
                    reason: error.to_string(),
                });
            },
        }
        result
    }
}
