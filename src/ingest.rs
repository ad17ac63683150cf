//! Ingestion pipeline orchestration.
//!
//! Drives one batch through tabular parsing → mapping → encoding → schema
//! validation → append. Every run ends in exactly one [`IngestStatus`];
//! nothing is retried, and nothing is persisted unless every earlier stage
//! succeeded.
//!
//! [`Ingestor::submit`] runs a batch as a detached tokio task and returns at
//! once; the outcome is only observable through the webhook (or by awaiting
//! the returned [`IngestHandle`]).

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::encode::encode_report;
use crate::error::IngestError;
use crate::mapper::{map_batch, ColumnLayout, MAPPER_VERSION};
use crate::models::{Provenance, RowId, VehicleReport};
use crate::schema::{AcceptAll, SchemaValidator, StructuralValidator};
use crate::store::DocumentStore;
use crate::tabular::parse_rows;
use crate::webhook::{deliver, HttpNotifier, NoopNotifier, Notifier, WebhookPayload};

/// Final status of one ingest run, as reported to the webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IngestStatus {
    Success,
    CsvError,
    MappingError,
    EmptyBatch,
    EncodingError,
    SchemaError,
    StorageError,
}

impl IngestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStatus::Success => "SUCCESS",
            IngestStatus::CsvError => "CSV_ERROR",
            IngestStatus::MappingError => "MAPPING_ERROR",
            IngestStatus::EmptyBatch => "EMPTY_BATCH",
            IngestStatus::EncodingError => "ENCODING_ERROR",
            IngestStatus::SchemaError => "SCHEMA_ERROR",
            IngestStatus::StorageError => "STORAGE_ERROR",
        }
    }
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&IngestError> for IngestStatus {
    fn from(err: &IngestError) -> Self {
        match err {
            IngestError::Tabular { .. } => IngestStatus::CsvError,
            IngestError::Mapping { .. } => IngestStatus::MappingError,
            IngestError::EmptyBatch => IngestStatus::EmptyBatch,
            IngestError::Encoding(_) => IngestStatus::EncodingError,
            IngestError::SchemaValidation(_) => IngestStatus::SchemaError,
            IngestError::Storage(_) => IngestStatus::StorageError,
        }
    }
}

/// One uploaded batch.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub request_id: String,
    pub file_name: String,
    /// Version tag stored with the row. Empty means the mapper's own version.
    pub mapper_version: String,
    pub webhook_url: Option<String>,
    /// Delimited text, header row first.
    pub payload: String,
}

pub fn generate_request_id() -> String {
    format!("REQ-{}", Utc::now().timestamp_millis())
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub request_id: String,
    pub file_name: String,
    pub status: IngestStatus,
    pub row_id: Option<RowId>,
    pub records: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub schema_version: String,
    pub validator_prefix: String,
    pub requester_prefix: String,
    pub layout: ColumnLayout,
    pub default_webhook_url: Option<String>,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            schema_version: config.ingest.schema_version.clone(),
            validator_prefix: config.ingest.validator_prefix.clone(),
            requester_prefix: config.ingest.requester_prefix.clone(),
            layout: ColumnLayout::V1,
            default_webhook_url: config.webhook.default_url.clone(),
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self::from_config(&Config::for_database("fleet.sqlite"))
    }
}

/// Pipeline with its collaborators. Cheap to clone.
#[derive(Clone)]
pub struct Ingestor {
    store: Arc<dyn DocumentStore>,
    validator: Arc<dyn SchemaValidator>,
    notifier: Arc<dyn Notifier>,
    settings: Arc<IngestSettings>,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        validator: Arc<dyn SchemaValidator>,
        notifier: Arc<dyn Notifier>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            store,
            validator,
            notifier,
            settings: Arc::new(settings),
        }
    }

    /// Wire the pipeline from config: structural validation unless disabled,
    /// HTTP webhook delivery.
    pub fn from_config(config: &Config, store: Arc<dyn DocumentStore>) -> Result<Self> {
        let notifier = Arc::new(HttpNotifier::new(config.webhook.timeout_secs)?);
        Ok(Self::new(
            store,
            validator_for(config),
            notifier,
            IngestSettings::from_config(config),
        ))
    }

    /// Like [`from_config`](Self::from_config), for callers that never have a
    /// webhook to notify. Completion is only visible in the returned outcome.
    pub fn offline(config: &Config, store: Arc<dyn DocumentStore>) -> Self {
        Self::new(
            store,
            validator_for(config),
            Arc::new(NoopNotifier),
            IngestSettings::from_config(config),
        )
    }

    /// Run the pipeline for one batch. Never notifies.
    pub async fn run(&self, request: &IngestRequest) -> IngestOutcome {
        info!(request_id = %request.request_id, file = %request.file_name, "ingest started");
        let generated_on = Utc::now().date_naive();

        match self.pipeline(request, generated_on).await {
            Ok((row_id, records)) => {
                info!(request_id = %request.request_id, row_id, records, "ingest stored");
                IngestOutcome {
                    request_id: request.request_id.clone(),
                    file_name: request.file_name.clone(),
                    status: IngestStatus::Success,
                    row_id: Some(row_id),
                    records,
                    error: None,
                }
            }
            Err(err) => {
                let status = IngestStatus::from(&err);
                warn!(request_id = %request.request_id, %status, error = %err, "ingest rejected");
                IngestOutcome {
                    request_id: request.request_id.clone(),
                    file_name: request.file_name.clone(),
                    status,
                    row_id: None,
                    records: 0,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    async fn pipeline(
        &self,
        request: &IngestRequest,
        generated_on: NaiveDate,
    ) -> Result<(RowId, usize), IngestError> {
        let rows = parse_rows(&request.payload)?;
        let vehicles = map_batch(&rows, &self.settings.layout)?;
        let records = vehicles.len();

        let provenance = Provenance::for_request(
            &self.settings.validator_prefix,
            &self.settings.requester_prefix,
            &request.request_id,
        );
        let report = VehicleReport::new(
            generated_on,
            self.settings.schema_version.clone(),
            provenance,
            vehicles,
        );
        let xml = encode_report(&report)?;
        self.validator.validate(&xml)?;

        let version = stored_version(request);
        let row_id = self.store.append(&xml, version).await?;
        Ok((row_id, records))
    }

    /// Run the pipeline, then notify the request's webhook (or the configured
    /// default) with the final status.
    pub async fn run_and_notify(&self, request: &IngestRequest) -> IngestOutcome {
        let outcome = self.run(request).await;
        let url = request
            .webhook_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .or(self.settings.default_webhook_url.as_deref());
        if let Some(url) = url {
            let payload = WebhookPayload {
                request_id: outcome.request_id.clone(),
                status: outcome.status.to_string(),
                file_name: outcome.file_name.clone(),
            };
            deliver(self.notifier.as_ref(), url, &payload).await;
        }
        outcome
    }

    /// Start the batch as a detached task and return immediately.
    pub fn submit(&self, request: IngestRequest) -> IngestHandle {
        let request_id = request.request_id.clone();
        let ingestor = self.clone();
        let task = tokio::spawn(async move { ingestor.run_and_notify(&request).await });
        IngestHandle { request_id, task }
    }
}

fn validator_for(config: &Config) -> Arc<dyn SchemaValidator> {
    if config.ingest.validate_schema {
        Arc::new(StructuralValidator::new())
    } else {
        Arc::new(AcceptAll)
    }
}

/// Version tag for the stored row. Rows are always mapped with the current
/// layout; a different requested version is kept as the tag and logged.
fn stored_version(request: &IngestRequest) -> &str {
    let requested = request.mapper_version.trim();
    if requested.is_empty() {
        return MAPPER_VERSION;
    }
    if requested != MAPPER_VERSION {
        warn!(
            request_id = %request.request_id,
            requested,
            mapped_with = MAPPER_VERSION,
            "requested mapper version differs from the layout in use"
        );
    }
    requested
}

/// A submitted ingest. Dropping the handle does not cancel the work.
pub struct IngestHandle {
    request_id: String,
    task: JoinHandle<IngestOutcome>,
}

impl IngestHandle {
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Cancel the outstanding work. The append is a single row, so a
    /// cancelled ingest leaves either one complete row or none.
    pub fn abort(&self) {
        self.task.abort();
    }

    /// Wait for the outcome; `None` if the task was aborted or panicked.
    pub async fn wait(self) -> Option<IngestOutcome> {
        self.task.await.ok()
    }
}
