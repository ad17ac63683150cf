//! HTTP surface: batch upload and corpus queries.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Multipart upload of one delimited batch; answers `202` at once |
//! | `GET`  | `/query/brand?term=` | [`BrandStats`] for designations containing `term` |
//! | `GET`  | `/query/segment?term=` | `{"count": n}` for categories containing `term` |
//! | `GET`  | `/query/location?term=` | [`LocationStats`] for cities containing `term` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "csvFile is required" } }
//! ```
//!
//! A query that fails because the store is unavailable answers `503` with
//! the zero-valued result next to the error:
//!
//! ```json
//! { "result": { "count": 0, "total_price": 0.0 },
//!   "error": { "code": "store_unavailable", "message": "..." } }
//! ```
//!
//! The upload outcome is never part of the HTTP response; it is delivered to
//! the webhook once the background ingest finishes.

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_typed_multipart::{FieldData, TryFromMultipart, TypedMultipart};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::config::Config;
use crate::db;
use crate::error::StoreError;
use crate::ingest::{generate_request_id, IngestRequest, Ingestor};
use crate::mapper::MAPPER_VERSION;
use crate::models::{BrandStats, LocationStats};
use crate::query::CorpusQueryEngine;
use crate::store::{DocumentStore, SqliteStore};

/// Request body cap for `/upload`. Sits above the `csvFile` field limit to
/// leave room for the other form fields and multipart framing.
const UPLOAD_BODY_LIMIT: usize = 64 * 1024 * 1024;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    ingestor: Ingestor,
    engine: Arc<CorpusQueryEngine>,
}

impl AppState {
    pub fn new(ingestor: Ingestor, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            ingestor,
            engine: Arc::new(CorpusQueryEngine::new(store)),
        }
    }

    pub fn from_config(config: &Config, store: Arc<dyn DocumentStore>) -> anyhow::Result<Self> {
        let ingestor = Ingestor::from_config(config, store.clone())?;
        Ok(Self::new(ingestor, store))
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/upload",
            post(handle_upload).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/query/brand", get(handle_brand))
        .route("/query/segment", get(handle_segment))
        .route("/query/location", get(handle_location))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` against the configured database.
///
/// Runs until the process receives Ctrl-C. The database must have been
/// initialised with `fleet init`.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let pool = db::connect(config).await?;
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::new(pool));
    let state = AppState::from_config(config, store)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "server listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("server stopped");
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

/// 503 body for a query whose store failed: zeros plus the error detail.
#[derive(Serialize)]
struct DegradedBody<T> {
    result: T,
    error: ErrorDetail,
}

fn query_response<T: Serialize + Default>(
    query: &str,
    result: Result<T, StoreError>,
) -> Response {
    match result {
        Ok(value) => Json(value).into_response(),
        Err(e) => {
            error!(query, error = %e, "query failed");
            let body = DegradedBody {
                result: T::default(),
                error: ErrorDetail {
                    code: "store_unavailable".to_string(),
                    message: e.to_string(),
                },
            };
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /upload ============

#[derive(Debug, TryFromMultipart)]
struct UploadParams {
    #[form_data(field_name = "requestId")]
    request_id: Option<String>,
    mapper: Option<String>,
    #[form_data(field_name = "fileName")]
    file_name: Option<String>,
    #[form_data(field_name = "webhookUrl")]
    webhook_url: Option<String>,
    #[form_data(field_name = "csvFile", limit = "50000000")]
    csv_file: Option<FieldData<Bytes>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadAccepted {
    request_id: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Handler for `POST /upload`.
///
/// Validates the form, hands the batch to a detached ingest task, and
/// answers `202` with the request id before any processing happens.
async fn handle_upload(
    State(state): State<AppState>,
    TypedMultipart(params): TypedMultipart<UploadParams>,
) -> Result<(StatusCode, Json<UploadAccepted>), AppError> {
    let csv_file = params
        .csv_file
        .ok_or_else(|| bad_request("csvFile is required"))?;

    let file_name = non_empty(params.file_name)
        .or(csv_file.metadata.file_name.clone())
        .unwrap_or_else(|| "upload.csv".to_string());
    let payload = String::from_utf8(csv_file.contents.to_vec())
        .map_err(|_| bad_request("csvFile must be UTF-8 text"))?;

    let request = IngestRequest {
        request_id: non_empty(params.request_id).unwrap_or_else(generate_request_id),
        file_name,
        mapper_version: non_empty(params.mapper).unwrap_or_else(|| MAPPER_VERSION.to_string()),
        webhook_url: non_empty(params.webhook_url),
        payload,
    };

    info!(
        request_id = %request.request_id,
        file = %request.file_name,
        bytes = request.payload.len(),
        "upload accepted"
    );

    let handle = state.ingestor.submit(request);
    Ok((
        StatusCode::ACCEPTED,
        Json(UploadAccepted {
            request_id: handle.request_id().to_string(),
        }),
    ))
}

// ============ GET /query/* ============

#[derive(Debug, Deserialize)]
struct TermParams {
    #[serde(default)]
    term: String,
}

#[derive(Debug, Default, Serialize)]
struct SegmentCount {
    count: i64,
}

async fn handle_brand(
    State(state): State<AppState>,
    Query(params): Query<TermParams>,
) -> Response {
    let result: Result<BrandStats, _> = state.engine.brand_stats(&params.term).await;
    query_response("brand", result)
}

async fn handle_segment(
    State(state): State<AppState>,
    Query(params): Query<TermParams>,
) -> Response {
    let result = state
        .engine
        .segment_count(&params.term)
        .await
        .map(|count| SegmentCount { count });
    query_response("segment", result)
}

async fn handle_location(
    State(state): State<AppState>,
    Query(params): Query<TermParams>,
) -> Response {
    let result: Result<LocationStats, _> = state.engine.location_stats(&params.term).await;
    query_response("location", result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RowId, StoredRow};
    use crate::schema::StructuralValidator;
    use crate::store::InMemoryStore;
    use crate::webhook::{Notifier, WebhookPayload};
    use async_trait::async_trait;
    use crate::ingest::IngestSettings;
    use std::sync::Mutex;
    use std::time::Duration;

    const CSV: &str = "Identificador,Designacao,Preco,Ano,Kilometragem,TipoCombustivel,Cidade,Cilindrada,PotenciaMotor,TipoTransmissao,CategoriaVeiculo,Latitude,Longitude\n\
V1,Toyota Corolla,15000,2019,50000,Petrol,Porto,1600,120,Manual,Sedan,41.15,-8.61\n\
V2,Toyota Yaris,9000,2020,30000,Petrol,Lisboa,1000,70,Manual,Hatchback,38.72,-9.14\n";

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<WebhookPayload>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, _url: &str, payload: &WebhookPayload) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(payload.clone());
            Ok(())
        }
    }

    struct DownStore;

    #[async_trait]
    impl DocumentStore for DownStore {
        async fn append(&self, _: &str, _: &str) -> Result<RowId, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn scan_all(&self) -> Result<Vec<StoredRow>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn count_rows(&self) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
        async fn version_breakdown(&self) -> Result<Vec<(String, i64)>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    async fn spawn_app(store: Arc<dyn DocumentStore>) -> (String, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::default());
        let ingestor = Ingestor::new(
            store.clone(),
            Arc::new(StructuralValidator::new()),
            notifier.clone(),
            IngestSettings::default(),
        );
        let app = build_router(AppState::new(ingestor, store));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}", addr), notifier)
    }

    fn upload_form(csv: &str) -> reqwest::multipart::Form {
        reqwest::multipart::Form::new()
            .text("requestId", "REQ-42")
            .text("mapper", "1.0")
            .text("fileName", "carros.csv")
            .text("webhookUrl", "http://hook.test/webhook")
            .part(
                "csvFile",
                reqwest::multipart::Part::bytes(csv.as_bytes().to_vec()).file_name("carros.csv"),
            )
    }

    async fn wait_for_rows(store: &InMemoryStore, n: i64) {
        for _ in 0..100 {
            if store.count_rows().await.unwrap() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("ingest did not finish");
    }

    #[tokio::test]
    async fn test_health() {
        let (base, _) = spawn_app(Arc::new(InMemoryStore::new())).await;
        let body: serde_json::Value = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_upload_then_query() {
        let store = Arc::new(InMemoryStore::new());
        let (base, notifier) = spawn_app(store.clone()).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{}/upload", base))
            .multipart(upload_form(CSV))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["requestId"], "REQ-42");

        wait_for_rows(&store, 1).await;

        let brand: serde_json::Value = client
            .get(format!("{}/query/brand?term=toyota", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(brand["count"], 2);
        assert_eq!(brand["avg_price"], 12000.0);

        let segment: serde_json::Value = client
            .get(format!("{}/query/segment?term=sedan", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(segment, serde_json::json!({ "count": 1 }));

        let location: serde_json::Value = client
            .get(format!("{}/query/location?term=LISBOA", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(location["count"], 1);
        assert_eq!(location["total_price"], 9000.0);

        for _ in 0..100 {
            if !notifier.sent.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent[0].request_id, "REQ-42");
        assert_eq!(sent[0].status, "SUCCESS");
        assert_eq!(sent[0].file_name, "carros.csv");
    }

    #[tokio::test]
    async fn test_upload_above_default_body_limit_is_accepted() {
        let store = Arc::new(InMemoryStore::new());
        let (base, _) = spawn_app(store.clone()).await;

        let mut csv = String::from(CSV);
        let mut i = 0;
        while csv.len() <= 3 * 1024 * 1024 {
            csv.push_str(&format!(
                "B{},Renault Clio,12000,2019,40000,Petrol,Faro,1200,90,Manual,Hatchback,37.02,-7.93\n",
                i
            ));
            i += 1;
        }

        let resp = reqwest::Client::new()
            .post(format!("{}/upload", base))
            .multipart(upload_form(&csv))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::ACCEPTED);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["requestId"], "REQ-42");
    }

    #[tokio::test]
    async fn test_upload_without_file_is_bad_request() {
        let (base, _) = spawn_app(Arc::new(InMemoryStore::new())).await;
        let form = reqwest::multipart::Form::new().text("requestId", "REQ-1");
        let resp = reqwest::Client::new()
            .post(format!("{}/upload", base))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["error"]["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_missing_term_matches_everything() {
        let store = Arc::new(InMemoryStore::new());
        let (base, _) = spawn_app(store.clone()).await;
        reqwest::Client::new()
            .post(format!("{}/upload", base))
            .multipart(upload_form(CSV))
            .send()
            .await
            .unwrap();
        wait_for_rows(&store, 1).await;

        let segment: serde_json::Value = reqwest::get(format!("{}/query/segment", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(segment["count"], 2);
    }

    #[tokio::test]
    async fn test_store_failure_is_503_with_zeros() {
        let (base, _) = spawn_app(Arc::new(DownStore)).await;
        let resp = reqwest::get(format!("{}/query/location?term=porto", base))
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["result"]["count"], 0);
        assert_eq!(body["result"]["total_price"], 0.0);
        assert_eq!(body["error"]["code"], "store_unavailable");
    }
}
