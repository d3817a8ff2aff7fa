//! Serve command - HTTP API over the orchestrator and extractors.

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Args;
use console::style;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use billex_core::error::StoreError;
use billex_core::models::config::ExtractionMethod;
use billex_core::orchestrator::StagedFile;
use billex_core::{
    extractor_for, open_store, BillRecord, BillexConfig, BillexError, Document, DocumentExtractor,
    DocumentKind, Job, Orchestrator,
};

use super::load_config;

/// Largest accepted request body.
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Arguments for the serve command.
#[derive(Args)]
pub struct ServeArgs {
    /// Address to listen on (default: from config)
    #[arg(short, long)]
    bind: Option<String>,

    /// Accept .txt uploads as well as PDFs
    #[arg(long)]
    accept_text: bool,
}

pub async fn run(args: ServeArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if args.accept_text {
        config.server.accept_text = true;
    }

    let state = AppState::from_config(&config)?;
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("Listening on {}", config.server.bind);
    println!(
        "{} Listening on http://{}",
        style("✓").green(),
        config.server.bind
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    orchestrator: Arc<Orchestrator>,
    pattern: Arc<dyn DocumentExtractor>,
    llm: Option<Arc<dyn DocumentExtractor>>,
    staging_dir: PathBuf,
    accept_text: bool,
}

impl AppState {
    pub fn new(
        orchestrator: Orchestrator,
        pattern: Arc<dyn DocumentExtractor>,
        llm: Option<Arc<dyn DocumentExtractor>>,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            pattern,
            llm,
            staging_dir,
            accept_text: false,
        }
    }

    pub fn with_accept_text(mut self, accept_text: bool) -> Self {
        self.accept_text = accept_text;
        self
    }

    /// Open the store and build the extractors named in the configuration.
    ///
    /// A missing LLM API key only disables `/extract/llm`, unless batch jobs
    /// are configured to use the LLM.
    pub fn from_config(config: &BillexConfig) -> anyhow::Result<Self> {
        let store = open_store(&config.store)?;
        let batch_extractor = extractor_for(config, config.extraction.method)?;
        let pattern = extractor_for(config, ExtractionMethod::Pattern)?;
        let llm = match extractor_for(config, ExtractionMethod::Llm) {
            Ok(extractor) => Some(extractor),
            Err(e) => {
                warn!("LLM extraction disabled: {}", e);
                None
            }
        };

        let orchestrator = Orchestrator::new(store, batch_extractor, config.batch.clone());
        Ok(Self::new(orchestrator, pattern, llm, config.batch.staging_dir.clone())
            .with_accept_text(config.server.accept_text))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/batch", post(submit_batch))
        .route("/api/extract/batch", post(submit_batch))
        .route("/jobs/:id/status", get(job_status))
        .route("/api/tasks/:id/status", get(job_status))
        .route("/jobs/:id/results", get(job_results))
        .route("/api/tasks/:id/results", get(job_results))
        .route("/extract", post(extract_pattern))
        .route("/extract/llm", post(extract_llm))
        .route("/extract/enhanced", post(extract_llm))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Error returned by handlers, rendered as `{"detail": ...}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<BillexError> for ApiError {
    fn from(e: BillexError) -> Self {
        match &e {
            BillexError::InvalidInput(_) => ApiError::BadRequest(e.to_string()),
            BillexError::Store(StoreError::NotFound(_)) => ApiError::NotFound(e.to_string()),
            _ => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail),
            ApiError::Internal(detail) => {
                error!("Request failed: {}", detail);
                (StatusCode::INTERNAL_SERVER_ERROR, detail)
            }
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// Body of the single-document extraction endpoints.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub status: String,
    pub message: String,
    pub data: Option<BillRecord>,
}

impl ExtractResponse {
    fn success(record: BillRecord) -> Self {
        Self {
            status: "success".to_string(),
            message: "Data extracted successfully".to_string(),
            data: Some(record),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            data: None,
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn submit_batch(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let documents = read_documents(multipart, state.accept_text).await?;
    let total = documents.len();
    let job_id = state.orchestrator.submit(documents).await?;

    Ok(Json(json!({
        "job_id": job_id,
        "total_documents": total,
        "status": "pending",
        "message": format!("Processing {} files", total),
    })))
}

async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Job>, ApiError> {
    Ok(Json(state.orchestrator.status(&job_id).await?))
}

async fn job_results(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let job = state.orchestrator.status(&job_id).await?;
    let results = state.orchestrator.results(&job_id).await?;

    Ok(Json(json!({
        "job_id": job.id,
        "status": job.status,
        "results": results,
    })))
}

async fn extract_pattern(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ExtractResponse>, ApiError> {
    let extractor = Arc::clone(&state.pattern);
    extract_single(&state, Some(extractor), multipart).await
}

async fn extract_llm(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<ExtractResponse>, ApiError> {
    let extractor = state.llm.clone();
    extract_single(&state, extractor, multipart).await
}

/// Extract the first uploaded document synchronously.
///
/// Upload problems are 400s; extraction failures are reported in the body.
async fn extract_single(
    state: &AppState,
    extractor: Option<Arc<dyn DocumentExtractor>>,
    multipart: Multipart,
) -> Result<Json<ExtractResponse>, ApiError> {
    let mut documents = read_documents(multipart, state.accept_text).await?;
    if documents.len() > 1 {
        warn!("Ignoring {} extra uploaded files", documents.len() - 1);
    }
    let document = documents.swap_remove(0);
    info!("Received file: {} ({} bytes)", document.filename, document.data.len());

    let Some(extractor) = extractor else {
        return Ok(Json(ExtractResponse::error("LLM extraction is not configured")));
    };

    let response = match stage_and_extract(state, extractor.as_ref(), &document).await {
        Ok(record) => ExtractResponse::success(record),
        Err(e) => {
            error!("Extraction of {} failed: {}", document.filename, e);
            ExtractResponse::error(e.to_string())
        }
    };
    Ok(Json(response))
}

async fn stage_and_extract(
    state: &AppState,
    extractor: &dyn DocumentExtractor,
    document: &Document,
) -> billex_core::Result<BillRecord> {
    tokio::fs::create_dir_all(&state.staging_dir).await?;
    let request_id = Uuid::new_v4().to_string();
    let staged = StagedFile::create(
        &state.staging_dir,
        &request_id,
        0,
        &document.filename,
        &document.data,
    )
    .await?;

    let mut record = extractor.extract(staged.path()).await?;
    record.source_file = Some(document.filename.clone());
    Ok(record)
}

/// Collect file parts; other form fields are ignored.
async fn read_documents(mut multipart: Multipart, accept_text: bool) -> Result<Vec<Document>, ApiError> {
    let mut documents = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        check_upload(&filename, accept_text)?;
        let data = field.bytes().await?;
        documents.push(Document::new(filename, data.to_vec()));
    }

    if documents.is_empty() {
        return Err(ApiError::BadRequest("No files uploaded".to_string()));
    }
    Ok(documents)
}

fn check_upload(filename: &str, accept_text: bool) -> Result<(), ApiError> {
    match DocumentKind::from_filename(filename) {
        Some(DocumentKind::Pdf) => Ok(()),
        Some(DocumentKind::Text) if accept_text => Ok(()),
        _ => Err(ApiError::BadRequest(format!("File {} is not a PDF", filename))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use billex_core::models::config::BatchConfig;
    use billex_core::{InMemoryTaskStore, PatternExtractor};
    use pretty_assertions::assert_eq;
    use tower::ServiceExt;

    const BOUNDARY: &str = "billex-test-boundary";

    fn test_app(dir: &std::path::Path, accept_text: bool) -> Router {
        test_app_with_llm(dir, accept_text, None)
    }

    fn test_app_with_llm(
        dir: &std::path::Path,
        accept_text: bool,
        llm: Option<Arc<dyn DocumentExtractor>>,
    ) -> Router {
        let pattern: Arc<dyn DocumentExtractor> = Arc::new(PatternExtractor::default());
        let config = BatchConfig {
            max_concurrency: 2,
            staging_dir: dir.to_path_buf(),
            poll_interval_ms: 10,
        };
        let orchestrator = Orchestrator::new(
            Arc::new(InMemoryTaskStore::new()),
            Arc::clone(&pattern),
            config,
        );
        router(
            AppState::new(orchestrator, pattern, llm, dir.to_path_buf())
                .with_accept_text(accept_text),
        )
    }

    fn multipart_request(uri: &str, files: &[(&str, &str)]) -> Request<Body> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n")
                .as_bytes(),
        );
        for (filename, data) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(body))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), false);

        let (status, body) = send(&app, get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_batch_without_files_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), true);

        let (status, body) = send(&app, multipart_request("/batch", &[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "No files uploaded");
    }

    #[tokio::test]
    async fn test_batch_rejects_non_document() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), false);

        let request = multipart_request("/batch", &[("bill.pdf", "%PDF"), ("bill.txt", "Amount Due: $1.00")]);
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "File bill.txt is not a PDF");
    }

    #[tokio::test]
    async fn test_batch_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), true);

        let request = multipart_request(
            "/api/extract/batch",
            &[
                ("good.txt", "Account Number: 12-345\nAmount Due: $42.10\n"),
                ("empty.txt", "   \n"),
            ],
        );
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "pending");
        assert_eq!(body["total_documents"], 2);
        let job_id = body["job_id"].as_str().unwrap().to_string();

        let mut job = Value::Null;
        for _ in 0..500 {
            let (status, body) = send(&app, get_request(&format!("/jobs/{}/status", job_id))).await;
            assert_eq!(status, StatusCode::OK);
            job = body;
            if job["status"] == "completed" || job["status"] == "failed" {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(job["status"], "completed");
        assert_eq!(job["processed_count"], 1);
        assert_eq!(job["failed_count"], 1);

        let (status, body) = send(&app, get_request(&format!("/api/tasks/{}/results", job_id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["job_id"], job_id.as_str());
        assert_eq!(body["status"], "completed");

        let results = body["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        let good = results.iter().find(|r| r["filename"] == "good.txt").unwrap();
        assert_eq!(good["status"], "completed");
        assert_eq!(good["extracted_data"]["account_number"], "12-345");
        assert_eq!(good["extracted_data"]["source_file"], "good.txt");
        let empty = results.iter().find(|r| r["filename"] == "empty.txt").unwrap();
        assert_eq!(empty["status"], "failed");
        assert!(empty["extracted_data"].is_null());
    }

    #[tokio::test]
    async fn test_unknown_job_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), false);

        let (status, _) = send(&app, get_request("/jobs/missing/status")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, get_request("/api/tasks/missing/results")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_extract_success() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), true);

        let request = multipart_request("/extract", &[("bill.txt", "Account Number: 77-1200\nAmount Due: $42.10\n")]);
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        let response: ExtractResponse = serde_json::from_value(body).unwrap();
        assert_eq!(response.status, "success");
        let record = response.data.unwrap();
        assert_eq!(record.account_number.as_deref(), Some("77-1200"));
        assert_eq!(record.amount_due, Some("42.10".parse().unwrap()));
        assert_eq!(record.source_file.as_deref(), Some("bill.txt"));

        // Staged copy is gone once the request finishes
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_extract_failure_is_reported_in_body() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), false);

        let request = multipart_request("/extract", &[("bill.pdf", "definitely not a pdf")]);
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert!(body["data"].is_null());
        assert!(!body["message"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extract_rejects_non_document() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), true);

        let (status, _) = send(&app, multipart_request("/extract", &[("bill.docx", "x")])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_extract_llm_unconfigured() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app(dir.path(), true);

        let request = multipart_request("/extract/llm", &[("bill.txt", "Amount Due: $1.00")]);
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "LLM extraction is not configured");
    }

    /// Stands in for the LLM collaborator.
    struct FixedExtractor;

    #[async_trait::async_trait]
    impl DocumentExtractor for FixedExtractor {
        async fn extract(&self, _path: &std::path::Path) -> billex_core::Result<BillRecord> {
            Ok(BillRecord {
                account_number: Some("from-llm".to_string()),
                ..Default::default()
            })
        }
    }

    #[tokio::test]
    async fn test_llm_routes_use_llm_extractor() {
        let dir = tempfile::tempdir().unwrap();
        let app = test_app_with_llm(dir.path(), true, Some(Arc::new(FixedExtractor)));

        for uri in ["/extract/llm", "/extract/enhanced"] {
            let request = multipart_request(uri, &[("bill.txt", "Account Number: 12-345")]);
            let (status, body) = send(&app, request).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
            assert_eq!(body["status"], "success");
            assert_eq!(body["data"]["account_number"], "from-llm");
            assert_eq!(body["data"]["source_file"], "bill.txt");
        }
    }
}
