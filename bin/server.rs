// Parking Reconciliation - Web Server
// Upload the three workbooks, download the reconciliation spreadsheet

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use log::{error, info};
use parking_recon::config::DEFAULT_CONFIG_PATH;
use parking_recon::pipeline::APP_LABEL;
use parking_recon::report::to_xlsx_bytes;
use parking_recon::{
    classify_workbook, AppConfig, ComplexRegistry, Credentials, Pipeline, PipelineInputs,
    ReconError, Session,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;
const FILE_PARTS: [&str; 3] = ["app", "rates", "sisco"];

/// Shared application state, read-only after startup
#[derive(Clone)]
struct AppState {
    config: Arc<AppConfig>,
    registry: Arc<ComplexRegistry>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::err(message))).into_response()
}

/// Bad credentials are 401, everything else the client can fix is 400
fn status_for(err: &ReconError) -> StatusCode {
    match err {
        ReconError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
        ReconError::Config { .. } | ReconError::Io(_) | ReconError::ReportWrite(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::BAD_REQUEST,
    }
}

fn recon_error_response(err: ReconError) -> Response {
    let status = status_for(&err);
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", err);
    } else {
        info!("Request rejected: {}", err);
    }
    error_response(status, err.to_string())
}

// ============================================================================
// Multipart form
// ============================================================================

/// Text fields and file parts of one upload form
#[derive(Default)]
struct UploadForm {
    fields: HashMap<String, String>,
    files: HashMap<String, Bytes>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, String> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await.map_err(|e| e.to_string())? {
            let name = field.name().unwrap_or_default().to_string();
            if field.file_name().is_some() || FILE_PARTS.contains(&name.as_str()) {
                let data = field.bytes().await.map_err(|e| e.to_string())?;
                form.files.insert(name, data);
            } else {
                let text = field.text().await.map_err(|e| e.to_string())?;
                form.fields.insert(name, text);
            }
        }

        Ok(form)
    }

    fn credentials(&self) -> Credentials {
        let get = |key: &str| self.fields.get(key).cloned().unwrap_or_default();
        Credentials::new(get("username"), get("password"))
    }

    fn file(&self, name: &str) -> Result<Vec<u8>, String> {
        self.files
            .get(name)
            .map(|b| b.to_vec())
            .ok_or_else(|| format!("Missing file part '{}'", name))
    }
}

fn open_session(state: &AppState, form: &UploadForm) -> Result<Session, ReconError> {
    Session::login(
        &state.config.login,
        &form.credentials(),
        state.registry.as_ref().clone(),
    )
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// POST /api/sheets - Classify the sheets of an APP workbook
async fn classify_sheets(State(state): State<AppState>, multipart: Multipart) -> Response {
    let form = match UploadForm::read(multipart).await {
        Ok(form) => form,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let session = match open_session(&state, &form) {
        Ok(session) => session,
        Err(e) => return recon_error_response(e),
    };
    let app = match form.file("app") {
        Ok(bytes) => bytes,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    match classify_workbook(APP_LABEL, &app, session.registry()) {
        Ok(classification) => (StatusCode::OK, Json(ApiResponse::ok(classification))).into_response(),
        Err(e) => recon_error_response(e),
    }
}

/// POST /api/reconcile - Run the pipeline, answer with the report spreadsheet
async fn reconcile(State(state): State<AppState>, multipart: Multipart) -> Response {
    let form = match UploadForm::read(multipart).await {
        Ok(form) => form,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let session = match open_session(&state, &form) {
        Ok(session) => session,
        Err(e) => return recon_error_response(e),
    };

    let inputs = match (form.file("app"), form.file("rates"), form.file("sisco")) {
        (Ok(app), Ok(rates), Ok(sisco)) => PipelineInputs::new(app, rates, sisco),
        (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => {
            return error_response(StatusCode::BAD_REQUEST, e)
        }
    };

    let options = state.config.pipeline.clone();
    let result = tokio::task::spawn_blocking(move || {
        let outcome = Pipeline::new(options).run(&session, &inputs)?;
        to_xlsx_bytes(&outcome.report).map(|bytes| (outcome.report.summary(), bytes))
    })
    .await;

    match result {
        Ok(Ok((summary, bytes))) => {
            info!("{}", summary);
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, XLSX_CONTENT_TYPE),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"reconciliacion.xlsx\"",
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Ok(Err(e)) => recon_error_response(e),
        Err(e) => {
            error!("Reconciliation task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Reconciliation task failed")
        }
    }
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/sheets", post(classify_sheets))
        .route("/reconcile", post(reconcile))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    println!("🌐 Parking Reconciliation - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config_path =
        std::env::var("PARKING_RECON_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = match AppConfig::load(std::path::Path::new(&config_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };
    println!("✓ Configuration loaded: {}", config_path);

    let registry = match ComplexRegistry::load(&config.authorization.list_path) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("❌ Could not read authorized list: {}", e);
            std::process::exit(1);
        }
    };
    println!("✓ {} authorized complexes", registry.len());

    let state = AppState {
        config: Arc::new(config),
        registry: Arc::new(registry),
    };

    let addr = "0.0.0.0:3000";
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("❌ Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    println!("\n🚀 Server running on http://localhost:3000");
    println!("   POST /api/sheets     (username, password, app)");
    println!("   POST /api/reconcile  (username, password, app, rates, sisco)");
    println!("\n   Press Ctrl+C to stop\n");

    if let Err(e) = axum::serve(listener, router(state)).await {
        eprintln!("❌ Server error: {}", e);
        std::process::exit(1);
    }
}
