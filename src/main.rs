//! LSI metadata server - multi-level configuration and field mapping for
//! Lightning Source title setup files.

mod checkpoint;
mod completion;
mod config;
mod error;
mod loaders;
mod lsi_headers;
mod mapping;
mod metadata;
mod openrouter;
mod pipeline;
mod report;
mod settings;
mod validation;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use checkpoint::CheckpointManager;
use config::ConfigurationContext;
use mapping::MappedRow;
use metadata::CodexMetadata;
use pipeline::Pipeline;
use report::BatchReport;
use serde_json::Value;
use settings::Settings;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
    output_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "lsi_metadata=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env();
    info!("Settings: {:?}", settings);

    let pipeline = Pipeline::from_settings(&settings)?;
    let state = AppState {
        pipeline: Arc::new(pipeline),
        output_dir: settings.output_dir.clone(),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/headers", get(headers))
        .route("/configs", get(list_configs))
        .route("/configs/:kind/:name", get(get_config).post(create_config))
        .route("/configuration/info", post(configuration_info))
        .route("/preview", post(preview))
        .route("/preview/row", post(preview_row))
        .route("/batch", post(run_batch))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    info!("Server listening on http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

/// LSI column headers in file order.
async fn headers(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.pipeline.headers().to_vec())
}

/// Publisher, imprint and tranche names.
async fn list_configs(State(state): State<AppState>) -> Json<BTreeMap<&'static str, Vec<String>>> {
    Json(state.pipeline.hierarchy().listing())
}

/// One publisher / imprint / tranche config.
async fn get_config(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> Result<Json<Value>, StatusCode> {
    state
        .pipeline
        .hierarchy()
        .entity_json(&kind, &name)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

#[derive(serde::Deserialize)]
struct CreateConfigRequest {
    template: String,
    #[serde(default)]
    overrides: serde_json::Map<String, Value>,
}

/// New publisher / imprint / tranche config copied from an existing one.
async fn create_config(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
    Json(request): Json<CreateConfigRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, String)> {
    state
        .pipeline
        .create_config(&kind, &request.template, &name, request.overrides)
        .map(|created| (StatusCode::CREATED, Json(created)))
        .map_err(|e| {
            error!("Config creation failed: {:#}", e);
            (StatusCode::BAD_REQUEST, format!("{:#}", e))
        })
}

#[derive(serde::Deserialize)]
struct InfoRequest {
    key: Option<String>,
    #[serde(default)]
    context: ConfigurationContext,
}

/// Where a configuration value comes from; every key when none is given.
async fn configuration_info(
    State(state): State<AppState>,
    Json(request): Json<InfoRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let configuration = state.pipeline.configuration();
    let context = state.pipeline.hierarchy().complete_context(request.context);
    let info = match request.key.as_deref() {
        Some(key) => serde_json::to_value(configuration.get_configuration_info(key, &context)),
        None => serde_json::to_value(configuration.list_all_configurations(&context)),
    };
    info.map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to encode info: {}", e)))
}

#[derive(serde::Deserialize)]
struct PreviewRequest {
    metadata: CodexMetadata,
    #[serde(default)]
    context: ConfigurationContext,
}

/// Map one book without writing output.
async fn preview(
    State(state): State<AppState>,
    Json(request): Json<PreviewRequest>,
) -> Json<MappedRow> {
    Json(state.pipeline.preview(&request.metadata, request.context).await)
}

/// Map one book into a header-ordered row.
async fn preview_row(
    State(state): State<AppState>,
    Json(request): Json<PreviewRequest>,
) -> Json<Vec<String>> {
    Json(state.pipeline.row(&request.metadata, request.context).await)
}

#[derive(serde::Deserialize)]
struct BatchRequest {
    books: Vec<CodexMetadata>,
    #[serde(default)]
    context: ConfigurationContext,
    /// Output file name inside the output directory.
    output: Option<String>,
}

/// Map a batch into a checkpointed CSV.
async fn run_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchReport>, (StatusCode, String)> {
    if request.books.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No books in batch".to_string()));
    }
    let file_name = output_file_name(request.output.as_deref(), &request.context);
    let path = state.output_dir.join(file_name);

    let mut checkpoint = CheckpointManager::open(&path, state.pipeline.headers().to_vec()).map_err(|e| {
        error!("Checkpoint open failed: {:#}", e);
        (StatusCode::CONFLICT, format!("Cannot use {:?}: {:#}", path, e))
    })?;

    let report = state
        .pipeline
        .run_batch(&request.books, request.context, Some(&mut checkpoint))
        .await
        .map_err(|e| {
            error!("Batch failed: {:#}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Batch failed: {:#}", e))
        })?;

    info!("Batch written to {:?}", path);
    Ok(Json(report))
}

/// `<name>.csv` with path separators and other odd characters removed.
fn output_file_name(requested: Option<&str>, context: &ConfigurationContext) -> String {
    let stem = requested
        .map(|r| r.trim().trim_end_matches(".csv").to_string())
        .filter(|r| !r.is_empty())
        .or_else(|| context.tranche_name.clone())
        .unwrap_or_else(|| "lsi_batch".to_string());
    let clean: String = stem
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{}.csv", clean)
}
