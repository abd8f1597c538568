//! HTTP routes over [`RagPipeline`].

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
};
use flare_rag::{
    CollectionAction, CollectionInfo, CollectionUpdate, ConditionSpec, Distance, Document,
    DocumentFormat, Filter, IngestReport, ManageOutcome, Payload, QueryResponse, RagError,
    RagPipeline, SearchOptions, SearchResult, extract_text, pipeline::merge_payloads,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::error::{ApiError, ApiResult};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RagPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<RagPipeline>) -> Self {
        Self { pipeline }
    }
}

fn default_collection() -> String {
    "default_collection".to_string()
}

fn default_filter_type() -> String {
    "must".to_string()
}

/// Distinguish an explicit `null` (`Some(None)`) from an absent field (`None`).
fn explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
pub struct CreateCollectionRequest {
    #[serde(default = "default_collection")]
    pub collection_name: String,
    pub vector_size: Option<usize>,
    pub distance: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddRequest {
    #[serde(default = "default_collection")]
    pub collection_name: String,
    pub chunk: String,
    #[serde(default)]
    pub payloads: Vec<Payload>,
}

#[derive(Debug, Serialize)]
pub struct AddResponse {
    pub message: String,
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    #[serde(default = "default_collection")]
    pub collection: String,
    pub format: Option<String>,
    pub encoding: Option<String>,
    pub filename: Option<String>,
}

/// Search parameters shared by `/search` and `/query`.
#[derive(Debug, Deserialize)]
pub struct SearchBody {
    #[serde(default = "default_collection")]
    pub collection_name: String,
    pub query: String,
    pub limit: Option<usize>,
    /// Absent uses the configured floor; `null` disables it.
    #[serde(default, deserialize_with = "explicit_null")]
    pub score_threshold: Option<Option<f32>>,
    pub payload_filter: Option<Payload>,
    pub filter_conditions: Option<Vec<ConditionSpec>>,
    #[serde(default = "default_filter_type")]
    pub filter_type: String,
}

impl SearchBody {
    fn options(&self, defaults: SearchOptions) -> Result<SearchOptions, RagError> {
        let filter = Filter::from_request(
            self.payload_filter.as_ref(),
            self.filter_conditions.as_deref(),
            &self.filter_type,
        )?;
        let threshold = self.score_threshold.unwrap_or(defaults.score_threshold);
        Ok(SearchOptions::new(self.limit.unwrap_or(defaults.limit))
            .with_score_threshold(threshold)
            .with_filter(filter))
    }
}

#[derive(Debug, Deserialize)]
pub struct QueryBody {
    pub instruction: String,
    #[serde(flatten)]
    pub search: SearchBody,
}

#[derive(Debug, Deserialize)]
pub struct ManageRequest {
    pub action: String,
    pub settings: Option<CollectionUpdate>,
}

pub fn app_router(state: AppState, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/collections", get(list_collections))
        .route("/collection/create", post(create_collection))
        .route("/collection/{name}", delete(delete_collection).patch(update_collection))
        .route("/collection/{name}/info", get(collection_info))
        .route("/collection/{name}/manage", post(manage_collection))
        .route("/add", post(add_chunk))
        .route("/upload", post(upload_document))
        .route("/search", post(search))
        .route("/query", post(query))
        .with_state(state)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": "flare-server"}))
}

async fn list_collections(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let collections = state.pipeline.list_collections().await?;
    Ok(Json(json!({ "collections": collections })))
}

async fn create_collection(
    State(state): State<AppState>,
    Json(request): Json<CreateCollectionRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let distance = request.distance.as_deref().map(str::parse::<Distance>).transpose()?;
    state
        .pipeline
        .create_collection(&request.collection_name, request.vector_size, distance)
        .await?;
    let message = format!("Collection {} created successfully", request.collection_name);
    Ok((StatusCode::CREATED, Json(json!({ "message": message }))))
}

async fn delete_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    state.pipeline.delete_collection(&name).await?;
    Ok(Json(json!({ "message": format!("Collection {name} deleted successfully") })))
}

async fn update_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(update): Json<CollectionUpdate>,
) -> ApiResult<Json<Value>> {
    state.pipeline.update_collection(&name, update).await?;
    Ok(Json(json!({ "message": format!("Collection {name} updated successfully") })))
}

async fn collection_info(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<CollectionInfo>> {
    Ok(Json(state.pipeline.collection_info(&name).await?))
}

async fn manage_collection(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ManageRequest>,
) -> ApiResult<Json<ManageOutcome>> {
    let action = CollectionAction::parse(&request.action, request.settings)?;
    Ok(Json(state.pipeline.manage(&name, action).await?))
}

async fn add_chunk(
    State(state): State<AppState>,
    Json(request): Json<AddRequest>,
) -> ApiResult<Json<AddResponse>> {
    let payload = merge_payloads(&request.payloads);
    let id = state.pipeline.ingest_chunk(&request.collection_name, &request.chunk, &payload).await?;
    Ok(Json(AddResponse { message: "Vectors added successfully".to_string(), id }))
}

async fn upload_document(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    body: Bytes,
) -> ApiResult<Json<IngestReport>> {
    let format = match (&params.format, &params.filename) {
        (Some(format), _) => format.parse::<DocumentFormat>()?,
        (None, Some(filename)) => DocumentFormat::from_path(std::path::Path::new(filename))?,
        (None, None) => DocumentFormat::Text,
    };
    let mut document = Document::from_bytes(body.to_vec(), format);
    if let Some(encoding) = params.encoding {
        document = document.with_encoding(encoding);
    }

    let extracted = tokio::task::spawn_blocking(move || extract_text(&document))
        .await
        .map_err(|e| ApiError(RagError::PipelineError(format!("extraction task failed: {e}"))))??;

    let mut payload = Payload::new();
    if let Some(filename) = params.filename {
        payload.insert("source".to_string(), Value::String(filename));
    }
    let point_ids = state.pipeline.ingest_text(&params.collection, &extracted.text, &payload).await?;
    info!(
        collection = %params.collection,
        %format,
        chunk_count = point_ids.len(),
        "document uploaded"
    );
    Ok(Json(IngestReport { point_ids, encoding: extracted.encoding }))
}

async fn search(
    State(state): State<AppState>,
    Json(body): Json<SearchBody>,
) -> ApiResult<Json<Vec<SearchResult>>> {
    let options = body.options(state.pipeline.search_options())?;
    let results = state.pipeline.search(&body.collection_name, &body.query, options).await?;
    Ok(Json(results))
}

async fn query(
    State(state): State<AppState>,
    Json(body): Json<QueryBody>,
) -> ApiResult<Json<QueryResponse>> {
    let search = &body.search;
    let options = search.options(state.pipeline.search_options())?;
    let response = state
        .pipeline
        .query(&search.collection_name, &body.instruction, &search.query, options)
        .await?;
    Ok(Json(response))
}
