//! API request handlers

use std::sync::Arc;

use axum::extract::Multipart;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::error;
use tracing::info;

use crate::api::types::decode_base64_image;
use crate::api::types::AnalyzeOutfitResponse;
use crate::api::types::DetectedItemResponse;
use crate::api::types::ErrorResponse;
use crate::api::types::HealthResponse;
use crate::api::types::SearchRequest;
use crate::api::types::SearchResponse;
use crate::api::types::ServiceInfo;
use crate::api::types::TopKParams;
use crate::errors::StyleSnapError;
use crate::pipeline::OutfitAnalyzer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<OutfitAnalyzer>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a pipeline error to its HTTP status. Bad input is the caller's
/// fault; everything else is ours.
fn into_api_error(err: &StyleSnapError) -> ApiError {
    let status = match err {
        StyleSnapError::InvalidImage(_) | StyleSnapError::DimensionMismatch { .. } => {
            StatusCode::BAD_REQUEST
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

fn bad_request(message: &str) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
}

/// Pull the uploaded image out of a multipart form's `file` field
async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(&format!("malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| bad_request(&format!("could not read upload: {e}")))?;
            return Ok(bytes.to_vec());
        }
    }
    Err(bad_request("missing multipart field 'file'"))
}

/// Service metadata (GET /)
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        service: "StyleSnap CV Service",
        version: env!("CARGO_PKG_VERSION"),
        status: "running",
    })
}

/// Liveness check (GET /health)
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

/// Detect fashion items in an uploaded image (POST /detect)
pub async fn detect(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<Vec<DetectedItemResponse>>, ApiError> {
    let bytes = read_upload(multipart).await?;

    let items = state
        .analyzer
        .detect_items(&bytes)
        .await
        .map_err(|e| into_api_error(&e))?;

    let mut results = Vec::with_capacity(items.len());
    for item in &items {
        results.push(DetectedItemResponse::from_item(item).map_err(|e| into_api_error(&e))?);
    }

    info!("POST /detect returned {} items", results.len());
    Ok(Json(results))
}

/// Search the catalog with a query image (POST /search)
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let bytes = decode_base64_image(&request.image_base64).map_err(|e| into_api_error(&e))?;

    let results = state
        .analyzer
        .search_similar(&bytes, request.top_k, request.category_filter)
        .await
        .map_err(|e| {
            error!("Search failed: {}", e);
            into_api_error(&e)
        })?;

    info!("POST /search returned {} results", results.len());
    Ok(Json(SearchResponse { results }))
}

/// Full pipeline: detect items and retrieve similar products per item
/// (POST /analyze-outfit)
pub async fn analyze_outfit(
    State(state): State<AppState>,
    Query(params): Query<TopKParams>,
    multipart: Multipart,
) -> Result<Json<AnalyzeOutfitResponse>, ApiError> {
    let bytes = read_upload(multipart).await?;

    let analysis = state
        .analyzer
        .analyze_outfit(&bytes, params.top_k)
        .await
        .map_err(|e| into_api_error(&e))?;

    let response =
        AnalyzeOutfitResponse::from_analysis(&analysis).map_err(|e| into_api_error(&e))?;
    info!("POST /analyze-outfit returned {} items", response.items.len());
    Ok(Json(response))
}
