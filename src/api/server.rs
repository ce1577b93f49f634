//! HTTP server implementation

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use tower_http::compression::CompressionLayer;
use tower_http::cors::Any;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handlers::AppState;
use crate::api::routes;
use crate::config::AppConfig;
use crate::detector::FashionDetector;
use crate::features::FeatureExtractor;
use crate::index::VectorSearch;
use crate::pipeline::OutfitAnalyzer;
use crate::Result;

/// Uploaded outfit photos top out well under this
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

/// Start the API server
pub async fn serve_api(
    config: &AppConfig,
    host: String,
    port: u16,
    enable_cors: bool,
) -> Result<()> {
    info!("Starting StyleSnap API server...");

    // Initialize services once; requests share them for the process lifetime
    let detector = Arc::new(FashionDetector::from_config(config)?);
    let extractor = Arc::new(FeatureExtractor::from_config(config)?);
    let search = Arc::new(VectorSearch::from_config(config).await?);

    let analyzer = Arc::new(OutfitAnalyzer::new(
        detector,
        extractor,
        search,
        config.confidence_threshold(),
    )?);

    let state = AppState { analyzer };

    let mut app = routes::api_routes(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    if enable_cors {
        info!("CORS enabled");
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("API server listening on http://{}", addr);
    info!("Available endpoints:");
    info!("  GET  /                - Service metadata");
    info!("  GET  /health          - Health check");
    info!("  POST /detect          - Detect fashion items (multipart image)");
    info!("  POST /search          - Similar-product search (JSON, base64 image)");
    info!("  POST /analyze-outfit  - Detect + per-item search (multipart image)");

    axum::serve(listener, app).await?;

    Ok(())
}
