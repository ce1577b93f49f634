//! API request/response types

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde::Serialize;

use crate::detector::DetectedItem;
use crate::errors::Result;
use crate::errors::StyleSnapError;
use crate::index::SearchResult;
use crate::pipeline::OutfitAnalysis;

/// One detected item shaped for transport, crop included as base64 JPEG
#[derive(Debug, Clone, Serialize)]
pub struct DetectedItemResponse {
    pub category: String,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in source-image pixel coordinates
    pub bbox: [u32; 4],
    pub cropped_image_base64: String,
}

impl DetectedItemResponse {
    /// Shape a detected item for the wire, JPEG-encoding its crop
    ///
    /// # Errors
    /// - JPEG encoding failures
    pub fn from_item(item: &DetectedItem) -> Result<Self> {
        let mut jpeg = Vec::new();
        item.crop
            .write_to(
                &mut std::io::Cursor::new(&mut jpeg),
                image::ImageFormat::Jpeg,
            )
            .map_err(|e| {
                StyleSnapError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("could not encode crop: {e}"),
                ))
            })?;

        Ok(Self {
            category: item.category.clone(),
            confidence: item.confidence,
            bbox: item.bbox.as_array(),
            cropped_image_base64: BASE64.encode(&jpeg),
        })
    }
}

fn default_search_top_k() -> usize {
    5
}

/// `POST /search` request body
#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub image_base64: String,
    #[serde(default = "default_search_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub category_filter: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
}

/// One analyzed outfit item with its catalog matches
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedItemResponse {
    pub detected_item: DetectedItemResponse,
    pub similar_products: Vec<SearchResult>,
}

/// `POST /analyze-outfit` response. `message` only appears when no items
/// were detected.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeOutfitResponse {
    pub items: Vec<AnalyzedItemResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AnalyzeOutfitResponse {
    /// Shape an outfit analysis for the wire. An empty analysis gets the
    /// explanatory message instead of a bare empty list.
    ///
    /// # Errors
    /// - JPEG encoding failures while shaping item crops
    pub fn from_analysis(analysis: &OutfitAnalysis) -> Result<Self> {
        if analysis.items.is_empty() {
            return Ok(Self {
                items: Vec::new(),
                message: Some("No fashion items detected".to_string()),
            });
        }

        let mut items = Vec::with_capacity(analysis.items.len());
        for analyzed in &analysis.items {
            items.push(AnalyzedItemResponse {
                detected_item: DetectedItemResponse::from_item(&analyzed.item)?,
                similar_products: analyzed.similar_products.clone(),
            });
        }
        Ok(Self {
            items,
            message: None,
        })
    }
}

fn default_analyze_top_k() -> usize {
    1
}

/// Query parameters for `POST /analyze-outfit`
#[derive(Debug, Clone, Deserialize)]
pub struct TopKParams {
    #[serde(default = "default_analyze_top_k")]
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Error body for non-2xx responses
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Decode a base64 image payload from a JSON request
///
/// # Errors
/// - `InvalidImage` for malformed base64
pub fn decode_base64_image(payload: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(payload)
        .map_err(|e| StyleSnapError::InvalidImage(format!("invalid base64 image data: {e}")))
}
