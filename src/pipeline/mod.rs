//! Retrieval orchestrator: Detector -> Feature Codec -> Vector Index.
//!
//! Failure policy follows partial-success over all-or-nothing. A detector
//! failure degrades to "no items detected"; a per-item extraction or search
//! failure drops that item and keeps the rest. Only whole-request failures,
//! undecodable images and malformed query vectors, propagate to the caller.

use std::sync::Arc;

use image::DynamicImage;
use image::RgbImage;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::detector::DetectedItem;
use crate::detector::FashionDetector;
use crate::errors::Result;
use crate::errors::StyleSnapError;
use crate::features::FeatureBundle;
use crate::features::FeatureExtractor;
use crate::index::SearchFilters;
use crate::index::SearchResult;
use crate::index::VectorSearch;

/// Detection stage seam. The production implementation runs the ONNX
/// detector; tests substitute deterministic stand-ins.
pub trait ItemDetector: Send + Sync {
    fn detect(
        &self,
        image: &DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<DetectedItem>>;
}

impl ItemDetector for FashionDetector {
    fn detect(
        &self,
        image: &DynamicImage,
        confidence_threshold: f32,
    ) -> Result<Vec<DetectedItem>> {
        FashionDetector::detect(self, image, confidence_threshold)
    }
}

/// Feature extraction stage seam
pub trait FeatureCodec: Send + Sync {
    fn extract_all(&self, image: &RgbImage) -> FeatureBundle;
    fn combined_dim(&self) -> usize;
}

impl FeatureCodec for FeatureExtractor {
    fn extract_all(&self, image: &RgbImage) -> FeatureBundle {
        FeatureExtractor::extract_all(self, image)
    }

    fn combined_dim(&self) -> usize {
        FeatureExtractor::combined_dim(self)
    }
}

/// One detected item together with its catalog matches
#[derive(Debug, Clone)]
pub struct AnalyzedItem {
    pub item: DetectedItem,
    pub similar_products: Vec<SearchResult>,
}

/// Result of a full outfit analysis. An empty `items` list is a valid
/// outcome, not an error.
#[derive(Debug, Clone, Default)]
pub struct OutfitAnalysis {
    pub items: Vec<AnalyzedItem>,
}

/// Wires the three pipeline stages together.
///
/// Constructed once at startup with the loaded models and the connected
/// index, then shared across requests. The models themselves serialize
/// inference internally, so this type is cheap to clone through its `Arc`s.
pub struct OutfitAnalyzer {
    detector: Arc<dyn ItemDetector>,
    extractor: Arc<dyn FeatureCodec>,
    search: Arc<VectorSearch>,
    confidence_threshold: f32,
}

impl OutfitAnalyzer {
    /// Assemble the pipeline, verifying up front that the feature codec and
    /// the index agree on the vector dimension.
    ///
    /// # Errors
    /// - `DimensionMismatch` when the combined feature dimension differs from
    ///   the index dimension; nothing useful can be served in that state
    pub fn new(
        detector: Arc<dyn ItemDetector>,
        extractor: Arc<dyn FeatureCodec>,
        search: Arc<VectorSearch>,
        confidence_threshold: f32,
    ) -> Result<Self> {
        if extractor.combined_dim() != search.dimension() {
            return Err(StyleSnapError::DimensionMismatch {
                expected: search.dimension(),
                actual: extractor.combined_dim(),
            });
        }
        Ok(Self {
            detector,
            extractor,
            search,
            confidence_threshold,
        })
    }

    /// Detect clothing items in raw image bytes.
    ///
    /// Detector-internal failures degrade to an empty list with a warning;
    /// they never surface to the caller.
    ///
    /// # Errors
    /// - `InvalidImage` when the bytes cannot be decoded
    pub async fn detect_items(&self, bytes: &[u8]) -> Result<Vec<DetectedItem>> {
        let image = crate::decode_image(bytes)?;
        let detector = Arc::clone(&self.detector);
        let threshold = self.confidence_threshold;

        let outcome = tokio::task::spawn_blocking(move || detector.detect(&image, threshold))
            .await
            .map_err(|e| StyleSnapError::Detection(format!("detection task failed: {e}")))?;

        match outcome {
            Ok(items) => Ok(items),
            Err(e) => {
                warn!("Detection failed, returning no items: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// Detect items, then retrieve `top_k` similar products per item.
    ///
    /// No category filter is applied: detector labels are noisier than
    /// embedding similarity, so embeddings alone decide the ranking.
    ///
    /// # Errors
    /// - `InvalidImage` when the bytes cannot be decoded
    pub async fn analyze_outfit(&self, bytes: &[u8], top_k: usize) -> Result<OutfitAnalysis> {
        let detected = self.detect_items(bytes).await?;
        if detected.is_empty() {
            info!("No fashion items detected in outfit image");
            return Ok(OutfitAnalysis::default());
        }

        let mut items = Vec::with_capacity(detected.len());
        for item in detected {
            match self.similar_for_crop(&item.crop, top_k).await {
                Ok(similar_products) => items.push(AnalyzedItem {
                    item,
                    similar_products,
                }),
                Err(e) => {
                    error!(
                        "Skipping {} item after retrieval failure: {}",
                        item.category, e
                    );
                }
            }
        }

        Ok(OutfitAnalysis { items })
    }

    /// Search the catalog with a whole query image, optionally restricted to
    /// one category. Index unavailability degrades to empty results; a
    /// malformed query vector fails the request.
    ///
    /// # Errors
    /// - `InvalidImage` when the bytes cannot be decoded
    /// - `DimensionMismatch` for a query vector the index cannot accept
    pub async fn search_similar(
        &self,
        bytes: &[u8],
        top_k: usize,
        category_filter: Option<String>,
    ) -> Result<Vec<SearchResult>> {
        let image = crate::decode_image(bytes)?.to_rgb8();
        let embedding = self.extract_combined(image).await?;

        let filters = SearchFilters {
            category: category_filter,
            ..SearchFilters::default()
        };
        match self.search.search(&embedding, top_k, &filters).await {
            Ok(results) => Ok(results),
            Err(e @ StyleSnapError::DimensionMismatch { .. }) => Err(e),
            Err(e) => {
                warn!("Similarity search failed, returning no results: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// Extract and search for one item crop; index errors propagate to the
    /// per-item handler in `analyze_outfit`.
    async fn similar_for_crop(&self, crop: &RgbImage, top_k: usize) -> Result<Vec<SearchResult>> {
        let embedding = self.extract_combined(crop.clone()).await?;
        self.search
            .search(&embedding, top_k, &SearchFilters::default())
            .await
    }

    /// Run the feature codec off the async runtime and return the combined
    /// vector. Extraction itself degrades internally and cannot fail; only a
    /// crashed worker task surfaces here.
    async fn extract_combined(&self, image: RgbImage) -> Result<Vec<f32>> {
        let extractor = Arc::clone(&self.extractor);
        let bundle = tokio::task::spawn_blocking(move || extractor.extract_all(&image))
            .await
            .map_err(|e| StyleSnapError::Embedding(format!("extraction task failed: {e}")))?;
        Ok(bundle.combined)
    }

    #[must_use]
    pub const fn confidence_threshold(&self) -> f32 {
        self.confidence_threshold
    }

    #[must_use]
    pub fn index(&self) -> &VectorSearch {
        &self.search
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;
    use image::RgbImage;

    use super::*;
    use crate::detector::BBox;
    use crate::detector::Mask;
    use crate::index::CatalogEntry;
    use crate::index::ProductMetadata;
    use crate::normalize_l2;

    const DIM: usize = 6;

    /// Yields a fixed number of items with crop widths 2, 3, 4, ...
    struct FixedDetector {
        item_count: usize,
    }

    impl ItemDetector for FixedDetector {
        fn detect(&self, image: &DynamicImage, _threshold: f32) -> Result<Vec<DetectedItem>> {
            let (w, h) = (image.width(), image.height());
            Ok((0..self.item_count)
                .map(|i| {
                    let bbox = BBox {
                        x1: 0,
                        y1: 0,
                        x2: 2 + i as u32,
                        y2: 2,
                    };
                    DetectedItem {
                        category: "shirt".to_string(),
                        bbox,
                        confidence: 0.9,
                        mask: Mask::filled_rect(w, h, &bbox),
                        crop: RgbImage::from_pixel(bbox.width(), 2, Rgb([10, 10, 10])),
                    }
                })
                .collect())
        }
    }

    struct FailingDetector;

    impl ItemDetector for FailingDetector {
        fn detect(&self, _image: &DynamicImage, _threshold: f32) -> Result<Vec<DetectedItem>> {
            Err(StyleSnapError::Detection("inference failed".to_string()))
        }
    }

    /// Emits a well-formed unit vector for every crop
    struct UnitCodec;

    impl FeatureCodec for UnitCodec {
        fn extract_all(&self, _image: &RgbImage) -> FeatureBundle {
            let mut combined = vec![1.0; DIM];
            normalize_l2(&mut combined);
            FeatureBundle {
                deep_embedding: vec![1.0; DIM - 2],
                color_histogram: vec![0.0; 2],
                dominant_color: "black",
                combined,
            }
        }

        fn combined_dim(&self) -> usize {
            DIM
        }
    }

    /// Emits a malformed (wrong-dimension) vector for any image that is not
    /// exactly 2 pixels wide
    struct WidthSensitiveCodec;

    impl FeatureCodec for WidthSensitiveCodec {
        fn extract_all(&self, image: &RgbImage) -> FeatureBundle {
            let dim = if image.width() == 2 { DIM } else { DIM + 1 };
            let mut combined = vec![1.0; dim];
            normalize_l2(&mut combined);
            FeatureBundle {
                deep_embedding: Vec::new(),
                color_histogram: Vec::new(),
                dominant_color: "black",
                combined,
            }
        }

        fn combined_dim(&self) -> usize {
            DIM
        }
    }

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(8, 8, Rgb([50, 60, 70]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(
                &mut std::io::Cursor::new(&mut bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        bytes
    }

    async fn seeded_index() -> Arc<VectorSearch> {
        let index = VectorSearch::in_memory(DIM);
        let entries = ["prod-a", "prod-b"]
            .iter()
            .map(|id| {
                let mut embedding = vec![1.0; DIM];
                normalize_l2(&mut embedding);
                CatalogEntry {
                    product_id: (*id).to_string(),
                    embedding,
                    metadata: ProductMetadata::default(),
                }
            })
            .collect();
        index.upsert_batch(entries).await.unwrap();
        Arc::new(index)
    }

    fn analyzer(
        detector: Arc<dyn ItemDetector>,
        extractor: Arc<dyn FeatureCodec>,
        search: Arc<VectorSearch>,
    ) -> OutfitAnalyzer {
        OutfitAnalyzer::new(detector, extractor, search, 0.5).unwrap()
    }

    #[test]
    fn test_constructor_rejects_dimension_disagreement() {
        let result = OutfitAnalyzer::new(
            Arc::new(FixedDetector { item_count: 1 }),
            Arc::new(UnitCodec),
            Arc::new(VectorSearch::in_memory(DIM + 10)),
            0.5,
        );
        assert!(matches!(
            result,
            Err(StyleSnapError::DimensionMismatch {
                expected,
                actual: DIM
            }) if expected == DIM + 10
        ));
    }

    #[tokio::test]
    async fn test_detector_failure_degrades_to_no_items() {
        let pipeline = analyzer(
            Arc::new(FailingDetector),
            Arc::new(UnitCodec),
            seeded_index().await,
        );

        let items = pipeline.detect_items(&png_bytes()).await.unwrap();
        assert!(items.is_empty());

        let analysis = pipeline.analyze_outfit(&png_bytes(), 3).await.unwrap();
        assert!(analysis.items.is_empty());
    }

    #[tokio::test]
    async fn test_undecodable_bytes_propagate() {
        let pipeline = analyzer(
            Arc::new(FixedDetector { item_count: 1 }),
            Arc::new(UnitCodec),
            seeded_index().await,
        );
        assert!(matches!(
            pipeline.detect_items(b"not an image").await,
            Err(StyleSnapError::InvalidImage(_))
        ));
        assert!(matches!(
            pipeline.analyze_outfit(b"not an image", 3).await,
            Err(StyleSnapError::InvalidImage(_))
        ));
    }

    #[tokio::test]
    async fn test_analyze_outfit_zero_detections_is_valid_empty() {
        let pipeline = analyzer(
            Arc::new(FixedDetector { item_count: 0 }),
            Arc::new(UnitCodec),
            seeded_index().await,
        );
        let analysis = pipeline.analyze_outfit(&png_bytes(), 3).await.unwrap();
        assert!(analysis.items.is_empty());
    }

    #[tokio::test]
    async fn test_analyze_outfit_matches_per_item() {
        let pipeline = analyzer(
            Arc::new(FixedDetector { item_count: 2 }),
            Arc::new(UnitCodec),
            seeded_index().await,
        );

        let analysis = pipeline.analyze_outfit(&png_bytes(), 2).await.unwrap();
        assert_eq!(analysis.items.len(), 2);
        for analyzed in &analysis.items {
            assert_eq!(analyzed.similar_products.len(), 2);
            assert!(
                analyzed.similar_products[0].similarity_score
                    >= analyzed.similar_products[1].similarity_score
            );
        }
    }

    #[tokio::test]
    async fn test_per_item_failure_omits_only_that_item() {
        // Two detected items; the codec malforms the second crop's vector,
        // so its index query fails and only the first item survives
        let pipeline = analyzer(
            Arc::new(FixedDetector { item_count: 2 }),
            Arc::new(WidthSensitiveCodec),
            seeded_index().await,
        );

        let analysis = pipeline.analyze_outfit(&png_bytes(), 2).await.unwrap();
        assert_eq!(analysis.items.len(), 1);
        assert_eq!(analysis.items[0].item.bbox.width(), 2);
    }

    #[tokio::test]
    async fn test_search_degrades_on_index_unavailable() {
        let pipeline = analyzer(
            Arc::new(FixedDetector { item_count: 1 }),
            Arc::new(UnitCodec),
            Arc::new(VectorSearch::unavailable(DIM)),
        );
        let results = pipeline.search_similar(&png_bytes(), 5, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_rejects_malformed_query_vector() {
        // The whole 8x8 query image trips the codec into a wrong dimension
        let pipeline = analyzer(
            Arc::new(FixedDetector { item_count: 1 }),
            Arc::new(WidthSensitiveCodec),
            seeded_index().await,
        );
        assert!(matches!(
            pipeline.search_similar(&png_bytes(), 5, None).await,
            Err(StyleSnapError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_index_unavailable_drops_all_outfit_items() {
        let pipeline = analyzer(
            Arc::new(FixedDetector { item_count: 2 }),
            Arc::new(UnitCodec),
            Arc::new(VectorSearch::unavailable(DIM)),
        );
        let analysis = pipeline.analyze_outfit(&png_bytes(), 2).await.unwrap();
        assert!(analysis.items.is_empty());
    }
}
