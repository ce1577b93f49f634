//! Feature codec: visual embeddings and color descriptors for item crops
//!
//! A crop goes through three extractors:
//! - a deep embedding from a pretrained backbone with its classifier removed
//! - an HSV color histogram
//! - a dominant color name
//!
//! The `combined` vector is what gets indexed and queried. Its layout and
//! weighting are fixed policy: changing them requires re-ingesting the whole
//! catalog, so they are constants rather than configuration.

pub mod backbone;
pub mod color;

use std::sync::Mutex;

use image::RgbImage;
use tracing::info;
use tracing::warn;

pub use color::color_histogram;
pub use color::dominant_color;

use crate::config::AppConfig;
use crate::errors::Result;
use crate::normalize_l2;

/// Weight applied to the L2-normalized deep embedding
pub const DEEP_WEIGHT: f32 = 0.8;
/// Weight applied to the L2-normalized color histogram
pub const COLOR_WEIGHT: f32 = 0.2;

/// All features extracted from a single item crop
#[derive(Debug, Clone)]
pub struct FeatureBundle {
    pub deep_embedding: Vec<f32>,
    pub color_histogram: Vec<f32>,
    pub dominant_color: &'static str,
    /// Unit-normalized weighted concatenation; this is the indexed vector
    pub combined: Vec<f32>,
}

/// Extracts visual features from fashion item crops.
///
/// The backbone is loaded once at construction and shared read-only for the
/// process lifetime; inference calls are serialized through a mutex because
/// reloading the model per call would dwarf any contention cost.
pub struct FeatureExtractor {
    plan: Mutex<backbone::OnnxPlan>,
    embedding_dim: usize,
    input_size: u32,
    histogram_bins: usize,
}

impl FeatureExtractor {
    /// Load the backbone from configuration
    ///
    /// # Errors
    /// - Missing or unreadable model weights
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let plan = backbone::load_onnx_model(
            &config.features.model_path,
            config.features.input_size,
        )?;
        info!(
            "Loaded feature backbone from {} ({}d)",
            config.features.model_path, config.features.embedding_dim
        );

        Ok(Self {
            plan: Mutex::new(plan),
            embedding_dim: config.features.embedding_dim,
            input_size: config.features.input_size,
            histogram_bins: config.features.histogram_bins,
        })
    }

    /// Extract the deep embedding for a crop
    ///
    /// # Errors
    /// - Backbone inference failures
    /// - Output dimension mismatch
    pub fn extract_embedding(&self, image: &RgbImage) -> Result<Vec<f32>> {
        let input = backbone::preprocess(image, self.input_size);
        let plan = self
            .plan
            .lock()
            .map_err(|_| crate::StyleSnapError::Embedding("backbone lock poisoned".to_string()))?;
        backbone::forward(&plan, input, self.embedding_dim)
    }

    /// Extract everything, degrading a failed embedding to a zero vector.
    ///
    /// Embedding failure must not abort a batch run over thousands of crops;
    /// the zero vector yields a meaningless similarity instead of an error.
    pub fn extract_all(&self, image: &RgbImage) -> FeatureBundle {
        let deep_embedding = match self.extract_embedding(image) {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("Embedding extraction failed, using zero vector: {}", e);
                vec![0.0; self.embedding_dim]
            }
        };

        let color_histogram = color::color_histogram(image, self.histogram_bins);
        let dominant_color = color::dominant_color(image);
        let combined = combine(&deep_embedding, &color_histogram);

        FeatureBundle {
            deep_embedding,
            color_histogram,
            dominant_color,
            combined,
        }
    }

    /// Dimension of the combined (indexed) vector
    #[must_use]
    pub const fn combined_dim(&self) -> usize {
        self.embedding_dim + 3 * self.histogram_bins
    }

    /// Dimension of the raw backbone embedding
    #[must_use]
    pub const fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }
}

/// Build the combined vector: each part L2-normalized, weighted, concatenated,
/// and the concatenation normalized to unit length.
#[must_use]
pub fn combine(deep_embedding: &[f32], color_histogram: &[f32]) -> Vec<f32> {
    let mut deep = deep_embedding.to_vec();
    let mut hist = color_histogram.to_vec();
    normalize_l2(&mut deep);
    normalize_l2(&mut hist);

    let mut combined = Vec::with_capacity(deep.len() + hist.len());
    combined.extend(deep.iter().map(|x| x * DEEP_WEIGHT));
    combined.extend(hist.iter().map(|x| x * COLOR_WEIGHT));
    normalize_l2(&mut combined);
    combined
}
