//! Vector index: persistent nearest-neighbor search over cataloged products
//!
//! Two backends behind one service, selected by configuration:
//! - `remote`: a Pinecone-style REST service (production catalog)
//! - `memory`: an in-process store for tests and local development
//!
//! All operations are dimension-checked against the configured index
//! dimension before touching the backend; a mismatch fails the whole call.

pub mod memory;
pub mod remote;

use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use crate::config::AppConfig;
use crate::errors::Result;
use crate::errors::StyleSnapError;

/// Typed product metadata. Every field is optional; readers fall back to
/// "Unknown"/empty through the accessors instead of failing on absent keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retailer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_numeric: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
}

impl ProductMetadata {
    #[must_use]
    pub fn name_or_unknown(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }

    #[must_use]
    pub fn brand_or_unknown(&self) -> &str {
        self.brand.as_deref().unwrap_or("Unknown")
    }

    #[must_use]
    pub fn retailer_or_unknown(&self) -> &str {
        self.retailer.as_deref().unwrap_or("Unknown")
    }

    #[must_use]
    pub fn price_display(&self) -> &str {
        self.price.as_deref().unwrap_or("N/A")
    }

    #[must_use]
    pub fn category_or_unknown(&self) -> &str {
        self.category.as_deref().unwrap_or("unknown")
    }

    #[must_use]
    pub fn image_url_or_empty(&self) -> &str {
        self.image_url.as_deref().unwrap_or("")
    }

    #[must_use]
    pub fn product_url_or_empty(&self) -> &str {
        self.product_url.as_deref().unwrap_or("")
    }
}

/// A cataloged product: index primary key, indexed vector, and metadata.
/// Re-upserting the same `product_id` overwrites; last upsert wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub product_id: String,
    pub embedding: Vec<f32>,
    pub metadata: ProductMetadata,
}

/// One similarity match, higher score = more similar (cosine)
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub product_id: String,
    pub similarity_score: f32,
    pub metadata: ProductMetadata,
}

/// Read-only index introspection
#[derive(Debug, Clone, Copy, Serialize)]
pub struct IndexStats {
    pub total_vectors: u64,
    pub dimension: usize,
    pub index_fullness: f32,
}

/// Conjunctive search filters: category equality AND inclusive price range
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl SearchFilters {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.min_price.is_none() && self.max_price.is_none()
    }

    /// Whether an entry's metadata passes every configured filter.
    /// Price filters exclude entries without a numeric price.
    #[must_use]
    pub fn matches(&self, metadata: &ProductMetadata) -> bool {
        if let Some(category) = &self.category {
            if metadata.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        if self.min_price.is_some() || self.max_price.is_some() {
            let Some(price) = metadata.price_numeric else {
                return false;
            };
            if self.min_price.is_some_and(|min| price < min) {
                return false;
            }
            if self.max_price.is_some_and(|max| price > max) {
                return false;
            }
        }
        true
    }
}

/// Supported index backends
enum IndexBackend {
    Remote(remote::RemoteIndex),
    Memory(memory::MemoryIndex),
    /// Simulates an unreachable index service so degrade policies can be
    /// exercised without a network
    #[cfg(test)]
    Unavailable,
}

#[cfg(test)]
fn unavailable_error() -> StyleSnapError {
    StyleSnapError::Index("index service unavailable".to_string())
}

/// Vector similarity search service over the configured backend
pub struct VectorSearch {
    backend: IndexBackend,
    dimension: usize,
}

impl VectorSearch {
    /// Connect to the configured backend. Remote index creation is
    /// idempotent: a missing index is created with the configured dimension
    /// and metric, an existing one is reused as-is.
    ///
    /// # Errors
    /// - Unknown provider name
    /// - Remote connectivity failures
    /// - A pre-existing remote index with a different dimension (fatal
    ///   configuration error; no migration is attempted)
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let dimension = config.index.dimension;
        let backend = match config.index.provider.as_str() {
            "memory" => {
                info!("Using in-memory vector index ({dimension}d)");
                IndexBackend::Memory(memory::MemoryIndex::new(dimension))
            }
            "remote" | "pinecone" => {
                let index = remote::RemoteIndex::connect(&config.index).await?;
                IndexBackend::Remote(index)
            }
            other => {
                return Err(StyleSnapError::Config(format!(
                    "Unknown index provider: {other}"
                )))
            }
        };

        Ok(Self { backend, dimension })
    }

    /// Build directly over an in-memory backend (tests, local tools)
    #[must_use]
    pub fn in_memory(dimension: usize) -> Self {
        Self {
            backend: IndexBackend::Memory(memory::MemoryIndex::new(dimension)),
            dimension,
        }
    }

    /// Build over a backend whose every call fails as unavailable
    #[cfg(test)]
    pub(crate) fn unavailable(dimension: usize) -> Self {
        Self {
            backend: IndexBackend::Unavailable,
            dimension,
        }
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(StyleSnapError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    /// Insert or replace one product
    ///
    /// # Errors
    /// - `DimensionMismatch` before any write
    /// - Backend failures (`Index`)
    pub async fn upsert(&self, entry: CatalogEntry) -> Result<()> {
        self.check_dimension(&entry.embedding)?;
        match &self.backend {
            IndexBackend::Remote(index) => index.upsert_batch(std::slice::from_ref(&entry)).await,
            IndexBackend::Memory(index) => {
                index.upsert_batch(vec![entry]);
                Ok(())
            }
            #[cfg(test)]
            IndexBackend::Unavailable => Err(unavailable_error()),
        }
    }

    /// Insert or replace a batch. The dimension check covers every entry
    /// before anything is written, so a mismatch rejects the whole call.
    ///
    /// # Errors
    /// - `DimensionMismatch`, backend failures
    pub async fn upsert_batch(&self, entries: Vec<CatalogEntry>) -> Result<()> {
        for entry in &entries {
            self.check_dimension(&entry.embedding)?;
        }
        match &self.backend {
            IndexBackend::Remote(index) => index.upsert_batch(&entries).await,
            IndexBackend::Memory(index) => {
                index.upsert_batch(entries);
                Ok(())
            }
            #[cfg(test)]
            IndexBackend::Unavailable => Err(unavailable_error()),
        }
    }

    /// Similarity search: at most `top_k` results, descending score.
    /// `top_k == 0` short-circuits to an empty list.
    ///
    /// # Errors
    /// - `DimensionMismatch` for a malformed query vector
    /// - Backend failures (`Index`); the serving path degrades these to
    ///   empty results
    pub async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimension(query)?;
        match &self.backend {
            IndexBackend::Remote(index) => index.search(query, top_k, filters).await,
            IndexBackend::Memory(index) => Ok(index.search(query, top_k, filters)),
            #[cfg(test)]
            IndexBackend::Unavailable => Err(unavailable_error()),
        }
    }

    /// Whether a product id is already indexed
    ///
    /// # Errors
    /// - Backend failures
    pub async fn contains(&self, product_id: &str) -> Result<bool> {
        match &self.backend {
            IndexBackend::Remote(index) => index.contains(product_id).await,
            IndexBackend::Memory(index) => Ok(index.contains(product_id)),
            #[cfg(test)]
            IndexBackend::Unavailable => Err(unavailable_error()),
        }
    }

    /// Delete one product by id
    ///
    /// # Errors
    /// - Backend failures
    pub async fn delete(&self, product_id: &str) -> Result<()> {
        match &self.backend {
            IndexBackend::Remote(index) => index.delete(product_id).await,
            IndexBackend::Memory(index) => {
                index.delete(product_id);
                Ok(())
            }
            #[cfg(test)]
            IndexBackend::Unavailable => Err(unavailable_error()),
        }
    }

    /// Wipe the index. Destructive; call sites must confirm explicitly.
    ///
    /// # Errors
    /// - Backend failures
    pub async fn delete_all(&self) -> Result<()> {
        match &self.backend {
            IndexBackend::Remote(index) => index.delete_all().await,
            IndexBackend::Memory(index) => {
                index.delete_all();
                Ok(())
            }
            #[cfg(test)]
            IndexBackend::Unavailable => Err(unavailable_error()),
        }
    }

    /// Index statistics
    ///
    /// # Errors
    /// - Backend failures
    pub async fn stats(&self) -> Result<IndexStats> {
        match &self.backend {
            IndexBackend::Remote(index) => index.stats().await,
            IndexBackend::Memory(index) => Ok(index.stats()),
            #[cfg(test)]
            IndexBackend::Unavailable => Err(unavailable_error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(category: &str, price: Option<f64>) -> ProductMetadata {
        ProductMetadata {
            category: Some(category.to_string()),
            price_numeric: price,
            ..ProductMetadata::default()
        }
    }

    #[test]
    fn test_filters_conjunctive() {
        let filters = SearchFilters {
            category: Some("dress".to_string()),
            min_price: Some(10.0),
            max_price: Some(60.0),
        };
        assert!(filters.matches(&meta("dress", Some(49.99))));
        assert!(!filters.matches(&meta("shoes", Some(49.99))));
        assert!(!filters.matches(&meta("dress", Some(75.0))));
        assert!(!filters.matches(&meta("dress", Some(5.0))));
        // Inclusive bounds
        assert!(filters.matches(&meta("dress", Some(10.0))));
        assert!(filters.matches(&meta("dress", Some(60.0))));
        // Price filter excludes entries without a numeric price
        assert!(!filters.matches(&meta("dress", None)));
    }

    #[test]
    fn test_empty_filters_match_everything() {
        let filters = SearchFilters::default();
        assert!(filters.is_empty());
        assert!(filters.matches(&ProductMetadata::default()));
    }

    #[test]
    fn test_metadata_defaults() {
        let metadata = ProductMetadata::default();
        assert_eq!(metadata.name_or_unknown(), "Unknown");
        assert_eq!(metadata.brand_or_unknown(), "Unknown");
        assert_eq!(metadata.retailer_or_unknown(), "Unknown");
        assert_eq!(metadata.price_display(), "N/A");
        assert_eq!(metadata.category_or_unknown(), "unknown");
        assert_eq!(metadata.image_url_or_empty(), "");
        assert_eq!(metadata.product_url_or_empty(), "");
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let search = VectorSearch::in_memory(4);
        let entry = CatalogEntry {
            product_id: "p1".to_string(),
            embedding: vec![1.0, 2.0],
            metadata: ProductMetadata::default(),
        };
        assert!(matches!(
            search.upsert(entry).await,
            Err(StyleSnapError::DimensionMismatch {
                expected: 4,
                actual: 2
            })
        ));
        assert!(matches!(
            search.search(&[1.0], 5, &SearchFilters::default()).await,
            Err(StyleSnapError::DimensionMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_top_k_zero_is_empty() {
        let search = VectorSearch::in_memory(2);
        let results = search
            .search(&[1.0, 0.0], 0, &SearchFilters::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
