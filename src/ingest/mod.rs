//! Catalog ingestion: discover products, embed their images, upsert.
//!
//! A long-lived offline job. It tolerates interruption (partial batches are
//! flushed) and is safe to re-run: product ids are derived from image URLs,
//! so already-ingested products are skipped instead of duplicated.

pub mod shopping;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use sha2::Digest;
use sha2::Sha256;
use tracing::info;
use tracing::warn;

use crate::config::IngestionConfig;
use crate::errors::Result;
use crate::errors::StyleSnapError;
use crate::features::FeatureExtractor;
use crate::index::CatalogEntry;
use crate::index::ProductMetadata;
use crate::index::VectorSearch;
use self::shopping::ShoppingClient;
use self::shopping::ShoppingProduct;

/// Coarse color vocabulary matched against product titles. This is a
/// bootstrap heuristic; the per-item dominant color from the feature codec
/// is the precise signal.
const COLOR_KEYWORDS: [&str; 12] = [
    "black", "white", "grey", "red", "orange", "yellow", "green", "blue", "purple", "pink",
    "brown", "beige",
];

/// Outcome of an ingestion run. `failed` counts individual products;
/// shopping queries that failed wholesale are counted separately so the
/// two granularities never mix.
#[derive(Debug, Clone, Copy, Default)]
pub struct IngestReport {
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub failed_queries: usize,
}

/// Best-effort numeric price from a display string. Keeps digits and the
/// decimal point; anything unparseable is 0.0.
#[must_use]
pub fn parse_price(display: &str) -> f64 {
    let numeric: String = display
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    numeric.parse().unwrap_or(0.0)
}

/// Coarse color label from free text, `multicolor` when nothing matches
#[must_use]
pub fn color_from_text(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    COLOR_KEYWORDS
        .iter()
        .find(|color| lower.contains(**color))
        .copied()
        .unwrap_or("multicolor")
}

/// Coarse category label: the last word of the search query
#[must_use]
pub fn category_from_query(query: &str) -> String {
    query
        .split_whitespace()
        .last()
        .unwrap_or("unknown")
        .to_lowercase()
}

/// Deterministic product id derived from the image URL, so re-running
/// ingestion over the same products produces the same keys
#[must_use]
pub fn product_id_for(image_url: &str) -> String {
    let digest = Sha256::digest(image_url.as_bytes());
    format!("prod-{}", &hex::encode(digest)[..16])
}

pub struct IngestService {
    client: ShoppingClient,
    extractor: Arc<FeatureExtractor>,
    index: Arc<VectorSearch>,
    config: IngestionConfig,
}

impl IngestService {
    /// Build the service over an already-loaded extractor and connected index
    ///
    /// # Errors
    /// - Missing shopping-search API key
    pub fn new(
        config: &IngestionConfig,
        extractor: Arc<FeatureExtractor>,
        index: Arc<VectorSearch>,
    ) -> Result<Self> {
        Ok(Self {
            client: ShoppingClient::from_config(config)?,
            extractor,
            index,
            config: config.clone(),
        })
    }

    /// Run ingestion over the given queries (or the configured set when
    /// empty), honoring `shutdown` between products.
    ///
    /// Per-product failures are logged and counted but never abort the run.
    /// A dimension mismatch is a configuration error: the staged batch is
    /// flushed and the run halts.
    ///
    /// # Errors
    /// - `DimensionMismatch` between extracted vectors and the index
    pub async fn run(&self, queries: &[String], shutdown: &AtomicBool) -> Result<IngestReport> {
        let queries = if queries.is_empty() {
            &self.config.queries
        } else {
            queries
        };

        let mut report = IngestReport::default();
        let mut staged: Vec<CatalogEntry> = Vec::with_capacity(self.config.batch_size);

        'queries: for query in queries {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            info!("Ingesting query '{}'", query);

            let products = match self
                .client
                .search_products(query, self.config.results_per_query)
                .await
            {
                Ok(products) => products,
                Err(e) => {
                    warn!("Shopping search failed for '{}': {}", query, e);
                    report.failed_queries += 1;
                    continue;
                }
            };

            let category = category_from_query(query);
            for product in products {
                if shutdown.load(Ordering::Relaxed) {
                    info!("Shutdown requested, flushing partial batch");
                    break 'queries;
                }

                match self.stage_product(&product, &category).await {
                    Ok(Some(entry)) => {
                        staged.push(entry);
                        if staged.len() >= self.config.batch_size {
                            flush_batch(&self.index, &mut staged, &mut report).await?;
                        }
                    }
                    Ok(None) => report.skipped += 1,
                    Err(e @ StyleSnapError::DimensionMismatch { .. }) => {
                        flush_batch(&self.index, &mut staged, &mut report).await?;
                        return Err(e);
                    }
                    Err(e) => {
                        warn!("Failed to ingest '{}': {}", product.title, e);
                        report.failed += 1;
                    }
                }
            }
        }

        flush_batch(&self.index, &mut staged, &mut report).await?;
        info!(
            "Ingestion finished: {} indexed, {} skipped, {} products failed, {} queries failed",
            report.indexed, report.skipped, report.failed, report.failed_queries
        );
        Ok(report)
    }

    /// Download, embed, and stage one product. `None` means skipped, either
    /// no usable image or already present in the index.
    async fn stage_product(
        &self,
        product: &ShoppingProduct,
        category: &str,
    ) -> Result<Option<CatalogEntry>> {
        let Some(image_url) = product.image_url.as_deref().filter(|u| !u.is_empty()) else {
            return Ok(None);
        };

        let product_id = product_id_for(image_url);
        if self.index.contains(&product_id).await? {
            return Ok(None);
        }

        let bytes = self.client.download_image(image_url).await?;
        let image = crate::decode_image(&bytes)?.to_rgb8();

        let extractor = Arc::clone(&self.extractor);
        let bundle = tokio::task::spawn_blocking(move || extractor.extract_all(&image))
            .await
            .map_err(|e| StyleSnapError::Embedding(format!("extraction task failed: {e}")))?;

        if bundle.combined.len() != self.index.dimension() {
            return Err(StyleSnapError::DimensionMismatch {
                expected: self.index.dimension(),
                actual: bundle.combined.len(),
            });
        }

        let price_display = product.price.clone();
        let metadata = ProductMetadata {
            name: Some(product.title.clone()),
            brand: product.brand.clone(),
            retailer: product.source.clone(),
            price_numeric: Some(price_display.as_deref().map_or(0.0, parse_price)),
            price: price_display,
            category: Some(category.to_string()),
            color: Some(color_from_text(&product.title).to_string()),
            image_url: Some(image_url.to_string()),
            product_url: product.product_url.clone(),
        };

        Ok(Some(CatalogEntry {
            product_id,
            embedding: bundle.combined,
            metadata,
        }))
    }

}

/// Upsert the staged batch and record the outcome in the report: every
/// product in the batch counts as indexed or as failed.
///
/// # Errors
/// - `DimensionMismatch`, which signals misconfiguration rather than a
///   transient index problem
async fn flush_batch(
    index: &VectorSearch,
    staged: &mut Vec<CatalogEntry>,
    report: &mut IngestReport,
) -> Result<()> {
    if staged.is_empty() {
        return Ok(());
    }
    let batch = std::mem::take(staged);
    let count = batch.len();
    match index.upsert_batch(batch).await {
        Ok(()) => {
            report.indexed += count;
            info!("Upserted batch of {} products", count);
            Ok(())
        }
        Err(e @ StyleSnapError::DimensionMismatch { .. }) => Err(e),
        Err(e) => {
            warn!("Batch upsert failed, skipping {} products: {}", count, e);
            report.failed += count;
            Ok(())
        }
    }
}
