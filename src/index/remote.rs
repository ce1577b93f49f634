//! REST client for the remote vector index service.
//!
//! Speaks a Pinecone-compatible data-plane dialect:
//! `POST /vectors/upsert`, `POST /query`, `POST /vectors/delete`,
//! `GET /vectors/fetch`, `POST /describe_index_stats`, with index creation
//! through `POST /indexes`. All calls carry a bounded timeout; the service
//! is treated as slow, remote, and fallible.

use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;
use tracing::debug;
use tracing::info;

use super::CatalogEntry;
use super::IndexStats;
use super::ProductMetadata;
use super::SearchFilters;
use super::SearchResult;
use crate::config::IndexConfig;
use crate::errors::Result;
use crate::errors::StyleSnapError;

pub struct RemoteIndex {
    client: Client,
    endpoint: String,
    api_key: String,
    index_name: String,
    dimension: usize,
}

impl RemoteIndex {
    /// Connect to the index service, creating the named index if it does
    /// not exist. An existing index is reused as-is; a dimension that
    /// disagrees with the configuration is a fatal configuration error.
    ///
    /// # Errors
    /// - HTTP client build or connectivity failures
    /// - Index creation failures
    /// - Dimension mismatch against a pre-existing index
    pub async fn connect(config: &IndexConfig) -> Result<Self> {
        if config.endpoint.is_empty() {
            return Err(StyleSnapError::Config(
                "index.endpoint is required for the remote provider".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StyleSnapError::Http(e.to_string()))?;

        let index = Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            index_name: config.index_name.clone(),
            dimension: config.dimension,
        };

        match index.stats().await {
            Ok(stats) => {
                if stats.dimension != 0 && stats.dimension != index.dimension {
                    return Err(StyleSnapError::Config(format!(
                        "Index '{}' has dimension {} but {} is configured",
                        index.index_name, stats.dimension, index.dimension
                    )));
                }
                info!(
                    "Connected to vector index '{}' ({} vectors)",
                    index.index_name, stats.total_vectors
                );
            }
            Err(_) => {
                info!("Creating vector index '{}'", index.index_name);
                index.create_index(&config.metric).await?;
            }
        }

        Ok(index)
    }

    async fn create_index(&self, metric: &str) -> Result<()> {
        #[derive(Serialize)]
        struct CreateIndexRequest<'a> {
            name: &'a str,
            dimension: usize,
            metric: &'a str,
        }

        let url = format!("{}/indexes", self.endpoint);
        let request = CreateIndexRequest {
            name: &self.index_name,
            dimension: self.dimension,
            metric,
        };

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| StyleSnapError::Http(e.to_string()))?;

        // 409 means a concurrent creator won the race; the index exists
        if !response.status().is_success() && response.status().as_u16() != 409 {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StyleSnapError::Index(format!(
                "Index creation failed ({status}): {body}"
            )));
        }

        Ok(())
    }

    /// Insert-or-replace a batch of products in one call
    ///
    /// # Errors
    /// - Network failures, non-success responses (`Index`)
    pub async fn upsert_batch(&self, entries: &[CatalogEntry]) -> Result<()> {
        #[derive(Serialize)]
        struct UpsertVector<'a> {
            id: &'a str,
            values: &'a [f32],
            metadata: &'a ProductMetadata,
        }

        #[derive(Serialize)]
        struct UpsertRequest<'a> {
            vectors: Vec<UpsertVector<'a>>,
        }

        let url = format!("{}/vectors/upsert", self.endpoint);
        debug!("Upserting {} vectors to {}", entries.len(), url);

        let request = UpsertRequest {
            vectors: entries
                .iter()
                .map(|e| UpsertVector {
                    id: &e.product_id,
                    values: &e.embedding,
                    metadata: &e.metadata,
                })
                .collect(),
        };

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| StyleSnapError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StyleSnapError::Index(format!(
                "Upsert failed ({status}): {body}"
            )));
        }

        Ok(())
    }

    /// Similarity query with conjunctive metadata filters
    ///
    /// # Errors
    /// - Network failures, non-success responses, malformed response bodies
    pub async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchResult>> {
        #[derive(Deserialize)]
        struct QueryMatch {
            id: String,
            score: f32,
            #[serde(default)]
            metadata: ProductMetadata,
        }

        #[derive(Deserialize)]
        struct QueryResponse {
            #[serde(default)]
            matches: Vec<QueryMatch>,
        }

        let url = format!("{}/query", self.endpoint);
        let mut request = json!({
            "vector": query,
            "topK": top_k,
            "includeMetadata": true,
        });
        if let Some(filter) = build_filter(filters) {
            request["filter"] = filter;
        }

        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| StyleSnapError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StyleSnapError::Index(format!(
                "Query failed ({status}): {body}"
            )));
        }

        let result: QueryResponse = response
            .json()
            .await
            .map_err(|e| StyleSnapError::Index(format!("Failed to parse response: {e}")))?;

        Ok(result
            .matches
            .into_iter()
            .map(|m| SearchResult {
                product_id: m.id,
                similarity_score: m.score,
                metadata: m.metadata,
            })
            .collect())
    }

    /// Whether a product id exists in the index
    ///
    /// # Errors
    /// - Network failures, non-success responses
    pub async fn contains(&self, product_id: &str) -> Result<bool> {
        #[derive(Deserialize)]
        struct FetchResponse {
            #[serde(default)]
            vectors: serde_json::Map<String, serde_json::Value>,
        }

        let url = format!("{}/vectors/fetch", self.endpoint);
        let response = self
            .client
            .get(&url)
            .header("Api-Key", &self.api_key)
            .query(&[("ids", product_id)])
            .send()
            .await
            .map_err(|e| StyleSnapError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StyleSnapError::Index(format!(
                "Fetch failed ({})",
                response.status()
            )));
        }

        let result: FetchResponse = response
            .json()
            .await
            .map_err(|e| StyleSnapError::Index(format!("Failed to parse response: {e}")))?;

        Ok(result.vectors.contains_key(product_id))
    }

    /// Delete one product by id
    ///
    /// # Errors
    /// - Network failures, non-success responses
    pub async fn delete(&self, product_id: &str) -> Result<()> {
        self.delete_request(json!({ "ids": [product_id] })).await
    }

    /// Wipe every vector in the index
    ///
    /// # Errors
    /// - Network failures, non-success responses
    pub async fn delete_all(&self) -> Result<()> {
        self.delete_request(json!({ "deleteAll": true })).await
    }

    async fn delete_request(&self, body: serde_json::Value) -> Result<()> {
        let url = format!("{}/vectors/delete", self.endpoint);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| StyleSnapError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StyleSnapError::Index(format!(
                "Delete failed ({status}): {text}"
            )));
        }

        Ok(())
    }

    /// Index statistics
    ///
    /// # Errors
    /// - Network failures, non-success responses, malformed response bodies
    pub async fn stats(&self) -> Result<IndexStats> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct StatsResponse {
            #[serde(default)]
            total_vector_count: u64,
            #[serde(default)]
            dimension: usize,
            #[serde(default)]
            index_fullness: f32,
        }

        let url = format!("{}/describe_index_stats", self.endpoint);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.api_key)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| StyleSnapError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StyleSnapError::Index(format!(
                "Stats failed ({})",
                response.status()
            )));
        }

        let result: StatsResponse = response
            .json()
            .await
            .map_err(|e| StyleSnapError::Index(format!("Failed to parse response: {e}")))?;

        Ok(IndexStats {
            total_vectors: result.total_vector_count,
            dimension: result.dimension,
            index_fullness: result.index_fullness,
        })
    }
}

/// Translate filters into the service's filter expression, `None` when empty
fn build_filter(filters: &SearchFilters) -> Option<serde_json::Value> {
    if filters.is_empty() {
        return None;
    }

    let mut filter = serde_json::Map::new();
    if let Some(category) = &filters.category {
        filter.insert("category".to_string(), json!({ "$eq": category }));
    }
    if filters.min_price.is_some() || filters.max_price.is_some() {
        let mut range = serde_json::Map::new();
        if let Some(min) = filters.min_price {
            range.insert("$gte".to_string(), json!(min));
        }
        if let Some(max) = filters.max_price {
            range.insert("$lte".to_string(), json!(max));
        }
        filter.insert("price_numeric".to_string(), serde_json::Value::Object(range));
    }
    Some(serde_json::Value::Object(filter))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_empty() {
        assert!(build_filter(&SearchFilters::default()).is_none());
    }

    #[test]
    fn test_build_filter_category_and_price() {
        let filters = SearchFilters {
            category: Some("dress".to_string()),
            min_price: Some(10.0),
            max_price: Some(50.0),
        };
        let filter = build_filter(&filters).unwrap();
        assert_eq!(filter["category"]["$eq"], "dress");
        assert_eq!(filter["price_numeric"]["$gte"], 10.0);
        assert_eq!(filter["price_numeric"]["$lte"], 50.0);
    }

    #[test]
    fn test_build_filter_price_only_min() {
        let filters = SearchFilters {
            min_price: Some(5.0),
            ..SearchFilters::default()
        };
        let filter = build_filter(&filters).unwrap();
        assert_eq!(filter["price_numeric"]["$gte"], 5.0);
        assert!(filter["price_numeric"].get("$lte").is_none());
        assert!(filter.get("category").is_none());
    }
}
