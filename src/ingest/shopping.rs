//! Product discovery through an external shopping-search provider.
//!
//! Wraps the SerpApi Google Shopping engine: one keyword query in, a page of
//! candidate products out. Only the fields the catalog needs survive the
//! response mapping.

use serde::Deserialize;
use tracing::debug;

use crate::config::IngestionConfig;
use crate::errors::Result;
use crate::errors::StyleSnapError;

const SEARCH_ENDPOINT: &str = "https://serpapi.com/search";

/// One candidate product from a shopping search
#[derive(Debug, Clone)]
pub struct ShoppingProduct {
    pub title: String,
    pub price: Option<String>,
    pub brand: Option<String>,
    pub image_url: Option<String>,
    pub product_url: Option<String>,
    pub source: Option<String>,
}

pub struct ShoppingClient {
    client: reqwest::Client,
    api_key: String,
    location: String,
}

impl ShoppingClient {
    /// Build the client from ingestion configuration
    ///
    /// # Errors
    /// - Missing API key
    pub fn from_config(config: &IngestionConfig) -> Result<Self> {
        if config.serpapi_key.is_empty() {
            return Err(StyleSnapError::Config(
                "ingestion.serpapi_key is required for catalog ingestion".to_string(),
            ));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key: config.serpapi_key.clone(),
            location: config.location.clone(),
        })
    }

    /// Search for products matching a keyword query, at most `limit` results
    ///
    /// # Errors
    /// - Network failures (`Http`), non-success responses, malformed bodies
    pub async fn search_products(&self, query: &str, limit: usize) -> Result<Vec<ShoppingProduct>> {
        #[derive(Deserialize)]
        struct ShoppingResult {
            title: String,
            #[serde(default)]
            price: Option<String>,
            #[serde(default)]
            source: Option<String>,
            #[serde(default)]
            thumbnail: Option<String>,
            #[serde(default)]
            product_link: Option<String>,
        }

        #[derive(Deserialize)]
        struct SearchResponse {
            #[serde(default)]
            shopping_results: Vec<ShoppingResult>,
        }

        debug!("Shopping search: '{}' (limit {})", query, limit);
        let response = self
            .client
            .get(SEARCH_ENDPOINT)
            .query(&[
                ("engine", "google_shopping"),
                ("q", query),
                ("location", &self.location),
                ("num", &limit.to_string()),
                ("api_key", &self.api_key),
            ])
            .send()
            .await
            .map_err(|e| StyleSnapError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StyleSnapError::Http(format!(
                "Shopping search failed with status {}",
                response.status()
            )));
        }

        let result: SearchResponse = response
            .json()
            .await
            .map_err(|e| StyleSnapError::Http(format!("Failed to parse search response: {e}")))?;

        Ok(result
            .shopping_results
            .into_iter()
            .take(limit)
            .map(|r| ShoppingProduct {
                title: r.title,
                price: r.price,
                brand: r.source.clone(),
                image_url: r.thumbnail,
                product_url: r.product_link,
                source: r.source,
            })
            .collect())
    }

    /// Download a product image as raw bytes
    ///
    /// # Errors
    /// - Network failures, non-success responses
    pub async fn download_image(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| StyleSnapError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(StyleSnapError::Http(format!(
                "Image download failed with status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StyleSnapError::Http(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
