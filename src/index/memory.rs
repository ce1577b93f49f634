//! In-process index backend for tests and local development.
//!
//! Exact cosine scan over a concurrent map. Results are fully deterministic:
//! descending score with ties broken by ascending product id.

use dashmap::DashMap;

use super::CatalogEntry;
use super::IndexStats;
use super::SearchFilters;
use super::SearchResult;

pub struct MemoryIndex {
    entries: DashMap<String, CatalogEntry>,
    dimension: usize,
}

impl MemoryIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: DashMap::new(),
            dimension,
        }
    }

    pub fn upsert_batch(&self, entries: Vec<CatalogEntry>) {
        for entry in entries {
            self.entries.insert(entry.product_id.clone(), entry);
        }
    }

    #[must_use]
    pub fn search(
        &self,
        query: &[f32],
        top_k: usize,
        filters: &SearchFilters,
    ) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = self
            .entries
            .iter()
            .filter(|entry| filters.matches(&entry.value().metadata))
            .map(|entry| SearchResult {
                product_id: entry.key().clone(),
                similarity_score: cosine_similarity(query, &entry.value().embedding),
                metadata: entry.value().metadata.clone(),
            })
            .collect();

        results.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.product_id.cmp(&b.product_id))
        });
        results.truncate(top_k);
        results
    }

    #[must_use]
    pub fn contains(&self, product_id: &str) -> bool {
        self.entries.contains_key(product_id)
    }

    pub fn delete(&self, product_id: &str) {
        self.entries.remove(product_id);
    }

    pub fn delete_all(&self) {
        self.entries.clear();
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            total_vectors: self.entries.len() as u64,
            dimension: self.dimension,
            index_fullness: 0.0,
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= 1e-8 || norm_b <= 1e-8 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::super::ProductMetadata;
    use super::*;

    fn entry(id: &str, embedding: Vec<f32>, category: &str) -> CatalogEntry {
        CatalogEntry {
            product_id: id.to_string(),
            embedding,
            metadata: ProductMetadata {
                name: Some(format!("Product {id}")),
                category: Some(category.to_string()),
                ..ProductMetadata::default()
            },
        }
    }

    #[test]
    fn test_round_trip_self_similarity() {
        let index = MemoryIndex::new(3);
        index.upsert_batch(vec![
            entry("a", vec![1.0, 0.0, 0.0], "shirt"),
            entry("b", vec![0.0, 1.0, 0.0], "pants"),
        ]);

        let results = index.search(&[1.0, 0.0, 0.0], 2, &SearchFilters::default());
        assert_eq!(results[0].product_id, "a");
        assert!((results[0].similarity_score - 1.0).abs() < 1e-6);
        assert!(results[0].similarity_score > results[1].similarity_score);
    }

    #[test]
    fn test_upsert_is_idempotent_overwrite() {
        let index = MemoryIndex::new(2);
        index.upsert_batch(vec![entry("a", vec![1.0, 0.0], "shirt")]);

        let mut updated = entry("a", vec![1.0, 0.0], "shirt");
        updated.metadata.name = Some("Renamed".to_string());
        index.upsert_batch(vec![updated]);

        assert_eq!(index.stats().total_vectors, 1);
        let results = index.search(&[1.0, 0.0], 1, &SearchFilters::default());
        assert_eq!(results[0].metadata.name.as_deref(), Some("Renamed"));
    }

    #[test]
    fn test_top_k_beyond_count_returns_all() {
        let index = MemoryIndex::new(2);
        index.upsert_batch(vec![
            entry("a", vec![1.0, 0.0], "shirt"),
            entry("b", vec![0.5, 0.5], "pants"),
        ]);
        let results = index.search(&[1.0, 0.0], 100, &SearchFilters::default());
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_category_filter() {
        let index = MemoryIndex::new(2);
        index.upsert_batch(vec![
            entry("a", vec![1.0, 0.0], "shirt"),
            entry("b", vec![0.9, 0.1], "pants"),
        ]);
        let filters = SearchFilters {
            category: Some("pants".to_string()),
            ..SearchFilters::default()
        };
        let results = index.search(&[1.0, 0.0], 10, &filters);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].product_id, "b");
    }

    #[test]
    fn test_tie_break_by_product_id() {
        let index = MemoryIndex::new(2);
        index.upsert_batch(vec![
            entry("zeta", vec![1.0, 0.0], "shirt"),
            entry("alpha", vec![2.0, 0.0], "shirt"), // same direction, same cosine
        ]);
        let results = index.search(&[1.0, 0.0], 2, &SearchFilters::default());
        assert_eq!(results[0].product_id, "alpha");
        assert_eq!(results[1].product_id, "zeta");
    }

    #[test]
    fn test_delete_and_clear() {
        let index = MemoryIndex::new(2);
        index.upsert_batch(vec![
            entry("a", vec![1.0, 0.0], "shirt"),
            entry("b", vec![0.0, 1.0], "pants"),
        ]);
        index.delete("a");
        assert!(!index.contains("a"));
        assert!(index.contains("b"));
        index.delete_all();
        assert_eq!(index.stats().total_vectors, 0);
    }

    #[test]
    fn test_zero_query_scores_zero() {
        let index = MemoryIndex::new(2);
        index.upsert_batch(vec![entry("a", vec![1.0, 0.0], "shirt")]);
        let results = index.search(&[0.0, 0.0], 1, &SearchFilters::default());
        assert_eq!(results[0].similarity_score, 0.0);
    }
}
