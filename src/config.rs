use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub backtrace: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Fine-tuned fashion weights; falls back to `baseline_model_path` when missing
    pub model_path: String,
    pub baseline_model_path: String,
    pub input_size: u32,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,
}

fn default_confidence_threshold() -> f32 {
    0.5
}

fn default_iou_threshold() -> f32 {
    0.45
}

fn default_max_detections() -> usize {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// Classifier-less backbone export (pooled feature output)
    pub model_path: String,
    pub embedding_dim: usize,
    pub input_size: u32,
    #[serde(default = "default_histogram_bins")]
    pub histogram_bins: usize,
}

fn default_histogram_bins() -> usize {
    32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// "remote" (Pinecone-style REST service) or "memory"
    pub provider: String,
    pub index_name: String,
    pub dimension: usize,
    pub metric: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_index_timeout")]
    pub timeout_secs: u64,
}

fn default_index_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_results_per_query")]
    pub results_per_query: usize,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default)]
    pub serpapi_key: String,
    #[serde(default = "default_queries")]
    pub queries: Vec<String>,
}

fn default_batch_size() -> usize {
    50
}

fn default_results_per_query() -> usize {
    50
}

fn default_location() -> String {
    "United States".to_string()
}

fn default_queries() -> Vec<String> {
    [
        "women black dress",
        "women white t-shirt",
        "women blue jeans",
        "women leather jacket",
        "women sneakers",
        "women handbag",
        "women cardigan",
        "women blazer",
        "women midi skirt",
        "women denim jacket",
        "women ankle boots",
        "women trench coat",
        "women maxi dress",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub detector: DetectorConfig,
    pub features: FeaturesConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(crate::StyleSnapError::Io)?;

        let config: AppConfig =
            toml::from_str(&content).map_err(crate::StyleSnapError::TomlParsing)?;

        Ok(config)
    }

    /// Load configuration from default config file path
    pub fn load() -> crate::Result<Self> {
        // Try to load from config.toml first, then fall back to config.example.toml
        if Path::new("config.toml").exists() {
            Self::from_file("config.toml")
        } else if Path::new("config.example.toml").exists() {
            println!(
                "Warning: Using config.example.toml. Please create config.toml for production use."
            );
            Self::from_file("config.example.toml")
        } else {
            Err(crate::StyleSnapError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config file found. Please create config.toml or config.example.toml",
            )))
        }
    }

    /// Get server bind host
    pub fn server_host(&self) -> &str {
        &self.server.host
    }

    /// Get server bind port
    pub fn server_port(&self) -> u16 {
        self.server.port
    }

    /// Check if CORS is enabled
    pub fn cors_enabled(&self) -> bool {
        self.server.enable_cors
    }

    /// Get detector confidence threshold
    pub fn confidence_threshold(&self) -> f32 {
        self.detector.confidence_threshold
    }

    /// Get backbone embedding dimension
    pub fn embedding_dim(&self) -> usize {
        self.features.embedding_dim
    }

    /// Get color histogram bins per channel
    pub fn histogram_bins(&self) -> usize {
        self.features.histogram_bins
    }

    /// Total dimension of the combined (indexed) vector
    pub fn combined_dim(&self) -> usize {
        self.features.embedding_dim + 3 * self.features.histogram_bins
    }

    /// Get vector index name
    pub fn index_name(&self) -> &str {
        &self.index.index_name
    }

    /// Get configured index dimension
    pub fn index_dimension(&self) -> usize {
        self.index.dimension
    }

    /// Get ingestion batch size
    pub fn ingest_batch_size(&self) -> usize {
        self.ingestion.batch_size
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            results_per_query: default_results_per_query(),
            location: default_location(),
            serpapi_key: String::new(),
            queries: default_queries(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8001,
                enable_cors: true,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                backtrace: true,
            },
            detector: DetectorConfig {
                model_path: "models/fashion_yolov8.onnx".to_string(),
                baseline_model_path: "models/yolov8n.onnx".to_string(),
                input_size: 640,
                confidence_threshold: default_confidence_threshold(),
                iou_threshold: default_iou_threshold(),
                max_detections: default_max_detections(),
            },
            features: FeaturesConfig {
                model_path: "models/resnet50_features.onnx".to_string(),
                embedding_dim: 2048,
                input_size: 224,
                histogram_bins: default_histogram_bins(),
            },
            index: IndexConfig {
                provider: "memory".to_string(),
                index_name: "fashion-items".to_string(),
                dimension: 2048 + 3 * 32,
                metric: "cosine".to_string(),
                endpoint: String::new(),
                api_key: String::new(),
                timeout_secs: default_index_timeout(),
            },
            ingestion: IngestionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dimensions_agree() {
        let config = AppConfig::default();
        assert_eq!(config.combined_dim(), config.index_dimension());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let rendered = toml::to_string(&AppConfig::default()).unwrap();
        std::fs::write(&path, rendered).unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.server.port, 8001);
        assert_eq!(config.index.provider, "memory");

        assert!(AppConfig::from_file(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_roundtrip_toml() {
        let config = AppConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.index.dimension, config.index.dimension);
        assert_eq!(parsed.ingestion.batch_size, 50);
    }
}
