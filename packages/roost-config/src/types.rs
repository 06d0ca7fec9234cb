use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	pub observation: Observation,
	pub policy: Policy,
	#[serde(default)]
	pub filter: Filter,
	#[serde(default)]
	pub semantic: Semantic,
	#[serde(default)]
	pub batch: Batch,
	pub catalog: Catalog,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
	/// Dimension of the pgvector columns; must match the embedding provider.
	pub vector_dim: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Providers {
	pub embedding: EmbeddingProviderConfig,
	#[serde(default)]
	pub risk: RiskProviderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingProviderConfig {
	/// `hash` selects the offline dummy embedder; anything else is an OpenAI-compatible endpoint.
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}
impl EmbeddingProviderConfig {
	pub fn is_hash(&self) -> bool {
		self.provider_id.eq_ignore_ascii_case("hash")
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct RiskProviderConfig {
	pub provider_id: String,
}
impl Default for RiskProviderConfig {
	fn default() -> Self {
		Self { provider_id: "mock".to_string() }
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Observation {
	pub version: String,
	pub source_data_version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Policy {
	pub policy_version: String,
	pub threshold_base_total: f64,
	pub top_k: u32,
	pub zscore_min: f64,
	pub zscore_max: f64,
	pub distance_full_minutes: f64,
	pub distance_zero_minutes: f64,
	pub weights: AxisWeights,
	pub price: PriceSubWeights,
	pub risk: RiskSubWeights,
	pub option: OptionSubWeights,
	pub distance: DistanceSubWeights,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct AxisWeights {
	pub price: f64,
	pub risk: f64,
	pub option: f64,
	pub distance: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PriceSubWeights {
	pub deposit_percentile: f64,
	pub monthly_percentile: f64,
	pub monthly_zscore: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RiskSubWeights {
	pub safety: f64,
	pub floor: f64,
	pub location: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OptionSubWeights {
	pub essential: f64,
	pub amenity: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DistanceSubWeights {
	pub nonlinear: f64,
	pub minutes: f64,
	pub percentile: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Filter {
	/// Fractional expansion applied to stated budget ceilings.
	#[serde(default = "default_margin_ratio")]
	pub margin_ratio: f64,
	#[serde(default = "default_near_campus_max_minutes")]
	pub near_campus_max_minutes: f64,
}
impl Default for Filter {
	fn default() -> Self {
		Self {
			margin_ratio: default_margin_ratio(),
			near_campus_max_minutes: default_near_campus_max_minutes(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Semantic {
	#[serde(default = "default_pool_limit")]
	pub pool_limit: u32,
	#[serde(default = "default_semantic_top_k")]
	pub top_k: u32,
	#[serde(default = "default_max_reasons")]
	pub max_reasons: u32,
}
impl Default for Semantic {
	fn default() -> Self {
		Self {
			pool_limit: default_pool_limit(),
			top_k: default_semantic_top_k(),
			max_reasons: default_max_reasons(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Batch {
	#[serde(default = "default_concurrency")]
	pub concurrency: u32,
	#[serde(default = "default_embedding_batch_size")]
	pub embedding_batch_size: u32,
}
impl Default for Batch {
	fn default() -> Self {
		Self {
			concurrency: default_concurrency(),
			embedding_batch_size: default_embedding_batch_size(),
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catalog {
	/// JSON array of reference locations (universities).
	pub path: PathBuf,
}

fn default_margin_ratio() -> f64 {
	0.1
}

fn default_near_campus_max_minutes() -> f64 {
	30.0
}

fn default_pool_limit() -> u32 {
	100
}

fn default_semantic_top_k() -> u32 {
	10
}

fn default_max_reasons() -> u32 {
	3
}

fn default_concurrency() -> u32 {
	5
}

fn default_embedding_batch_size() -> u32 {
	16
}
