pub mod embed;
pub mod filter;
pub mod observe;
pub mod recommend;
pub mod refresh;
pub mod semantic;

mod error;

pub use embed::{EmbedBatchFailure, EmbedReport};
pub use error::{Error, Result};
pub use filter::{Candidate, FilterOutcome};
pub use observe::{ObserveFailure, ObserveReport};
pub use recommend::{
	Explanation, QueryContext, RecommendationItem, RecommendationResult, RecommendationSummary,
	RejectReason,
};
pub use refresh::{RefreshFailure, RefreshResult};
pub use semantic::{SemanticMatch, SemanticMatchResult};

use std::{future::Future, pin::Pin, sync::Arc};

use roost_config::{Config, EmbeddingProviderConfig};
use roost_domain::{
	distance::ReferenceCatalog, observation::RiskAssessment, policy::DecisionPolicy,
};
use roost_providers::{embedding, hash_embedding, risk};
use roost_storage::store::{
	DistanceStore, EmbeddingStore, ListingStore, ObservationStore, ScoreStore,
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait RiskAnalysisProvider
where
	Self: Send + Sync,
{
	fn analyze<'a>(
		&'a self,
		address: &'a str,
		parcel_id: Option<&'a str>,
	) -> BoxFuture<'a, Result<RiskAssessment>>;
}

#[derive(Clone)]
pub struct Providers {
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub risk: Arc<dyn RiskAnalysisProvider>,
}
impl Providers {
	pub fn new(
		embedding: Arc<dyn EmbeddingProvider>,
		risk: Arc<dyn RiskAnalysisProvider>,
	) -> Self {
		Self { embedding, risk }
	}
}
impl Default for Providers {
	fn default() -> Self {
		let provider = Arc::new(DefaultProviders);

		Self { embedding: provider.clone(), risk: provider }
	}
}

/// Store handles injected into the service. Usually every field points at the same backend.
#[derive(Clone)]
pub struct Stores {
	pub listings: Arc<dyn ListingStore>,
	pub observations: Arc<dyn ObservationStore>,
	pub distances: Arc<dyn DistanceStore>,
	pub scores: Arc<dyn ScoreStore>,
	pub embeddings: Arc<dyn EmbeddingStore>,
}
impl Stores {
	pub fn shared<S>(store: Arc<S>) -> Self
	where
		S: ListingStore + ObservationStore + DistanceStore + ScoreStore + EmbeddingStore + 'static,
	{
		Self {
			listings: store.clone(),
			observations: store.clone(),
			distances: store.clone(),
			scores: store.clone(),
			embeddings: store,
		}
	}
}

pub struct RoostService {
	pub cfg: Config,
	/// Built once from `cfg.policy`; weights are already normalized.
	pub policy: DecisionPolicy,
	pub stores: Stores,
	pub providers: Providers,
	pub catalog: ReferenceCatalog,
}
impl RoostService {
	pub fn new(cfg: Config, stores: Stores, catalog: ReferenceCatalog) -> Self {
		Self::with_providers(cfg, stores, catalog, Providers::default())
	}

	pub fn with_providers(
		cfg: Config,
		stores: Stores,
		catalog: ReferenceCatalog,
		providers: Providers,
	) -> Self {
		let policy = DecisionPolicy::from_config(&cfg.policy);

		Self { cfg, policy, stores, providers, catalog }
	}

	pub fn embedding_version(&self) -> String {
		embedding_version(&self.cfg)
	}
}

struct DefaultProviders;
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move {
			if cfg.is_hash() {
				return Ok(hash_embedding::embed(texts, cfg.dimensions as usize));
			}

			Ok(embedding::embed(cfg, texts).await?)
		})
	}
}
impl RiskAnalysisProvider for DefaultProviders {
	fn analyze<'a>(
		&'a self,
		address: &'a str,
		parcel_id: Option<&'a str>,
	) -> BoxFuture<'a, Result<RiskAssessment>> {
		Box::pin(std::future::ready(Ok(risk::mock_analyze(address, parcel_id))))
	}
}

pub(crate) fn embedding_version(cfg: &Config) -> String {
	format!(
		"{}:{}:{}",
		cfg.providers.embedding.provider_id, cfg.providers.embedding.model, cfg.storage.vector_dim
	)
}

pub(crate) fn check_vector_dim(vec: &[f32], expected: u32) -> Result<()> {
	if vec.len() != expected as usize {
		return Err(Error::Provider {
			message: format!(
				"Embedding has {} dimensions; storage.vector_dim is {expected}.",
				vec.len()
			),
		});
	}

	Ok(())
}
