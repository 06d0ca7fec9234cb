use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::{sync::Semaphore, task::JoinSet};

use roost_config::EmbeddingProviderConfig;
use roost_domain::listing::Listing;

use crate::{Error, Providers, Result, RoostService, Stores};

#[derive(Clone, Debug, Serialize)]
pub struct EmbedBatchFailure {
	pub listing_ids: Vec<i64>,
	pub error: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct EmbedReport {
	pub embedding_version: String,
	pub embedded: usize,
	pub batches: usize,
	pub failed: Vec<EmbedBatchFailure>,
}

struct BatchContext {
	stores: Stores,
	providers: Providers,
	provider_cfg: EmbeddingProviderConfig,
	embedding_version: String,
	vector_dim: u32,
}

impl RoostService {
	/// Embeds listing text in fixed-size batches with bounded provider concurrency.
	///
	/// A batch the provider fails is reported with its listing ids; the other batches still run.
	/// Store errors abort the job.
	pub async fn embed_listings(&self, listing_ids: Option<&[i64]>) -> Result<EmbedReport> {
		let listings = self.stores.listings.list_listings(listing_ids).await?;
		let embedding_version = self.embedding_version();
		let batch_size = self.cfg.batch.embedding_batch_size.max(1) as usize;
		let semaphore = Arc::new(Semaphore::new(self.cfg.batch.concurrency.max(1) as usize));
		let ctx = Arc::new(BatchContext {
			stores: self.stores.clone(),
			providers: self.providers.clone(),
			provider_cfg: self.cfg.providers.embedding.clone(),
			embedding_version: embedding_version.clone(),
			vector_dim: self.cfg.storage.vector_dim,
		});
		let mut tasks = JoinSet::new();
		let mut batches = 0;

		for chunk in listings.chunks(batch_size) {
			let batch = chunk.to_vec();
			let semaphore = semaphore.clone();
			let ctx = ctx.clone();

			batches += 1;

			tasks.spawn(async move {
				let _permit = semaphore.acquire_owned().await;
				let ids: Vec<i64> = batch.iter().map(|listing| listing.listing_id).collect();
				let vectors = match embed_batch(&ctx, &batch).await {
					Ok(vectors) => vectors,
					Err(err) =>
						return Ok(Err(EmbedBatchFailure {
							listing_ids: ids,
							error: err.to_string(),
						})),
				};

				store_batch(&ctx, &batch, &vectors).await.map(Ok)
			});
		}

		let mut embedded = 0;
		let mut failed = Vec::new();

		while let Some(joined) = tasks.join_next().await {
			match joined?? {
				Ok(count) => embedded += count,
				Err(failure) => {
					tracing::warn!(
						listing_ids = ?failure.listing_ids,
						error = %failure.error,
						"Embedding batch failed."
					);

					failed.push(failure);
				},
			}
		}

		failed.sort_by_key(|failure| failure.listing_ids.first().copied());

		tracing::info!(
			embedding_version = %embedding_version,
			embedded,
			batches,
			failed = failed.len(),
			"Listing embedding job finished."
		);

		Ok(EmbedReport { embedding_version, embedded, batches, failed })
	}
}

async fn embed_batch(ctx: &BatchContext, batch: &[Listing]) -> Result<Vec<Vec<f32>>> {
	let texts: Vec<String> = batch.iter().map(Listing::embedding_text).collect();
	let vectors = ctx.providers.embedding.embed(&ctx.provider_cfg, &texts).await?;

	if vectors.len() != batch.len() {
		return Err(Error::Provider {
			message: format!(
				"Embedding provider returned {} vectors for {} texts.",
				vectors.len(),
				batch.len()
			),
		});
	}

	for vec in &vectors {
		crate::check_vector_dim(vec, ctx.vector_dim)?;
	}

	Ok(vectors)
}

async fn store_batch(
	ctx: &BatchContext,
	batch: &[Listing],
	vectors: &[Vec<f32>],
) -> Result<usize> {
	let now = OffsetDateTime::now_utc();

	for (listing, vec) in batch.iter().zip(vectors) {
		ctx.stores
			.embeddings
			.upsert_listing_embedding(listing.listing_id, &ctx.embedding_version, vec, now)
			.await?;
	}

	Ok(batch.len())
}
