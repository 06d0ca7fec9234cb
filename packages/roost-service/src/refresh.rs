use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::{sync::Semaphore, task::JoinSet};

use roost_domain::{
	observation::FeatureObservation,
	policy::DecisionPolicy,
	score::{self, ScoreRecord},
};
use roost_storage::store::FailedScore;

use crate::{Result, RoostService, Stores};

#[derive(Clone, Debug, Serialize)]
pub struct RefreshFailure {
	pub listing_id: i64,
	pub error: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct RefreshResult {
	pub observation_version: String,
	pub policy_version: String,
	pub processed: usize,
	pub failed: usize,
	pub failures: Vec<RefreshFailure>,
	/// Completed scores at or above the threshold for the version pair, best first.
	pub top_k: Vec<ScoreRecord>,
}

impl RoostService {
	/// Rescores the latest observation of every listing within `observation_version`, or of every
	/// listing when omitted.
	///
	/// A listing whose score cannot be computed is marked FAILED and counted; the pass continues.
	/// Store failures abort the pass.
	pub async fn refresh(&self, observation_version: Option<&str>) -> Result<RefreshResult> {
		let observations =
			self.stores.observations.observations_by_version(observation_version).await?;
		let leaderboard_version =
			observation_version.unwrap_or(self.cfg.observation.version.as_str()).to_string();

		self.refresh_observations(observations, leaderboard_version).await
	}

	/// Rescores the latest observation of each listing in `listing_ids`.
	pub async fn refresh_listings(&self, listing_ids: &[i64]) -> Result<RefreshResult> {
		let mut latest = self.stores.observations.latest_observations(listing_ids).await?;
		let observations =
			listing_ids.iter().filter_map(|listing_id| latest.remove(listing_id)).collect();

		self.refresh_observations(observations, self.cfg.observation.version.clone()).await
	}

	async fn refresh_observations(
		&self,
		observations: Vec<FeatureObservation>,
		leaderboard_version: String,
	) -> Result<RefreshResult> {
		let semaphore = Arc::new(Semaphore::new(self.cfg.batch.concurrency.max(1) as usize));
		let policy = Arc::new(self.policy.clone());
		let mut tasks = JoinSet::new();

		for observation in observations {
			let semaphore = semaphore.clone();
			let policy = policy.clone();
			let stores = self.stores.clone();

			tasks.spawn(async move {
				let _permit = semaphore.acquire_owned().await;

				refresh_one(&stores, &policy, observation).await
			});
		}

		let mut processed = 0;
		let mut failures = Vec::new();

		while let Some(joined) = tasks.join_next().await {
			match joined?? {
				None => processed += 1,
				Some(failure) => failures.push(failure),
			}
		}

		failures.sort_by_key(|failure| failure.listing_id);

		let top_k = self
			.stores
			.scores
			.top_scores(
				&leaderboard_version,
				&self.policy.policy_version,
				self.policy.threshold_base_total,
				self.policy.top_k as i64,
			)
			.await?;

		tracing::info!(
			observation_version = %leaderboard_version,
			policy_version = %self.policy.policy_version,
			processed,
			failed = failures.len(),
			"Score refresh finished."
		);

		Ok(RefreshResult {
			observation_version: leaderboard_version,
			policy_version: self.policy.policy_version.clone(),
			processed,
			failed: failures.len(),
			failures,
			top_k,
		})
	}
}

async fn refresh_one(
	stores: &Stores,
	policy: &DecisionPolicy,
	observation: FeatureObservation,
) -> Result<Option<RefreshFailure>> {
	let now = OffsetDateTime::now_utc();

	match score::calculate(&observation, policy, now) {
		Ok(record) => {
			stores.scores.upsert_score(&record).await?;

			Ok(None)
		},
		Err(err) => {
			let error = err.to_string();

			tracing::warn!(
				listing_id = observation.listing_id,
				observation_version = %observation.observation_version,
				policy_version = %policy.policy_version,
				error = %error,
				"Failed to score listing."
			);

			stores
				.scores
				.mark_failed(&FailedScore {
					listing_id: observation.listing_id,
					snapshot_id: observation.snapshot_id.clone(),
					observation_version: observation.observation_version.clone(),
					policy_version: policy.policy_version.clone(),
					error: error.clone(),
					at: now,
				})
				.await?;

			Ok(Some(RefreshFailure { listing_id: observation.listing_id, error }))
		},
	}
}
