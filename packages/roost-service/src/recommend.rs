use std::collections::{HashMap, HashSet};

use serde::Serialize;
use uuid::Uuid;

use roost_domain::{
	criteria::CandidateCriteria,
	listing::Listing,
	observation::{FeatureObservation, ObservationSummary},
	score::{ProcessingStatus, ScoreBreakdown, ScoreRecord},
};

use crate::{Result, RoostService};

pub const BELOW_THRESHOLD: &str = "BELOW_THRESHOLD";

// Axis scores at or above this are called out as reasons.
const STRONG_AXIS_SCORE: f64 = 70.0;

#[derive(Clone, Debug, Serialize)]
pub struct RecommendationResult {
	pub request_id: Uuid,
	pub recommended: Vec<RecommendationItem>,
	pub rejected: Vec<RecommendationItem>,
	pub summary: RecommendationSummary,
	pub query_context: QueryContext,
}

#[derive(Clone, Debug, Serialize)]
pub struct RecommendationItem {
	pub listing_id: i64,
	/// 1-based position within its list.
	pub rank: usize,
	pub base_total_score: f64,
	pub is_recommended: bool,
	pub processing_status: Option<ProcessingStatus>,
	/// `None` when unobserved or when the listing changed since it was observed.
	pub summary: Option<ObservationSummary>,
	/// `None` unless the score was computed from the listing's latest observation.
	pub score_breakdown: Option<ScoreBreakdown>,
	pub explanation: Explanation,
	pub reject_reason: Option<RejectReason>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Explanation {
	pub reasons: Vec<String>,
	pub warnings: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RejectReason {
	pub code: String,
	pub threshold: f64,
	pub achieved: f64,
	pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct RecommendationSummary {
	pub candidate_count: usize,
	pub recommended_count: usize,
	pub rejected_count: usize,
	pub message: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct QueryContext {
	pub criteria: Option<CandidateCriteria>,
	pub observation_version: String,
	pub policy_version: String,
	pub threshold_base_total: f64,
	pub top_k: usize,
}

impl RoostService {
	/// Ranks `candidate_ids` by their stored scores and explains each decision.
	///
	/// Missing scores rank at 0 and missing observations leave the summary empty; no candidate is
	/// dropped. Stale or mismatched data only suppresses detail. Version mismatches are not
	/// recomputed here; `refresh_listings` resolves them.
	pub async fn recommend(
		&self,
		request_id: Uuid,
		candidate_ids: &[i64],
	) -> Result<RecommendationResult> {
		let listings = self.stores.listings.list_listings(Some(candidate_ids)).await?;
		let scores = self.stores.scores.scores_for(candidate_ids).await?;
		let observations = self.stores.observations.latest_observations(candidate_ids).await?;
		let mut recommended = Vec::new();
		let mut rejected = Vec::new();
		let by_id: HashMap<i64, &Listing> =
			listings.iter().map(|listing| (listing.listing_id, listing)).collect();
		let mut seen = HashSet::with_capacity(candidate_ids.len());

		for &listing_id in candidate_ids {
			if !seen.insert(listing_id) {
				continue;
			}

			let current_snapshot =
				by_id.get(&listing_id).map(|listing| listing.compute_snapshot_id());
			let item = self.explain(
				listing_id,
				scores.get(&listing_id),
				observations.get(&listing_id),
				current_snapshot.as_deref(),
			);

			if item.is_recommended {
				recommended.push(item);
			} else {
				rejected.push(item);
			}
		}

		let candidate_count = seen.len();

		for list in [&mut recommended, &mut rejected] {
			list.sort_by(|a, b| {
				b.base_total_score
					.total_cmp(&a.base_total_score)
					.then_with(|| a.listing_id.cmp(&b.listing_id))
			});
			list.truncate(self.policy.top_k);

			for (index, item) in list.iter_mut().enumerate() {
				item.rank = index + 1;
			}
		}

		let message = (candidate_count == 0).then(|| "No candidates to rank.".to_string());

		Ok(RecommendationResult {
			request_id,
			summary: RecommendationSummary {
				candidate_count,
				recommended_count: recommended.len(),
				rejected_count: rejected.len(),
				message,
			},
			recommended,
			rejected,
			query_context: QueryContext {
				criteria: None,
				observation_version: self.cfg.observation.version.clone(),
				policy_version: self.policy.policy_version.clone(),
				threshold_base_total: self.policy.threshold_base_total,
				top_k: self.policy.top_k,
			},
		})
	}

	/// Filters listings for a stored request and ranks the survivors. `None` when the request does
	/// not exist.
	pub async fn recommend_for_request(
		&self,
		request_id: Uuid,
	) -> Result<Option<RecommendationResult>> {
		let Some(request) = self.stores.listings.get_renter_request(request_id).await? else {
			return Ok(None);
		};
		let outcome = self.filter(&request).await?;
		let ids: Vec<i64> =
			outcome.candidates.iter().map(|candidate| candidate.listing_id).collect();
		let mut result = self.recommend(request_id, &ids).await?;

		if outcome.message.is_some() {
			result.summary.message = outcome.message;
		}

		result.query_context.criteria = Some(outcome.criteria);

		Ok(Some(result))
	}

	fn explain(
		&self,
		listing_id: i64,
		score: Option<&ScoreRecord>,
		observation: Option<&FeatureObservation>,
		current_snapshot: Option<&str>,
	) -> RecommendationItem {
		let threshold = self.policy.threshold_base_total;
		let base_total_score = score.map_or(0.0, |record| record.base_total_score);
		let is_recommended = score.is_some() && self.policy.is_recommended(base_total_score);
		let mut warnings = Vec::new();
		let summary = match observation {
			Some(observation) if current_snapshot.is_some_and(|s| s != observation.snapshot_id) => {
				warnings.push("The listing changed since it was observed.".to_string());

				None
			},
			Some(observation) => Some(observation.summary()),
			None => {
				warnings.push("The listing has not been observed yet.".to_string());

				None
			},
		};
		let score_breakdown = match (score, observation) {
			(None, _) => {
				warnings.push("The listing has not been scored yet.".to_string());

				None
			},
			(Some(record), Some(observation))
				if record.observation_version != observation.observation_version =>
			{
				tracing::warn!(
					listing_id,
					observation_version = %observation.observation_version,
					score_observation_version = %record.observation_version,
					"Score and observation versions differ; withholding breakdown."
				);

				warnings.push(format!(
					"Score is from observation version {} but the latest is {}; refresh pending.",
					record.observation_version, observation.observation_version
				));

				None
			},
			(Some(record), _) => {
				match record.processing_status {
					ProcessingStatus::Completed => {},
					ProcessingStatus::Ready => warnings
						.push("A newer observation is waiting to be scored.".to_string()),
					ProcessingStatus::Failed => warnings.push(format!(
						"The latest scoring attempt failed: {}",
						record.last_error.as_deref().unwrap_or("unknown error")
					)),
				}

				if record.policy_version != self.policy.policy_version {
					warnings.push(format!(
						"Score was computed under policy {} rather than {}.",
						record.policy_version, self.policy.policy_version
					));
				}

				(record.processing_status == ProcessingStatus::Completed)
					.then(|| record.breakdown())
			},
		};
		let reasons = if is_recommended {
			recommendation_reasons(base_total_score, threshold, score_breakdown.as_ref())
		} else {
			Vec::new()
		};
		let reject_reason = (!is_recommended).then(|| RejectReason {
			code: BELOW_THRESHOLD.to_string(),
			threshold,
			achieved: base_total_score,
			message: format!(
				"Score {base_total_score:.1} is below the recommendation threshold {threshold:.1}."
			),
		});

		RecommendationItem {
			listing_id,
			rank: 0,
			base_total_score,
			is_recommended,
			processing_status: score.map(|record| record.processing_status),
			summary,
			score_breakdown,
			explanation: Explanation { reasons, warnings },
			reject_reason,
		}
	}
}

fn recommendation_reasons(
	base_total_score: f64,
	threshold: f64,
	breakdown: Option<&ScoreBreakdown>,
) -> Vec<String> {
	let mut reasons = Vec::new();

	if let Some(breakdown) = breakdown {
		for (axis, value) in [
			("price", breakdown.price_score),
			("safety", breakdown.risk_score),
			("options", breakdown.option_score),
			("distance", breakdown.distance_score),
		] {
			if value >= STRONG_AXIS_SCORE {
				reasons.push(format!("Strong {axis} score ({value:.1})."));
			}
		}
	}

	if reasons.is_empty() {
		reasons.push(format!(
			"Overall score {base_total_score:.1} meets the recommendation threshold {threshold:.1}."
		));
	}

	reasons
}
