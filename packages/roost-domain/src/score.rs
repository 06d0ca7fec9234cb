use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
	observation::{DistanceSummary, FeatureObservation, RiskFeatures},
	policy::DecisionPolicy,
};

/// Floor position assumed when a listing does not report its floor.
const UNKNOWN_FLOOR_RATIO: f64 = 0.5;

pub type Result<T, E = ScoreError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
	#[error("Observation for listing {listing_id} has invalid {field}: {message}")]
	InvalidObservation { listing_id: i64, field: &'static str, message: String },
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessingStatus {
	/// A fresh observation exists and is waiting for the next refresh.
	Ready,
	Completed,
	Failed,
}
impl ProcessingStatus {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Ready => "READY",
			Self::Completed => "COMPLETED",
			Self::Failed => "FAILED",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"READY" => Some(Self::Ready),
			"COMPLETED" => Some(Self::Completed),
			"FAILED" => Some(Self::Failed),
			_ => None,
		}
	}
}

/// The current score of one listing. Upserted by `listing_id`; no history is kept.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ScoreRecord {
	pub listing_id: i64,
	pub snapshot_id: String,
	pub price_score: f64,
	pub option_score: f64,
	pub risk_score: f64,
	pub distance_score: f64,
	pub base_total_score: f64,
	pub is_recommended: bool,
	pub observation_version: String,
	pub policy_version: String,
	pub processing_status: ProcessingStatus,
	pub last_error: Option<String>,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
}
impl ScoreRecord {
	pub fn breakdown(&self) -> ScoreBreakdown {
		ScoreBreakdown {
			price_score: self.price_score,
			risk_score: self.risk_score,
			option_score: self.option_score,
			distance_score: self.distance_score,
			base_total_score: self.base_total_score,
			observation_version: self.observation_version.clone(),
			policy_version: self.policy_version.clone(),
		}
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ScoreBreakdown {
	pub price_score: f64,
	pub risk_score: f64,
	pub option_score: f64,
	pub distance_score: f64,
	pub base_total_score: f64,
	pub observation_version: String,
	pub policy_version: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AxisScores {
	pub price: f64,
	pub risk: f64,
	pub option: f64,
	pub distance: f64,
}

/// Scores one observation under `policy`.
///
/// The record carries both versions so it is only ever compared with the observation generation
/// it was derived from.
pub fn calculate(
	observation: &FeatureObservation,
	policy: &DecisionPolicy,
	now: OffsetDateTime,
) -> Result<ScoreRecord> {
	let axes = axis_scores(observation, policy)?;
	let weighted = axes.price * policy.axis.price
		+ axes.risk * policy.axis.risk
		+ axes.option * policy.axis.option
		+ axes.distance * policy.axis.distance;
	let base_total_score = round_one_decimal(weighted).clamp(0.0, 100.0);

	Ok(ScoreRecord {
		listing_id: observation.listing_id,
		snapshot_id: observation.snapshot_id.clone(),
		price_score: axes.price,
		option_score: axes.option,
		risk_score: axes.risk,
		distance_score: axes.distance,
		base_total_score,
		is_recommended: policy.is_recommended(base_total_score),
		observation_version: observation.observation_version.clone(),
		policy_version: policy.policy_version.clone(),
		processing_status: ProcessingStatus::Completed,
		last_error: None,
		updated_at: now,
	})
}

pub fn axis_scores(
	observation: &FeatureObservation,
	policy: &DecisionPolicy,
) -> Result<AxisScores> {
	let listing_id = observation.listing_id;
	let price = &observation.price;

	check_non_negative(listing_id, "price.move_in_cost", price.move_in_cost)?;
	check_non_negative(listing_id, "price.monthly_cost", price.monthly_cost)?;

	let Some(stats) = price.stats else {
		return Err(ScoreError::InvalidObservation {
			listing_id,
			field: "price.stats",
			message: "population statistics are missing.".to_string(),
		});
	};

	check_unit(listing_id, "price.deposit_percentile", stats.deposit_percentile)?;
	check_unit(listing_id, "price.monthly_percentile", stats.monthly_percentile)?;
	check_finite(listing_id, "price.monthly_zscore", stats.monthly_zscore)?;

	let price_score = blend(
		&[
			percentile_score(stats.deposit_percentile),
			percentile_score(stats.monthly_percentile),
			zscore_score(stats.monthly_zscore, policy.zscore_min, policy.zscore_max),
		],
		&policy.price,
	);
	let risk_score = blend(&risk_sub_scores(listing_id, &observation.risk)?, &policy.risk);
	let option = &observation.option;

	check_non_negative(listing_id, "option.essential_coverage", option.essential_coverage)?;
	check_non_negative(listing_id, "option.amenity_ratio", option.amenity_ratio)?;

	let option_score = blend(
		&[ratio_score(option.essential_coverage), ratio_score(option.amenity_ratio)],
		&policy.option,
	);
	let distance_score = match observation.distance.as_ref() {
		Some(distance) =>
			blend(&distance_sub_scores(listing_id, distance, policy)?, &policy.distance),
		None => 0.0,
	};

	Ok(AxisScores {
		price: price_score,
		risk: risk_score,
		option: option_score,
		distance: distance_score,
	})
}

fn risk_sub_scores(listing_id: i64, risk: &RiskFeatures) -> Result<[f64; 3]> {
	let safety = if risk.is_banned {
		0.0
	} else if let Some(assessment) = risk.assessment.as_ref() {
		check_finite(listing_id, "risk.assessment.score", assessment.score)?;

		(100.0 - assessment.score).clamp(0.0, 100.0)
	} else {
		100.0
	};
	let floor_ratio = risk.floor_ratio.unwrap_or(UNKNOWN_FLOOR_RATIO);

	check_unit(listing_id, "risk.floor_ratio", floor_ratio)?;

	let location = if risk.has_location { 100.0 } else { 0.0 };

	Ok([safety, ratio_score(floor_ratio), location])
}

fn distance_sub_scores(
	listing_id: i64,
	distance: &DistanceSummary,
	policy: &DecisionPolicy,
) -> Result<[f64; 3]> {
	check_non_negative(listing_id, "distance.minutes", distance.minutes)?;
	check_unit(listing_id, "distance.percentile", distance.percentile)?;
	check_unit(listing_id, "distance.nonlinear_score", distance.nonlinear_score)?;

	Ok([
		ratio_score(distance.nonlinear_score),
		minutes_score(
			distance.minutes,
			policy.distance_full_minutes,
			policy.distance_zero_minutes,
		),
		percentile_score(distance.percentile),
	])
}

/// Lower percentile is better: 0.0 maps to 100, 1.0 maps to 0.
pub fn percentile_score(percentile: f64) -> f64 {
	((1.0 - percentile) * 100.0).clamp(0.0, 100.0)
}

/// Ratios in [0, 1] scale to [0, 100]. Values above 1 are taken as already on the 0-100 scale.
pub fn ratio_score(ratio: f64) -> f64 {
	if ratio > 1.0 { ratio.min(100.0) } else { (ratio * 100.0).max(0.0) }
}

/// Maps `[zscore_min, zscore_max]` linearly onto `[100, 0]`, clamped outside the window.
pub fn zscore_score(zscore: f64, zscore_min: f64, zscore_max: f64) -> f64 {
	linear_descending(zscore, zscore_min, zscore_max)
}

/// 100 up to `full` minutes, 0 from `zero` minutes, linear in between.
pub fn minutes_score(minutes: f64, full: f64, zero: f64) -> f64 {
	linear_descending(minutes, full, zero)
}

fn linear_descending(value: f64, low: f64, high: f64) -> f64 {
	if value <= low {
		return 100.0;
	}
	if value >= high {
		return 0.0;
	}

	(high - value) / (high - low) * 100.0
}

fn blend<const N: usize>(scores: &[f64; N], weights: &[f64; N]) -> f64 {
	scores.iter().zip(weights).map(|(score, weight)| score * weight).sum::<f64>().clamp(0.0, 100.0)
}

fn round_one_decimal(value: f64) -> f64 {
	(value * 10.0).round() / 10.0
}

fn check_finite(listing_id: i64, field: &'static str, value: f64) -> Result<()> {
	if value.is_finite() {
		return Ok(());
	}

	Err(ScoreError::InvalidObservation {
		listing_id,
		field,
		message: format!("must be a finite number, got {value}."),
	})
}

fn check_non_negative(listing_id: i64, field: &'static str, value: f64) -> Result<()> {
	check_finite(listing_id, field, value)?;

	if value < 0.0 {
		return Err(ScoreError::InvalidObservation {
			listing_id,
			field,
			message: format!("must be zero or greater, got {value}."),
		});
	}

	Ok(())
}

fn check_unit(listing_id: i64, field: &'static str, value: f64) -> Result<()> {
	check_finite(listing_id, field, value)?;

	if !(0.0..=1.0).contains(&value) {
		return Err(ScoreError::InvalidObservation {
			listing_id,
			field,
			message: format!("must be in the range 0.0-1.0, got {value}."),
		});
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use time::{OffsetDateTime, macros::datetime};

	use roost_config::{
		AxisWeights, DistanceSubWeights, OptionSubWeights, Policy, PriceSubWeights, RiskSubWeights,
	};

	use crate::{
		observation::{
			DistanceSummary, FeatureObservation, OptionFeatures, PriceFeatures, PriceStats,
			RiskAssessment, RiskFeatures, RiskLevel,
		},
		policy::DecisionPolicy,
		score::{self, ProcessingStatus, ScoreError, calculate},
	};

	const NOW: OffsetDateTime = datetime!(2026-03-01 00:00 UTC);

	fn policy(threshold: f64) -> DecisionPolicy {
		DecisionPolicy::from_config(&Policy {
			policy_version: "policy-v1".to_string(),
			threshold_base_total: threshold,
			top_k: 10,
			zscore_min: -2.0,
			zscore_max: 2.0,
			distance_full_minutes: 10.0,
			distance_zero_minutes: 60.0,
			weights: AxisWeights { price: 0.35, risk: 0.25, option: 0.15, distance: 0.25 },
			price: PriceSubWeights {
				deposit_percentile: 0.4,
				monthly_percentile: 0.4,
				monthly_zscore: 0.2,
			},
			risk: RiskSubWeights { safety: 0.5, floor: 0.2, location: 0.3 },
			option: OptionSubWeights { essential: 0.7, amenity: 0.3 },
			distance: DistanceSubWeights { nonlinear: 0.5, minutes: 0.3, percentile: 0.2 },
		})
	}

	fn observation(
		deposit_percentile: f64,
		monthly_percentile: f64,
		monthly_zscore: f64,
	) -> FeatureObservation {
		FeatureObservation {
			listing_id: 1,
			snapshot_id: "snap".to_string(),
			price: PriceFeatures {
				move_in_cost: 1_000.0,
				monthly_cost: 55.0,
				stats: Some(PriceStats {
					deposit_percentile,
					monthly_percentile,
					monthly_zscore,
					nonlinear_price_burden: 1.0,
				}),
			},
			risk: RiskFeatures {
				is_banned: false,
				floor_ratio: Some(0.6),
				has_location: true,
				region_code: None,
				assessment: None,
			},
			option: OptionFeatures {
				essential_coverage: 0.75,
				amenity_ratio: 0.5,
				amenities: Vec::new(),
			},
			distance: Some(DistanceSummary {
				reference_location_id: 1,
				minutes: 20.0,
				percentile: 0.1,
				nonlinear_score: 0.8,
			}),
			calculated_at: NOW,
			observation_version: "obs-v1".to_string(),
			source_data_version: "crawl-v1".to_string(),
		}
	}

	#[test]
	fn sub_feature_mappings_follow_their_kind() {
		assert_eq!(score::percentile_score(0.0), 100.0);
		assert_eq!(score::percentile_score(1.0), 0.0);
		assert_eq!(score::ratio_score(0.25), 25.0);
		assert_eq!(score::ratio_score(80.0), 80.0);
		assert_eq!(score::ratio_score(250.0), 100.0);
		assert_eq!(score::zscore_score(-3.0, -2.0, 2.0), 100.0);
		assert_eq!(score::zscore_score(0.0, -2.0, 2.0), 50.0);
		assert_eq!(score::zscore_score(2.5, -2.0, 2.0), 0.0);
		assert_eq!(score::minutes_score(35.0, 10.0, 60.0), 50.0);
	}

	#[test]
	fn composite_is_weighted_and_rounded() {
		let record = calculate(&observation(0.5, 0.5, 0.0), &policy(60.0), NOW)
			.expect("Expected score.");

		// price: 0.4*50 + 0.4*50 + 0.2*50 = 50
		assert!((record.price_score - 50.0).abs() < 1e-9);
		// risk: 0.5*100 + 0.2*60 + 0.3*100 = 92
		assert!((record.risk_score - 92.0).abs() < 1e-9);
		// option: 0.7*75 + 0.3*50 = 67.5
		assert!((record.option_score - 67.5).abs() < 1e-9);
		// distance: 0.5*80 + 0.3*80 + 0.2*90 = 82
		assert!((record.distance_score - 82.0).abs() < 1e-9);
		// 0.35*50 + 0.25*92 + 0.15*67.5 + 0.25*82 = 71.125
		assert_eq!(record.base_total_score, 71.1);
		assert!(record.is_recommended);
		assert_eq!(record.processing_status, ProcessingStatus::Completed);
		assert_eq!(record.observation_version, "obs-v1");
		assert_eq!(record.policy_version, "policy-v1");
	}

	#[test]
	fn recommendation_matches_threshold_for_every_score() {
		let policy = policy(55.0);

		for step in 0..=10 {
			let p = f64::from(step) / 10.0;
			let record = calculate(&observation(p, 1.0 - p, p * 4.0 - 2.0), &policy, NOW)
				.expect("Expected score.");

			assert!((0.0..=100.0).contains(&record.base_total_score));
			assert_eq!(record.is_recommended, record.base_total_score >= 55.0);
		}
	}

	#[test]
	fn cheapest_and_most_expensive_bound_the_price_axis() {
		let policy = policy(60.0);
		let cheapest =
			calculate(&observation(0.0, 0.0, -5.0), &policy, NOW).expect("Expected score.");
		let priciest =
			calculate(&observation(1.0, 1.0, 5.0), &policy, NOW).expect("Expected score.");

		assert!((cheapest.price_score - 100.0).abs() < 1e-9);
		assert_eq!(priciest.price_score, 0.0);
	}

	#[test]
	fn banned_listing_loses_safety_even_with_assessment() {
		let mut observation = observation(0.5, 0.5, 0.0);

		observation.risk.is_banned = true;
		observation.risk.assessment = Some(RiskAssessment {
			score: 10.0,
			level: RiskLevel::Safe,
			reason: "clean registry".to_string(),
		});

		let axes = score::axis_scores(&observation, &policy(60.0)).expect("Expected axes.");

		assert!((axes.risk - 42.0).abs() < 1e-9);
	}

	#[test]
	fn external_risk_uses_inverted_score() {
		let mut observation = observation(0.5, 0.5, 0.0);

		observation.risk.assessment = Some(RiskAssessment {
			score: 99.5,
			level: RiskLevel::Danger,
			reason: "seizure on record".to_string(),
		});

		let axes = score::axis_scores(&observation, &policy(60.0)).expect("Expected axes.");

		// 0.5*0.5 + 0.2*60 + 0.3*100 = 42.25
		assert!((axes.risk - 42.25).abs() < 1e-9);
	}

	#[test]
	fn missing_distance_zeroes_the_axis() {
		let mut observation = observation(0.5, 0.5, 0.0);

		observation.distance = None;

		let axes = score::axis_scores(&observation, &policy(60.0)).expect("Expected axes.");

		assert_eq!(axes.distance, 0.0);
	}

	#[test]
	fn malformed_observation_is_rejected() {
		let mut observation = observation(0.5, 0.5, 0.0);

		observation.price.stats = observation.price.stats.map(|mut stats| {
			stats.monthly_percentile = f64::NAN;

			stats
		});

		let err = calculate(&observation, &policy(60.0), NOW)
			.expect_err("Expected invalid observation.");

		assert!(matches!(
			err,
			ScoreError::InvalidObservation { field: "price.monthly_percentile", .. }
		));
	}

	#[test]
	fn missing_population_stats_are_rejected() {
		let mut observation = observation(0.5, 0.5, 0.0);

		observation.price.stats = None;

		assert!(calculate(&observation, &policy(60.0), NOW).is_err());
	}
}
