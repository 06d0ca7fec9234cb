use serde::Serialize;

use roost_config::{
	AxisWeights, DistanceSubWeights, OptionSubWeights, Policy, PriceSubWeights, RiskSubWeights,
};

pub const DEFAULT_AXIS_WEIGHTS: AxisWeights =
	AxisWeights { price: 0.35, risk: 0.25, option: 0.15, distance: 0.25 };
pub const DEFAULT_PRICE_WEIGHTS: PriceSubWeights =
	PriceSubWeights { deposit_percentile: 0.4, monthly_percentile: 0.4, monthly_zscore: 0.2 };
pub const DEFAULT_RISK_WEIGHTS: RiskSubWeights =
	RiskSubWeights { safety: 0.5, floor: 0.2, location: 0.3 };
pub const DEFAULT_OPTION_WEIGHTS: OptionSubWeights =
	OptionSubWeights { essential: 0.7, amenity: 0.3 };
pub const DEFAULT_DISTANCE_WEIGHTS: DistanceSubWeights =
	DistanceSubWeights { nonlinear: 0.5, minutes: 0.3, percentile: 0.2 };

/// An immutable, versioned scoring policy.
///
/// Every weight group is normalized to sum to 1 once, at construction. A group whose weights sum
/// to zero is replaced by its default.
#[derive(Clone, Debug, Serialize)]
pub struct DecisionPolicy {
	pub policy_version: String,
	pub threshold_base_total: f64,
	pub top_k: usize,
	pub zscore_min: f64,
	pub zscore_max: f64,
	pub distance_full_minutes: f64,
	pub distance_zero_minutes: f64,
	pub axis: NormalizedAxisWeights,
	pub price: [f64; 3],
	pub risk: [f64; 3],
	pub option: [f64; 2],
	pub distance: [f64; 3],
}
impl DecisionPolicy {
	pub fn from_config(policy: &Policy) -> Self {
		let axis = normalize_weights(
			"policy.weights",
			[
				policy.weights.price,
				policy.weights.risk,
				policy.weights.option,
				policy.weights.distance,
			],
			[
				DEFAULT_AXIS_WEIGHTS.price,
				DEFAULT_AXIS_WEIGHTS.risk,
				DEFAULT_AXIS_WEIGHTS.option,
				DEFAULT_AXIS_WEIGHTS.distance,
			],
		);
		let price = normalize_weights(
			"policy.price",
			[
				policy.price.deposit_percentile,
				policy.price.monthly_percentile,
				policy.price.monthly_zscore,
			],
			[
				DEFAULT_PRICE_WEIGHTS.deposit_percentile,
				DEFAULT_PRICE_WEIGHTS.monthly_percentile,
				DEFAULT_PRICE_WEIGHTS.monthly_zscore,
			],
		);
		let risk = normalize_weights(
			"policy.risk",
			[policy.risk.safety, policy.risk.floor, policy.risk.location],
			[
				DEFAULT_RISK_WEIGHTS.safety,
				DEFAULT_RISK_WEIGHTS.floor,
				DEFAULT_RISK_WEIGHTS.location,
			],
		);
		let option = normalize_weights(
			"policy.option",
			[policy.option.essential, policy.option.amenity],
			[DEFAULT_OPTION_WEIGHTS.essential, DEFAULT_OPTION_WEIGHTS.amenity],
		);
		let distance = normalize_weights(
			"policy.distance",
			[policy.distance.nonlinear, policy.distance.minutes, policy.distance.percentile],
			[
				DEFAULT_DISTANCE_WEIGHTS.nonlinear,
				DEFAULT_DISTANCE_WEIGHTS.minutes,
				DEFAULT_DISTANCE_WEIGHTS.percentile,
			],
		);

		Self {
			policy_version: policy.policy_version.clone(),
			threshold_base_total: policy.threshold_base_total,
			top_k: policy.top_k as usize,
			zscore_min: policy.zscore_min,
			zscore_max: policy.zscore_max,
			distance_full_minutes: policy.distance_full_minutes,
			distance_zero_minutes: policy.distance_zero_minutes,
			axis: NormalizedAxisWeights {
				price: axis[0],
				risk: axis[1],
				option: axis[2],
				distance: axis[3],
			},
			price,
			risk,
			option,
			distance,
		}
	}

	pub fn is_recommended(&self, base_total_score: f64) -> bool {
		base_total_score >= self.threshold_base_total
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct NormalizedAxisWeights {
	pub price: f64,
	pub risk: f64,
	pub option: f64,
	pub distance: f64,
}
impl NormalizedAxisWeights {
	pub fn sum(&self) -> f64 {
		self.price + self.risk + self.option + self.distance
	}
}

/// Scales `weights` to sum to 1. Negative and non-finite entries count as zero.
pub fn normalize_weights<const N: usize>(
	group: &str,
	weights: [f64; N],
	default: [f64; N],
) -> [f64; N] {
	let cleaned =
		weights.map(|weight| if weight.is_finite() && weight > 0.0 { weight } else { 0.0 });
	let sum: f64 = cleaned.iter().sum();

	if sum <= 0.0 || !sum.is_finite() {
		tracing::warn!(group, "Weight group sums to zero. Falling back to default weights.");

		let default_sum: f64 = default.iter().sum();

		return default.map(|weight| weight / default_sum);
	}

	cleaned.map(|weight| weight / sum)
}
