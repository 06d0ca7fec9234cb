//! Population-level positioning of raw price features.

use crate::observation::{FeatureObservation, PriceStats};

/// Fills `price.stats` on every observation from the population they form together.
///
/// Percentiles are `count(x <= v) / N`, so the most expensive listing sits at 1.0. The z-score
/// uses the population standard deviation and is zero for every member when the deviation is
/// zero.
pub fn apply_population_stats(observations: &mut [FeatureObservation]) {
	if observations.is_empty() {
		return;
	}

	let deposits: Vec<f64> =
		observations.iter().map(|observation| observation.price.move_in_cost).collect();
	let monthly: Vec<f64> =
		observations.iter().map(|observation| observation.price.monthly_cost).collect();
	let (mean, std_dev) = mean_and_std_dev(&monthly);

	for observation in observations.iter_mut() {
		let monthly_zscore = zscore(observation.price.monthly_cost, mean, std_dev);

		observation.price.stats = Some(PriceStats {
			deposit_percentile: percentile(&deposits, observation.price.move_in_cost),
			monthly_percentile: percentile(&monthly, observation.price.monthly_cost),
			monthly_zscore,
			nonlinear_price_burden: nonlinear_price_burden(monthly_zscore),
		});
	}
}

/// Share of `population` at or below `value`.
pub fn percentile(population: &[f64], value: f64) -> f64 {
	if population.is_empty() {
		return 0.0;
	}

	let at_or_below = population.iter().filter(|candidate| **candidate <= value).count();

	at_or_below as f64 / population.len() as f64
}

pub fn mean_and_std_dev(values: &[f64]) -> (f64, f64) {
	if values.is_empty() {
		return (0.0, 0.0);
	}

	let n = values.len() as f64;
	let mean = values.iter().sum::<f64>() / n;
	let variance = values.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / n;

	(mean, variance.sqrt())
}

pub fn zscore(value: f64, mean: f64, std_dev: f64) -> f64 {
	if std_dev <= f64::EPSILON || !std_dev.is_finite() {
		return 0.0;
	}

	(value - mean) / std_dev
}

/// 1.0 for listings at or below the mean, decaying as `exp(-z)` above it.
pub fn nonlinear_price_burden(zscore: f64) -> f64 {
	if zscore <= 0.0 { 1.0 } else { (-zscore).exp() }
}
