mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	AxisWeights, Batch, Catalog, Config, DistanceSubWeights, EmbeddingProviderConfig, Filter,
	Observation, OptionSubWeights, Policy, Postgres, PriceSubWeights, Providers, RiskProviderConfig,
	RiskSubWeights, Semantic, Service, Storage,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.observation.version.trim().is_empty() {
		return Err(Error::Validation {
			message: "observation.version must be non-empty.".to_string(),
		});
	}
	if cfg.observation.source_data_version.trim().is_empty() {
		return Err(Error::Validation {
			message: "observation.source_data_version must be non-empty.".to_string(),
		});
	}
	if cfg.storage.vector_dim == 0 {
		return Err(Error::Validation {
			message: "storage.vector_dim must be greater than zero.".to_string(),
		});
	}
	if cfg.providers.embedding.dimensions != cfg.storage.vector_dim {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must match storage.vector_dim.".to_string(),
		});
	}
	if !cfg.providers.embedding.is_hash() && cfg.providers.embedding.api_key.trim().is_empty() {
		return Err(Error::Validation {
			message: "providers.embedding.api_key must be non-empty for remote providers."
				.to_string(),
		});
	}
	if !cfg.providers.risk.provider_id.eq_ignore_ascii_case("mock") {
		return Err(Error::Validation {
			message: "providers.risk.provider_id must be mock.".to_string(),
		});
	}

	validate_policy(&cfg.policy)?;

	if !cfg.filter.margin_ratio.is_finite() || cfg.filter.margin_ratio < 0.0 {
		return Err(Error::Validation {
			message: "filter.margin_ratio must be a finite number zero or greater.".to_string(),
		});
	}
	if !cfg.filter.near_campus_max_minutes.is_finite() || cfg.filter.near_campus_max_minutes <= 0.0
	{
		return Err(Error::Validation {
			message: "filter.near_campus_max_minutes must be greater than zero.".to_string(),
		});
	}
	if cfg.semantic.pool_limit == 0 {
		return Err(Error::Validation {
			message: "semantic.pool_limit must be greater than zero.".to_string(),
		});
	}
	if cfg.semantic.top_k == 0 {
		return Err(Error::Validation {
			message: "semantic.top_k must be greater than zero.".to_string(),
		});
	}
	if cfg.batch.concurrency == 0 {
		return Err(Error::Validation {
			message: "batch.concurrency must be greater than zero.".to_string(),
		});
	}
	if cfg.batch.embedding_batch_size == 0 {
		return Err(Error::Validation {
			message: "batch.embedding_batch_size must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_policy(policy: &Policy) -> Result<()> {
	if policy.policy_version.trim().is_empty() {
		return Err(Error::Validation {
			message: "policy.policy_version must be non-empty.".to_string(),
		});
	}
	if !policy.threshold_base_total.is_finite()
		|| !(0.0..=100.0).contains(&policy.threshold_base_total)
	{
		return Err(Error::Validation {
			message: "policy.threshold_base_total must be in the range 0.0-100.0.".to_string(),
		});
	}
	if policy.top_k == 0 {
		return Err(Error::Validation {
			message: "policy.top_k must be greater than zero.".to_string(),
		});
	}
	if !policy.zscore_min.is_finite() || !policy.zscore_max.is_finite() {
		return Err(Error::Validation {
			message: "policy.zscore_min and policy.zscore_max must be finite numbers.".to_string(),
		});
	}
	if policy.zscore_min >= policy.zscore_max {
		return Err(Error::Validation {
			message: "policy.zscore_min must be less than policy.zscore_max.".to_string(),
		});
	}
	if !policy.distance_full_minutes.is_finite()
		|| !policy.distance_zero_minutes.is_finite()
		|| policy.distance_full_minutes < 0.0
	{
		return Err(Error::Validation {
			message: "policy.distance_full_minutes and policy.distance_zero_minutes must be finite \
				and zero or greater."
				.to_string(),
		});
	}
	if policy.distance_full_minutes >= policy.distance_zero_minutes {
		return Err(Error::Validation {
			message: "policy.distance_full_minutes must be less than policy.distance_zero_minutes."
				.to_string(),
		});
	}

	let weights = [
		("policy.weights.price", policy.weights.price),
		("policy.weights.risk", policy.weights.risk),
		("policy.weights.option", policy.weights.option),
		("policy.weights.distance", policy.weights.distance),
		("policy.price.deposit_percentile", policy.price.deposit_percentile),
		("policy.price.monthly_percentile", policy.price.monthly_percentile),
		("policy.price.monthly_zscore", policy.price.monthly_zscore),
		("policy.risk.safety", policy.risk.safety),
		("policy.risk.floor", policy.risk.floor),
		("policy.risk.location", policy.risk.location),
		("policy.option.essential", policy.option.essential),
		("policy.option.amenity", policy.option.amenity),
		("policy.distance.nonlinear", policy.distance.nonlinear),
		("policy.distance.minutes", policy.distance.minutes),
		("policy.distance.percentile", policy.distance.percentile),
	];

	for (path, value) in weights {
		if !value.is_finite() {
			return Err(Error::Validation { message: format!("{path} must be a finite number.") });
		}
		if value < 0.0 {
			return Err(Error::Validation { message: format!("{path} must be zero or greater.") });
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.observation.version = cfg.observation.version.trim().to_string();
	cfg.observation.source_data_version = cfg.observation.source_data_version.trim().to_string();
	cfg.policy.policy_version = cfg.policy.policy_version.trim().to_string();

	if cfg.service.log_level.trim().is_empty() {
		cfg.service.log_level = "info".to_string();
	}
}
