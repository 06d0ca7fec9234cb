use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::listing::{ESSENTIAL_SIGNAL_COUNT, Listing, ListingOptions, TRACKED_AMENITIES};

pub type Result<T, E = ObservationError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum ObservationError {
	#[error("Listing {listing_id} was not found.")]
	ListingNotFound { listing_id: i64 },
	#[error("Listing {listing_id} has invalid {field}: {message}")]
	InvalidListing { listing_id: i64, field: &'static str, message: String },
}

/// A versioned feature vector derived from one listing at one point in time.
///
/// Rows are append-only. The price statistics stay `None` until the population pass has
/// positioned the observation among its peers.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct FeatureObservation {
	pub listing_id: i64,
	pub snapshot_id: String,
	pub price: PriceFeatures,
	pub risk: RiskFeatures,
	pub option: OptionFeatures,
	pub distance: Option<DistanceSummary>,
	#[serde(with = "crate::time_serde")]
	pub calculated_at: OffsetDateTime,
	pub observation_version: String,
	pub source_data_version: String,
}
impl FeatureObservation {
	pub fn summary(&self) -> ObservationSummary {
		ObservationSummary {
			snapshot_id: self.snapshot_id.clone(),
			move_in_cost: self.price.move_in_cost,
			monthly_cost: self.price.monthly_cost,
			monthly_percentile: self.price.stats.map(|stats| stats.monthly_percentile),
			nonlinear_price_burden: self.price.stats.map(|stats| stats.nonlinear_price_burden),
			essential_coverage: self.option.essential_coverage,
			nearest_minutes: self.distance.as_ref().map(|distance| distance.minutes),
			risk_level: self.risk.assessment.as_ref().map(|assessment| assessment.level),
			observation_version: self.observation_version.clone(),
		}
	}
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct PriceFeatures {
	pub move_in_cost: f64,
	pub monthly_cost: f64,
	pub stats: Option<PriceStats>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct PriceStats {
	pub deposit_percentile: f64,
	pub monthly_percentile: f64,
	pub monthly_zscore: f64,
	pub nonlinear_price_burden: f64,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RiskFeatures {
	pub is_banned: bool,
	/// Floor position in the building, `None` when either floor count is unknown.
	pub floor_ratio: Option<f64>,
	pub has_location: bool,
	pub region_code: Option<String>,
	pub assessment: Option<RiskAssessment>,
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
	Safe,
	Warn,
	Danger,
}
impl RiskLevel {
	pub fn from_score(score: f64) -> Self {
		if score >= 70.0 {
			Self::Danger
		} else if score >= 40.0 {
			Self::Warn
		} else {
			Self::Safe
		}
	}
}

/// External risk verdict. `score` runs 0-100 where higher is riskier.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RiskAssessment {
	pub score: f64,
	pub level: RiskLevel,
	pub reason: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct OptionFeatures {
	pub essential_coverage: f64,
	pub amenity_ratio: f64,
	pub amenities: Vec<String>,
}

/// Distance to the nearest reference location, copied from the fan-out pass.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DistanceSummary {
	pub reference_location_id: i64,
	pub minutes: f64,
	pub percentile: f64,
	pub nonlinear_score: f64,
}

/// The display-oriented view of an observation attached to ranked candidates.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ObservationSummary {
	pub snapshot_id: String,
	pub move_in_cost: f64,
	pub monthly_cost: f64,
	pub monthly_percentile: Option<f64>,
	pub nonlinear_price_burden: Option<f64>,
	pub essential_coverage: f64,
	pub nearest_minutes: Option<f64>,
	pub risk_level: Option<RiskLevel>,
	pub observation_version: String,
}

#[derive(Clone, Debug)]
pub struct ObservationBuilder {
	observation_version: String,
	source_data_version: String,
}
impl ObservationBuilder {
	pub fn new(
		observation_version: impl Into<String>,
		source_data_version: impl Into<String>,
	) -> Self {
		Self {
			observation_version: observation_version.into(),
			source_data_version: source_data_version.into(),
		}
	}

	pub fn observation_version(&self) -> &str {
		&self.observation_version
	}

	/// Assembles the raw observation for `listing_id`.
	///
	/// `listing` is the result of resolving `listing_id`; an unresolved listing is an error, never
	/// an all-zero observation. Price statistics and distance are left for later passes.
	pub fn build(
		&self,
		listing_id: i64,
		listing: Option<&Listing>,
		options: &ListingOptions,
		now: OffsetDateTime,
	) -> Result<FeatureObservation> {
		let Some(listing) = listing else {
			return Err(ObservationError::ListingNotFound { listing_id });
		};

		validate_listing(listing)?;

		Ok(FeatureObservation {
			listing_id,
			snapshot_id: listing.compute_snapshot_id(),
			price: PriceFeatures {
				move_in_cost: listing.move_in_cost() as f64,
				monthly_cost: listing.monthly_cost() as f64,
				stats: None,
			},
			risk: RiskFeatures {
				is_banned: listing.is_banned,
				floor_ratio: floor_ratio(listing.floor, listing.total_floors),
				has_location: listing.coordinates().is_some(),
				region_code: listing
					.region_code
					.as_deref()
					.map(str::trim)
					.filter(|code| !code.is_empty())
					.map(str::to_string),
				assessment: None,
			},
			option: OptionFeatures {
				essential_coverage: options.essential_count() as f64
					/ ESSENTIAL_SIGNAL_COUNT as f64,
				amenity_ratio: options.tracked_amenity_count() as f64
					/ TRACKED_AMENITIES.len() as f64,
				amenities: options.amenities.clone(),
			},
			distance: None,
			calculated_at: now,
			observation_version: self.observation_version.clone(),
			source_data_version: self.source_data_version.clone(),
		})
	}
}

fn validate_listing(listing: &Listing) -> Result<()> {
	let costs = [
		("deposit", listing.deposit),
		("monthly_rent", listing.monthly_rent),
		("management_fee", listing.management_fee),
	];

	for (field, value) in costs {
		if value < 0 {
			return Err(ObservationError::InvalidListing {
				listing_id: listing.listing_id,
				field,
				message: format!("must be zero or greater, got {value}."),
			});
		}
	}

	Ok(())
}

/// Basement units (floor below 1) sit at 0.0; the top floor at 1.0.
fn floor_ratio(floor: Option<i32>, total_floors: Option<i32>) -> Option<f64> {
	let (floor, total) = (floor?, total_floors?);

	if total <= 0 {
		return None;
	}
	if floor < 1 {
		return Some(0.0);
	}

	Some((f64::from(floor) / f64::from(total)).clamp(0.0, 1.0))
}
