use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

use roost_domain::{
	distance::{DistanceBucket, DistanceObservation},
	listing::{Listing, ListingOptions, PriceType, RenterRequest},
	observation::{
		DistanceSummary, FeatureObservation, OptionFeatures, PriceFeatures, RiskFeatures,
	},
	score::{ProcessingStatus, ScoreRecord},
};

use crate::{Error, Result};

#[derive(Debug, sqlx::FromRow)]
pub struct ListingRow {
	pub listing_id: i64,
	pub title: String,
	pub address: String,
	pub sales_type: String,
	pub deposit: i64,
	pub monthly_rent: i64,
	pub management_fee: i64,
	pub area_m2: Option<f64>,
	pub floor: Option<i32>,
	pub total_floors: Option<i32>,
	pub latitude: Option<f64>,
	pub longitude: Option<f64>,
	pub region_code: Option<String>,
	pub parcel_id: Option<String>,
	pub is_banned: bool,
	pub description: String,
	pub options: Json<ListingOptions>,
	pub crawled_at: Option<OffsetDateTime>,
}
impl From<ListingRow> for Listing {
	fn from(row: ListingRow) -> Self {
		Self {
			listing_id: row.listing_id,
			title: row.title,
			address: row.address,
			sales_type: row.sales_type,
			deposit: row.deposit,
			monthly_rent: row.monthly_rent,
			management_fee: row.management_fee,
			area_m2: row.area_m2,
			floor: row.floor,
			total_floors: row.total_floors,
			latitude: row.latitude,
			longitude: row.longitude,
			region_code: row.region_code,
			parcel_id: row.parcel_id,
			is_banned: row.is_banned,
			description: row.description,
			options: row.options.0,
			crawled_at: row.crawled_at,
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct RenterRequestRow {
	pub request_id: Uuid,
	pub max_deposit: Option<i64>,
	pub max_rent: Option<i64>,
	pub price_type: Option<String>,
	pub preferred_region: Option<String>,
	pub near_campus: bool,
	pub university: Option<String>,
	pub desired_amenities: Json<Vec<String>>,
	pub notes: Option<String>,
	pub created_at: OffsetDateTime,
}
impl TryFrom<RenterRequestRow> for RenterRequest {
	type Error = Error;

	fn try_from(row: RenterRequestRow) -> Result<Self> {
		let price_type = match row.price_type.as_deref() {
			Some(raw) => Some(PriceType::parse(raw).ok_or_else(|| {
				Error::InvalidArgument(format!("Unknown price type {raw:?}."))
			})?),
			None => None,
		};

		Ok(Self {
			request_id: row.request_id,
			max_deposit: row.max_deposit,
			max_rent: row.max_rent,
			price_type,
			preferred_region: row.preferred_region,
			near_campus: row.near_campus,
			university: row.university,
			desired_amenities: row.desired_amenities.0,
			notes: row.notes,
			created_at: row.created_at,
		})
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct ObservationRow {
	pub listing_id: i64,
	pub snapshot_id: String,
	pub price: Json<PriceFeatures>,
	pub risk: Json<RiskFeatures>,
	pub option_features: Json<OptionFeatures>,
	pub distance: Option<Json<DistanceSummary>>,
	pub calculated_at: OffsetDateTime,
	pub observation_version: String,
	pub source_data_version: String,
}
impl From<ObservationRow> for FeatureObservation {
	fn from(row: ObservationRow) -> Self {
		Self {
			listing_id: row.listing_id,
			snapshot_id: row.snapshot_id,
			price: row.price.0,
			risk: row.risk.0,
			option: row.option_features.0,
			distance: row.distance.map(|distance| distance.0),
			calculated_at: row.calculated_at,
			observation_version: row.observation_version,
			source_data_version: row.source_data_version,
		}
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct DistanceRow {
	pub listing_id: i64,
	pub reference_location_id: i64,
	pub minutes: f64,
	pub percentile: f64,
	pub bucket: String,
	pub nonlinear_score: f64,
	pub calculated_at: OffsetDateTime,
}
impl TryFrom<DistanceRow> for DistanceObservation {
	type Error = Error;

	fn try_from(row: DistanceRow) -> Result<Self> {
		let bucket = DistanceBucket::parse(&row.bucket).ok_or_else(|| {
			Error::InvalidArgument(format!("Unknown distance bucket {:?}.", row.bucket))
		})?;

		Ok(Self {
			listing_id: row.listing_id,
			reference_location_id: row.reference_location_id,
			minutes: row.minutes,
			percentile: row.percentile,
			bucket,
			nonlinear_score: row.nonlinear_score,
			calculated_at: row.calculated_at,
		})
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct ScoreRow {
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
	pub processing_status: String,
	pub last_error: Option<String>,
	pub updated_at: OffsetDateTime,
}
impl TryFrom<ScoreRow> for ScoreRecord {
	type Error = Error;

	fn try_from(row: ScoreRow) -> Result<Self> {
		let processing_status =
			ProcessingStatus::parse(&row.processing_status).ok_or_else(|| {
				Error::InvalidArgument(format!(
					"Unknown processing status {:?}.",
					row.processing_status
				))
			})?;

		Ok(Self {
			listing_id: row.listing_id,
			snapshot_id: row.snapshot_id,
			price_score: row.price_score,
			option_score: row.option_score,
			risk_score: row.risk_score,
			distance_score: row.distance_score,
			base_total_score: row.base_total_score,
			is_recommended: row.is_recommended,
			observation_version: row.observation_version,
			policy_version: row.policy_version,
			processing_status,
			last_error: row.last_error,
			updated_at: row.updated_at,
		})
	}
}

#[derive(Debug, sqlx::FromRow)]
pub struct NearestRow {
	pub listing_id: i64,
	pub distance: f64,
}
