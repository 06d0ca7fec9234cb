//! The relational seam. Services hold these traits; `pg` and `memory` implement them.

use std::{collections::HashMap, future::Future, pin::Pin};

use time::OffsetDateTime;
use uuid::Uuid;

use roost_domain::{
	criteria::CandidateCriteria,
	distance::DistanceObservation,
	listing::{JEONSE_MARKER, Listing, RenterRequest},
	observation::FeatureObservation,
	score::ScoreRecord,
};

use crate::Result;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Rule-based pre-filter evaluated by the store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListingQuery {
	pub max_deposit: Option<i64>,
	/// Ceiling on rent plus management fee.
	pub max_monthly: Option<i64>,
	/// Listings whose sales type contains this marker skip the monthly ceiling.
	pub monthly_exempt_marker: Option<String>,
	/// The sales type must contain at least one of these; empty accepts all.
	pub sales_type_patterns: Vec<String>,
	/// Substring the address must contain.
	pub region: Option<String>,
	pub limit: Option<i64>,
}
impl ListingQuery {
	pub fn from_criteria(criteria: &CandidateCriteria, limit: Option<i64>) -> Self {
		Self {
			max_deposit: criteria.max_deposit_limit,
			max_monthly: criteria.max_rent_limit,
			monthly_exempt_marker: criteria
				.rent_relaxed_for(JEONSE_MARKER)
				.then(|| JEONSE_MARKER.to_string()),
			sales_type_patterns: criteria.sales_type_patterns(),
			region: criteria.region.clone(),
			limit,
		}
	}

	pub fn matches(&self, listing: &Listing) -> bool {
		if let Some(limit) = self.max_deposit
			&& listing.move_in_cost() > limit
		{
			return false;
		}
		if let Some(limit) = self.max_monthly
			&& listing.monthly_cost() > limit
			&& !self
				.monthly_exempt_marker
				.as_deref()
				.is_some_and(|marker| listing.sales_type.contains(marker))
		{
			return false;
		}
		if !self.sales_type_patterns.is_empty()
			&& !self.sales_type_patterns.iter().any(|pattern| listing.sales_type.contains(pattern))
		{
			return false;
		}
		if let Some(region) = self.region.as_deref()
			&& !listing.address.contains(region)
		{
			return false;
		}

		true
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct FailedScore {
	pub listing_id: i64,
	pub snapshot_id: String,
	pub observation_version: String,
	pub policy_version: String,
	pub error: String,
	pub at: OffsetDateTime,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NearestListing {
	pub listing_id: i64,
	/// Cosine distance, 0.0 for identical direction.
	pub distance: f64,
}

pub trait ListingStore
where
	Self: Send + Sync,
{
	fn upsert_listing<'a>(&'a self, listing: &'a Listing) -> BoxFuture<'a, Result<()>>;

	fn get_listing<'a>(&'a self, listing_id: i64) -> BoxFuture<'a, Result<Option<Listing>>>;

	/// Every listing when `ids` is `None`, ordered by id.
	fn list_listings<'a>(&'a self, ids: Option<&'a [i64]>) -> BoxFuture<'a, Result<Vec<Listing>>>;

	fn prefilter_listings<'a>(
		&'a self,
		query: &'a ListingQuery,
	) -> BoxFuture<'a, Result<Vec<Listing>>>;

	fn put_renter_request<'a>(&'a self, request: &'a RenterRequest) -> BoxFuture<'a, Result<()>>;

	fn get_renter_request<'a>(
		&'a self,
		request_id: Uuid,
	) -> BoxFuture<'a, Result<Option<RenterRequest>>>;
}

pub trait ObservationStore
where
	Self: Send + Sync,
{
	/// Appends; earlier observations are never modified.
	fn insert_observations<'a>(
		&'a self,
		observations: &'a [FeatureObservation],
	) -> BoxFuture<'a, Result<()>>;

	fn latest_observation<'a>(
		&'a self,
		listing_id: i64,
	) -> BoxFuture<'a, Result<Option<FeatureObservation>>>;

	fn latest_observations<'a>(
		&'a self,
		listing_ids: &'a [i64],
	) -> BoxFuture<'a, Result<HashMap<i64, FeatureObservation>>>;

	/// Latest observation per listing within `observation_version`, or across all versions when
	/// `None`. Ordered by listing id.
	fn observations_by_version<'a>(
		&'a self,
		observation_version: Option<&'a str>,
	) -> BoxFuture<'a, Result<Vec<FeatureObservation>>>;
}

pub trait DistanceStore
where
	Self: Send + Sync,
{
	/// Deletes the listing's previous rows and writes `rows` in their place.
	fn replace_distances<'a>(
		&'a self,
		listing_id: i64,
		rows: &'a [DistanceObservation],
	) -> BoxFuture<'a, Result<()>>;

	fn get_distance<'a>(
		&'a self,
		listing_id: i64,
		reference_location_id: i64,
	) -> BoxFuture<'a, Result<Option<DistanceObservation>>>;

	fn distances_to<'a>(
		&'a self,
		reference_location_id: i64,
		listing_ids: &'a [i64],
	) -> BoxFuture<'a, Result<HashMap<i64, DistanceObservation>>>;
}

pub trait ScoreStore
where
	Self: Send + Sync,
{
	fn upsert_score<'a>(&'a self, record: &'a ScoreRecord) -> BoxFuture<'a, Result<()>>;

	/// Marks the listing FAILED, keeping any previously computed scores.
	fn mark_failed<'a>(&'a self, failure: &'a FailedScore) -> BoxFuture<'a, Result<()>>;

	/// Marks the listing READY for the next refresh, keeping any previously computed scores.
	fn mark_ready<'a>(
		&'a self,
		listing_id: i64,
		snapshot_id: &'a str,
		observation_version: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;

	fn get_score<'a>(&'a self, listing_id: i64) -> BoxFuture<'a, Result<Option<ScoreRecord>>>;

	fn scores_for<'a>(
		&'a self,
		listing_ids: &'a [i64],
	) -> BoxFuture<'a, Result<HashMap<i64, ScoreRecord>>>;

	/// Completed scores for the exact version pair at or above `threshold`, best first.
	fn top_scores<'a>(
		&'a self,
		observation_version: &'a str,
		policy_version: &'a str,
		threshold: f64,
		limit: i64,
	) -> BoxFuture<'a, Result<Vec<ScoreRecord>>>;
}

pub trait EmbeddingStore
where
	Self: Send + Sync,
{
	fn get_request_embedding<'a>(
		&'a self,
		request_id: Uuid,
		embedding_version: &'a str,
	) -> BoxFuture<'a, Result<Option<Vec<f32>>>>;

	fn put_request_embedding<'a>(
		&'a self,
		request_id: Uuid,
		embedding_version: &'a str,
		text: &'a str,
		vec: &'a [f32],
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;

	fn upsert_listing_embedding<'a>(
		&'a self,
		listing_id: i64,
		embedding_version: &'a str,
		vec: &'a [f32],
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;

	/// Nearest listings to `vec` among `pool`, closest first.
	fn nearest_listings<'a>(
		&'a self,
		vec: &'a [f32],
		embedding_version: &'a str,
		pool: &'a [i64],
		limit: i64,
	) -> BoxFuture<'a, Result<Vec<NearestListing>>>;
}
