use std::collections::HashMap;

use time::OffsetDateTime;
use uuid::Uuid;

use roost_domain::{
	distance::DistanceObservation,
	listing::{Listing, RenterRequest},
	observation::FeatureObservation,
	score::ScoreRecord,
};

use crate::{
	Result,
	db::Db,
	queries,
	store::{
		BoxFuture, DistanceStore, EmbeddingStore, FailedScore, ListingQuery, ListingStore,
		NearestListing, ObservationStore, ScoreStore,
	},
};

/// Postgres-backed store. Vector search runs through pgvector's cosine operator.
pub struct PgStore {
	pub db: Db,
}
impl PgStore {
	pub fn new(db: Db) -> Self {
		Self { db }
	}
}

impl ListingStore for PgStore {
	fn upsert_listing<'a>(&'a self, listing: &'a Listing) -> BoxFuture<'a, Result<()>> {
		Box::pin(queries::upsert_listing(&self.db.pool, listing))
	}

	fn get_listing<'a>(&'a self, listing_id: i64) -> BoxFuture<'a, Result<Option<Listing>>> {
		Box::pin(queries::get_listing(&self.db.pool, listing_id))
	}

	fn list_listings<'a>(&'a self, ids: Option<&'a [i64]>) -> BoxFuture<'a, Result<Vec<Listing>>> {
		Box::pin(queries::list_listings(&self.db.pool, ids))
	}

	fn prefilter_listings<'a>(
		&'a self,
		query: &'a ListingQuery,
	) -> BoxFuture<'a, Result<Vec<Listing>>> {
		Box::pin(queries::prefilter_listings(&self.db.pool, query))
	}

	fn put_renter_request<'a>(&'a self, request: &'a RenterRequest) -> BoxFuture<'a, Result<()>> {
		Box::pin(queries::put_renter_request(&self.db.pool, request))
	}

	fn get_renter_request<'a>(
		&'a self,
		request_id: Uuid,
	) -> BoxFuture<'a, Result<Option<RenterRequest>>> {
		Box::pin(queries::get_renter_request(&self.db.pool, request_id))
	}
}

impl ObservationStore for PgStore {
	fn insert_observations<'a>(
		&'a self,
		observations: &'a [FeatureObservation],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(queries::insert_observations(&self.db.pool, observations))
	}

	fn latest_observation<'a>(
		&'a self,
		listing_id: i64,
	) -> BoxFuture<'a, Result<Option<FeatureObservation>>> {
		Box::pin(async move {
			let mut found = queries::latest_observations(&self.db.pool, &[listing_id]).await?;

			Ok(found.remove(&listing_id))
		})
	}

	fn latest_observations<'a>(
		&'a self,
		listing_ids: &'a [i64],
	) -> BoxFuture<'a, Result<HashMap<i64, FeatureObservation>>> {
		Box::pin(queries::latest_observations(&self.db.pool, listing_ids))
	}

	fn observations_by_version<'a>(
		&'a self,
		observation_version: Option<&'a str>,
	) -> BoxFuture<'a, Result<Vec<FeatureObservation>>> {
		Box::pin(queries::observations_by_version(&self.db.pool, observation_version))
	}
}

impl DistanceStore for PgStore {
	fn replace_distances<'a>(
		&'a self,
		listing_id: i64,
		rows: &'a [DistanceObservation],
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(queries::replace_distances(&self.db.pool, listing_id, rows))
	}

	fn get_distance<'a>(
		&'a self,
		listing_id: i64,
		reference_location_id: i64,
	) -> BoxFuture<'a, Result<Option<DistanceObservation>>> {
		Box::pin(async move {
			let mut found =
				queries::distances_to(&self.db.pool, reference_location_id, &[listing_id]).await?;

			Ok(found.remove(&listing_id))
		})
	}

	fn distances_to<'a>(
		&'a self,
		reference_location_id: i64,
		listing_ids: &'a [i64],
	) -> BoxFuture<'a, Result<HashMap<i64, DistanceObservation>>> {
		Box::pin(queries::distances_to(&self.db.pool, reference_location_id, listing_ids))
	}
}

impl ScoreStore for PgStore {
	fn upsert_score<'a>(&'a self, record: &'a ScoreRecord) -> BoxFuture<'a, Result<()>> {
		Box::pin(queries::upsert_score(&self.db.pool, record))
	}

	fn mark_failed<'a>(&'a self, failure: &'a FailedScore) -> BoxFuture<'a, Result<()>> {
		Box::pin(queries::mark_failed(&self.db.pool, failure))
	}

	fn mark_ready<'a>(
		&'a self,
		listing_id: i64,
		snapshot_id: &'a str,
		observation_version: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(queries::mark_ready(
			&self.db.pool,
			listing_id,
			snapshot_id,
			observation_version,
			at,
		))
	}

	fn get_score<'a>(&'a self, listing_id: i64) -> BoxFuture<'a, Result<Option<ScoreRecord>>> {
		Box::pin(async move {
			let mut found = queries::scores_for(&self.db.pool, &[listing_id]).await?;

			Ok(found.remove(&listing_id))
		})
	}

	fn scores_for<'a>(
		&'a self,
		listing_ids: &'a [i64],
	) -> BoxFuture<'a, Result<HashMap<i64, ScoreRecord>>> {
		Box::pin(queries::scores_for(&self.db.pool, listing_ids))
	}

	fn top_scores<'a>(
		&'a self,
		observation_version: &'a str,
		policy_version: &'a str,
		threshold: f64,
		limit: i64,
	) -> BoxFuture<'a, Result<Vec<ScoreRecord>>> {
		Box::pin(queries::top_scores(
			&self.db.pool,
			observation_version,
			policy_version,
			threshold,
			limit,
		))
	}
}

impl EmbeddingStore for PgStore {
	fn get_request_embedding<'a>(
		&'a self,
		request_id: Uuid,
		embedding_version: &'a str,
	) -> BoxFuture<'a, Result<Option<Vec<f32>>>> {
		Box::pin(queries::get_request_embedding(&self.db.pool, request_id, embedding_version))
	}

	fn put_request_embedding<'a>(
		&'a self,
		request_id: Uuid,
		embedding_version: &'a str,
		text: &'a str,
		vec: &'a [f32],
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(queries::put_request_embedding(
			&self.db.pool,
			request_id,
			embedding_version,
			text,
			vec,
			at,
		))
	}

	fn upsert_listing_embedding<'a>(
		&'a self,
		listing_id: i64,
		embedding_version: &'a str,
		vec: &'a [f32],
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(queries::upsert_listing_embedding(
			&self.db.pool,
			listing_id,
			embedding_version,
			vec,
			at,
		))
	}

	fn nearest_listings<'a>(
		&'a self,
		vec: &'a [f32],
		embedding_version: &'a str,
		pool: &'a [i64],
		limit: i64,
	) -> BoxFuture<'a, Result<Vec<NearestListing>>> {
		Box::pin(queries::nearest_listings(&self.db.pool, vec, embedding_version, pool, limit))
	}
}
