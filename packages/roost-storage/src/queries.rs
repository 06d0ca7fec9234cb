use std::collections::HashMap;

use sqlx::{PgPool, QueryBuilder, types::Json};
use time::OffsetDateTime;
use uuid::Uuid;

use roost_domain::{
	distance::DistanceObservation,
	listing::{Listing, RenterRequest},
	observation::FeatureObservation,
	score::{ProcessingStatus, ScoreRecord},
};

use crate::{
	Result,
	models::{
		DistanceRow, ListingRow, NearestRow, ObservationRow, RenterRequestRow, ScoreRow,
	},
	store::{FailedScore, ListingQuery, NearestListing},
};

// Seven binds per row; Postgres caps one statement at 65535 binds.
const DISTANCE_INSERT_CHUNK: usize = 1_000;
const LISTING_COLUMNS: &str = "\
listing_id,
	title,
	address,
	sales_type,
	deposit,
	monthly_rent,
	management_fee,
	area_m2,
	floor,
	total_floors,
	latitude,
	longitude,
	region_code,
	parcel_id,
	is_banned,
	description,
	options,
	crawled_at";
const OBSERVATION_COLUMNS: &str = "\
listing_id,
	snapshot_id,
	price,
	risk,
	option_features,
	distance,
	calculated_at,
	observation_version,
	source_data_version";
const SCORE_COLUMNS: &str = "\
listing_id,
	snapshot_id,
	price_score,
	option_score,
	risk_score,
	distance_score,
	base_total_score,
	is_recommended,
	observation_version,
	policy_version,
	processing_status,
	last_error,
	updated_at";

pub async fn upsert_listing(pool: &PgPool, listing: &Listing) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO listings (
	listing_id,
	title,
	address,
	sales_type,
	deposit,
	monthly_rent,
	management_fee,
	area_m2,
	floor,
	total_floors,
	latitude,
	longitude,
	region_code,
	parcel_id,
	is_banned,
	description,
	options,
	crawled_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, now())
ON CONFLICT (listing_id) DO UPDATE
SET
	title = EXCLUDED.title,
	address = EXCLUDED.address,
	sales_type = EXCLUDED.sales_type,
	deposit = EXCLUDED.deposit,
	monthly_rent = EXCLUDED.monthly_rent,
	management_fee = EXCLUDED.management_fee,
	area_m2 = EXCLUDED.area_m2,
	floor = EXCLUDED.floor,
	total_floors = EXCLUDED.total_floors,
	latitude = EXCLUDED.latitude,
	longitude = EXCLUDED.longitude,
	region_code = EXCLUDED.region_code,
	parcel_id = EXCLUDED.parcel_id,
	is_banned = EXCLUDED.is_banned,
	description = EXCLUDED.description,
	options = EXCLUDED.options,
	crawled_at = EXCLUDED.crawled_at,
	updated_at = now()",
	)
	.bind(listing.listing_id)
	.bind(listing.title.as_str())
	.bind(listing.address.as_str())
	.bind(listing.sales_type.as_str())
	.bind(listing.deposit)
	.bind(listing.monthly_rent)
	.bind(listing.management_fee)
	.bind(listing.area_m2)
	.bind(listing.floor)
	.bind(listing.total_floors)
	.bind(listing.latitude)
	.bind(listing.longitude)
	.bind(listing.region_code.as_deref())
	.bind(listing.parcel_id.as_deref())
	.bind(listing.is_banned)
	.bind(listing.description.as_str())
	.bind(Json(&listing.options))
	.bind(listing.crawled_at)
	.execute(pool)
	.await?;

	Ok(())
}

pub async fn get_listing(pool: &PgPool, listing_id: i64) -> Result<Option<Listing>> {
	let sql = format!("SELECT {LISTING_COLUMNS}\nFROM listings\nWHERE listing_id = $1");
	let row: Option<ListingRow> =
		sqlx::query_as(&sql).bind(listing_id).fetch_optional(pool).await?;

	Ok(row.map(Listing::from))
}

pub async fn list_listings(pool: &PgPool, ids: Option<&[i64]>) -> Result<Vec<Listing>> {
	let sql = format!(
		"\
SELECT {LISTING_COLUMNS}
FROM listings
WHERE ($1::bigint[] IS NULL OR listing_id = ANY($1))
ORDER BY listing_id"
	);
	let rows: Vec<ListingRow> = sqlx::query_as(&sql).bind(ids).fetch_all(pool).await?;

	Ok(rows.into_iter().map(Listing::from).collect())
}

pub async fn prefilter_listings(pool: &PgPool, query: &ListingQuery) -> Result<Vec<Listing>> {
	let sql = format!(
		"\
SELECT {LISTING_COLUMNS}
FROM listings
WHERE ($1::bigint IS NULL OR deposit <= $1)
	AND (
		$2::bigint IS NULL
		OR monthly_rent + management_fee <= $2
		OR ($3::text IS NOT NULL AND strpos(sales_type, $3) > 0)
	)
	AND (
		cardinality($4::text[]) = 0
		OR EXISTS (
			SELECT 1
			FROM unnest($4::text[]) AS pattern
			WHERE strpos(sales_type, pattern) > 0
		)
	)
	AND ($5::text IS NULL OR strpos(address, $5) > 0)
ORDER BY listing_id
LIMIT $6"
	);
	let rows: Vec<ListingRow> = sqlx::query_as(&sql)
		.bind(query.max_deposit)
		.bind(query.max_monthly)
		.bind(query.monthly_exempt_marker.as_deref())
		.bind(&query.sales_type_patterns)
		.bind(query.region.as_deref())
		.bind(query.limit)
		.fetch_all(pool)
		.await?;

	Ok(rows.into_iter().map(Listing::from).collect())
}

pub async fn put_renter_request(pool: &PgPool, request: &RenterRequest) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO renter_requests (
	request_id,
	max_deposit,
	max_rent,
	price_type,
	preferred_region,
	near_campus,
	university,
	desired_amenities,
	notes,
	created_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
ON CONFLICT (request_id) DO UPDATE
SET
	max_deposit = EXCLUDED.max_deposit,
	max_rent = EXCLUDED.max_rent,
	price_type = EXCLUDED.price_type,
	preferred_region = EXCLUDED.preferred_region,
	near_campus = EXCLUDED.near_campus,
	university = EXCLUDED.university,
	desired_amenities = EXCLUDED.desired_amenities,
	notes = EXCLUDED.notes",
	)
	.bind(request.request_id)
	.bind(request.max_deposit)
	.bind(request.max_rent)
	.bind(request.price_type.map(|price_type| price_type.as_str()))
	.bind(request.preferred_region.as_deref())
	.bind(request.near_campus)
	.bind(request.university.as_deref())
	.bind(Json(&request.desired_amenities))
	.bind(request.notes.as_deref())
	.bind(request.created_at)
	.execute(pool)
	.await?;

	Ok(())
}

pub async fn get_renter_request(pool: &PgPool, request_id: Uuid) -> Result<Option<RenterRequest>> {
	let row: Option<RenterRequestRow> = sqlx::query_as(
		"\
SELECT
	request_id,
	max_deposit,
	max_rent,
	price_type,
	preferred_region,
	near_campus,
	university,
	desired_amenities,
	notes,
	created_at
FROM renter_requests
WHERE request_id = $1",
	)
	.bind(request_id)
	.fetch_optional(pool)
	.await?;

	row.map(RenterRequest::try_from).transpose()
}

pub async fn insert_observations(pool: &PgPool, observations: &[FeatureObservation]) -> Result<()> {
	let mut tx = pool.begin().await?;

	for observation in observations {
		sqlx::query(
			"\
INSERT INTO feature_observations (
	listing_id,
	snapshot_id,
	price,
	risk,
	option_features,
	distance,
	calculated_at,
	observation_version,
	source_data_version
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
		)
		.bind(observation.listing_id)
		.bind(observation.snapshot_id.as_str())
		.bind(Json(&observation.price))
		.bind(Json(&observation.risk))
		.bind(Json(&observation.option))
		.bind(observation.distance.as_ref().map(Json))
		.bind(observation.calculated_at)
		.bind(observation.observation_version.as_str())
		.bind(observation.source_data_version.as_str())
		.execute(&mut *tx)
		.await?;
	}

	tx.commit().await?;

	Ok(())
}

pub async fn latest_observations(
	pool: &PgPool,
	listing_ids: &[i64],
) -> Result<HashMap<i64, FeatureObservation>> {
	let sql = format!(
		"\
SELECT DISTINCT ON (listing_id) {OBSERVATION_COLUMNS}
FROM feature_observations
WHERE listing_id = ANY($1)
ORDER BY listing_id, calculated_at DESC, observation_id DESC"
	);
	let rows: Vec<ObservationRow> = sqlx::query_as(&sql).bind(listing_ids).fetch_all(pool).await?;

	Ok(rows
		.into_iter()
		.map(|row| {
			let observation = FeatureObservation::from(row);

			(observation.listing_id, observation)
		})
		.collect())
}

pub async fn observations_by_version(
	pool: &PgPool,
	observation_version: Option<&str>,
) -> Result<Vec<FeatureObservation>> {
	let sql = format!(
		"\
SELECT DISTINCT ON (listing_id) {OBSERVATION_COLUMNS}
FROM feature_observations
WHERE ($1::text IS NULL OR observation_version = $1)
ORDER BY listing_id, calculated_at DESC, observation_id DESC"
	);
	let rows: Vec<ObservationRow> =
		sqlx::query_as(&sql).bind(observation_version).fetch_all(pool).await?;

	Ok(rows.into_iter().map(FeatureObservation::from).collect())
}

pub async fn replace_distances(
	pool: &PgPool,
	listing_id: i64,
	rows: &[DistanceObservation],
) -> Result<()> {
	let mut tx = pool.begin().await?;

	sqlx::query("DELETE FROM distance_observations WHERE listing_id = $1")
		.bind(listing_id)
		.execute(&mut *tx)
		.await?;

	for chunk in rows.chunks(DISTANCE_INSERT_CHUNK) {
		let mut builder = QueryBuilder::new(
			"\
INSERT INTO distance_observations (
	listing_id,
	reference_location_id,
	minutes,
	percentile,
	bucket,
	nonlinear_score,
	calculated_at
) ",
		);

		builder.push_values(chunk, |mut b, row| {
			b.push_bind(listing_id)
				.push_bind(row.reference_location_id)
				.push_bind(row.minutes)
				.push_bind(row.percentile)
				.push_bind(row.bucket.as_str())
				.push_bind(row.nonlinear_score)
				.push_bind(row.calculated_at);
		});
		builder.build().execute(&mut *tx).await?;
	}

	tx.commit().await?;

	Ok(())
}

pub async fn distances_to(
	pool: &PgPool,
	reference_location_id: i64,
	listing_ids: &[i64],
) -> Result<HashMap<i64, DistanceObservation>> {
	let rows: Vec<DistanceRow> = sqlx::query_as(
		"\
SELECT
	listing_id,
	reference_location_id,
	minutes,
	percentile,
	bucket,
	nonlinear_score,
	calculated_at
FROM distance_observations
WHERE reference_location_id = $1 AND listing_id = ANY($2)",
	)
	.bind(reference_location_id)
	.bind(listing_ids)
	.fetch_all(pool)
	.await?;
	let mut out = HashMap::with_capacity(rows.len());

	for row in rows {
		let observation = DistanceObservation::try_from(row)?;

		out.insert(observation.listing_id, observation);
	}

	Ok(out)
}

pub async fn upsert_score(pool: &PgPool, record: &ScoreRecord) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO listing_scores (
	listing_id,
	snapshot_id,
	price_score,
	option_score,
	risk_score,
	distance_score,
	base_total_score,
	is_recommended,
	observation_version,
	policy_version,
	processing_status,
	last_error,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
ON CONFLICT (listing_id) DO UPDATE
SET
	snapshot_id = EXCLUDED.snapshot_id,
	price_score = EXCLUDED.price_score,
	option_score = EXCLUDED.option_score,
	risk_score = EXCLUDED.risk_score,
	distance_score = EXCLUDED.distance_score,
	base_total_score = EXCLUDED.base_total_score,
	is_recommended = EXCLUDED.is_recommended,
	observation_version = EXCLUDED.observation_version,
	policy_version = EXCLUDED.policy_version,
	processing_status = EXCLUDED.processing_status,
	last_error = EXCLUDED.last_error,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(record.listing_id)
	.bind(record.snapshot_id.as_str())
	.bind(record.price_score)
	.bind(record.option_score)
	.bind(record.risk_score)
	.bind(record.distance_score)
	.bind(record.base_total_score)
	.bind(record.is_recommended)
	.bind(record.observation_version.as_str())
	.bind(record.policy_version.as_str())
	.bind(record.processing_status.as_str())
	.bind(record.last_error.as_deref())
	.bind(record.updated_at)
	.execute(pool)
	.await?;

	Ok(())
}

pub async fn mark_failed(pool: &PgPool, failure: &FailedScore) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO listing_scores (
	listing_id,
	snapshot_id,
	observation_version,
	policy_version,
	processing_status,
	last_error,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7)
ON CONFLICT (listing_id) DO UPDATE
SET
	processing_status = EXCLUDED.processing_status,
	last_error = EXCLUDED.last_error,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(failure.listing_id)
	.bind(failure.snapshot_id.as_str())
	.bind(failure.observation_version.as_str())
	.bind(failure.policy_version.as_str())
	.bind(ProcessingStatus::Failed.as_str())
	.bind(failure.error.as_str())
	.bind(failure.at)
	.execute(pool)
	.await?;

	Ok(())
}

pub async fn mark_ready(
	pool: &PgPool,
	listing_id: i64,
	snapshot_id: &str,
	observation_version: &str,
	at: OffsetDateTime,
) -> Result<()> {
	sqlx::query(
		"\
INSERT INTO listing_scores (
	listing_id,
	snapshot_id,
	observation_version,
	policy_version,
	processing_status,
	updated_at
)
VALUES ($1, $2, $3, '', $4, $5)
ON CONFLICT (listing_id) DO UPDATE
SET
	processing_status = EXCLUDED.processing_status,
	last_error = NULL,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(listing_id)
	.bind(snapshot_id)
	.bind(observation_version)
	.bind(ProcessingStatus::Ready.as_str())
	.bind(at)
	.execute(pool)
	.await?;

	Ok(())
}

pub async fn scores_for(pool: &PgPool, listing_ids: &[i64]) -> Result<HashMap<i64, ScoreRecord>> {
	let sql = format!("SELECT {SCORE_COLUMNS}\nFROM listing_scores\nWHERE listing_id = ANY($1)");
	let rows: Vec<ScoreRow> = sqlx::query_as(&sql).bind(listing_ids).fetch_all(pool).await?;
	let mut out = HashMap::with_capacity(rows.len());

	for row in rows {
		let record = ScoreRecord::try_from(row)?;

		out.insert(record.listing_id, record);
	}

	Ok(out)
}

pub async fn top_scores(
	pool: &PgPool,
	observation_version: &str,
	policy_version: &str,
	threshold: f64,
	limit: i64,
) -> Result<Vec<ScoreRecord>> {
	let sql = format!(
		"\
SELECT {SCORE_COLUMNS}
FROM listing_scores
WHERE observation_version = $1
	AND policy_version = $2
	AND processing_status = $3
	AND base_total_score >= $4
ORDER BY base_total_score DESC, listing_id ASC
LIMIT $5"
	);
	let rows: Vec<ScoreRow> = sqlx::query_as(&sql)
		.bind(observation_version)
		.bind(policy_version)
		.bind(ProcessingStatus::Completed.as_str())
		.bind(threshold)
		.bind(limit)
		.fetch_all(pool)
		.await?;

	rows.into_iter().map(ScoreRecord::try_from).collect()
}

pub async fn get_request_embedding(
	pool: &PgPool,
	request_id: Uuid,
	embedding_version: &str,
) -> Result<Option<Vec<f32>>> {
	let text: Option<String> = sqlx::query_scalar(
		"\
SELECT vec::text
FROM request_embeddings
WHERE request_id = $1 AND embedding_version = $2",
	)
	.bind(request_id)
	.bind(embedding_version)
	.fetch_optional(pool)
	.await?;

	text.as_deref().map(crate::parse_pg_vector).transpose()
}

pub async fn put_request_embedding(
	pool: &PgPool,
	request_id: Uuid,
	embedding_version: &str,
	text: &str,
	vec: &[f32],
	at: OffsetDateTime,
) -> Result<()> {
	let vec_text = crate::vector_to_pg(vec);

	sqlx::query(
		"\
INSERT INTO request_embeddings (
	request_id,
	embedding_version,
	text,
	embedding_dim,
	vec,
	created_at
)
VALUES ($1, $2, $3, $4, $5::text::vector, $6)
ON CONFLICT (request_id, embedding_version) DO UPDATE
SET
	text = EXCLUDED.text,
	embedding_dim = EXCLUDED.embedding_dim,
	vec = EXCLUDED.vec,
	created_at = EXCLUDED.created_at",
	)
	.bind(request_id)
	.bind(embedding_version)
	.bind(text)
	.bind(vec.len() as i32)
	.bind(vec_text.as_str())
	.bind(at)
	.execute(pool)
	.await?;

	Ok(())
}

pub async fn upsert_listing_embedding(
	pool: &PgPool,
	listing_id: i64,
	embedding_version: &str,
	vec: &[f32],
	at: OffsetDateTime,
) -> Result<()> {
	let vec_text = crate::vector_to_pg(vec);

	sqlx::query(
		"\
INSERT INTO listing_embeddings (
	listing_id,
	embedding_version,
	embedding_dim,
	vec,
	updated_at
)
VALUES ($1, $2, $3, $4::text::vector, $5)
ON CONFLICT (listing_id, embedding_version) DO UPDATE
SET
	embedding_dim = EXCLUDED.embedding_dim,
	vec = EXCLUDED.vec,
	updated_at = EXCLUDED.updated_at",
	)
	.bind(listing_id)
	.bind(embedding_version)
	.bind(vec.len() as i32)
	.bind(vec_text.as_str())
	.bind(at)
	.execute(pool)
	.await?;

	Ok(())
}

pub async fn nearest_listings(
	pool: &PgPool,
	vec: &[f32],
	embedding_version: &str,
	pool_ids: &[i64],
	limit: i64,
) -> Result<Vec<NearestListing>> {
	let vec_text = crate::vector_to_pg(vec);
	let rows: Vec<NearestRow> = sqlx::query_as(
		"\
SELECT
	listing_id,
	(vec <=> $1::text::vector)::double precision AS distance
FROM listing_embeddings
WHERE embedding_version = $2 AND listing_id = ANY($3)
ORDER BY vec <=> $1::text::vector, listing_id
LIMIT $4",
	)
	.bind(vec_text.as_str())
	.bind(embedding_version)
	.bind(pool_ids)
	.bind(limit)
	.fetch_all(pool)
	.await?;

	Ok(rows
		.into_iter()
		.map(|row| NearestListing { listing_id: row.listing_id, distance: row.distance })
		.collect())
}
