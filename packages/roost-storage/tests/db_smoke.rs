use time::{Duration, OffsetDateTime, macros::datetime};
use uuid::Uuid;

use roost_config::Postgres;
use roost_domain::{
	distance::{DistanceBucket, DistanceObservation},
	listing::{Listing, ListingOptions, PriceType, RenterRequest},
	observation::{FeatureObservation, OptionFeatures, PriceFeatures, RiskFeatures},
	score::ProcessingStatus,
};
use roost_storage::{
	db::Db,
	pg::PgStore,
	store::{
		DistanceStore, EmbeddingStore, FailedScore, ListingQuery, ListingStore, ObservationStore,
		ScoreStore,
	},
};
use roost_testkit::TestDatabase;

const NOW: OffsetDateTime = datetime!(2026-03-02 09:00 UTC);

fn listing(listing_id: i64, sales_type: &str, deposit: i64, monthly_rent: i64) -> Listing {
	Listing {
		listing_id,
		title: format!("listing {listing_id}"),
		address: "서울특별시 관악구 신림동".to_string(),
		sales_type: sales_type.to_string(),
		deposit,
		monthly_rent,
		management_fee: 5,
		area_m2: None,
		floor: Some(2),
		total_floors: Some(4),
		latitude: Some(37.48),
		longitude: Some(126.93),
		region_code: Some("1162010200".to_string()),
		parcel_id: None,
		is_banned: false,
		description: "에어컨 세탁기".to_string(),
		options: ListingOptions {
			built_in_appliances: true,
			amenities: vec!["에어컨".to_string()],
			..ListingOptions::default()
		},
		crawled_at: Some(NOW),
	}
}

fn observation(listing_id: i64, at: OffsetDateTime) -> FeatureObservation {
	FeatureObservation {
		listing_id,
		snapshot_id: format!("snap-{listing_id}"),
		price: PriceFeatures { move_in_cost: 1_000.0, monthly_cost: 55.0, stats: None },
		risk: RiskFeatures {
			is_banned: false,
			floor_ratio: Some(0.5),
			has_location: true,
			region_code: None,
			assessment: None,
		},
		option: OptionFeatures {
			essential_coverage: 0.25,
			amenity_ratio: 0.125,
			amenities: Vec::new(),
		},
		distance: None,
		calculated_at: at,
		observation_version: "obs-v1".to_string(),
		source_data_version: "crawl-v1".to_string(),
	}
}

async fn bootstrap(test_name: &str) -> Option<(TestDatabase, PgStore)> {
	let Some(base_dsn) = roost_testkit::env_dsn() else {
		eprintln!("Skipping {test_name}; set ROOST_PG_DSN to run this test.");

		return None;
	};
	let test_db = TestDatabase::new(&base_dsn).await.expect("Failed to create test database.");
	let cfg = Postgres { dsn: test_db.dsn().to_string(), pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("Failed to connect to Postgres.");

	db.ensure_schema(3).await.expect("Failed to ensure schema.");

	Some((test_db, PgStore::new(db)))
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROOST_PG_DSN to run."]
async fn schema_bootstrap_is_idempotent() {
	let Some((test_db, store)) = bootstrap("schema_bootstrap_is_idempotent").await else {
		return;
	};

	store.db.ensure_schema(3).await.expect("Second bootstrap must succeed.");

	let count: i64 = sqlx::query_scalar(
		"SELECT count(*) FROM information_schema.tables WHERE table_name = 'listing_scores'",
	)
	.fetch_one(&store.db.pool)
	.await
	.expect("Failed to query schema tables.");

	assert_eq!(count, 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROOST_PG_DSN to run."]
async fn listings_and_requests_round_trip_through_prefilter() {
	let Some((test_db, store)) =
		bootstrap("listings_and_requests_round_trip_through_prefilter").await
	else {
		return;
	};

	for sample in [listing(1, "월세", 1_000, 50), listing(2, "전세", 30_000, 0)] {
		store.upsert_listing(&sample).await.expect("Failed to upsert listing.");
	}

	let fetched = store.get_listing(1).await.expect("Failed to read.").expect("Missing listing.");

	assert_eq!(fetched, listing(1, "월세", 1_000, 50));

	let query = ListingQuery {
		max_deposit: Some(5_000),
		max_monthly: Some(60),
		sales_type_patterns: vec!["월세".to_string()],
		region: Some("관악구".to_string()),
		..ListingQuery::default()
	};
	let matched = store.prefilter_listings(&query).await.expect("Failed to prefilter.");

	assert_eq!(matched.len(), 1);
	assert_eq!(matched[0].listing_id, 1);

	let request = RenterRequest {
		request_id: Uuid::new_v4(),
		max_deposit: Some(5_000),
		max_rent: Some(60),
		price_type: Some(PriceType::Monthly),
		preferred_region: Some("관악구".to_string()),
		near_campus: true,
		university: Some("서울대학교".to_string()),
		desired_amenities: vec!["에어컨".to_string()],
		notes: None,
		created_at: NOW,
	};

	store.put_renter_request(&request).await.expect("Failed to store request.");

	let loaded = store
		.get_renter_request(request.request_id)
		.await
		.expect("Failed to read request.")
		.expect("Missing request.");

	assert_eq!(loaded, request);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROOST_PG_DSN to run."]
async fn observations_scores_and_vectors_persist() {
	let Some((test_db, store)) = bootstrap("observations_scores_and_vectors_persist").await else {
		return;
	};

	store
		.insert_observations(&[observation(1, NOW - Duration::minutes(5)), observation(1, NOW)])
		.await
		.expect("Failed to insert observations.");

	let latest = store.latest_observation(1).await.expect("Failed to read.").expect("Missing.");

	assert_eq!(latest.calculated_at, NOW);

	store.mark_ready(1, "snap-1", "obs-v1", NOW).await.expect("Failed to mark ready.");
	store
		.mark_failed(&FailedScore {
			listing_id: 1,
			snapshot_id: "snap-1".to_string(),
			observation_version: "obs-v1".to_string(),
			policy_version: "policy-v1".to_string(),
			error: "boom".to_string(),
			at: NOW,
		})
		.await
		.expect("Failed to mark failed.");

	let record = store.get_score(1).await.expect("Failed to read.").expect("Missing score.");

	assert_eq!(record.processing_status, ProcessingStatus::Failed);
	assert_eq!(record.last_error.as_deref(), Some("boom"));
	assert!(store.top_scores("obs-v1", "policy-v1", 0.0, 10).await.expect("Rank.").is_empty());

	store.upsert_listing_embedding(1, "hash:v:3", &[1.0, 0.0, 0.0], NOW).await.expect("Write.");
	store.upsert_listing_embedding(2, "hash:v:3", &[0.0, 1.0, 0.0], NOW).await.expect("Write.");

	let nearest = store
		.nearest_listings(&[0.9, 0.1, 0.0], "hash:v:3", &[1, 2], 1)
		.await
		.expect("Failed to search.");

	assert_eq!(nearest.len(), 1);
	assert_eq!(nearest[0].listing_id, 1);

	let request_id = Uuid::new_v4();

	store
		.put_request_embedding(request_id, "hash:v:3", "관악구 월세", &[0.0, 0.0, 1.0], NOW)
		.await
		.expect("Failed to store request embedding.");

	let cached = store
		.get_request_embedding(request_id, "hash:v:3")
		.await
		.expect("Failed to read request embedding.");

	assert_eq!(cached, Some(vec![0.0, 0.0, 1.0]));

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}

#[tokio::test]
#[ignore = "Requires external Postgres. Set ROOST_PG_DSN to run."]
async fn distance_fan_out_is_replaced_in_bulk() {
	let Some((test_db, store)) = bootstrap("distance_fan_out_is_replaced_in_bulk").await else {
		return;
	};
	let fan_out: Vec<DistanceObservation> = (1..=1_500)
		.map(|reference_location_id| DistanceObservation {
			listing_id: 1,
			reference_location_id,
			minutes: reference_location_id as f64,
			percentile: reference_location_id as f64 / 1_500.0,
			bucket: DistanceBucket::Over40,
			nonlinear_score: 0.0,
			calculated_at: NOW,
		})
		.collect();

	store.replace_distances(1, &fan_out).await.expect("Failed to write fan-out.");

	let last = store.distances_to(1_500, &[1]).await.expect("Failed to read distances.");

	assert_eq!(last.get(&1).map(|row| row.minutes), Some(1_500.0));

	store.replace_distances(1, &fan_out[..2]).await.expect("Failed to replace fan-out.");

	assert!(store.distances_to(1_500, &[1]).await.expect("Read.").is_empty());
	assert_eq!(store.distances_to(2, &[1]).await.expect("Read.").len(), 1);

	test_db.cleanup().await.expect("Failed to cleanup test database.");
}
