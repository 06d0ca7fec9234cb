use time::{Duration, OffsetDateTime, macros::datetime};

use roost_domain::{
	distance::{DistanceBucket, DistanceObservation},
	listing::{Listing, ListingOptions},
	observation::{FeatureObservation, OptionFeatures, PriceFeatures, RiskFeatures},
	score::{ProcessingStatus, ScoreRecord},
};
use roost_storage::{
	memory::MemoryStore,
	store::{
		DistanceStore, EmbeddingStore, FailedScore, ListingQuery, ListingStore, ObservationStore,
		ScoreStore,
	},
};

const NOW: OffsetDateTime = datetime!(2026-03-02 09:00 UTC);

fn listing(listing_id: i64, sales_type: &str, deposit: i64, monthly_rent: i64) -> Listing {
	Listing {
		listing_id,
		title: format!("listing {listing_id}"),
		address: "서울특별시 관악구 봉천동".to_string(),
		sales_type: sales_type.to_string(),
		deposit,
		monthly_rent,
		management_fee: 5,
		area_m2: Some(20.0),
		floor: Some(3),
		total_floors: Some(5),
		latitude: Some(37.48),
		longitude: Some(126.95),
		region_code: None,
		parcel_id: None,
		is_banned: false,
		description: String::new(),
		options: ListingOptions::default(),
		crawled_at: None,
	}
}

fn observation(listing_id: i64, version: &str, at: OffsetDateTime) -> FeatureObservation {
	FeatureObservation {
		listing_id,
		snapshot_id: format!("snap-{listing_id}-{version}"),
		price: PriceFeatures { move_in_cost: 1_000.0, monthly_cost: 55.0, stats: None },
		risk: RiskFeatures {
			is_banned: false,
			floor_ratio: Some(0.6),
			has_location: true,
			region_code: None,
			assessment: None,
		},
		option: OptionFeatures {
			essential_coverage: 0.5,
			amenity_ratio: 0.25,
			amenities: Vec::new(),
		},
		distance: None,
		calculated_at: at,
		observation_version: version.to_string(),
		source_data_version: "crawl-v1".to_string(),
	}
}

fn completed(listing_id: i64, total: f64) -> ScoreRecord {
	ScoreRecord {
		listing_id,
		snapshot_id: format!("snap-{listing_id}"),
		price_score: total,
		option_score: total,
		risk_score: total,
		distance_score: total,
		base_total_score: total,
		is_recommended: total >= 60.0,
		observation_version: "obs-v1".to_string(),
		policy_version: "policy-v1".to_string(),
		processing_status: ProcessingStatus::Completed,
		last_error: None,
		updated_at: NOW,
	}
}

#[tokio::test]
async fn prefilter_applies_budget_and_limit() {
	let store = MemoryStore::new();

	for sample in [
		listing(1, "월세", 1_000, 50),
		listing(2, "월세", 1_000, 90),
		listing(3, "전세", 20_000, 0),
		listing(4, "월세", 500, 40),
	] {
		store.upsert_listing(&sample).await.expect("Failed to upsert listing.");
	}

	let query = ListingQuery {
		max_deposit: Some(5_000),
		max_monthly: Some(60),
		sales_type_patterns: vec!["월세".to_string()],
		limit: Some(10),
		..ListingQuery::default()
	};
	let ids: Vec<i64> = store
		.prefilter_listings(&query)
		.await
		.expect("Failed to prefilter.")
		.iter()
		.map(|listing| listing.listing_id)
		.collect();

	assert_eq!(ids, vec![1, 4]);

	let limited = ListingQuery { limit: Some(1), ..query };
	let ids: Vec<i64> = store
		.prefilter_listings(&limited)
		.await
		.expect("Failed to prefilter.")
		.iter()
		.map(|listing| listing.listing_id)
		.collect();

	assert_eq!(ids, vec![1]);
}

#[tokio::test]
async fn latest_observation_wins_and_history_is_kept() {
	let store = MemoryStore::new();
	let older = observation(7, "obs-v1", NOW - Duration::hours(1));
	let newer = observation(7, "obs-v2", NOW);

	store.insert_observations(&[older.clone(), newer.clone()]).await.expect("Failed to insert.");

	let latest = store.latest_observation(7).await.expect("Failed to read.").expect("Missing row.");

	assert_eq!(latest.observation_version, "obs-v2");

	let v1 = store.observations_by_version(Some("obs-v1")).await.expect("Failed to read.");

	assert_eq!(v1, vec![older]);

	let all = store.observations_by_version(None).await.expect("Failed to read.");

	assert_eq!(all, vec![newer]);
}

#[tokio::test]
async fn status_transitions_keep_previous_scores() {
	let store = MemoryStore::new();

	store.upsert_score(&completed(1, 72.5)).await.expect("Failed to upsert score.");
	store
		.mark_failed(&FailedScore {
			listing_id: 1,
			snapshot_id: "snap-1".to_string(),
			observation_version: "obs-v1".to_string(),
			policy_version: "policy-v1".to_string(),
			error: "price.stats missing".to_string(),
			at: NOW,
		})
		.await
		.expect("Failed to mark failed.");

	let failed = store.get_score(1).await.expect("Failed to read.").expect("Missing score.");

	assert_eq!(failed.processing_status, ProcessingStatus::Failed);
	assert_eq!(failed.base_total_score, 72.5);
	assert_eq!(failed.last_error.as_deref(), Some("price.stats missing"));

	store.mark_ready(1, "snap-1b", "obs-v1", NOW).await.expect("Failed to mark ready.");

	let ready = store.get_score(1).await.expect("Failed to read.").expect("Missing score.");

	assert_eq!(ready.processing_status, ProcessingStatus::Ready);
	assert_eq!(ready.base_total_score, 72.5);
	assert!(ready.last_error.is_none());
}

#[tokio::test]
async fn top_scores_only_ranks_completed_rows() {
	let store = MemoryStore::new();

	for record in [completed(1, 80.0), completed(2, 55.0), completed(3, 91.0), completed(4, 80.0)] {
		store.upsert_score(&record).await.expect("Failed to upsert score.");
	}

	store.mark_ready(3, "snap-3", "obs-v1", NOW).await.expect("Failed to mark ready.");

	let top = store.top_scores("obs-v1", "policy-v1", 60.0, 10).await.expect("Failed to rank.");
	let ids: Vec<i64> = top.iter().map(|record| record.listing_id).collect();

	assert_eq!(ids, vec![1, 4]);

	let other_policy =
		store.top_scores("obs-v1", "policy-v2", 0.0, 10).await.expect("Failed to rank.");

	assert!(other_policy.is_empty());
}

#[tokio::test]
async fn replace_distances_drops_stale_rows() {
	let store = MemoryStore::new();
	let row = |reference_location_id: i64, minutes: f64| DistanceObservation {
		listing_id: 5,
		reference_location_id,
		minutes,
		percentile: 0.5,
		bucket: DistanceBucket::from_minutes(minutes),
		nonlinear_score: 0.8,
		calculated_at: NOW,
	};

	store.replace_distances(5, &[row(1, 12.0), row(2, 45.0)]).await.expect("Failed to write.");
	store.replace_distances(5, &[row(1, 15.0)]).await.expect("Failed to write.");

	assert!(store.get_distance(5, 2).await.expect("Failed to read.").is_none());

	let found = store.distances_to(1, &[5, 6]).await.expect("Failed to read.");

	assert_eq!(found.len(), 1);
	assert_eq!(found[&5].minutes, 15.0);
	assert_eq!(found[&5].bucket, DistanceBucket::from_minutes(15.0));
}

#[tokio::test]
async fn nearest_listings_orders_by_cosine_distance_within_pool() {
	let store = MemoryStore::new();

	store.upsert_listing_embedding(1, "hash:v:3", &[1.0, 0.0, 0.0], NOW).await.expect("Write.");
	store.upsert_listing_embedding(2, "hash:v:3", &[0.6, 0.8, 0.0], NOW).await.expect("Write.");
	store.upsert_listing_embedding(3, "hash:v:3", &[0.0, 0.0, 1.0], NOW).await.expect("Write.");

	let nearest = store
		.nearest_listings(&[1.0, 0.0, 0.0], "hash:v:3", &[2, 3, 1], 2)
		.await
		.expect("Failed to search.");
	let ids: Vec<i64> = nearest.iter().map(|item| item.listing_id).collect();

	assert_eq!(ids, vec![1, 2]);
	assert!(nearest[0].distance.abs() < 1e-9);

	let outside_pool =
		store.nearest_listings(&[1.0, 0.0, 0.0], "hash:v:3", &[3], 5).await.expect("Search.");

	assert_eq!(outside_pool.len(), 1);
	assert_eq!(outside_pool[0].listing_id, 3);
	assert!(
		store.upsert_listing_embedding(4, "hash:v:3", &[1.0, 0.0], NOW).await.is_err(),
		"Dimension mismatch must be rejected."
	);
}
