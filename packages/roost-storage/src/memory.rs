//! In-process store with the same contract as [`crate::pg::PgStore`]. Used by tests and offline
//! runs of the worker.

use std::{
	collections::{BTreeMap, HashMap},
	future,
	sync::{Mutex, MutexGuard},
};

use time::OffsetDateTime;
use uuid::Uuid;

use roost_domain::{
	distance::DistanceObservation,
	listing::{Listing, RenterRequest},
	observation::FeatureObservation,
	score::{ProcessingStatus, ScoreRecord},
};

use crate::{
	Error, Result,
	store::{
		BoxFuture, DistanceStore, EmbeddingStore, FailedScore, ListingQuery, ListingStore,
		NearestListing, ObservationStore, ScoreStore,
	},
};

#[derive(Default)]
pub struct MemoryStore {
	state: Mutex<State>,
}
impl MemoryStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn lock(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(|err| err.into_inner())
	}
}

#[derive(Default)]
struct State {
	listings: BTreeMap<i64, Listing>,
	requests: HashMap<Uuid, RenterRequest>,
	// Append-only, in insertion order.
	observations: Vec<FeatureObservation>,
	distances: BTreeMap<(i64, i64), DistanceObservation>,
	scores: BTreeMap<i64, ScoreRecord>,
	request_embeddings: HashMap<(Uuid, String), Vec<f32>>,
	listing_embeddings: HashMap<(i64, String), Vec<f32>>,
}
impl State {
	fn latest_observation(&self, listing_id: i64) -> Option<&FeatureObservation> {
		// Ties on `calculated_at` go to the later insert.
		self.observations
			.iter()
			.filter(|observation| observation.listing_id == listing_id)
			.max_by(|a, b| a.calculated_at.cmp(&b.calculated_at))
	}
}

fn check_dimensions(vec: &[f32], existing: Option<&Vec<f32>>) -> Result<()> {
	if vec.is_empty() {
		return Err(Error::InvalidArgument("Embedding vector must not be empty.".to_string()));
	}
	if let Some(existing) = existing
		&& existing.len() != vec.len()
	{
		return Err(Error::Conflict(format!(
			"Embedding dimension {} does not match stored dimension {}.",
			vec.len(),
			existing.len()
		)));
	}

	Ok(())
}

impl ListingStore for MemoryStore {
	fn upsert_listing<'a>(&'a self, listing: &'a Listing) -> BoxFuture<'a, Result<()>> {
		self.lock().listings.insert(listing.listing_id, listing.clone());

		Box::pin(future::ready(Ok(())))
	}

	fn get_listing<'a>(&'a self, listing_id: i64) -> BoxFuture<'a, Result<Option<Listing>>> {
		let found = self.lock().listings.get(&listing_id).cloned();

		Box::pin(future::ready(Ok(found)))
	}

	fn list_listings<'a>(&'a self, ids: Option<&'a [i64]>) -> BoxFuture<'a, Result<Vec<Listing>>> {
		let state = self.lock();
		let listings = state
			.listings
			.values()
			.filter(|listing| ids.is_none_or(|ids| ids.contains(&listing.listing_id)))
			.cloned()
			.collect();

		Box::pin(future::ready(Ok(listings)))
	}

	fn prefilter_listings<'a>(
		&'a self,
		query: &'a ListingQuery,
	) -> BoxFuture<'a, Result<Vec<Listing>>> {
		let state = self.lock();
		let limit = query.limit.map_or(usize::MAX, |limit| limit.max(0) as usize);
		let listings = state
			.listings
			.values()
			.filter(|listing| query.matches(listing))
			.take(limit)
			.cloned()
			.collect();

		Box::pin(future::ready(Ok(listings)))
	}

	fn put_renter_request<'a>(&'a self, request: &'a RenterRequest) -> BoxFuture<'a, Result<()>> {
		self.lock().requests.insert(request.request_id, request.clone());

		Box::pin(future::ready(Ok(())))
	}

	fn get_renter_request<'a>(
		&'a self,
		request_id: Uuid,
	) -> BoxFuture<'a, Result<Option<RenterRequest>>> {
		let found = self.lock().requests.get(&request_id).cloned();

		Box::pin(future::ready(Ok(found)))
	}
}

impl ObservationStore for MemoryStore {
	fn insert_observations<'a>(
		&'a self,
		observations: &'a [FeatureObservation],
	) -> BoxFuture<'a, Result<()>> {
		self.lock().observations.extend_from_slice(observations);

		Box::pin(future::ready(Ok(())))
	}

	fn latest_observation<'a>(
		&'a self,
		listing_id: i64,
	) -> BoxFuture<'a, Result<Option<FeatureObservation>>> {
		let found = self.lock().latest_observation(listing_id).cloned();

		Box::pin(future::ready(Ok(found)))
	}

	fn latest_observations<'a>(
		&'a self,
		listing_ids: &'a [i64],
	) -> BoxFuture<'a, Result<HashMap<i64, FeatureObservation>>> {
		let state = self.lock();
		let found = listing_ids
			.iter()
			.filter_map(|listing_id| {
				state.latest_observation(*listing_id).map(|obs| (*listing_id, obs.clone()))
			})
			.collect();

		Box::pin(future::ready(Ok(found)))
	}

	fn observations_by_version<'a>(
		&'a self,
		observation_version: Option<&'a str>,
	) -> BoxFuture<'a, Result<Vec<FeatureObservation>>> {
		let state = self.lock();
		let mut latest: BTreeMap<i64, &FeatureObservation> = BTreeMap::new();

		for observation in &state.observations {
			if observation_version.is_some_and(|version| observation.observation_version != version)
			{
				continue;
			}

			match latest.get(&observation.listing_id) {
				Some(current) if current.calculated_at > observation.calculated_at => {},
				_ => {
					latest.insert(observation.listing_id, observation);
				},
			}
		}

		let out = latest.into_values().cloned().collect();

		Box::pin(future::ready(Ok(out)))
	}
}

impl DistanceStore for MemoryStore {
	fn replace_distances<'a>(
		&'a self,
		listing_id: i64,
		rows: &'a [DistanceObservation],
	) -> BoxFuture<'a, Result<()>> {
		let mut state = self.lock();

		state.distances.retain(|(owner, _), _| *owner != listing_id);

		for row in rows {
			state.distances.insert((listing_id, row.reference_location_id), row.clone());
		}

		Box::pin(future::ready(Ok(())))
	}

	fn get_distance<'a>(
		&'a self,
		listing_id: i64,
		reference_location_id: i64,
	) -> BoxFuture<'a, Result<Option<DistanceObservation>>> {
		let found = self.lock().distances.get(&(listing_id, reference_location_id)).cloned();

		Box::pin(future::ready(Ok(found)))
	}

	fn distances_to<'a>(
		&'a self,
		reference_location_id: i64,
		listing_ids: &'a [i64],
	) -> BoxFuture<'a, Result<HashMap<i64, DistanceObservation>>> {
		let state = self.lock();
		let found = listing_ids
			.iter()
			.filter_map(|listing_id| {
				state
					.distances
					.get(&(*listing_id, reference_location_id))
					.map(|row| (*listing_id, row.clone()))
			})
			.collect();

		Box::pin(future::ready(Ok(found)))
	}
}

impl ScoreStore for MemoryStore {
	fn upsert_score<'a>(&'a self, record: &'a ScoreRecord) -> BoxFuture<'a, Result<()>> {
		self.lock().scores.insert(record.listing_id, record.clone());

		Box::pin(future::ready(Ok(())))
	}

	fn mark_failed<'a>(&'a self, failure: &'a FailedScore) -> BoxFuture<'a, Result<()>> {
		let mut state = self.lock();
		let record = state.scores.entry(failure.listing_id).or_insert_with(|| ScoreRecord {
			listing_id: failure.listing_id,
			snapshot_id: failure.snapshot_id.clone(),
			price_score: 0.0,
			option_score: 0.0,
			risk_score: 0.0,
			distance_score: 0.0,
			base_total_score: 0.0,
			is_recommended: false,
			observation_version: failure.observation_version.clone(),
			policy_version: failure.policy_version.clone(),
			processing_status: ProcessingStatus::Failed,
			last_error: None,
			updated_at: failure.at,
		});

		record.processing_status = ProcessingStatus::Failed;
		record.last_error = Some(failure.error.clone());
		record.updated_at = failure.at;

		Box::pin(future::ready(Ok(())))
	}

	fn mark_ready<'a>(
		&'a self,
		listing_id: i64,
		snapshot_id: &'a str,
		observation_version: &'a str,
		at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		let mut state = self.lock();
		let record = state.scores.entry(listing_id).or_insert_with(|| ScoreRecord {
			listing_id,
			snapshot_id: snapshot_id.to_string(),
			price_score: 0.0,
			option_score: 0.0,
			risk_score: 0.0,
			distance_score: 0.0,
			base_total_score: 0.0,
			is_recommended: false,
			observation_version: observation_version.to_string(),
			policy_version: String::new(),
			processing_status: ProcessingStatus::Ready,
			last_error: None,
			updated_at: at,
		});

		record.processing_status = ProcessingStatus::Ready;
		record.last_error = None;
		record.updated_at = at;

		Box::pin(future::ready(Ok(())))
	}

	fn get_score<'a>(&'a self, listing_id: i64) -> BoxFuture<'a, Result<Option<ScoreRecord>>> {
		let found = self.lock().scores.get(&listing_id).cloned();

		Box::pin(future::ready(Ok(found)))
	}

	fn scores_for<'a>(
		&'a self,
		listing_ids: &'a [i64],
	) -> BoxFuture<'a, Result<HashMap<i64, ScoreRecord>>> {
		let state = self.lock();
		let found = listing_ids
			.iter()
			.filter_map(|listing_id| {
				state.scores.get(listing_id).map(|record| (*listing_id, record.clone()))
			})
			.collect();

		Box::pin(future::ready(Ok(found)))
	}

	fn top_scores<'a>(
		&'a self,
		observation_version: &'a str,
		policy_version: &'a str,
		threshold: f64,
		limit: i64,
	) -> BoxFuture<'a, Result<Vec<ScoreRecord>>> {
		let state = self.lock();
		let mut out: Vec<ScoreRecord> = state
			.scores
			.values()
			.filter(|record| {
				record.processing_status == ProcessingStatus::Completed
					&& record.observation_version == observation_version
					&& record.policy_version == policy_version
					&& record.base_total_score >= threshold
			})
			.cloned()
			.collect();

		out.sort_by(|a, b| {
			b.base_total_score
				.total_cmp(&a.base_total_score)
				.then_with(|| a.listing_id.cmp(&b.listing_id))
		});
		out.truncate(limit.max(0) as usize);

		Box::pin(future::ready(Ok(out)))
	}
}

impl EmbeddingStore for MemoryStore {
	fn get_request_embedding<'a>(
		&'a self,
		request_id: Uuid,
		embedding_version: &'a str,
	) -> BoxFuture<'a, Result<Option<Vec<f32>>>> {
		let found = self
			.lock()
			.request_embeddings
			.get(&(request_id, embedding_version.to_string()))
			.cloned();

		Box::pin(future::ready(Ok(found)))
	}

	fn put_request_embedding<'a>(
		&'a self,
		request_id: Uuid,
		embedding_version: &'a str,
		_text: &'a str,
		vec: &'a [f32],
		_at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		let result = check_dimensions(vec, None).map(|()| {
			self.lock()
				.request_embeddings
				.insert((request_id, embedding_version.to_string()), vec.to_vec());
		});

		Box::pin(future::ready(result))
	}

	fn upsert_listing_embedding<'a>(
		&'a self,
		listing_id: i64,
		embedding_version: &'a str,
		vec: &'a [f32],
		_at: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		let mut state = self.lock();
		let result = check_dimensions(vec, state.listing_embeddings.values().next());

		if result.is_ok() {
			state
				.listing_embeddings
				.insert((listing_id, embedding_version.to_string()), vec.to_vec());
		}

		Box::pin(future::ready(result))
	}

	fn nearest_listings<'a>(
		&'a self,
		vec: &'a [f32],
		embedding_version: &'a str,
		pool: &'a [i64],
		limit: i64,
	) -> BoxFuture<'a, Result<Vec<NearestListing>>> {
		let state = self.lock();
		let mut out: Vec<NearestListing> = pool
			.iter()
			.filter_map(|listing_id| {
				state.listing_embeddings.get(&(*listing_id, embedding_version.to_string())).map(
					|stored| NearestListing {
						listing_id: *listing_id,
						distance: crate::cosine_distance(vec, stored),
					},
				)
			})
			.collect();

		out.sort_by(|a, b| {
			a.distance.total_cmp(&b.distance).then_with(|| a.listing_id.cmp(&b.listing_id))
		});
		out.dedup_by_key(|item| item.listing_id);
		out.truncate(limit.max(0) as usize);

		Box::pin(future::ready(Ok(out)))
	}
}
