use serde::Serialize;
use time::OffsetDateTime;

use roost_domain::{
	distance::{self, DistanceError, DistanceObservation},
	listing::Listing,
	observation::{FeatureObservation, ObservationBuilder, ObservationError},
	population,
};

use crate::{Error, Result, RoostService};

#[derive(Clone, Debug, Serialize)]
pub struct ObserveFailure {
	pub listing_id: i64,
	pub error: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ObserveReport {
	pub observation_version: String,
	pub observed: usize,
	pub failed: Vec<ObserveFailure>,
}

impl RoostService {
	/// Observes every listing as one population.
	pub async fn observe_all(&self) -> Result<ObserveReport> {
		let listings = self.stores.listings.list_listings(None).await?;
		let now = OffsetDateTime::now_utc();
		let builder = self.observation_builder();
		let mut observations = Vec::with_capacity(listings.len());
		let mut failed = Vec::new();

		for listing in &listings {
			match self.observe_raw(&builder, listing, now).await {
				Ok(observation) => observations.push(observation),
				Err(Error::Domain { message }) => {
					tracing::warn!(
						listing_id = listing.listing_id,
						error = %message,
						"Skipping listing that cannot be observed."
					);

					failed.push(ObserveFailure { listing_id: listing.listing_id, error: message });
				},
				Err(err) => return Err(err),
			}
		}

		population::apply_population_stats(&mut observations);

		self.persist(&observations).await?;

		tracing::info!(
			observation_version = builder.observation_version(),
			observed = observations.len(),
			failed = failed.len(),
			"Observation pass finished."
		);

		Ok(ObserveReport {
			observation_version: builder.observation_version().to_string(),
			observed: observations.len(),
			failed,
		})
	}

	/// Observes one listing, positioning its price among the latest observations of the current
	/// version.
	pub async fn observe_listing(&self, listing_id: i64) -> Result<FeatureObservation> {
		let Some(listing) = self.stores.listings.get_listing(listing_id).await? else {
			return Err(ObservationError::ListingNotFound { listing_id }.into());
		};
		let now = OffsetDateTime::now_utc();
		let builder = self.observation_builder();
		let observation = self.observe_raw(&builder, &listing, now).await?;
		let mut population = self
			.stores
			.observations
			.observations_by_version(Some(builder.observation_version()))
			.await?;

		population.retain(|peer| peer.listing_id != listing_id);
		population.push(observation);
		population::apply_population_stats(&mut population);

		let observation = population
			.pop()
			.ok_or_else(|| Error::from(ObservationError::ListingNotFound { listing_id }))?;

		self.persist(std::slice::from_ref(&observation)).await?;

		Ok(observation)
	}

	fn observation_builder(&self) -> ObservationBuilder {
		ObservationBuilder::new(
			self.cfg.observation.version.clone(),
			self.cfg.observation.source_data_version.clone(),
		)
	}

	/// Raw features, distance fan-out and risk enrichment. Population statistics are left empty.
	async fn observe_raw(
		&self,
		builder: &ObservationBuilder,
		listing: &Listing,
		now: OffsetDateTime,
	) -> Result<FeatureObservation> {
		let mut observation =
			builder.build(listing.listing_id, Some(listing), &listing.options, now)?;
		let rows = self.fan_out_distances(listing, now).await?;

		observation.distance = distance::nearest(&rows).map(DistanceObservation::summary);

		match self.providers.risk.analyze(&listing.address, listing.parcel_id.as_deref()).await {
			Ok(assessment) => observation.risk.assessment = Some(assessment),
			Err(err) => {
				tracing::warn!(
					listing_id = listing.listing_id,
					error = %err,
					"Risk analysis failed; keeping proxy risk features."
				);
			},
		}

		Ok(observation)
	}

	async fn fan_out_distances(
		&self,
		listing: &Listing,
		now: OffsetDateTime,
	) -> Result<Vec<DistanceObservation>> {
		let rows = match distance::compute_all(listing, &self.catalog, now) {
			Ok(rows) => rows,
			Err(DistanceError::MissingCoordinates { listing_id }) => {
				tracing::debug!(listing_id, "Listing has no coordinates; clearing distances.");

				Vec::new()
			},
			Err(err) => return Err(err.into()),
		};

		self.stores.distances.replace_distances(listing.listing_id, &rows).await?;

		Ok(rows)
	}

	async fn persist(&self, observations: &[FeatureObservation]) -> Result<()> {
		self.stores.observations.insert_observations(observations).await?;

		for observation in observations {
			self.stores
				.scores
				.mark_ready(
					observation.listing_id,
					&observation.snapshot_id,
					&observation.observation_version,
					observation.calculated_at,
				)
				.await?;
		}

		Ok(())
	}
}
