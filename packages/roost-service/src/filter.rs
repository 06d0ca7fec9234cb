use serde::Serialize;

use roost_domain::{criteria::CandidateCriteria, listing::RenterRequest};
use roost_storage::store::ListingQuery;

use crate::{Result, RoostService};

pub const MISSING_BUDGET_MESSAGE: &str =
	"A maximum deposit or maximum monthly rent is required to search listings.";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Candidate {
	pub listing_id: i64,
	pub title: String,
	pub address: String,
	pub sales_type: String,
	/// Observed costs, which the budget gate was applied to.
	pub move_in_cost: f64,
	pub monthly_cost: f64,
	/// Walking minutes to the requested university, when the distance gate ran.
	pub campus_minutes: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FilterOutcome {
	pub criteria: CandidateCriteria,
	pub candidates: Vec<Candidate>,
	pub message: Option<String>,
}

impl RoostService {
	/// Narrows the listing population to the request's budget, price type, region and campus
	/// distance constraints.
	pub async fn filter(&self, request: &RenterRequest) -> Result<FilterOutcome> {
		let mut criteria = CandidateCriteria::from_request(request, self.cfg.filter.margin_ratio);

		if !criteria.has_budget() {
			return Ok(FilterOutcome {
				criteria,
				candidates: Vec::new(),
				message: Some(MISSING_BUDGET_MESSAGE.to_string()),
			});
		}

		criteria.university_id = self.resolve_university(request);

		let query = ListingQuery::from_criteria(&criteria, None);
		let listings = self.stores.listings.prefilter_listings(&query).await?;
		let ids: Vec<i64> = listings.iter().map(|listing| listing.listing_id).collect();
		let observations = self.stores.observations.latest_observations(&ids).await?;
		let campus_distances = match criteria.university_id.filter(|_| criteria.near_campus) {
			Some(reference_location_id) =>
				Some(self.stores.distances.distances_to(reference_location_id, &ids).await?),
			None => None,
		};
		let max_minutes = self.cfg.filter.near_campus_max_minutes;
		let mut candidates = Vec::new();

		for listing in listings {
			// A listing without a price observation cannot be budget-checked.
			let Some(observation) = observations.get(&listing.listing_id) else {
				continue;
			};

			if !criteria.admits_price(&observation.price, &listing.sales_type) {
				continue;
			}

			let campus_minutes = match campus_distances.as_ref() {
				Some(distances) => match distances.get(&listing.listing_id) {
					Some(row) if row.minutes <= max_minutes => Some(row.minutes),
					_ => continue,
				},
				None => None,
			};

			candidates.push(Candidate {
				listing_id: listing.listing_id,
				title: listing.title,
				address: listing.address,
				sales_type: listing.sales_type,
				move_in_cost: observation.price.move_in_cost,
				monthly_cost: observation.price.monthly_cost,
				campus_minutes,
			});
		}

		let message = candidates.is_empty().then(|| "No listings matched the request.".to_string());

		Ok(FilterOutcome { criteria, candidates, message })
	}

	fn resolve_university(&self, request: &RenterRequest) -> Option<i64> {
		if !request.near_campus {
			return None;
		}

		let name = request.university.as_deref().map(str::trim).filter(|name| !name.is_empty())?;

		match self.catalog.resolve(name) {
			Some(location) => Some(location.id),
			None => {
				tracing::warn!(
					university = name,
					"Unknown university; skipping the campus distance gate."
				);

				None
			},
		}
	}
}
