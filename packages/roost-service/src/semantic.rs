use std::collections::HashMap;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use roost_domain::{
	criteria::{CandidateCriteria, extract_district},
	listing::{Listing, RenterRequest},
};
use roost_storage::store::ListingQuery;

use crate::{Error, Result, RoostService, filter::MISSING_BUDGET_MESSAGE};

pub const FALLBACK_REASON: &str = "Closely matches the wording of the request.";

#[derive(Clone, Debug, Serialize)]
pub struct SemanticMatch {
	pub listing_id: i64,
	pub title: String,
	pub address: String,
	pub sales_type: String,
	pub deposit: i64,
	pub monthly_cost: i64,
	/// `max(0, 1 - distance)`.
	pub similarity: f64,
	pub distance: f64,
	pub reasons: Vec<String>,
	pub risk_flags: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SemanticMatchResult {
	pub request_id: Uuid,
	pub embedding_version: String,
	pub pool_size: usize,
	pub matches: Vec<SemanticMatch>,
	pub message: Option<String>,
}

impl RoostService {
	/// Nearest listings to the request's text embedding, searched only within the rule-based
	/// candidate pool. `None` when the request does not exist; a request without any budget
	/// bound gets an empty result with a message and is never embedded.
	pub async fn match_request(&self, request_id: Uuid) -> Result<Option<SemanticMatchResult>> {
		let Some(request) = self.stores.listings.get_renter_request(request_id).await? else {
			return Ok(None);
		};
		let embedding_version = self.embedding_version();
		let criteria = CandidateCriteria::from_request(&request, self.cfg.filter.margin_ratio);

		if !criteria.has_budget() {
			return Ok(Some(SemanticMatchResult {
				request_id,
				embedding_version,
				pool_size: 0,
				matches: Vec::new(),
				message: Some(MISSING_BUDGET_MESSAGE.to_string()),
			}));
		}

		let query =
			ListingQuery::from_criteria(&criteria, Some(i64::from(self.cfg.semantic.pool_limit)));
		let pool = self.stores.listings.prefilter_listings(&query).await?;

		if pool.is_empty() {
			return Ok(Some(SemanticMatchResult {
				request_id,
				embedding_version,
				pool_size: 0,
				matches: Vec::new(),
				message: None,
			}));
		}

		let vec = self.request_embedding(&request, &embedding_version).await?;
		let ids: Vec<i64> = pool.iter().map(|listing| listing.listing_id).collect();
		let nearest = self
			.stores
			.embeddings
			.nearest_listings(&vec, &embedding_version, &ids, i64::from(self.cfg.semantic.top_k))
			.await?;
		let by_id: HashMap<i64, &Listing> =
			pool.iter().map(|listing| (listing.listing_id, listing)).collect();
		let max_reasons = self.cfg.semantic.max_reasons as usize;
		let matches = nearest
			.into_iter()
			.filter_map(|hit| {
				let listing = by_id.get(&hit.listing_id)?;

				Some(SemanticMatch {
					listing_id: listing.listing_id,
					title: listing.title.clone(),
					address: listing.address.clone(),
					sales_type: listing.sales_type.clone(),
					deposit: listing.deposit,
					monthly_cost: listing.monthly_cost(),
					similarity: (1.0 - hit.distance).max(0.0),
					distance: hit.distance,
					reasons: match_reasons(&request, listing, max_reasons),
					risk_flags: risk_flags(listing),
				})
			})
			.collect();

		Ok(Some(SemanticMatchResult {
			request_id,
			embedding_version,
			pool_size: pool.len(),
			matches,
			message: None,
		}))
	}

	/// The cached request embedding, computed and stored on first use.
	async fn request_embedding(
		&self,
		request: &RenterRequest,
		embedding_version: &str,
	) -> Result<Vec<f32>> {
		if let Some(vec) = self
			.stores
			.embeddings
			.get_request_embedding(request.request_id, embedding_version)
			.await?
		{
			return Ok(vec);
		}

		let text = request.embedding_text();
		let texts = [text];
		let vec = self
			.providers
			.embedding
			.embed(&self.cfg.providers.embedding, &texts)
			.await?
			.into_iter()
			.next()
			.ok_or_else(|| Error::Provider {
				message: "Embedding provider returned no vectors.".to_string(),
			})?;

		crate::check_vector_dim(&vec, self.cfg.storage.vector_dim)?;

		self.stores
			.embeddings
			.put_request_embedding(
				request.request_id,
				embedding_version,
				&texts[0],
				&vec,
				OffsetDateTime::now_utc(),
			)
			.await?;

		Ok(vec)
	}
}

/// Literal reasons a listing fits the request, capped at `max_reasons`.
pub fn match_reasons(
	request: &RenterRequest,
	listing: &Listing,
	max_reasons: usize,
) -> Vec<String> {
	let mut reasons = Vec::new();

	if let Some(max_deposit) = request.max_deposit
		&& listing.move_in_cost() <= max_deposit
	{
		reasons.push(format!(
			"Deposit {} is within the budget of {max_deposit}.",
			listing.move_in_cost()
		));
	}
	if let Some(max_rent) = request.max_rent
		&& listing.monthly_cost() <= max_rent
	{
		reasons.push(format!(
			"Monthly cost {} is within the budget of {max_rent}.",
			listing.monthly_cost()
		));
	}
	if let Some(district) = request.preferred_region.as_deref().and_then(extract_district)
		&& listing.address.contains(&district)
	{
		reasons.push(format!("Located in {district}."));
	}

	for amenity in &request.desired_amenities {
		let amenity = amenity.trim();

		if amenity.is_empty() {
			continue;
		}
		if listing.options.amenities.iter().any(|have| have.contains(amenity))
			|| listing.description.contains(amenity)
		{
			reasons.push(format!("Offers {amenity}."));
		}
	}

	reasons.truncate(max_reasons);

	if reasons.is_empty() && max_reasons > 0 {
		reasons.push(FALLBACK_REASON.to_string());
	}

	reasons
}

/// Heuristic warnings from listing attributes alone.
pub fn risk_flags(listing: &Listing) -> Vec<String> {
	let mut flags = Vec::new();

	if listing.is_banned {
		flags.push("Listing has been flagged by moderators.".to_string());
	}
	if listing.floor.is_some_and(|floor| floor < 0) {
		flags.push("Basement unit.".to_string());
	}
	if listing.coordinates().is_none() {
		flags.push("Location could not be verified.".to_string());
	}
	if listing.region_code.as_deref().is_none_or(|code| code.trim().is_empty())
		&& listing.parcel_id.as_deref().is_none_or(|parcel| parcel.trim().is_empty())
	{
		flags.push("No registry identifiers; ownership records were not checked.".to_string());
	}

	flags
}
