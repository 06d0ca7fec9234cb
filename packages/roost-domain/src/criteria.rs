use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
	listing::{Listing, PriceType, RenterRequest},
	observation::PriceFeatures,
};

static DISTRICT_TOKEN: LazyLock<Option<Regex>> =
	LazyLock::new(|| Regex::new(r"[0-9A-Za-z가-힣]+구").ok());

/// Structured filter constraints derived from one renter request. Never persisted.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CandidateCriteria {
	pub max_deposit_limit: Option<i64>,
	pub max_rent_limit: Option<i64>,
	pub price_type: Option<PriceType>,
	pub region: Option<String>,
	pub near_campus: bool,
	pub university_id: Option<i64>,
}
impl CandidateCriteria {
	/// Expands the stated budget ceilings by `margin_ratio` and extracts the district token.
	///
	/// `university_id` is left unset; resolving it needs the reference catalog.
	pub fn from_request(request: &RenterRequest, margin_ratio: f64) -> Self {
		Self {
			max_deposit_limit: request.max_deposit.map(|limit| expand_budget(limit, margin_ratio)),
			max_rent_limit: request.max_rent.map(|limit| expand_budget(limit, margin_ratio)),
			price_type: request.price_type,
			region: request.preferred_region.as_deref().and_then(extract_district),
			near_campus: request.near_campus,
			university_id: None,
		}
	}

	pub fn has_budget(&self) -> bool {
		self.max_deposit_limit.is_some() || self.max_rent_limit.is_some()
	}

	/// Sales-type substrings a listing must contain, empty when any type is acceptable.
	pub fn sales_type_patterns(&self) -> Vec<String> {
		self.price_type
			.map(|price_type| {
				price_type.sales_type_markers().iter().map(|marker| marker.to_string()).collect()
			})
			.unwrap_or_default()
	}

	/// The same budget, price-type and region gates the storage pre-filter applies, on a loaded
	/// listing.
	pub fn admits_listing(&self, listing: &Listing) -> bool {
		if let Some(price_type) = self.price_type
			&& !price_type.accepts(&listing.sales_type)
		{
			return false;
		}
		if let Some(region) = self.region.as_deref()
			&& !listing.address.contains(region)
		{
			return false;
		}
		if let Some(limit) = self.max_deposit_limit
			&& listing.move_in_cost() > limit
		{
			return false;
		}
		if let Some(limit) = self.max_rent_limit
			&& !self.rent_relaxed_for(&listing.sales_type)
			&& listing.monthly_cost() > limit
		{
			return false;
		}

		true
	}

	/// Applies the budget to the observed move-in and monthly costs.
	pub fn admits_price(&self, price: &PriceFeatures, sales_type: &str) -> bool {
		if let Some(limit) = self.max_deposit_limit
			&& price.move_in_cost > limit as f64
		{
			return false;
		}
		if let Some(limit) = self.max_rent_limit
			&& !self.rent_relaxed_for(sales_type)
			&& price.monthly_cost > limit as f64
		{
			return false;
		}

		true
	}

	/// A mixed request does not hold key-money listings to the monthly-rent ceiling.
	pub fn rent_relaxed_for(&self, sales_type: &str) -> bool {
		matches!(self.price_type, Some(PriceType::Mixed)) && PriceType::Jeonse.accepts(sales_type)
	}
}

/// Soft ceiling: `round(limit * (1 + margin_ratio))`.
pub fn expand_budget(limit: i64, margin_ratio: f64) -> i64 {
	(limit as f64 * (1.0 + margin_ratio)).round() as i64
}

/// First administrative-district token (ending in `구`) in free text.
pub fn extract_district(text: &str) -> Option<String> {
	let regex = DISTRICT_TOKEN.as_ref()?;

	regex.find(text).map(|token| token.as_str().to_string())
}
