use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Sales-type marker for key-money (lump-sum deposit) leases.
pub const JEONSE_MARKER: &str = "전세";
/// Sales-type marker for monthly-rent leases.
pub const MONTHLY_MARKER: &str = "월세";

/// Essential signals the option axis tracks. Coverage is the share of these present.
pub const ESSENTIAL_SIGNAL_COUNT: usize = 4;

/// Amenity keywords counted toward the amenity ratio.
pub const TRACKED_AMENITIES: [&str; 8] = [
	"에어컨",
	"세탁기",
	"냉장고",
	"인덕션",
	"전자레인지",
	"옷장",
	"책상",
	"침대",
];

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Listing {
	pub listing_id: i64,
	pub title: String,
	pub address: String,
	/// Free-text sales type as crawled, e.g. `월세`, `전세`, `전세/월세`.
	pub sales_type: String,
	pub deposit: i64,
	pub monthly_rent: i64,
	pub management_fee: i64,
	pub area_m2: Option<f64>,
	pub floor: Option<i32>,
	pub total_floors: Option<i32>,
	pub latitude: Option<f64>,
	pub longitude: Option<f64>,
	pub region_code: Option<String>,
	pub parcel_id: Option<String>,
	pub is_banned: bool,
	pub description: String,
	#[serde(default)]
	pub options: ListingOptions,
	#[serde(default, with = "crate::time_serde::option")]
	pub crawled_at: Option<OffsetDateTime>,
}
impl Listing {
	/// Deposit paid at move-in.
	pub fn move_in_cost(&self) -> i64 {
		self.deposit
	}

	/// Rent plus management fee.
	pub fn monthly_cost(&self) -> i64 {
		self.monthly_rent + self.management_fee
	}

	pub fn is_jeonse(&self) -> bool {
		self.sales_type.contains(JEONSE_MARKER)
	}

	pub fn is_monthly(&self) -> bool {
		self.sales_type.contains(MONTHLY_MARKER)
	}

	pub fn coordinates(&self) -> Option<(f64, f64)> {
		match (self.latitude, self.longitude) {
			(Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some((lat, lon)),
			_ => None,
		}
	}

	/// Content hash over the fields that change what a listing is worth.
	///
	/// Crawl timestamps and free-text descriptions are excluded so re-crawls of an unchanged unit
	/// keep the same snapshot.
	pub fn compute_snapshot_id(&self) -> String {
		let mut hasher = blake3::Hasher::new();

		hasher.update(&self.listing_id.to_le_bytes());
		hasher.update(self.address.trim().as_bytes());
		hasher.update(b"\0");
		hasher.update(self.sales_type.trim().as_bytes());
		hasher.update(b"\0");
		hasher.update(&self.deposit.to_le_bytes());
		hasher.update(&self.monthly_rent.to_le_bytes());
		hasher.update(&self.management_fee.to_le_bytes());
		hasher.update(&self.area_m2.unwrap_or(-1.0).to_bits().to_le_bytes());
		hasher.update(&self.floor.unwrap_or(i32::MIN).to_le_bytes());
		hasher.update(&self.total_floors.unwrap_or(i32::MIN).to_le_bytes());
		hasher.update(&self.latitude.unwrap_or(f64::NAN).to_bits().to_le_bytes());
		hasher.update(&self.longitude.unwrap_or(f64::NAN).to_bits().to_le_bytes());
		hasher.update(&[u8::from(self.is_banned)]);

		let mut amenities: Vec<&str> =
			self.options.amenities.iter().map(|amenity| amenity.trim()).collect();

		amenities.sort_unstable();

		for amenity in amenities {
			hasher.update(amenity.as_bytes());
			hasher.update(b"\0");
		}

		hasher.update(&[
			u8::from(self.options.built_in_appliances),
			u8::from(self.options.near_university),
			u8::from(self.options.near_transport),
			u8::from(self.options.near_mart),
		]);

		hasher.finalize().to_hex().to_string()
	}

	/// Text the listing embedding is computed from.
	pub fn embedding_text(&self) -> String {
		let mut text = format!(
			"{title}. {sales_type} 보증금 {deposit} 월 {monthly}. 주소 {address}.",
			title = self.title.trim(),
			sales_type = self.sales_type.trim(),
			deposit = self.deposit,
			monthly = self.monthly_cost(),
			address = self.address.trim(),
		);

		if !self.options.amenities.is_empty() {
			text.push_str(" 옵션 ");
			text.push_str(&self.options.amenities.join(", "));
			text.push('.');
		}
		if !self.description.trim().is_empty() {
			text.push(' ');
			text.push_str(self.description.trim());
		}

		text
	}
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ListingOptions {
	pub built_in_appliances: bool,
	pub near_university: bool,
	pub near_transport: bool,
	pub near_mart: bool,
	#[serde(default)]
	pub amenities: Vec<String>,
}
impl ListingOptions {
	pub fn essential_count(&self) -> usize {
		[self.built_in_appliances, self.near_university, self.near_transport, self.near_mart]
			.into_iter()
			.filter(|signal| *signal)
			.count()
	}

	pub fn tracked_amenity_count(&self) -> usize {
		TRACKED_AMENITIES
			.iter()
			.filter(|tracked| self.amenities.iter().any(|amenity| amenity.contains(**tracked)))
			.count()
	}
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceType {
	Jeonse,
	Monthly,
	Mixed,
}
impl PriceType {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Jeonse => "JEONSE",
			Self::Monthly => "MONTHLY",
			Self::Mixed => "MIXED",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw.trim().to_ascii_uppercase().as_str() {
			"JEONSE" => Some(Self::Jeonse),
			"MONTHLY" => Some(Self::Monthly),
			"MIXED" => Some(Self::Mixed),
			_ => None,
		}
	}

	/// Substrings of a listing's sales type that satisfy this price type.
	pub fn sales_type_markers(self) -> &'static [&'static str] {
		match self {
			Self::Jeonse => &[JEONSE_MARKER],
			Self::Monthly => &[MONTHLY_MARKER],
			Self::Mixed => &[JEONSE_MARKER, MONTHLY_MARKER],
		}
	}

	pub fn accepts(self, sales_type: &str) -> bool {
		self.sales_type_markers().iter().any(|marker| sales_type.contains(marker))
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RenterRequest {
	pub request_id: Uuid,
	pub max_deposit: Option<i64>,
	pub max_rent: Option<i64>,
	pub price_type: Option<PriceType>,
	pub preferred_region: Option<String>,
	#[serde(default)]
	pub near_campus: bool,
	pub university: Option<String>,
	#[serde(default)]
	pub desired_amenities: Vec<String>,
	pub notes: Option<String>,
	#[serde(with = "crate::time_serde")]
	pub created_at: OffsetDateTime,
}
impl RenterRequest {
	/// Text the request embedding is computed from.
	pub fn embedding_text(&self) -> String {
		let mut parts = Vec::new();

		if let Some(price_type) = self.price_type {
			parts.push(format!("희망 거래 유형 {}", price_type.as_str()));
		}
		if let Some(max_deposit) = self.max_deposit {
			parts.push(format!("보증금 {max_deposit} 이하"));
		}
		if let Some(max_rent) = self.max_rent {
			parts.push(format!("월세 {max_rent} 이하"));
		}
		if let Some(region) = self.preferred_region.as_deref().map(str::trim)
			&& !region.is_empty()
		{
			parts.push(format!("선호 지역 {region}"));
		}
		if self.near_campus
			&& let Some(university) = self.university.as_deref()
		{
			parts.push(format!("{} 근처", university.trim()));
		}
		if !self.desired_amenities.is_empty() {
			parts.push(format!("필요 옵션 {}", self.desired_amenities.join(", ")));
		}
		if let Some(notes) = self.notes.as_deref().map(str::trim)
			&& !notes.is_empty()
		{
			parts.push(notes.to_string());
		}

		if parts.is_empty() {
			return "학생 자취방".to_string();
		}

		parts.join(". ")
	}
}

#[cfg(test)]
mod tests {
	use crate::listing::{Listing, ListingOptions, PriceType};

	fn listing() -> Listing {
		Listing {
			listing_id: 7,
			title: "신촌역 원룸".to_string(),
			address: "서울특별시 서대문구 창천동 12-3".to_string(),
			sales_type: "월세".to_string(),
			deposit: 1_000,
			monthly_rent: 50,
			management_fee: 5,
			area_m2: Some(19.8),
			floor: Some(3),
			total_floors: Some(5),
			latitude: Some(37.559),
			longitude: Some(126.936),
			region_code: Some("11410".to_string()),
			parcel_id: None,
			is_banned: false,
			description: "채광 좋음".to_string(),
			options: ListingOptions {
				built_in_appliances: true,
				near_university: true,
				near_transport: false,
				near_mart: true,
				amenities: vec!["에어컨".to_string(), "세탁기".to_string()],
			},
			crawled_at: None,
		}
	}

	#[test]
	fn snapshot_ignores_description_and_amenity_order() {
		let base = listing();
		let mut reordered = listing();

		reordered.description = "리모델링 완료".to_string();
		reordered.options.amenities.reverse();

		assert_eq!(base.compute_snapshot_id(), reordered.compute_snapshot_id());
	}

	#[test]
	fn snapshot_changes_with_price() {
		let base = listing();
		let mut cheaper = listing();

		cheaper.monthly_rent = 45;

		assert_ne!(base.compute_snapshot_id(), cheaper.compute_snapshot_id());
	}

	#[test]
	fn monthly_cost_includes_management_fee() {
		assert_eq!(listing().monthly_cost(), 55);
		assert_eq!(listing().move_in_cost(), 1_000);
	}

	#[test]
	fn mixed_price_type_accepts_either_marker() {
		assert!(PriceType::Mixed.accepts("전세"));
		assert!(PriceType::Mixed.accepts("월세"));
		assert!(!PriceType::Jeonse.accepts("월세"));
		assert!(PriceType::Monthly.accepts("전세/월세"));
		assert_eq!(PriceType::parse(" mixed "), Some(PriceType::Mixed));
	}

	#[test]
	fn option_counters_match_tracked_signals() {
		let options = listing().options;

		assert_eq!(options.essential_count(), 3);
		assert_eq!(options.tracked_amenity_count(), 2);
	}
}
