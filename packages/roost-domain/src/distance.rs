use std::{fs, path::Path};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{listing::Listing, observation::DistanceSummary, population};

pub const EARTH_RADIUS_KM: f64 = 6_371.0;
pub const WALKING_SPEED_KMH: f64 = 5.0;

// (minutes, score) knots of the walking-time decay curve.
const NONLINEAR_KNOTS: [(f64, f64); 4] = [(0.0, 1.0), (20.0, 0.8), (30.0, 0.6), (40.0, 0.3)];

pub type Result<T, E = DistanceError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum DistanceError {
	#[error("Listing {listing_id} has no usable coordinates.")]
	MissingCoordinates { listing_id: i64 },
	#[error("Failed to read reference catalog at {path}.")]
	ReadCatalog {
		path: String,
		#[source]
		source: std::io::Error,
	},
	#[error("Failed to parse reference catalog at {path}.")]
	ParseCatalog {
		path: String,
		#[source]
		source: serde_json::Error,
	},
	#[error("Reference location {id} has invalid coordinates.")]
	InvalidReference { id: i64 },
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ReferenceLocation {
	pub id: i64,
	pub name: String,
	pub latitude: f64,
	pub longitude: f64,
}

/// Fixed set of universities every listing is measured against.
#[derive(Clone, Debug, Default)]
pub struct ReferenceCatalog {
	locations: Vec<ReferenceLocation>,
}
impl ReferenceCatalog {
	pub fn new(locations: Vec<ReferenceLocation>) -> Result<Self> {
		for location in &locations {
			if !location.latitude.is_finite()
				|| !location.longitude.is_finite()
				|| !(-90.0..=90.0).contains(&location.latitude)
				|| !(-180.0..=180.0).contains(&location.longitude)
			{
				return Err(DistanceError::InvalidReference { id: location.id });
			}
		}

		Ok(Self { locations })
	}

	pub fn from_json_path(path: &Path) -> Result<Self> {
		let raw = fs::read_to_string(path).map_err(|source| DistanceError::ReadCatalog {
			path: path.display().to_string(),
			source,
		})?;
		let locations: Vec<ReferenceLocation> =
			serde_json::from_str(&raw).map_err(|source| DistanceError::ParseCatalog {
				path: path.display().to_string(),
				source,
			})?;

		Self::new(locations)
	}

	pub fn locations(&self) -> &[ReferenceLocation] {
		&self.locations
	}

	pub fn len(&self) -> usize {
		self.locations.len()
	}

	pub fn is_empty(&self) -> bool {
		self.locations.is_empty()
	}

	pub fn get(&self, id: i64) -> Option<&ReferenceLocation> {
		self.locations.iter().find(|location| location.id == id)
	}

	/// Resolves a university name: exact match first, then the first location whose name contains
	/// the query or is contained by it.
	pub fn resolve(&self, name: &str) -> Option<&ReferenceLocation> {
		let query = name.trim();

		if query.is_empty() {
			return None;
		}

		self.locations.iter().find(|location| location.name == query).or_else(|| {
			self.locations
				.iter()
				.find(|location| location.name.contains(query) || query.contains(&location.name))
		})
	}
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum DistanceBucket {
	#[serde(rename = "0-10")]
	Under10,
	#[serde(rename = "10-20")]
	From10To20,
	#[serde(rename = "20-30")]
	From20To30,
	#[serde(rename = "30-40")]
	From30To40,
	#[serde(rename = "40+")]
	Over40,
}
impl DistanceBucket {
	pub fn from_minutes(minutes: f64) -> Self {
		if minutes < 10.0 {
			Self::Under10
		} else if minutes < 20.0 {
			Self::From10To20
		} else if minutes < 30.0 {
			Self::From20To30
		} else if minutes < 40.0 {
			Self::From30To40
		} else {
			Self::Over40
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Under10 => "0-10",
			Self::From10To20 => "10-20",
			Self::From20To30 => "20-30",
			Self::From30To40 => "30-40",
			Self::Over40 => "40+",
		}
	}

	pub fn parse(raw: &str) -> Option<Self> {
		match raw {
			"0-10" => Some(Self::Under10),
			"10-20" => Some(Self::From10To20),
			"20-30" => Some(Self::From20To30),
			"30-40" => Some(Self::From30To40),
			"40+" => Some(Self::Over40),
			_ => None,
		}
	}
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct DistanceObservation {
	pub listing_id: i64,
	pub reference_location_id: i64,
	pub minutes: f64,
	/// Rank of this pair within the listing's own fan-out.
	pub percentile: f64,
	pub bucket: DistanceBucket,
	pub nonlinear_score: f64,
	#[serde(with = "crate::time_serde")]
	pub calculated_at: OffsetDateTime,
}
impl DistanceObservation {
	pub fn summary(&self) -> DistanceSummary {
		DistanceSummary {
			reference_location_id: self.reference_location_id,
			minutes: self.minutes,
			percentile: self.percentile,
			nonlinear_score: self.nonlinear_score,
		}
	}
}

/// Measures `listing` against every location in `catalog`.
///
/// The whole matrix is returned so callers can replace the listing's rows in one write.
pub fn compute_all(
	listing: &Listing,
	catalog: &ReferenceCatalog,
	now: OffsetDateTime,
) -> Result<Vec<DistanceObservation>> {
	let Some((lat, lon)) = listing.coordinates() else {
		return Err(DistanceError::MissingCoordinates { listing_id: listing.listing_id });
	};
	let minutes: Vec<f64> = catalog
		.locations()
		.iter()
		.map(|location| {
			walking_minutes(haversine_km(lat, lon, location.latitude, location.longitude))
		})
		.collect();

	Ok(catalog
		.locations()
		.iter()
		.zip(&minutes)
		.map(|(location, minutes_to)| DistanceObservation {
			listing_id: listing.listing_id,
			reference_location_id: location.id,
			minutes: *minutes_to,
			percentile: population::percentile(&minutes, *minutes_to),
			bucket: DistanceBucket::from_minutes(*minutes_to),
			nonlinear_score: nonlinear_distance_score(*minutes_to),
			calculated_at: now,
		})
		.collect())
}

/// The closest reference location in a fan-out result.
pub fn nearest(observations: &[DistanceObservation]) -> Option<&DistanceObservation> {
	observations.iter().min_by(|a, b| a.minutes.total_cmp(&b.minutes))
}

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
	let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
	let d_phi = (lat2 - lat1).to_radians();
	let d_lambda = (lon2 - lon1).to_radians();
	let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);

	2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

pub fn walking_minutes(km: f64) -> f64 {
	km / WALKING_SPEED_KMH * 60.0
}

/// Piecewise-linear decay: 1.0 at 0 min, 0.8 at 20, 0.6 at 30, 0.3 from 40 on.
pub fn nonlinear_distance_score(minutes: f64) -> f64 {
	if !minutes.is_finite() {
		return NONLINEAR_KNOTS[NONLINEAR_KNOTS.len() - 1].1;
	}

	let minutes = minutes.max(0.0);

	for pair in NONLINEAR_KNOTS.windows(2) {
		let ((x0, y0), (x1, y1)) = (pair[0], pair[1]);

		if minutes <= x1 {
			return y0 + (y1 - y0) * (minutes - x0) / (x1 - x0);
		}
	}

	NONLINEAR_KNOTS[NONLINEAR_KNOTS.len() - 1].1
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use crate::{
		distance::{
			self, DistanceBucket, DistanceError, ReferenceCatalog, ReferenceLocation, compute_all,
		},
		listing::{Listing, ListingOptions},
	};

	fn catalog() -> ReferenceCatalog {
		ReferenceCatalog::new(vec![
			ReferenceLocation {
				id: 1,
				name: "연세대학교".to_string(),
				latitude: 37.5658,
				longitude: 126.9386,
			},
			ReferenceLocation {
				id: 2,
				name: "서울대학교".to_string(),
				latitude: 37.4600,
				longitude: 126.9519,
			},
			ReferenceLocation {
				id: 3,
				name: "홍익대학교".to_string(),
				latitude: 37.5509,
				longitude: 126.9250,
			},
		])
		.expect("Expected valid catalog.")
	}

	fn listing(latitude: Option<f64>) -> Listing {
		Listing {
			listing_id: 11,
			title: String::new(),
			address: "서울특별시 서대문구 창천동".to_string(),
			sales_type: "월세".to_string(),
			deposit: 500,
			monthly_rent: 50,
			management_fee: 5,
			area_m2: None,
			floor: None,
			total_floors: None,
			latitude,
			longitude: Some(126.9370),
			region_code: None,
			parcel_id: None,
			is_banned: false,
			description: String::new(),
			options: ListingOptions::default(),
			crawled_at: None,
		}
	}

	#[test]
	fn nonlinear_score_hits_every_knot() {
		assert_eq!(distance::nonlinear_distance_score(0.0), 1.0);
		assert!((distance::nonlinear_distance_score(20.0) - 0.8).abs() < 1e-12);
		assert!((distance::nonlinear_distance_score(30.0) - 0.6).abs() < 1e-12);
		assert!((distance::nonlinear_distance_score(40.0) - 0.3).abs() < 1e-12);
		assert!((distance::nonlinear_distance_score(95.0) - 0.3).abs() < 1e-12);
		assert!((distance::nonlinear_distance_score(10.0) - 0.9).abs() < 1e-12);
		assert!((distance::nonlinear_distance_score(35.0) - 0.45).abs() < 1e-12);
	}

	#[test]
	fn buckets_split_on_ten_minute_bounds() {
		assert_eq!(DistanceBucket::from_minutes(9.9), DistanceBucket::Under10);
		assert_eq!(DistanceBucket::from_minutes(10.0), DistanceBucket::From10To20);
		assert_eq!(DistanceBucket::from_minutes(39.0), DistanceBucket::From30To40);
		assert_eq!(DistanceBucket::from_minutes(40.0), DistanceBucket::Over40);
		assert_eq!(DistanceBucket::parse("40+"), Some(DistanceBucket::Over40));
	}

	#[test]
	fn walking_minutes_use_five_kmh() {
		assert!((distance::walking_minutes(5.0) - 60.0).abs() < 1e-12);

		// One degree of latitude is about 111.2 km.
		let km = distance::haversine_km(37.0, 127.0, 38.0, 127.0);

		assert!((km - 111.19).abs() < 0.1, "Unexpected distance: {km}");
	}

	#[test]
	fn fan_out_covers_every_reference_with_ranked_percentiles() {
		let rows = compute_all(&listing(Some(37.5590)), &catalog(), datetime!(2026-03-01 00:00 UTC))
			.expect("Expected fan-out.");

		assert_eq!(rows.len(), 3);

		let nearest = distance::nearest(&rows).expect("Expected nearest row.");

		assert_eq!(nearest.reference_location_id, 1);
		assert!((nearest.percentile - 1.0 / 3.0).abs() < 1e-9);

		let farthest = rows
			.iter()
			.max_by(|a, b| a.minutes.total_cmp(&b.minutes))
			.expect("Expected farthest row.");

		assert_eq!(farthest.reference_location_id, 2);
		assert_eq!(farthest.percentile, 1.0);
		assert_eq!(farthest.bucket, DistanceBucket::Over40);
	}

	#[test]
	fn fan_out_requires_coordinates() {
		let err = compute_all(&listing(None), &catalog(), datetime!(2026-03-01 00:00 UTC))
			.expect_err("Expected missing coordinates.");

		assert!(matches!(err, DistanceError::MissingCoordinates { listing_id: 11 }));
	}

	#[test]
	fn resolve_prefers_exact_then_substring() {
		let catalog = catalog();

		assert_eq!(catalog.resolve("서울대학교").map(|location| location.id), Some(2));
		assert_eq!(catalog.resolve("홍익대").map(|location| location.id), Some(3));
		assert!(catalog.resolve("  ").is_none());
		assert!(catalog.resolve("카이스트").is_none());
	}
}
