use roost_domain::observation::{RiskAssessment, RiskLevel};

/// Deterministic stand-in for the external risk engine.
///
/// The score is derived from a hash of the address and parcel id, so the same property always gets
/// the same verdict.
pub fn mock_analyze(address: &str, parcel_id: Option<&str>) -> RiskAssessment {
	let mut hasher = blake3::Hasher::new();

	hasher.update(address.trim().as_bytes());
	hasher.update(b"\0");
	hasher.update(parcel_id.unwrap_or_default().trim().as_bytes());

	let hash = hasher.finalize();
	let bytes = hash.as_bytes();
	let score = f64::from(u16::from_le_bytes([bytes[0], bytes[1]]) % 101);
	let level = RiskLevel::from_score(score);
	let reason = match level {
		RiskLevel::Safe => "No registry encumbrances found.",
		RiskLevel::Warn => "Senior liens exceed half of the estimated value.",
		RiskLevel::Danger => "Outstanding seizure or auction record on the parcel.",
	};

	RiskAssessment { score, level, reason: reason.to_string() }
}
