pub mod db;
pub mod memory;
pub mod models;
pub mod pg;
pub mod queries;
pub mod schema;
pub mod store;

mod error;

pub use error::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Renders a vector as pgvector text, e.g. `[0.1,0.2]`.
pub fn vector_to_pg(vec: &[f32]) -> String {
	let mut out = String::with_capacity(vec.len() * 8);

	out.push('[');

	for (i, value) in vec.iter().enumerate() {
		if i > 0 {
			out.push(',');
		}

		out.push_str(&value.to_string());
	}

	out.push(']');

	out
}

pub fn parse_pg_vector(text: &str) -> Result<Vec<f32>> {
	let trimmed = text.trim();
	let without_brackets = trimmed
		.strip_prefix('[')
		.and_then(|s| s.strip_suffix(']'))
		.ok_or_else(|| Error::InvalidArgument("Vector text is not bracketed.".to_string()))?;

	if without_brackets.trim().is_empty() {
		return Ok(Vec::new());
	}

	without_brackets
		.split(',')
		.map(|part| {
			part.trim().parse::<f32>().map_err(|_| {
				Error::InvalidArgument("Vector text contains a non-numeric value.".to_string())
			})
		})
		.collect()
}

/// `1 - cos(a, b)`, matching pgvector's `<=>`. Zero-length vectors are maximally distant.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
	let mut dot = 0.0_f64;
	let mut norm_a = 0.0_f64;
	let mut norm_b = 0.0_f64;

	for (x, y) in a.iter().zip(b) {
		let (x, y) = (f64::from(*x), f64::from(*y));

		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a <= 0.0 || norm_b <= 0.0 {
		return 1.0;
	}

	1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
	use crate::{cosine_distance, parse_pg_vector, vector_to_pg};

	#[test]
	fn pg_vector_text_round_trips() {
		let text = vector_to_pg(&[0.5, -1.0, 2.25]);

		assert_eq!(text, "[0.5,-1,2.25]");
		assert_eq!(parse_pg_vector(&text).expect("Expected vector."), vec![0.5, -1.0, 2.25]);
		assert!(parse_pg_vector("0.5,1").is_err());
		assert!(parse_pg_vector("[]").expect("Expected empty vector.").is_empty());
	}

	#[test]
	fn cosine_distance_matches_direction() {
		assert!(cosine_distance(&[1.0, 0.0], &[2.0, 0.0]).abs() < 1e-12);
		assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-12);
		assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-12);
		assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
	}
}
