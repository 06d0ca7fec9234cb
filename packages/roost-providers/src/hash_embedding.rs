//! Offline embedder: signed feature hashing of whitespace tokens into a fixed-size vector.
//!
//! Texts that share tokens land close together under cosine distance, which is enough to exercise
//! nearest-neighbour search without a model.

pub fn embed(texts: &[String], dimensions: usize) -> Vec<Vec<f32>> {
	texts.iter().map(|text| embed_one(text, dimensions)).collect()
}

pub fn embed_one(text: &str, dimensions: usize) -> Vec<f32> {
	let mut vec = vec![0.0_f32; dimensions];

	if dimensions == 0 {
		return vec;
	}

	for token in text.split_whitespace() {
		let token = token.trim_matches(|c: char| c.is_ascii_punctuation()).to_lowercase();

		if token.is_empty() {
			continue;
		}

		let hash = blake3::hash(token.as_bytes());
		let bytes = hash.as_bytes();
		let mut index_bytes = [0_u8; 8];

		index_bytes.copy_from_slice(&bytes[..8]);

		let index = (u64::from_le_bytes(index_bytes) % dimensions as u64) as usize;
		let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };

		vec[index] += sign;
	}

	let norm = vec.iter().map(|value| value * value).sum::<f32>().sqrt();

	if norm <= f32::EPSILON {
		// Empty input still needs a unit vector so cosine distance stays defined.
		vec[0] = 1.0;

		return vec;
	}

	for value in &mut vec {
		*value /= norm;
	}

	vec
}

#[cfg(test)]
mod tests {
	use crate::hash_embedding;

	fn cosine(a: &[f32], b: &[f32]) -> f32 {
		a.iter().zip(b).map(|(x, y)| x * y).sum()
	}

	#[test]
	fn vectors_are_unit_length_and_deterministic() {
		let texts = vec!["관악구 원룸 월세".to_string(), String::new()];
		let first = hash_embedding::embed(&texts, 64);
		let second = hash_embedding::embed(&texts, 64);

		assert_eq!(first, second);

		for vec in &first {
			assert_eq!(vec.len(), 64);
			assert!((cosine(vec, vec) - 1.0).abs() < 1e-5);
		}
	}

	#[test]
	fn shared_tokens_raise_similarity() {
		let query = hash_embedding::embed_one("관악구 원룸 에어컨 세탁기", 256);
		let close = hash_embedding::embed_one("관악구 원룸 에어컨", 256);
		let far = hash_embedding::embed_one("마포구 투룸 주차", 256);

		assert!(cosine(&query, &close) > cosine(&query, &far));
	}
}
