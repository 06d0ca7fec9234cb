pub fn render_schema(vector_dim: u32) -> String {
	let init = include_str!("../../../sql/init.sql");
	let expanded = expand_includes(init);

	expanded.replace("<VECTOR_DIM>", &vector_dim.to_string())
}

fn expand_includes(sql: &str) -> String {
	let mut out = String::new();

	for line in sql.lines() {
		let trimmed = line.trim();

		if let Some(path) = trimmed.strip_prefix("\\ir ") {
			match path.trim() {
				"00_extensions.sql" => out.push_str(include_str!("../../../sql/00_extensions.sql")),
				"tables/001_listings.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_listings.sql")),
				"tables/002_renter_requests.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_renter_requests.sql")),
				"tables/003_feature_observations.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_feature_observations.sql")),
				"tables/004_distance_observations.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_distance_observations.sql")),
				"tables/005_listing_scores.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_listing_scores.sql")),
				"tables/006_listing_embeddings.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_listing_embeddings.sql")),
				"tables/007_request_embeddings.sql" =>
					out.push_str(include_str!("../../../sql/tables/007_request_embeddings.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
