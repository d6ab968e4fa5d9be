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
				"tables/001_sessions.sql" =>
					out.push_str(include_str!("../../../sql/tables/001_sessions.sql")),
				"tables/002_messages.sql" =>
					out.push_str(include_str!("../../../sql/tables/002_messages.sql")),
				"tables/003_sub_queries.sql" =>
					out.push_str(include_str!("../../../sql/tables/003_sub_queries.sql")),
				"tables/004_search_results.sql" =>
					out.push_str(include_str!("../../../sql/tables/004_search_results.sql")),
				"tables/005_result_message_links.sql" =>
					out.push_str(include_str!("../../../sql/tables/005_result_message_links.sql")),
				"tables/006_result_outbox.sql" =>
					out.push_str(include_str!("../../../sql/tables/006_result_outbox.sql")),
				_ => out.push_str(line),
			}
		} else {
			out.push_str(line);
		}

		out.push('\n');
	}

	out
}
