//! Keyword generation through an OpenAI-compatible chat completion.
//!
//! The model must answer with a list of `{ "query": ... }` objects, either as a bare array or
//! under a `queries` key, optionally wrapped in a markdown code fence.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result};
use scour_config::LlmProviderConfig;

#[derive(Debug, Deserialize)]
struct GeneratedQuery {
	query: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeneratedQueries {
	Bare(Vec<GeneratedQuery>),
	Wrapped { queries: Vec<GeneratedQuery> },
}

pub async fn generate_queries(cfg: &LlmProviderConfig, messages: &[Value]) -> Result<Vec<String>> {
	let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;
	let url = format!("{}{}", cfg.api_base, cfg.path);
	let body = serde_json::json!({
		"model": cfg.model,
		"temperature": cfg.temperature,
		"messages": messages,
	});
	let res = client
		.post(url)
		.headers(crate::auth_headers(&cfg.api_key, &cfg.default_headers)?)
		.json(&body)
		.send()
		.await?;
	let json: Value = crate::check_status(res)?.json().await?;
	let content = choice_content(&json)?;

	parse_generated_queries(content)
}

fn choice_content(json: &Value) -> Result<&str> {
	json.get("choices")
		.and_then(Value::as_array)
		.and_then(|choices| choices.first())
		.and_then(|choice| choice.get("message"))
		.and_then(|message| message.get("content"))
		.and_then(Value::as_str)
		.ok_or_else(|| Error::InvalidResponse {
			message: "Planner response is missing choice content.".to_string(),
		})
}

/// Parses generator output into trimmed, non-empty query strings.
///
/// Any other shape is rejected as a whole; no partial list is returned.
pub fn parse_generated_queries(content: &str) -> Result<Vec<String>> {
	let body = strip_code_fence(content);
	let parsed: GeneratedQueries = serde_json::from_str(body).map_err(|err| {
		Error::InvalidResponse { message: format!("Planner output is not a query list: {err}.") }
	})?;
	let items = match parsed {
		GeneratedQueries::Bare(items) => items,
		GeneratedQueries::Wrapped { queries } => queries,
	};

	Ok(items
		.into_iter()
		.map(|item| item.query.trim().to_string())
		.filter(|query| !query.is_empty())
		.collect())
}

fn strip_code_fence(content: &str) -> &str {
	let trimmed = content.trim();
	let Some(rest) = trimmed.strip_prefix("```") else {
		return trimmed;
	};
	let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);

	rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn accepts_bare_and_wrapped_lists() {
		let bare = r#"[{"query":"AI regulation"},{"query":" EU AI Act "}]"#;
		let wrapped = r#"{"queries":[{"query":"AI regulation"},{"query":"EU AI Act"}]}"#;

		assert_eq!(
			parse_generated_queries(bare).expect("Bare list must parse."),
			vec!["AI regulation", "EU AI Act"]
		);
		assert_eq!(
			parse_generated_queries(wrapped).expect("Wrapped list must parse."),
			vec!["AI regulation", "EU AI Act"]
		);
	}

	#[test]
	fn accepts_fenced_output() {
		let fenced = "```json\n[{\"query\":\"chip exports\"}]\n```";

		assert_eq!(
			parse_generated_queries(fenced).expect("Fenced list must parse."),
			vec!["chip exports"]
		);
	}

	#[test]
	fn rejects_other_shapes() {
		for content in ["not json", r#"{"items":[]}"#, r#"[{"keyword":"x"}]"#, r#"["x"]"#] {
			assert!(
				matches!(parse_generated_queries(content), Err(Error::InvalidResponse { .. })),
				"Expected rejection for {content}"
			);
		}
	}

	#[test]
	fn reads_first_choice_content() {
		let json = serde_json::json!({
			"choices": [{ "message": { "content": "[]" } }]
		});

		assert_eq!(choice_content(&json).expect("Content must be present."), "[]");
		assert!(choice_content(&serde_json::json!({})).is_err());
	}
}
