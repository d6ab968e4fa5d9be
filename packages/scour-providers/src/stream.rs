//! Streaming calls to the external search workflow.
//!
//! The workflow answers one POST with a line-delimited stream. Lines beginning with `event:` or
//! `id:` are control frames. Lines containing `data:` carry a JSON payload that may itself be a
//! JSON document encoded as a string, either directly or in a `content` field. Payloads with only
//! a `debug_url`, or with an `error_code`, carry no data. Usable payloads hold an `output` list
//! whose items carry `post` objects or `posts` arrays, directly or in a nested object field.

use std::{
	sync::Arc,
	time::{Duration, Instant},
};

use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result, token::AccessTokenProvider};
use scour_config::SearchProviderConfig;
use scour_domain::post::{self, Post, PostBatch};

const MAX_PAYLOAD_DEPTH: usize = 3;
const MAX_LINE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormattedResponse {
	pub posts: Vec<Post>,
	pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
	pub total_count: usize,
	pub newest_id: Option<String>,
	pub oldest_id: Option<String>,
	pub processing_time_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
	Control,
	Data(Value),
	Malformed(String),
	Ignored,
}

#[derive(Debug)]
pub struct StreamClient {
	client: Client,
	url: String,
	user: String,
	api_key: Option<String>,
	default_headers: Map<String, Value>,
	token: Option<Arc<AccessTokenProvider>>,
}
impl StreamClient {
	/// Builds a client from configuration, creating a token provider when a token endpoint is
	/// configured.
	pub fn new(cfg: &SearchProviderConfig) -> Result<Self> {
		let token = cfg.token.as_ref().map(AccessTokenProvider::new).transpose()?.map(Arc::new);

		Self::with_token_provider(cfg, token)
	}

	pub fn with_token_provider(
		cfg: &SearchProviderConfig,
		token: Option<Arc<AccessTokenProvider>>,
	) -> Result<Self> {
		let api_key = cfg.api_key.clone().filter(|key| !key.trim().is_empty());

		if api_key.is_none() && token.is_none() {
			return Err(Error::InvalidConfig {
				message: "Search provider requires either api_key or a token endpoint."
					.to_string(),
			});
		}

		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self {
			client,
			url: format!("{}{}", cfg.api_base, cfg.path),
			user: cfg.user.clone(),
			api_key,
			default_headers: cfg.default_headers.clone(),
			token,
		})
	}

	pub async fn run(&self, query: &str) -> Result<FormattedResponse> {
		let started = Instant::now();
		let bearer = match self.token.as_ref() {
			Some(provider) => provider.token().await?,
			None => self.api_key.clone().unwrap_or_default(),
		};
		let body = serde_json::json!({
			"inputs": { "query": query },
			"response_mode": "streaming",
			"user": self.user,
		});
		let res = self
			.client
			.post(&self.url)
			.headers(crate::auth_headers(&bearer, &self.default_headers)?)
			.json(&body)
			.send()
			.await?;

		if res.status() == reqwest::StatusCode::UNAUTHORIZED
			&& let Some(provider) = self.token.as_ref()
		{
			provider.invalidate().await;
		}

		let mut stream = crate::check_status(res)?.bytes_stream();
		let mut lines = LineBuffer::new(MAX_LINE_BYTES);
		let mut batch = PostBatch::new();

		while let Some(chunk) = stream.next().await {
			let chunk = chunk?;

			for line in lines.push(&chunk) {
				absorb_frame(parse_frame(&line), &mut batch);
			}
		}

		if let Some(line) = lines.finish() {
			absorb_frame(parse_frame(&line), &mut batch);
		}

		let metadata = ResponseMetadata {
			total_count: batch.len(),
			newest_id: batch.newest_id().map(str::to_string),
			oldest_id: batch.oldest_id().map(str::to_string),
			processing_time_ms: started.elapsed().as_millis() as u64,
		};

		tracing::debug!(
			query,
			total_count = metadata.total_count,
			processing_time_ms = metadata.processing_time_ms,
			"Search workflow stream finished."
		);

		Ok(FormattedResponse { posts: batch.into_posts(), metadata })
	}
}

/// Splits a byte stream into lines. Partial lines are held until their newline arrives.
///
/// Lines longer than `max_line` bytes are dropped with a warning, including the part that is
/// still arriving.
#[derive(Debug)]
struct LineBuffer {
	pending: Vec<u8>,
	scanned: usize,
	discarding: bool,
	max_line: usize,
}
impl LineBuffer {
	fn new(max_line: usize) -> Self {
		Self { pending: Vec::new(), scanned: 0, discarding: false, max_line }
	}

	fn push(&mut self, chunk: &[u8]) -> Vec<String> {
		self.pending.extend_from_slice(chunk);

		let mut out = Vec::new();

		while let Some(offset) = find_newline(&self.pending[self.scanned..]) {
			let end = self.scanned + offset;
			let line: Vec<u8> = self.pending.drain(..=end).collect();

			self.scanned = 0;

			if std::mem::take(&mut self.discarding) {
				continue;
			}
			if line.len() > self.max_line {
				tracing::warn!(
					len = line.len(),
					max = self.max_line,
					"Dropped an oversized frame."
				);

				continue;
			}

			out.push(String::from_utf8_lossy(&line).trim_end_matches(['\r', '\n']).to_string());
		}

		self.scanned = self.pending.len();

		if self.pending.len() > self.max_line {
			if !self.discarding {
				tracing::warn!(
					len = self.pending.len(),
					max = self.max_line,
					"Dropping an oversized frame."
				);
			}

			self.pending.clear();
			self.scanned = 0;
			self.discarding = true;
		}

		out
	}

	fn finish(&mut self) -> Option<String> {
		if std::mem::take(&mut self.discarding) || self.pending.is_empty() {
			self.pending.clear();
			self.scanned = 0;

			return None;
		}

		let line = String::from_utf8_lossy(&self.pending).trim_end_matches('\r').to_string();

		self.pending.clear();
		self.scanned = 0;

		Some(line)
	}
}

fn find_newline(bytes: &[u8]) -> Option<usize> {
	bytes.iter().position(|byte| *byte == b'\n')
}

pub fn parse_frame(line: &str) -> Frame {
	let trimmed = line.trim();

	if trimmed.is_empty() {
		return Frame::Ignored;
	}
	if trimmed.starts_with("event:") || trimmed.starts_with("id:") {
		return Frame::Control;
	}

	let Some(pos) = trimmed.find("data:") else {
		return Frame::Ignored;
	};
	let payload = trimmed[pos + "data:".len()..].trim();

	match serde_json::from_str::<Value>(payload) {
		Ok(value) => Frame::Data(value),
		Err(err) => Frame::Malformed(err.to_string()),
	}
}

/// Decodes string-encoded payloads and `content` wrappers until a JSON document remains.
pub fn unwrap_payload(mut value: Value) -> Value {
	for _ in 0..MAX_PAYLOAD_DEPTH {
		let inner = match &value {
			Value::String(raw) => serde_json::from_str::<Value>(raw).ok(),
			Value::Object(map) => map
				.get("content")
				.and_then(Value::as_str)
				.and_then(|raw| serde_json::from_str::<Value>(raw).ok()),
			_ => None,
		};

		match inner {
			Some(inner) => value = inner,
			None => break,
		}
	}

	value
}

/// True when the payload is a diagnostic envelope with nothing to extract.
pub fn is_unusable(payload: &Value) -> bool {
	let Some(map) = payload.as_object() else {
		return !payload.is_array();
	};

	if map.get("error_code").map(|code| !code.is_null()).unwrap_or(false) {
		return true;
	}

	map.contains_key("debug_url") && map.keys().all(|key| key == "debug_url")
}

/// Raw post records carried by a usable payload, in arrival order.
pub fn extract_raw_posts(payload: &Value) -> Vec<&Value> {
	let mut out = Vec::new();
	let Some(items) = find_output(payload) else {
		return out;
	};

	for item in items {
		if collect_carried(item, &mut out) {
			continue;
		}

		let Some(map) = item.as_object() else {
			continue;
		};

		for nested in map.values().filter(|value| value.is_object()) {
			collect_carried(nested, &mut out);
		}
	}

	out
}

fn find_output(payload: &Value) -> Option<&Vec<Value>> {
	if let Some(items) = payload.as_array() {
		return Some(items);
	}

	[
		payload.get("output"),
		payload.get("data").and_then(|data| data.get("output")),
		payload.get("outputs").and_then(|outputs| outputs.get("output")),
		payload
			.get("data")
			.and_then(|data| data.get("outputs"))
			.and_then(|outputs| outputs.get("output")),
	]
	.into_iter()
	.flatten()
	.find_map(Value::as_array)
}

fn collect_carried<'a>(value: &'a Value, out: &mut Vec<&'a Value>) -> bool {
	let mut found = false;

	if let Some(post) = value.get("post").filter(|post| post.is_object()) {
		out.push(post);

		found = true;
	}
	if let Some(posts) = value.get("posts").and_then(Value::as_array) {
		out.extend(posts.iter().filter(|post| post.is_object()));

		found = true;
	}

	found
}

fn absorb_frame(frame: Frame, batch: &mut PostBatch) {
	let payload = match frame {
		Frame::Data(value) => unwrap_payload(value),
		Frame::Malformed(error) => {
			tracing::warn!(error = %error, "Skipping malformed stream frame.");

			return;
		},
		Frame::Control | Frame::Ignored => return,
	};

	if is_unusable(&payload) {
		tracing::debug!("Skipping stream frame without usable data.");

		return;
	}

	for raw in extract_raw_posts(&payload) {
		match post::normalize(raw) {
			Ok(post) => {
				batch.push(post);
			},
			Err(reject) => {
				tracing::warn!(reason = ?reject, "Skipping post that failed normalization.");
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn control_and_data_frames_are_classified() {
		assert_eq!(parse_frame("event: workflow_started"), Frame::Control);
		assert_eq!(parse_frame("id: 42"), Frame::Control);
		assert_eq!(parse_frame(": keep-alive"), Frame::Ignored);
		assert_eq!(parse_frame("data: {\"a\":1}"), Frame::Data(json!({ "a": 1 })));
		assert!(matches!(parse_frame("data: {broken"), Frame::Malformed(_)));
	}

	#[test]
	fn double_encoded_payloads_are_unwrapped() {
		let inner = json!({ "output": [{ "post": { "id": "1" } }] });
		let as_string = Value::String(inner.to_string());
		let as_content = json!({ "content": inner.to_string() });

		assert_eq!(unwrap_payload(as_string), inner);
		assert_eq!(unwrap_payload(as_content), inner);
	}

	#[test]
	fn debug_url_and_error_code_payloads_are_unusable() {
		assert!(is_unusable(&json!({ "debug_url": "https://trace.example/1" })));
		assert!(is_unusable(&json!({ "error_code": "E42", "output": [] })));
		assert!(!is_unusable(&json!({ "debug_url": "https://trace.example/1", "output": [] })));
		assert!(!is_unusable(&json!({ "output": [] })));
	}

	#[test]
	fn posts_are_found_directly_and_in_nested_fields() {
		let payload = json!({
			"output": [
				{ "post": { "id": "1" } },
				{ "posts": [{ "id": "2" }, { "id": "3" }] },
				{ "result": { "post": { "id": "4" } } },
				{ "unrelated": true }
			]
		});
		let ids: Vec<&str> = extract_raw_posts(&payload)
			.into_iter()
			.filter_map(|raw| raw.get("id").and_then(Value::as_str))
			.collect();

		assert_eq!(ids, vec!["1", "2", "3", "4"]);
	}

	#[test]
	fn line_buffer_holds_partial_lines() {
		let mut lines = LineBuffer::new(MAX_LINE_BYTES);

		assert!(lines.push(b"data: {\"a\"").is_empty());
		assert_eq!(lines.push(b":1}\r\nevent: x\n"), vec!["data: {\"a\":1}", "event: x"]);
		assert_eq!(lines.push(b"data: tail"), Vec::<String>::new());
		assert_eq!(lines.finish(), Some("data: tail".to_string()));
		assert_eq!(lines.finish(), None);
	}

	#[test]
	fn oversized_lines_are_dropped_and_the_stream_recovers() {
		let mut lines = LineBuffer::new(16);

		assert!(lines.push(b"data: 0123456789").is_empty());
		assert!(lines.push(b"abcdef").is_empty());
		assert!(lines.push(b"ghij").is_empty());
		assert_eq!(lines.push(b"klm\ndata: {}\n"), vec!["data: {}"]);
		assert_eq!(lines.push(b"data: 0123456789abcdef\nid: 1\n"), vec!["id: 1"]);
		assert!(lines.push(b"data: 0123456789abcdef").is_empty());
		assert_eq!(lines.finish(), None);
	}

	#[test]
	fn frames_feed_a_deduplicated_batch() {
		let mut batch = PostBatch::new();

		for line in [
			"event: message",
			r#"data: {"debug_url":"https://trace.example/1"}"#,
			r#"data: {"output":[{"posts":[{"id":"100","text":"a"},{"id":"99","text":"b"}]}]}"#,
			r#"data: {"output":[{"post":{"id":"100","text":"dup"}}]}"#,
			"data: not json",
		] {
			absorb_frame(parse_frame(line), &mut batch);
		}

		assert_eq!(batch.len(), 2);
		assert_eq!(batch.newest_id(), Some("100"));
		assert_eq!(batch.oldest_id(), Some("99"));

		let posts = batch.into_posts();

		assert_eq!(posts[0].text, "a");
	}
}
