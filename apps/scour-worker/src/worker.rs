use std::time::Duration as StdDuration;

use time::{Duration, OffsetDateTime};
use tokio::time as tokio_time;

use crate::{Error, Result};
use scour_config::EmbeddingProviderConfig;
use scour_domain::{
	post::{Post, ResultPayload},
	session::SessionStatus,
};
use scour_providers::embedding;
use scour_storage::{
	db::Db,
	models::{NewSearchResult, ResultOutboxEntry},
	outbox, results, sessions,
};

const POLL_INTERVAL_MS: i64 = 500;
const CLAIM_LEASE_SECONDS: i64 = 30;
const BASE_BACKOFF_MS: i64 = 500;
const MAX_BACKOFF_MS: i64 = 30_000;
const MAX_OUTBOX_ERROR_CHARS: usize = 1_024;

pub struct WorkerState {
	pub db: Db,
	pub embedding: EmbeddingProviderConfig,
	pub notify_channel: String,
}

pub async fn run_worker(state: WorkerState) -> color_eyre::Result<()> {
	tracing::info!(channel = %state.notify_channel, "Result indexer started.");

	loop {
		if let Err(err) = process_result_outbox_once(&state).await {
			tracing::error!(error = %err, "Result outbox processing failed.");
		}

		tokio_time::sleep(to_std_duration(Duration::milliseconds(POLL_INTERVAL_MS))).await;
	}
}

async fn process_result_outbox_once(state: &WorkerState) -> Result<()> {
	let now = OffsetDateTime::now_utc();
	let job = outbox::claim_next_result_outbox_job(&state.db, now, CLAIM_LEASE_SECONDS).await?;
	let Some(job) = job else {
		return Ok(());
	};

	match index_job(state, &job).await {
		Ok(count) => {
			let now = OffsetDateTime::now_utc();

			outbox::mark_result_outbox_done(&state.db.pool, job.outbox_id, now).await?;

			tracing::info!(
				outbox_id = %job.outbox_id,
				session_id = %job.session_id,
				results = count,
				"Indexed session results."
			);
		},
		Err(err) => {
			mark_failed(&state.db, &job, &err).await?;

			tracing::error!(
				error = %err,
				outbox_id = %job.outbox_id,
				session_id = %job.session_id,
				"Result outbox job failed."
			);
		},
	}

	Ok(())
}

/// Embeds and upserts every post of the job, then moves the session to `results_saved` and
/// announces it. The announcement is delivered when the transaction commits.
async fn index_job(state: &WorkerState, job: &ResultOutboxEntry) -> Result<usize> {
	let payload: ResultPayload = serde_json::from_value(job.payload.clone())?;
	let mut records = payload.posts.iter().map(build_result).collect::<Result<Vec<_>>>()?;
	let texts: Vec<String> = records.iter().map(embedding_text).collect();
	let vectors = embedding::embed(&state.embedding, &texts).await?;

	if vectors.len() != records.len() {
		return Err(Error::Validation(format!(
			"Embedding provider returned {} vectors for {} posts.",
			vectors.len(),
			records.len()
		)));
	}

	let dim = state.embedding.dimensions as usize;

	for (record, vector) in records.iter_mut().zip(vectors) {
		if vector.len() != dim {
			return Err(Error::Validation(format!(
				"Embedding dimension mismatch for post {}: expected {dim}, got {}.",
				record.external_id,
				vector.len()
			)));
		}

		record.embedding = Some(vector);
	}

	let now = OffsetDateTime::now_utc();
	let mut tx = state.db.pool.begin().await?;

	for record in &records {
		results::upsert_search_result(&mut *tx, record, now).await?;
	}

	let advanced =
		sessions::advance_status(&mut *tx, job.session_id, SessionStatus::ResultsSaved, now)
			.await?;

	if !advanced {
		tracing::debug!(session_id = %job.session_id, "Session was already past results_saved.");
	}

	sessions::notify_status(&mut *tx, &state.notify_channel, job.session_id).await?;
	tx.commit().await?;

	Ok(records.len())
}

fn build_result(post: &Post) -> Result<NewSearchResult> {
	Ok(NewSearchResult {
		external_id: post.id.clone(),
		content: post.text.clone(),
		source_title: post.source_title(),
		source_url: post.url(),
		metadata: serde_json::to_value(post)?,
		embedding: None,
	})
}

/// Posts with no text are embedded by their title so every result gets a vector.
fn embedding_text(record: &NewSearchResult) -> String {
	if record.content.trim().is_empty() {
		record.source_title.clone()
	} else {
		record.content.clone()
	}
}

async fn mark_failed(db: &Db, job: &ResultOutboxEntry, err: &Error) -> Result<()> {
	let now = OffsetDateTime::now_utc();
	let attempts = job.attempts.saturating_add(1);
	let available_at = now + backoff_for_attempt(attempts);
	let error_text = sanitize_outbox_error(&err.to_string());

	outbox::mark_result_outbox_failed(db, job.outbox_id, attempts, &error_text, available_at, now)
		.await?;

	Ok(())
}

fn sanitize_outbox_error(text: &str) -> String {
	let mut parts = Vec::new();
	let mut redact_next = false;

	for raw in text.split_whitespace() {
		let mut word = raw.to_string();

		if redact_next {
			word = "[REDACTED]".to_string();
			redact_next = false;
		}
		if raw.eq_ignore_ascii_case("bearer") {
			redact_next = true;
		}

		let lowered = raw.to_ascii_lowercase();

		for key in ["api_key", "apikey", "client_secret", "password", "secret", "token"] {
			if lowered.contains(key) && (lowered.contains('=') || lowered.contains(':')) {
				let sep = if raw.contains('=') { '=' } else { ':' };
				let prefix = raw.split(sep).next().unwrap_or(raw);

				word = format!("{prefix}{sep}[REDACTED]");

				break;
			}
		}

		parts.push(word);
	}

	let mut out = parts.join(" ");

	if out.chars().count() > MAX_OUTBOX_ERROR_CHARS {
		out = out.chars().take(MAX_OUTBOX_ERROR_CHARS).collect();
		out.push_str("...");
	}

	out
}

fn backoff_for_attempt(attempt: i32) -> Duration {
	let attempts = attempt.max(1) as u32;
	let exp = attempts.saturating_sub(1).min(6);
	let base = BASE_BACKOFF_MS.saturating_mul(1 << exp);

	Duration::milliseconds(base.min(MAX_BACKOFF_MS))
}

fn to_std_duration(duration: Duration) -> StdDuration {
	let millis = duration.whole_milliseconds();

	if millis <= 0 {
		return StdDuration::from_millis(0);
	}

	StdDuration::from_millis(millis as u64)
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn backoff_doubles_and_caps() {
		assert_eq!(backoff_for_attempt(0), Duration::milliseconds(500));
		assert_eq!(backoff_for_attempt(1), Duration::milliseconds(500));
		assert_eq!(backoff_for_attempt(2), Duration::milliseconds(1_000));
		assert_eq!(backoff_for_attempt(4), Duration::milliseconds(4_000));
		assert_eq!(backoff_for_attempt(7), Duration::milliseconds(30_000));
		assert_eq!(backoff_for_attempt(40), Duration::milliseconds(30_000));
	}

	#[test]
	fn outbox_errors_are_redacted() {
		let sanitized =
			sanitize_outbox_error("request failed: Bearer abc123 api_key=xyz client_secret:s3cr3t");

		assert_eq!(
			sanitized,
			"request failed: Bearer [REDACTED] api_key=[REDACTED] client_secret:[REDACTED]"
		);
	}

	#[test]
	fn long_outbox_errors_are_truncated() {
		let sanitized = sanitize_outbox_error(&"x".repeat(2_000));

		assert_eq!(sanitized.chars().count(), MAX_OUTBOX_ERROR_CHARS + 3);
		assert!(sanitized.ends_with("..."));
	}

	#[test]
	fn result_rows_carry_the_canonical_post() {
		let post = scour_domain::post::normalize(&json!({
			"id": "1790000000000000001",
			"text": "",
			"author": { "username": "eu", "name": "EU" }
		}))
		.expect("Post must normalize.");
		let record = build_result(&post).expect("Result must build.");

		assert_eq!(record.external_id, "1790000000000000001");
		assert_eq!(record.source_url, "https://x.com/eu/status/1790000000000000001");
		assert_eq!(record.metadata["id"], "1790000000000000001");
		assert_eq!(embedding_text(&record), "EU (@eu)");
	}

	#[test]
	fn negative_durations_clamp_to_zero() {
		assert_eq!(to_std_duration(Duration::milliseconds(-5)), StdDuration::ZERO);
		assert_eq!(to_std_duration(Duration::milliseconds(500)), StdDuration::from_millis(500));
	}
}
