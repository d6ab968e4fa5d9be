use std::cmp::Ordering;

use serde::Serialize;
use uuid::Uuid;

use crate::{Providers, Result, ResultStore};
use scour_config::Config;
use scour_domain::post::Post;
use scour_storage::models::LinkedResult;

#[derive(Debug, Clone, Serialize)]
pub struct ScoredItem {
	pub result_id: Uuid,
	pub link_id: Uuid,
	pub external_id: String,
	pub content: String,
	pub source_title: String,
	pub source_url: String,
	pub post: Option<Post>,
	pub embedding_score: f32,
	pub rerank_score: f32,
	pub final_score: f32,
}

/// Scores every result linked to `(session_id, message_id)` against the user query and returns
/// them best first.
///
/// Provider failures degrade the affected score to 0. Score write-back is best effort.
pub async fn score_session(
	store: &dyn ResultStore,
	providers: &Providers,
	cfg: &Config,
	session_id: Uuid,
	message_id: Uuid,
	query: &str,
) -> Result<Vec<ScoredItem>> {
	let rows = store.linked_results(session_id, message_id).await?;

	if rows.is_empty() {
		return Ok(Vec::new());
	}

	let query_vec = embed_query(providers, cfg, query).await;
	let rerank_scores = rerank_contents(providers, cfg, query, &rows).await;
	let weights = &cfg.scoring;
	let mut items = Vec::with_capacity(rows.len());

	for (row, rerank_score) in rows.into_iter().zip(rerank_scores) {
		let embedding_score = finite_or_zero(
			query_vec
				.as_deref()
				.zip(row.embedding.as_deref())
				.map(|(query_vec, embedding)| cosine(query_vec, embedding))
				.unwrap_or(0.0),
		);
		let rerank_score = finite_or_zero(rerank_score);
		let final_score = finite_or_zero(
			weights.embedding_weight * embedding_score + weights.rerank_weight * rerank_score,
		);
		let post = serde_json::from_value::<Post>(row.metadata).ok();

		if let Err(err) = store
			.update_link_scores(row.link_id, embedding_score, rerank_score, final_score)
			.await
		{
			tracing::warn!(error = %err, link_id = %row.link_id, "Failed to store link scores.");
		}

		items.push(ScoredItem {
			result_id: row.result_id,
			link_id: row.link_id,
			external_id: row.external_id,
			content: row.content,
			source_title: row.source_title,
			source_url: row.source_url,
			post,
			embedding_score,
			rerank_score,
			final_score,
		});
	}

	sort_ranked(&mut items);

	Ok(items)
}

pub fn sort_ranked(items: &mut [ScoredItem]) {
	items.sort_by(|a, b| {
		b.final_score
			.partial_cmp(&a.final_score)
			.unwrap_or(Ordering::Equal)
			.then_with(|| a.result_id.cmp(&b.result_id))
	});
}

/// Cosine similarity. 0 when either vector is empty, zero or of a different dimension.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
	if a.is_empty() || a.len() != b.len() {
		return 0.0;
	}

	let mut dot = 0.0_f32;
	let mut norm_a = 0.0_f32;
	let mut norm_b = 0.0_f32;

	for (x, y) in a.iter().zip(b) {
		dot += x * y;
		norm_a += x * x;
		norm_b += y * y;
	}

	if norm_a <= 0.0 || norm_b <= 0.0 {
		return 0.0;
	}

	dot / (norm_a.sqrt() * norm_b.sqrt())
}

pub fn finite_or_zero(value: f32) -> f32 {
	if value.is_finite() { value } else { 0.0 }
}

async fn embed_query(providers: &Providers, cfg: &Config, query: &str) -> Option<Vec<f32>> {
	let texts = vec![query.to_string()];

	match providers.embedding.embed(&cfg.providers.embedding, &texts).await {
		Ok(vectors) => vectors.into_iter().next(),
		Err(err) => {
			tracing::warn!(
				error = %err,
				"Query embedding failed. Embedding scores fall back to 0."
			);

			None
		},
	}
}

async fn rerank_contents(
	providers: &Providers,
	cfg: &Config,
	query: &str,
	rows: &[LinkedResult],
) -> Vec<f32> {
	let docs: Vec<String> = rows.iter().map(|row| row.content.clone()).collect();

	match providers.rerank.rerank(&cfg.providers.rerank, query, &docs).await {
		Ok(scores) if scores.len() == docs.len() => scores,
		Ok(scores) => {
			tracing::warn!(
				expected = docs.len(),
				got = scores.len(),
				"Rerank returned a mismatched score count. Rerank scores fall back to 0."
			);

			vec![0.0; docs.len()]
		},
		Err(err) => {
			tracing::warn!(error = %err, "Rerank failed. Rerank scores fall back to 0.");

			vec![0.0; docs.len()]
		},
	}
}
