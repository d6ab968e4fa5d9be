use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, Result,
	models::{NewSearchResult, SearchResultRow},
};

/// Inserts or refreshes the result for `external_id`, returning its stable id.
///
/// An upsert without an embedding keeps the stored one.
pub async fn upsert_search_result<'e, E>(
	executor: E,
	result: &NewSearchResult,
	now: OffsetDateTime,
) -> Result<Uuid>
where
	E: PgExecutor<'e>,
{
	if result.external_id.trim().is_empty() {
		return Err(Error::InvalidArgument("external_id must be non-empty.".to_string()));
	}

	let result_id: Uuid = sqlx::query_scalar(
		"\
INSERT INTO search_results (
	result_id,
	external_id,
	content,
	source_title,
	source_url,
	metadata,
	embedding,
	created_at,
	updated_at
)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
ON CONFLICT (external_id) DO UPDATE
SET
	content = EXCLUDED.content,
	source_title = EXCLUDED.source_title,
	source_url = EXCLUDED.source_url,
	metadata = EXCLUDED.metadata,
	embedding = COALESCE(EXCLUDED.embedding, search_results.embedding),
	updated_at = EXCLUDED.updated_at
RETURNING result_id",
	)
	.bind(Uuid::new_v4())
	.bind(result.external_id.as_str())
	.bind(result.content.as_str())
	.bind(result.source_title.as_str())
	.bind(result.source_url.as_str())
	.bind(&result.metadata)
	.bind(result.embedding.as_deref())
	.bind(now)
	.fetch_one(executor)
	.await?;

	Ok(result_id)
}

/// Maps external ids to result ids in one round trip. Unknown ids are absent from the output.
pub async fn resolve_external_ids<'e, E>(
	executor: E,
	external_ids: &[String],
) -> Result<Vec<(String, Uuid)>>
where
	E: PgExecutor<'e>,
{
	if external_ids.is_empty() {
		return Ok(Vec::new());
	}

	let rows: Vec<(String, Uuid)> = sqlx::query_as(
		"SELECT external_id, result_id FROM search_results WHERE external_id = ANY($1)",
	)
	.bind(external_ids)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn get_by_external_id<'e, E>(
	executor: E,
	external_id: &str,
) -> Result<Option<SearchResultRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, SearchResultRow>(
		"\
SELECT
	result_id,
	external_id,
	content,
	source_title,
	source_url,
	metadata,
	embedding,
	created_at,
	updated_at
FROM search_results
WHERE external_id = $1",
	)
	.bind(external_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}
