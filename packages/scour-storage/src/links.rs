use sqlx::{PgExecutor, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{LinkedResult, NewLink},
};

/// Writes all rows in one statement. Rows already linked to the session are skipped.
pub async fn insert_links_bulk<'e, E>(
	executor: E,
	links: &[NewLink],
	now: OffsetDateTime,
) -> Result<u64>
where
	E: PgExecutor<'e>,
{
	if links.is_empty() {
		return Ok(0);
	}

	let mut builder = QueryBuilder::new(
		"INSERT INTO result_message_links (link_id, result_id, session_id, message_id, created_at) ",
	);

	builder.push_values(links, |mut row, link| {
		row.push_bind(link.link_id)
			.push_bind(link.result_id)
			.push_bind(link.session_id)
			.push_bind(link.message_id)
			.push_bind(now);
	});
	builder.push(" ON CONFLICT (result_id, session_id) DO NOTHING");

	let result = builder.build().execute(executor).await?;

	Ok(result.rows_affected())
}

pub async fn insert_link<'e, E>(executor: E, link: &NewLink, now: OffsetDateTime) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
INSERT INTO result_message_links (link_id, result_id, session_id, message_id, created_at)
VALUES ($1, $2, $3, $4, $5)
ON CONFLICT (result_id, session_id) DO NOTHING",
	)
	.bind(link.link_id)
	.bind(link.result_id)
	.bind(link.session_id)
	.bind(link.message_id)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

pub async fn list_linked_results<'e, E>(
	executor: E,
	session_id: Uuid,
	message_id: Uuid,
) -> Result<Vec<LinkedResult>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, LinkedResult>(
		"\
SELECT
	l.link_id,
	l.result_id,
	r.external_id,
	r.content,
	r.source_title,
	r.source_url,
	r.metadata,
	r.embedding,
	l.embedding_score,
	l.rerank_score,
	l.final_score
FROM result_message_links l
JOIN search_results r ON r.result_id = l.result_id
WHERE l.session_id = $1 AND l.message_id = $2
ORDER BY l.final_score DESC, l.result_id ASC",
	)
	.bind(session_id)
	.bind(message_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}

pub async fn update_link_scores<'e, E>(
	executor: E,
	link_id: Uuid,
	embedding_score: f32,
	rerank_score: f32,
	final_score: f32,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
UPDATE result_message_links
SET embedding_score = $1, rerank_score = $2, final_score = $3
WHERE link_id = $4",
	)
	.bind(embedding_score)
	.bind(rerank_score)
	.bind(final_score)
	.bind(link_id)
	.execute(executor)
	.await?;

	Ok(())
}
