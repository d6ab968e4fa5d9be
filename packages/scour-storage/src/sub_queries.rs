use sqlx::{PgExecutor, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::SubQueryRow};

/// Records the sub-queries planned for one user message, in plan order.
pub async fn insert_sub_queries<'e, E>(
	executor: E,
	chat_id: Uuid,
	parent_message_id: Option<Uuid>,
	queries: &[String],
	now: OffsetDateTime,
) -> Result<Vec<Uuid>>
where
	E: PgExecutor<'e>,
{
	if queries.is_empty() {
		return Ok(Vec::new());
	}

	let ids: Vec<Uuid> = queries.iter().map(|_| Uuid::new_v4()).collect();
	// Offsets keep `created_at` ordering equal to plan order.
	let mut builder = QueryBuilder::new(
		"INSERT INTO sub_queries (sub_query_id, chat_id, query, parent_message_id, created_at) ",
	);

	builder.push_values(ids.iter().zip(queries).enumerate(), |mut row, (index, (id, query))| {
		row.push_bind(*id)
			.push_bind(chat_id)
			.push_bind(query.as_str())
			.push_bind(parent_message_id)
			.push_bind(now + time::Duration::microseconds(index as i64));
	});
	builder.build().execute(executor).await?;

	Ok(ids)
}

pub async fn count_for_chat<'e, E>(executor: E, chat_id: Uuid) -> Result<i64>
where
	E: PgExecutor<'e>,
{
	let count: i64 = sqlx::query_scalar("SELECT count(*) FROM sub_queries WHERE chat_id = $1")
		.bind(chat_id)
		.fetch_one(executor)
		.await?;

	Ok(count)
}

pub async fn list_for_chat<'e, E>(executor: E, chat_id: Uuid) -> Result<Vec<SubQueryRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, SubQueryRow>(
		"\
SELECT sub_query_id, chat_id, query, parent_message_id, created_at
FROM sub_queries
WHERE chat_id = $1
ORDER BY created_at ASC",
	)
	.bind(chat_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}
