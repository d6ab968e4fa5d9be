use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::SessionRow};
use scour_domain::session::SessionStatus;

pub async fn insert_session<'e, E>(
	executor: E,
	session_id: Uuid,
	message_id: Uuid,
	query: &str,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO sessions (session_id, message_id, query, status, created_at, updated_at)
VALUES ($1, $2, $3, 'pending', $4, $4)",
	)
	.bind(session_id)
	.bind(message_id)
	.bind(query)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn get_session<'e, E>(executor: E, session_id: Uuid) -> Result<Option<SessionRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, SessionRow>(
		"\
SELECT session_id, message_id, query, status, created_at, updated_at
FROM sessions
WHERE session_id = $1",
	)
	.bind(session_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

pub async fn get_session_by_message<'e, E>(
	executor: E,
	message_id: Uuid,
) -> Result<Option<SessionRow>>
where
	E: PgExecutor<'e>,
{
	let row = sqlx::query_as::<_, SessionRow>(
		"\
SELECT session_id, message_id, query, status, created_at, updated_at
FROM sessions
WHERE message_id = $1",
	)
	.bind(message_id)
	.fetch_optional(executor)
	.await?;

	Ok(row)
}

/// Moves the session to `next` only from one of its predecessor states.
///
/// Returns false when the session is missing or already at or past `next`.
pub async fn advance_status<'e, E>(
	executor: E,
	session_id: Uuid,
	next: SessionStatus,
	now: OffsetDateTime,
) -> Result<bool>
where
	E: PgExecutor<'e>,
{
	let result = sqlx::query(
		"\
UPDATE sessions
SET status = $1, updated_at = $2
WHERE session_id = $3 AND status = ANY($4)",
	)
	.bind(next.as_str())
	.bind(now)
	.bind(session_id)
	.bind(next.predecessors())
	.execute(executor)
	.await?;

	Ok(result.rows_affected() == 1)
}

/// Publishes a status change on `channel` with the session id as payload.
pub async fn notify_status<'e, E>(executor: E, channel: &str, session_id: Uuid) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query("SELECT pg_notify($1, $2)")
		.bind(channel)
		.bind(session_id.to_string())
		.execute(executor)
		.await?;

	Ok(())
}
