use sqlx::PgExecutor;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{Result, models::MessageRow};
use scour_domain::session::MessageRole;

pub async fn insert_message<'e, E>(
	executor: E,
	message_id: Uuid,
	chat_id: Uuid,
	role: MessageRole,
	content: &str,
	now: OffsetDateTime,
) -> Result<()>
where
	E: PgExecutor<'e>,
{
	sqlx::query(
		"\
INSERT INTO messages (message_id, chat_id, role, content, created_at)
VALUES ($1, $2, $3, $4, $5)",
	)
	.bind(message_id)
	.bind(chat_id)
	.bind(role.as_str())
	.bind(content)
	.bind(now)
	.execute(executor)
	.await?;

	Ok(())
}

pub async fn list_chat_messages<'e, E>(executor: E, chat_id: Uuid) -> Result<Vec<MessageRow>>
where
	E: PgExecutor<'e>,
{
	let rows = sqlx::query_as::<_, MessageRow>(
		"\
SELECT message_id, chat_id, role, content, created_at
FROM messages
WHERE chat_id = $1
ORDER BY created_at ASC, message_id ASC",
	)
	.bind(chat_id)
	.fetch_all(executor)
	.await?;

	Ok(rows)
}
