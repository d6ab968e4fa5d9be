//! Persistence seam of the pipeline.
//!
//! `ResultStore` is what the pipeline reads and writes. `PgResultStore` backs it with Postgres and,
//! when a notification channel is configured, turns `LISTEN` notifications from the companion
//! indexer into a broadcast completion signal.

use std::time::Duration;

use serde_json::Value;
use sqlx::postgres::PgListener;
use time::OffsetDateTime;
use tokio::{sync::broadcast, task::JoinHandle};
use uuid::Uuid;

use crate::{BoxFuture, Error, Result};
use scour_domain::session::{MessageRole, SessionStatus};
use scour_storage::{
	db::Db,
	links, messages,
	models::{LinkedResult, MessageRow, NewLink},
	outbox, results, sessions, sub_queries,
};

const SIGNAL_CAPACITY: usize = 256;
const LISTENER_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionRecord {
	pub session_id: Uuid,
	pub message_id: Uuid,
	pub status: SessionStatus,
}

pub trait ResultStore
where
	Self: Send + Sync,
{
	fn record_message<'a>(
		&'a self,
		message_id: Uuid,
		chat_id: Uuid,
		role: MessageRole,
		content: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;

	fn chat_messages<'a>(&'a self, chat_id: Uuid) -> BoxFuture<'a, Result<Vec<MessageRow>>>;

	fn count_sub_queries<'a>(&'a self, chat_id: Uuid) -> BoxFuture<'a, Result<i64>>;

	fn record_sub_queries<'a>(
		&'a self,
		chat_id: Uuid,
		parent_message_id: Uuid,
		queries: &'a [String],
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Vec<Uuid>>>;

	fn create_session<'a>(
		&'a self,
		session_id: Uuid,
		message_id: Uuid,
		query: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>>;

	fn session_by_message<'a>(
		&'a self,
		message_id: Uuid,
	) -> BoxFuture<'a, Result<Option<SessionRecord>>>;

	fn session_status<'a>(
		&'a self,
		session_id: Uuid,
	) -> BoxFuture<'a, Result<Option<SessionStatus>>>;

	/// Applies a forward transition. Returns false when the session is already at or past `next`.
	fn advance_session<'a>(
		&'a self,
		session_id: Uuid,
		next: SessionStatus,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>>;

	/// Hands the merged posts to the companion indexer.
	fn enqueue_results<'a>(
		&'a self,
		session_id: Uuid,
		payload: &'a Value,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Uuid>>;

	fn resolve_external_ids<'a>(
		&'a self,
		external_ids: &'a [String],
	) -> BoxFuture<'a, Result<Vec<(String, Uuid)>>>;

	fn insert_links_bulk<'a>(
		&'a self,
		links: &'a [NewLink],
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>>;

	fn insert_link<'a>(
		&'a self,
		link: &'a NewLink,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>>;

	fn linked_results<'a>(
		&'a self,
		session_id: Uuid,
		message_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<LinkedResult>>>;

	fn update_link_scores<'a>(
		&'a self,
		link_id: Uuid,
		embedding_score: f32,
		rerank_score: f32,
		final_score: f32,
	) -> BoxFuture<'a, Result<()>>;

	/// Session ids whose status changed, when the store can push them. `None` means callers poll.
	fn completion_signal(&self) -> Option<broadcast::Receiver<Uuid>> {
		None
	}
}

pub struct PgResultStore {
	db: Db,
	signal: Option<broadcast::Sender<Uuid>>,
	listener: Option<JoinHandle<()>>,
}
impl PgResultStore {
	pub fn new(db: Db) -> Self {
		Self { db, signal: None, listener: None }
	}

	/// Subscribes to `channel` and forwards each notified session id to the completion signal.
	pub async fn with_listener(db: Db, channel: &str) -> Result<Self> {
		let mut listener = PgListener::connect_with(&db.pool).await?;

		listener.listen(channel).await?;

		let (tx, _) = broadcast::channel(SIGNAL_CAPACITY);
		let sender = tx.clone();
		let channel = channel.to_string();
		let handle = tokio::spawn(async move {
			loop {
				match listener.recv().await {
					Ok(notification) => match Uuid::parse_str(notification.payload()) {
						Ok(session_id) => {
							let _ = sender.send(session_id);
						},
						Err(err) => {
							tracing::warn!(
								error = %err,
								channel = %channel,
								"Ignoring session notification with a non-UUID payload."
							);
						},
					},
					Err(err) => {
						tracing::warn!(
							error = %err,
							channel = %channel,
							"Session listener failed."
						);
						tokio::time::sleep(LISTENER_RETRY_DELAY).await;
					},
				}
			}
		});

		Ok(Self { db, signal: Some(tx), listener: Some(handle) })
	}

	pub fn db(&self) -> &Db {
		&self.db
	}
}
impl Drop for PgResultStore {
	fn drop(&mut self) {
		if let Some(handle) = self.listener.take() {
			handle.abort();
		}
	}
}
impl ResultStore for PgResultStore {
	fn record_message<'a>(
		&'a self,
		message_id: Uuid,
		chat_id: Uuid,
		role: MessageRole,
		content: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			messages::insert_message(&self.db.pool, message_id, chat_id, role, content, now).await?;

			Ok(())
		})
	}

	fn chat_messages<'a>(&'a self, chat_id: Uuid) -> BoxFuture<'a, Result<Vec<MessageRow>>> {
		Box::pin(async move { Ok(messages::list_chat_messages(&self.db.pool, chat_id).await?) })
	}

	fn count_sub_queries<'a>(&'a self, chat_id: Uuid) -> BoxFuture<'a, Result<i64>> {
		Box::pin(async move { Ok(sub_queries::count_for_chat(&self.db.pool, chat_id).await?) })
	}

	fn record_sub_queries<'a>(
		&'a self,
		chat_id: Uuid,
		parent_message_id: Uuid,
		queries: &'a [String],
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Vec<Uuid>>> {
		Box::pin(async move {
			Ok(sub_queries::insert_sub_queries(
				&self.db.pool,
				chat_id,
				Some(parent_message_id),
				queries,
				now,
			)
			.await?)
		})
	}

	fn create_session<'a>(
		&'a self,
		session_id: Uuid,
		message_id: Uuid,
		query: &'a str,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			sessions::insert_session(&self.db.pool, session_id, message_id, query, now).await?;

			Ok(())
		})
	}

	fn session_by_message<'a>(
		&'a self,
		message_id: Uuid,
	) -> BoxFuture<'a, Result<Option<SessionRecord>>> {
		Box::pin(async move {
			let Some(row) = sessions::get_session_by_message(&self.db.pool, message_id).await?
			else {
				return Ok(None);
			};

			Ok(Some(SessionRecord {
				session_id: row.session_id,
				message_id: row.message_id,
				status: parse_status(&row.status)?,
			}))
		})
	}

	fn session_status<'a>(
		&'a self,
		session_id: Uuid,
	) -> BoxFuture<'a, Result<Option<SessionStatus>>> {
		Box::pin(async move {
			sessions::get_session(&self.db.pool, session_id)
				.await?
				.map(|row| parse_status(&row.status))
				.transpose()
		})
	}

	fn advance_session<'a>(
		&'a self,
		session_id: Uuid,
		next: SessionStatus,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move {
			Ok(sessions::advance_status(&self.db.pool, session_id, next, now).await?)
		})
	}

	fn enqueue_results<'a>(
		&'a self,
		session_id: Uuid,
		payload: &'a Value,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<Uuid>> {
		Box::pin(async move {
			Ok(outbox::enqueue_result_outbox(&self.db.pool, session_id, payload, now).await?)
		})
	}

	fn resolve_external_ids<'a>(
		&'a self,
		external_ids: &'a [String],
	) -> BoxFuture<'a, Result<Vec<(String, Uuid)>>> {
		Box::pin(async move {
			Ok(results::resolve_external_ids(&self.db.pool, external_ids).await?)
		})
	}

	fn insert_links_bulk<'a>(
		&'a self,
		rows: &'a [NewLink],
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<u64>> {
		Box::pin(async move { Ok(links::insert_links_bulk(&self.db.pool, rows, now).await?) })
	}

	fn insert_link<'a>(
		&'a self,
		link: &'a NewLink,
		now: OffsetDateTime,
	) -> BoxFuture<'a, Result<bool>> {
		Box::pin(async move { Ok(links::insert_link(&self.db.pool, link, now).await?) })
	}

	fn linked_results<'a>(
		&'a self,
		session_id: Uuid,
		message_id: Uuid,
	) -> BoxFuture<'a, Result<Vec<LinkedResult>>> {
		Box::pin(async move {
			Ok(links::list_linked_results(&self.db.pool, session_id, message_id).await?)
		})
	}

	fn update_link_scores<'a>(
		&'a self,
		link_id: Uuid,
		embedding_score: f32,
		rerank_score: f32,
		final_score: f32,
	) -> BoxFuture<'a, Result<()>> {
		Box::pin(async move {
			links::update_link_scores(
				&self.db.pool,
				link_id,
				embedding_score,
				rerank_score,
				final_score,
			)
			.await?;

			Ok(())
		})
	}

	fn completion_signal(&self) -> Option<broadcast::Receiver<Uuid>> {
		self.signal.as_ref().map(broadcast::Sender::subscribe)
	}
}

fn parse_status(raw: &str) -> Result<SessionStatus> {
	SessionStatus::parse(raw).ok_or_else(|| Error::Storage {
		message: format!("Unknown session status {raw:?}."),
	})
}
