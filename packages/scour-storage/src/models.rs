use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
	pub session_id: Uuid,
	pub message_id: Uuid,
	pub query: String,
	pub status: String,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
	pub message_id: Uuid,
	pub chat_id: Uuid,
	pub role: String,
	pub content: String,
	pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SubQueryRow {
	pub sub_query_id: Uuid,
	pub chat_id: Uuid,
	pub query: String,
	pub parent_message_id: Option<Uuid>,
	pub created_at: OffsetDateTime,
}

/// Values written by an upsert of one search result.
#[derive(Debug, Clone)]
pub struct NewSearchResult {
	pub external_id: String,
	pub content: String,
	pub source_title: String,
	pub source_url: String,
	pub metadata: Value,
	pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SearchResultRow {
	pub result_id: Uuid,
	pub external_id: String,
	pub content: String,
	pub source_title: String,
	pub source_url: String,
	pub metadata: Value,
	pub embedding: Option<Vec<f32>>,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewLink {
	pub link_id: Uuid,
	pub result_id: Uuid,
	pub session_id: Uuid,
	pub message_id: Uuid,
}

/// A link row joined with the result it points at.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LinkedResult {
	pub link_id: Uuid,
	pub result_id: Uuid,
	pub external_id: String,
	pub content: String,
	pub source_title: String,
	pub source_url: String,
	pub metadata: Value,
	pub embedding: Option<Vec<f32>>,
	pub embedding_score: f32,
	pub rerank_score: f32,
	pub final_score: f32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ResultOutboxEntry {
	pub outbox_id: Uuid,
	pub session_id: Uuid,
	pub payload: Value,
	pub status: String,
	pub attempts: i32,
	pub last_error: Option<String>,
	pub available_at: OffsetDateTime,
	pub created_at: OffsetDateTime,
	pub updated_at: OffsetDateTime,
}
