use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Error, LinkReport, ParallelExecutor, PerQueryResult, Progress, Result, ScourService,
	persistence,
	planner::{ConversationState, Plan, SubqueryPlanner},
	scoring::{self, ScoredItem},
};
use scour_domain::{
	post::{PostBatch, ResultPayload},
	session::{MessageRole, SessionStatus},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
	pub chat_id: Uuid,
	/// Id for the stored user message. A fresh one is generated when absent.
	#[serde(default)]
	pub message_id: Option<Uuid>,
	pub query: String,
	/// Restricts every sub-query to this language.
	#[serde(default)]
	pub language: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchOutcome {
	Clarification { message_id: Uuid, prompt: String },
	Results(SearchResponse),
}

/// Per-sub-query diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SubQueryReport {
	pub index: usize,
	pub query: String,
	pub post_count: usize,
	pub attempts: u32,
	pub error: Option<String>,
	pub empty: bool,
	pub newest_id: Option<String>,
	pub oldest_id: Option<String>,
	pub elapsed_ms: u64,
}
impl From<&PerQueryResult> for SubQueryReport {
	fn from(result: &PerQueryResult) -> Self {
		Self {
			index: result.index,
			query: result.query.clone(),
			post_count: result.post_count,
			attempts: result.attempts,
			error: result.error.clone(),
			empty: result.is_empty(),
			newest_id: result.metadata.as_ref().and_then(|metadata| metadata.newest_id.clone()),
			oldest_id: result.metadata.as_ref().and_then(|metadata| metadata.oldest_id.clone()),
			elapsed_ms: result.elapsed_ms,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
	pub session_id: Uuid,
	pub message_id: Uuid,
	pub sub_queries: Vec<SubQueryReport>,
	pub total_posts: usize,
	pub items: Vec<ScoredItem>,
	pub link_report: LinkReport,
}

impl ScourService {
	pub async fn search(&self, req: SearchRequest) -> Result<SearchOutcome> {
		self.search_with_progress(req, |_| {}).await
	}

	/// Runs the whole pipeline for one user message. `progress` is called after every sub-query
	/// settles.
	pub async fn search_with_progress<F>(
		&self,
		req: SearchRequest,
		progress: F,
	) -> Result<SearchOutcome>
	where
		F: Fn(Progress) + Send + Sync,
	{
		let query = req.query.trim();

		if query.is_empty() {
			return Err(Error::InvalidRequest { message: "query must be non-empty.".to_string() });
		}

		let now = OffsetDateTime::now_utc();
		let message_id = req.message_id.unwrap_or_else(Uuid::new_v4);

		self.store.record_message(message_id, req.chat_id, MessageRole::User, query, now).await?;

		let prior_sub_queries = self.store.count_sub_queries(req.chat_id).await?;
		let history = self.store.chat_messages(req.chat_id).await?;
		let state =
			ConversationState::from_history(prior_sub_queries, &history, message_id, query);
		let planner = SubqueryPlanner::new(
			&self.cfg.planner,
			&self.cfg.providers.planner,
			self.providers.planner.as_ref(),
		);
		let plan = planner.plan(query, &state, req.language.as_deref(), now.date()).await?;
		let planned = match plan {
			Plan::Clarify(prompt) => {
				let assistant_id = Uuid::new_v4();

				self.store
					.record_message(
						assistant_id,
						req.chat_id,
						MessageRole::Assistant,
						&prompt,
						OffsetDateTime::now_utc(),
					)
					.await?;

				return Ok(SearchOutcome::Clarification { message_id: assistant_id, prompt });
			},
			Plan::Queries(planned) => planned,
		};
		let sub_queries: Vec<String> = planned.into_iter().map(|planned| planned.query).collect();
		let topic = state.original_query.as_deref().unwrap_or(query);

		self.store.record_sub_queries(req.chat_id, message_id, &sub_queries, now).await?;

		let session_id = Uuid::new_v4();

		self.store.create_session(session_id, message_id, topic, now).await?;

		tracing::info!(
			session_id = %session_id,
			message_id = %message_id,
			sub_queries = sub_queries.len(),
			"Fanning out sub-queries."
		);

		let executor = ParallelExecutor::new(
			self.providers.search.clone(),
			self.gate.clone(),
			&self.cfg.fanout,
		);
		let mut results = executor.execute_all(&sub_queries, progress).await;
		let reports: Vec<SubQueryReport> = results.iter().map(SubQueryReport::from).collect();
		let mut batch = PostBatch::new();

		for result in results.iter_mut() {
			for post in std::mem::take(&mut result.posts) {
				batch.push(post);
			}
		}

		let posts = batch.into_posts();

		if posts.is_empty() {
			tracing::info!(session_id = %session_id, "No posts found. Nothing to index.");

			self.store
				.advance_session(session_id, SessionStatus::ResultsSaved, OffsetDateTime::now_utc())
				.await?;
		} else {
			let payload =
				serde_json::to_value(ResultPayload { posts: posts.clone() }).map_err(|err| {
					Error::Storage { message: format!("Failed to encode result payload: {err}.") }
				})?;
			let outbox_id = self
				.store
				.enqueue_results(session_id, &payload, OffsetDateTime::now_utc())
				.await?;

			tracing::info!(
				session_id = %session_id,
				outbox_id = %outbox_id,
				posts = posts.len(),
				"Queued posts for indexing."
			);
		}

		let link_report = persistence::link_results(
			self.store.as_ref(),
			&self.cfg.persistence,
			message_id,
			&posts,
		)
		.await?;
		let items = scoring::score_session(
			self.store.as_ref(),
			&self.providers,
			&self.cfg,
			session_id,
			message_id,
			topic,
		)
		.await?;

		self.store
			.advance_session(session_id, SessionStatus::Completed, OffsetDateTime::now_utc())
			.await?;

		tracing::info!(
			session_id = %session_id,
			posts = posts.len(),
			items = items.len(),
			"Search session completed."
		);

		Ok(SearchOutcome::Results(SearchResponse {
			session_id,
			message_id,
			sub_queries: reports,
			total_posts: posts.len(),
			items,
			link_report,
		}))
	}
}
