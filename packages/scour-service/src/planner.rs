//! Turns one user query into scoped sub-queries.
//!
//! The first message of a chat gets a clarification prompt instead of a fan-out. Once the user
//! has answered, or once the chat already has sub-queries, the planner asks the generator for
//! keywords and scopes them by language tier, engagement floor and date window.

use serde::Serialize;
use serde_json::Value;
use time::Date;
use uuid::Uuid;

use crate::{Error, PlannerProvider, Result};
use scour_config::{LanguageTier, LlmProviderConfig, Planner};
use scour_domain::{
	plan::{self, DateWindow, ScopedQuery, TierAllocation},
	session::MessageRole,
};
use scour_storage::models::MessageRow;

/// What the chat history says about the current message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
	pub prior_sub_queries: i64,
	/// The user message that triggered the clarification prompt, when the current message
	/// answers it.
	pub original_query: Option<String>,
	pub clarification: Option<String>,
}
impl ConversationState {
	/// Derives the state from the stored chat history. `current_message_id` is excluded from
	/// the history.
	///
	/// A chat without sub-queries that already got a clarification prompt is still answering
	/// it, also after a planning attempt failed.
	pub fn from_history(
		prior_sub_queries: i64,
		messages: &[MessageRow],
		current_message_id: Uuid,
		current_query: &str,
	) -> Self {
		if prior_sub_queries > 0 {
			return Self { prior_sub_queries, original_query: None, clarification: None };
		}

		let history: Vec<&MessageRow> =
			messages.iter().filter(|row| row.message_id != current_message_id).collect();
		let Some(prompt_at) =
			history.iter().rposition(|row| row.role == MessageRole::Assistant.as_str())
		else {
			return Self::default();
		};
		let original_query = history[..prompt_at]
			.iter()
			.rev()
			.find(|row| row.role == MessageRole::User.as_str())
			.map(|row| row.content.clone());

		Self { prior_sub_queries, original_query, clarification: Some(current_query.to_string()) }
	}

	pub fn is_first_contact(&self) -> bool {
		self.prior_sub_queries == 0 && self.clarification.is_none()
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedQuery {
	pub scoped: ScopedQuery,
	pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
	Clarify(String),
	Queries(Vec<PlannedQuery>),
}

pub struct SubqueryPlanner<'a> {
	cfg: &'a Planner,
	llm: &'a LlmProviderConfig,
	provider: &'a dyn PlannerProvider,
}
impl<'a> SubqueryPlanner<'a> {
	pub fn new(
		cfg: &'a Planner,
		llm: &'a LlmProviderConfig,
		provider: &'a dyn PlannerProvider,
	) -> Self {
		Self { cfg, llm, provider }
	}

	pub async fn plan(
		&self,
		user_query: &str,
		state: &ConversationState,
		requested_language: Option<&str>,
		today: Date,
	) -> Result<Plan> {
		let detected = plan::detect_language(user_query);

		if state.is_first_contact() {
			tracing::info!(language = ?detected, "First contact. Asking for clarification.");

			return Ok(Plan::Clarify(clarification_prompt(user_query, detected, &self.cfg.tiers)));
		}

		let topic = state.original_query.as_deref().unwrap_or(user_query);
		let clarification = state.clarification.as_deref();
		let language = requested_language
			.map(|language| language.trim().to_lowercase())
			.filter(|language| !language.is_empty())
			.or_else(|| plan::explicit_language(user_query))
			.or_else(|| clarification.and_then(plan::explicit_language))
			.or_else(|| plan::explicit_language(topic));
		let scope_text = match clarification {
			Some(clarification) => format!("{topic}\n{clarification}"),
			None => topic.to_string(),
		};
		let window = plan::infer_date_window(&scope_text, today);
		let tiers = plan::resolve_tiers(self.cfg, language.as_deref());
		let target = self.cfg.target_queries.clamp(self.cfg.min_queries, self.cfg.max_queries);
		let slots = plan::allocate(target, &tiers);
		let messages = build_messages(topic, clarification, detected, &slots, window);
		let keywords = self.provider.generate(self.llm, &messages).await.map_err(|err| {
			Error::SubqueryGeneration { message: err.to_string() }
		})?;

		if keywords.len() < self.cfg.min_queries as usize {
			return Err(Error::SubqueryGeneration {
				message: format!(
					"Generator returned {} usable queries; at least {} are required.",
					keywords.len(),
					self.cfg.min_queries
				),
			});
		}

		let count = keywords.len().min(self.cfg.max_queries as usize);
		let allocations = plan::allocate(count as u32, &tiers);
		let queries: Vec<PlannedQuery> =
			plan::scope_keywords(&keywords[..count], &allocations, window)
				.into_iter()
				.map(|scoped| PlannedQuery { query: scoped.render(), scoped })
				.collect();

		tracing::info!(
			count = queries.len(),
			language = ?language,
			window = ?window,
			"Planned sub-queries."
		);

		Ok(Plan::Queries(queries))
	}
}

fn clarification_prompt(
	user_query: &str,
	detected: Option<&str>,
	tiers: &[LanguageTier],
) -> String {
	let coverage: Vec<String> = tiers
		.iter()
		.map(|tier| {
			format!(
				"{} {}% (at least {} likes)",
				tier.language,
				(tier.share * 100.0).round() as u32,
				tier.min_engagement
			)
		})
		.collect();

	format!(
		"Before I search for \"{}\", help me narrow it down.\n\
1. Topic: which angle, people or sub-topic matter most?\n\
2. Time: how recent should posts be (latest, today, this week, this month, any time)?\n\
3. Depth: a quick overview, or a deep dive with expert and primary sources?\n\
Detected language: {}. Default coverage: {}. Name a language to search only in it.",
		user_query.trim(),
		detected.unwrap_or("unknown"),
		coverage.join(", ")
	)
}

fn build_messages(
	topic: &str,
	clarification: Option<&str>,
	detected: Option<&str>,
	slots: &[TierAllocation],
	window: Option<DateWindow>,
) -> Vec<Value> {
	let total: u32 = slots.iter().map(|slot| slot.count).sum();
	let system = format!(
		"You write keyword searches for a social media search engine. \
Return JSON only: an array of exactly {total} objects shaped {{\"query\": \"...\"}}. \
Fill the slots in order and write each query in its slot language. \
Use 1 to 5 keywords per query and no search operators."
	);
	let slots: Vec<Value> = slots
		.iter()
		.map(|slot| serde_json::json!({ "language": slot.language, "count": slot.count }))
		.collect();
	let user = serde_json::json!({
		"topic": topic,
		"clarification": clarification,
		"detected_language": detected,
		"since": window.map(|window| plan::format_date(window.since)),
		"slots": slots,
	});

	vec![
		serde_json::json!({ "role": "system", "content": system }),
		serde_json::json!({ "role": "user", "content": user.to_string() }),
	]
}
