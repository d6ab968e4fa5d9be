pub mod executor;
pub mod persistence;
pub mod planner;
pub mod scoring;
pub mod search;
pub mod store;

mod error;

pub use error::{Error, Result};
pub use executor::{ParallelExecutor, PerQueryResult, Progress};
pub use persistence::{LinkReport, LinkRowError, WriteMode};
pub use planner::{ConversationState, Plan, PlannedQuery, SubqueryPlanner};
pub use scoring::ScoredItem;
pub use search::{SearchOutcome, SearchRequest, SearchResponse, SubQueryReport};
pub use store::{PgResultStore, ResultStore, SessionRecord};

use std::{future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use scour_config::{Config, EmbeddingProviderConfig, LlmProviderConfig, ProviderConfig};
use scour_domain::rate_gate::RateGate;
use scour_providers::{
	embedding, planner as planner_provider, rerank,
	stream::{FormattedResponse, StreamClient},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub trait SearchProvider
where
	Self: Send + Sync,
{
	fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<FormattedResponse>>;
}

pub trait PlannerProvider
where
	Self: Send + Sync,
{
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<Vec<String>>>;
}

pub trait EmbeddingProvider
where
	Self: Send + Sync,
{
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>>;
}

pub trait RerankProvider
where
	Self: Send + Sync,
{
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f32>>>;
}

#[derive(Clone)]
pub struct Providers {
	pub search: Arc<dyn SearchProvider>,
	pub planner: Arc<dyn PlannerProvider>,
	pub embedding: Arc<dyn EmbeddingProvider>,
	pub rerank: Arc<dyn RerankProvider>,
}
impl Providers {
	pub fn new(
		search: Arc<dyn SearchProvider>,
		planner: Arc<dyn PlannerProvider>,
		embedding: Arc<dyn EmbeddingProvider>,
		rerank: Arc<dyn RerankProvider>,
	) -> Self {
		Self { search, planner, embedding, rerank }
	}

	/// HTTP-backed providers. Fails when the search workflow has no usable credentials.
	pub fn from_config(cfg: &Config) -> Result<Self> {
		let search = Arc::new(StreamClient::new(&cfg.providers.search)?);
		let provider = Arc::new(DefaultProviders);

		Ok(Self {
			search,
			planner: provider.clone(),
			embedding: provider.clone(),
			rerank: provider,
		})
	}
}

pub struct ScourService {
	pub cfg: Config,
	pub store: Arc<dyn ResultStore>,
	pub providers: Providers,
	pub gate: Arc<RateGate>,
}
impl ScourService {
	pub fn new(cfg: Config, store: Arc<dyn ResultStore>, providers: Providers) -> Self {
		let gate = Arc::new(RateGate::from_config(&cfg.rate_limit));

		Self { cfg, store, providers, gate }
	}
}

struct DefaultProviders;
impl PlannerProvider for DefaultProviders {
	fn generate<'a>(
		&'a self,
		cfg: &'a LlmProviderConfig,
		messages: &'a [Value],
	) -> BoxFuture<'a, Result<Vec<String>>> {
		Box::pin(async move { Ok(planner_provider::generate_queries(cfg, messages).await?) })
	}
}
impl EmbeddingProvider for DefaultProviders {
	fn embed<'a>(
		&'a self,
		cfg: &'a EmbeddingProviderConfig,
		texts: &'a [String],
	) -> BoxFuture<'a, Result<Vec<Vec<f32>>>> {
		Box::pin(async move { Ok(embedding::embed(cfg, texts).await?) })
	}
}
impl RerankProvider for DefaultProviders {
	fn rerank<'a>(
		&'a self,
		cfg: &'a ProviderConfig,
		query: &'a str,
		docs: &'a [String],
	) -> BoxFuture<'a, Result<Vec<f32>>> {
		Box::pin(async move { Ok(rerank::rerank(cfg, query, docs).await?) })
	}
}

impl SearchProvider for StreamClient {
	fn search<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Result<FormattedResponse>> {
		Box::pin(async move { Ok(self.run(query).await?) })
	}
}
