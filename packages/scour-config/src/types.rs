use serde::Deserialize;
use serde_json::{Map, Value};

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub providers: Providers,
	#[serde(default)]
	pub planner: Planner,
	#[serde(default)]
	pub fanout: Fanout,
	#[serde(default)]
	pub rate_limit: RateLimit,
	#[serde(default)]
	pub persistence: Persistence,
	#[serde(default)]
	pub scoring: Scoring,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Debug, Deserialize)]
pub struct Providers {
	pub search: SearchProviderConfig,
	pub planner: LlmProviderConfig,
	pub embedding: EmbeddingProviderConfig,
	pub rerank: ProviderConfig,
}

/// The external streaming search workflow.
///
/// Requests authenticate with a bearer token from `token` when it is present, otherwise with the
/// static `api_key`. At least one of the two must be configured.
#[derive(Debug, Deserialize)]
pub struct SearchProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	#[serde(default)]
	pub api_key: Option<String>,
	pub path: String,
	#[serde(default = "default_search_user")]
	pub user: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
	#[serde(default)]
	pub token: Option<TokenEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenEndpoint {
	pub url: String,
	pub client_id: String,
	pub client_secret: String,
	#[serde(default)]
	pub scope: Option<String>,
	/// A cached token is refreshed once it is this close to expiry.
	#[serde(default = "default_refresh_margin_secs")]
	pub refresh_margin_secs: u64,
	#[serde(default = "default_token_timeout_ms")]
	pub timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct EmbeddingProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub dimensions: u32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct ProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
pub struct LlmProviderConfig {
	pub provider_id: String,
	pub api_base: String,
	pub api_key: String,
	pub path: String,
	pub model: String,
	pub temperature: f32,
	pub timeout_ms: u64,
	#[serde(default)]
	pub default_headers: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Planner {
	pub min_queries: u32,
	pub max_queries: u32,
	pub target_queries: u32,
	/// Engagement floor for an explicitly requested language that has no tier of its own.
	pub default_min_engagement: u32,
	pub tiers: Vec<LanguageTier>,
}
impl Default for Planner {
	fn default() -> Self {
		Self {
			min_queries: 6,
			max_queries: 10,
			target_queries: 8,
			default_min_engagement: 50,
			tiers: vec![
				LanguageTier { language: "en".to_string(), min_engagement: 10, share: 0.4 },
				LanguageTier { language: "ja".to_string(), min_engagement: 50, share: 0.3 },
				LanguageTier { language: "zh".to_string(), min_engagement: 100, share: 0.3 },
			],
		}
	}
}

#[derive(Debug, Clone, Deserialize)]
pub struct LanguageTier {
	pub language: String,
	pub min_engagement: u32,
	pub share: f32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Fanout {
	pub batch_size: u32,
	pub batch_delay_ms: u64,
	pub max_retries: u32,
	pub retry_delay_ms: u64,
}
impl Default for Fanout {
	fn default() -> Self {
		Self { batch_size: 10, batch_delay_ms: 5_000, max_retries: 2, retry_delay_ms: 3_000 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RateLimit {
	pub max_requests: u32,
	pub window_ms: u64,
}
impl Default for RateLimit {
	fn default() -> Self {
		Self { max_requests: 30, window_ms: 60_000 }
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Persistence {
	pub poll_interval_ms: u64,
	pub poll_max_attempts: u32,
	pub notify_channel: String,
}
impl Default for Persistence {
	fn default() -> Self {
		Self {
			poll_interval_ms: 1_000,
			poll_max_attempts: 60,
			notify_channel: "scour_session_status".to_string(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Scoring {
	pub embedding_weight: f32,
	pub rerank_weight: f32,
}
impl Default for Scoring {
	fn default() -> Self {
		Self { embedding_weight: 0.3, rerank_weight: 0.7 }
	}
}

fn default_search_user() -> String {
	"scour".to_string()
}

fn default_refresh_margin_secs() -> u64 {
	60
}

fn default_token_timeout_ms() -> u64 {
	10_000
}
