mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Config, EmbeddingProviderConfig, Fanout, LanguageTier, LlmProviderConfig, Persistence,
	Planner, Postgres, ProviderConfig, Providers, RateLimit, Scoring, SearchProviderConfig,
	Service, Storage, TokenEndpoint,
};

use std::{fs, path::Path};

const SHARE_TOLERANCE: f32 = 0.01;

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);
	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.trim().is_empty() {
		return Err(Error::Validation {
			message: "service.log_level must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}

	validate_providers(cfg)?;
	validate_planner(&cfg.planner)?;

	if cfg.fanout.batch_size == 0 {
		return Err(Error::Validation {
			message: "fanout.batch_size must be greater than zero.".to_string(),
		});
	}
	if cfg.rate_limit.max_requests == 0 {
		return Err(Error::Validation {
			message: "rate_limit.max_requests must be greater than zero.".to_string(),
		});
	}
	if cfg.rate_limit.window_ms == 0 {
		return Err(Error::Validation {
			message: "rate_limit.window_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.persistence.poll_interval_ms == 0 {
		return Err(Error::Validation {
			message: "persistence.poll_interval_ms must be greater than zero.".to_string(),
		});
	}
	if cfg.persistence.poll_max_attempts == 0 {
		return Err(Error::Validation {
			message: "persistence.poll_max_attempts must be greater than zero.".to_string(),
		});
	}

	let channel = cfg.persistence.notify_channel.as_str();

	if channel.is_empty()
		|| !channel.chars().all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '_')
	{
		return Err(Error::Validation {
			message: "persistence.notify_channel must be a lowercase identifier.".to_string(),
		});
	}

	for (label, weight) in [
		("scoring.embedding_weight", cfg.scoring.embedding_weight),
		("scoring.rerank_weight", cfg.scoring.rerank_weight),
	] {
		if !weight.is_finite() {
			return Err(Error::Validation { message: format!("{label} must be a finite number.") });
		}
		if weight < 0.0 {
			return Err(Error::Validation { message: format!("{label} must be zero or greater.") });
		}
	}

	Ok(())
}

fn validate_providers(cfg: &Config) -> Result<()> {
	let search = &cfg.providers.search;

	for (label, base) in [
		("search", &search.api_base),
		("planner", &cfg.providers.planner.api_base),
		("embedding", &cfg.providers.embedding.api_base),
		("rerank", &cfg.providers.rerank.api_base),
	] {
		if base.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_base must be non-empty."),
			});
		}
	}

	if search.api_key.is_none() && search.token.is_none() {
		return Err(Error::Validation {
			message: "Provider search requires either api_key or a token endpoint.".to_string(),
		});
	}
	if let Some(token) = search.token.as_ref() {
		for (label, value) in [
			("providers.search.token.url", &token.url),
			("providers.search.token.client_id", &token.client_id),
			("providers.search.token.client_secret", &token.client_secret),
		] {
			if value.trim().is_empty() {
				return Err(Error::Validation { message: format!("{label} must be non-empty.") });
			}
		}
	}

	for (label, key) in [
		("planner", &cfg.providers.planner.api_key),
		("embedding", &cfg.providers.embedding.api_key),
		("rerank", &cfg.providers.rerank.api_key),
	] {
		if key.trim().is_empty() {
			return Err(Error::Validation {
				message: format!("Provider {label} api_key must be non-empty."),
			});
		}
	}

	if cfg.providers.embedding.dimensions == 0 {
		return Err(Error::Validation {
			message: "providers.embedding.dimensions must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_planner(planner: &Planner) -> Result<()> {
	if planner.min_queries == 0 {
		return Err(Error::Validation {
			message: "planner.min_queries must be greater than zero.".to_string(),
		});
	}
	if planner.min_queries > planner.max_queries {
		return Err(Error::Validation {
			message: "planner.min_queries must not exceed planner.max_queries.".to_string(),
		});
	}
	if !(planner.min_queries..=planner.max_queries).contains(&planner.target_queries) {
		return Err(Error::Validation {
			message: "planner.target_queries must be between planner.min_queries and planner.max_queries."
				.to_string(),
		});
	}
	if planner.tiers.is_empty() {
		return Err(Error::Validation {
			message: "planner.tiers must be non-empty.".to_string(),
		});
	}

	let mut total = 0.0_f32;

	for tier in &planner.tiers {
		if tier.language.trim().is_empty() {
			return Err(Error::Validation {
				message: "planner.tiers.language must be non-empty.".to_string(),
			});
		}
		if !tier.share.is_finite() || tier.share <= 0.0 {
			return Err(Error::Validation {
				message: "planner.tiers.share must be a finite number greater than zero."
					.to_string(),
			});
		}

		total += tier.share;
	}

	if (total - 1.0).abs() > SHARE_TOLERANCE {
		return Err(Error::Validation {
			message: "planner.tiers.share values must sum to 1.0.".to_string(),
		});
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let search = &mut cfg.providers.search;

	if search.api_key.as_deref().map(|key| key.trim().is_empty()).unwrap_or(false) {
		search.api_key = None;
	}
	if let Some(token) = search.token.as_mut()
		&& token.scope.as_deref().map(|scope| scope.trim().is_empty()).unwrap_or(false)
	{
		token.scope = None;
	}

	for tier in &mut cfg.planner.tiers {
		tier.language = tier.language.trim().to_lowercase();
	}
}
