//! Client-credentials access tokens for the search workflow.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::{sync::Mutex, time::Instant};

use crate::{Error, Result};
use scour_config::TokenEndpoint;

const DEFAULT_EXPIRES_IN_SECS: u64 = 3_600;
const MAX_EXPIRES_IN_SECS: u64 = 86_400;

/// Caches one bearer token and refreshes it shortly before expiry.
///
/// The cache lock is held across the refresh request, so concurrent callers that find the token
/// stale wait for a single in-flight refresh instead of each fetching their own.
#[derive(Debug)]
pub struct AccessTokenProvider {
	client: Client,
	cfg: TokenEndpoint,
	cache: Mutex<Option<CachedToken>>,
}
impl AccessTokenProvider {
	pub fn new(cfg: &TokenEndpoint) -> Result<Self> {
		let client = Client::builder().timeout(Duration::from_millis(cfg.timeout_ms)).build()?;

		Ok(Self { client, cfg: cfg.clone(), cache: Mutex::new(None) })
	}

	pub async fn token(&self) -> Result<String> {
		let mut cache = self.cache.lock().await;
		let margin = Duration::from_secs(self.cfg.refresh_margin_secs);

		if let Some(cached) = cache.as_ref()
			&& cached.is_fresh(Instant::now(), margin)
		{
			return Ok(cached.value.clone());
		}

		let fetched = self.fetch().await?;
		let value = fetched.value.clone();

		*cache = Some(fetched);

		Ok(value)
	}

	/// Drops the cached token so the next call fetches a new one.
	pub async fn invalidate(&self) {
		*self.cache.lock().await = None;
	}

	async fn fetch(&self) -> Result<CachedToken> {
		let mut form = vec![
			("grant_type", "client_credentials"),
			("client_id", self.cfg.client_id.as_str()),
			("client_secret", self.cfg.client_secret.as_str()),
		];

		if let Some(scope) = self.cfg.scope.as_deref() {
			form.push(("scope", scope));
		}

		let res = self.client.post(&self.cfg.url).form(&form).send().await?;
		let body: TokenResponse = crate::check_status(res)?.json().await?;

		if body.access_token.trim().is_empty() {
			return Err(Error::InvalidResponse {
				message: "Token response carried an empty access_token.".to_string(),
			});
		}

		let expires_in = body.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);

		tracing::debug!(expires_in, "Fetched search workflow access token.");

		Ok(CachedToken { value: body.access_token, expires_at: expiry(Instant::now(), expires_in) })
	}
}

#[derive(Debug)]
struct CachedToken {
	value: String,
	expires_at: Instant,
}
impl CachedToken {
	fn is_fresh(&self, now: Instant, margin: Duration) -> bool {
		now.checked_add(margin).is_some_and(|deadline| deadline < self.expires_at)
	}
}

/// Token lifetimes are capped at one day.
fn expiry(now: Instant, expires_in: u64) -> Instant {
	let lifetime = Duration::from_secs(expires_in.min(MAX_EXPIRES_IN_SECS));

	now.checked_add(lifetime).unwrap_or(now)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
	access_token: String,
	#[serde(default)]
	expires_in: Option<u64>,
}
