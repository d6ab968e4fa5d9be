pub mod embedding;
pub mod planner;
pub mod rerank;
pub mod stream;
pub mod token;

mod error;

pub use error::{Error, Result};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName};
use serde_json::{Map, Value};

pub fn auth_headers(api_key: &str, default_headers: &Map<String, Value>) -> Result<HeaderMap> {
	let mut headers = HeaderMap::new();

	headers.insert(AUTHORIZATION, format!("Bearer {api_key}").parse()?);

	for (key, value) in default_headers {
		let Some(raw) = value.as_str() else {
			return Err(Error::InvalidConfig {
				message: "Default header values must be strings.".to_string(),
			});
		};

		headers.insert(HeaderName::from_bytes(key.as_bytes())?, raw.parse()?);
	}

	Ok(headers)
}

/// Maps a non-2xx answer to `Error::Status` so callers can treat it as transient.
pub(crate) fn check_status(res: reqwest::Response) -> Result<reqwest::Response> {
	let status = res.status();

	if !status.is_success() {
		return Err(Error::Status { status: status.as_u16() });
	}

	Ok(res)
}
