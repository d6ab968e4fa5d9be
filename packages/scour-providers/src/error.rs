pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Reqwest(#[from] reqwest::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
	#[error(transparent)]
	InvalidHeaderName(#[from] reqwest::header::InvalidHeaderName),
	#[error(transparent)]
	InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),
	#[error("{message}")]
	InvalidConfig { message: String },
	#[error("{message}")]
	InvalidResponse { message: String },
	#[error("Upstream returned HTTP {status}.")]
	Status { status: u16 },
}
impl Error {
	/// Transport failures and non-2xx answers may succeed on a later attempt. Configuration and
	/// response-shape errors never do.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Reqwest(err) => !err.is_builder(),
			Self::Status { .. } => true,
			Self::SerdeJson(_)
			| Self::InvalidHeaderName(_)
			| Self::InvalidHeaderValue(_)
			| Self::InvalidConfig { .. }
			| Self::InvalidResponse { .. } => false,
		}
	}
}
