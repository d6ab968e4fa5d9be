pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Configuration error: {message}")]
	Configuration { message: String },
	#[error("Sub-query generation failed: {message}")]
	SubqueryGeneration { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String, transient: bool },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	/// Whether retrying the same call may succeed.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Provider { transient: true, .. })
	}
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
impl From<scour_storage::Error> for Error {
	fn from(err: scour_storage::Error) -> Self {
		match err {
			scour_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			scour_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
		}
	}
}
impl From<scour_providers::Error> for Error {
	fn from(err: scour_providers::Error) -> Self {
		match err {
			scour_providers::Error::InvalidConfig { message } => Self::Configuration { message },
			other => Self::Provider { transient: other.is_transient(), message: other.to_string() },
		}
	}
}
