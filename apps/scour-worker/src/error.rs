pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("{0}")]
	Validation(String),
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error(transparent)]
	Storage(#[from] scour_storage::Error),
	#[error(transparent)]
	Provider(#[from] scour_providers::Error),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
}
