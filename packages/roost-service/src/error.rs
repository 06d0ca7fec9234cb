use roost_domain::{distance::DistanceError, observation::ObservationError, score::ScoreError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Domain error: {message}")]
	Domain { message: String },
	#[error("Background task failed: {message}")]
	Task { message: String },
}
impl From<roost_storage::Error> for Error {
	fn from(err: roost_storage::Error) -> Self {
		match err {
			roost_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			roost_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			roost_storage::Error::NotFound(message) => Self::NotFound { message },
			roost_storage::Error::Conflict(message) => Self::Storage { message },
		}
	}
}

impl From<roost_providers::Error> for Error {
	fn from(err: roost_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<ObservationError> for Error {
	fn from(err: ObservationError) -> Self {
		match err {
			ObservationError::ListingNotFound { .. } => Self::NotFound { message: err.to_string() },
			ObservationError::InvalidListing { .. } => Self::Domain { message: err.to_string() },
		}
	}
}

impl From<ScoreError> for Error {
	fn from(err: ScoreError) -> Self {
		Self::Domain { message: err.to_string() }
	}
}

impl From<DistanceError> for Error {
	fn from(err: DistanceError) -> Self {
		Self::Domain { message: err.to_string() }
	}
}

impl From<tokio::task::JoinError> for Error {
	fn from(err: tokio::task::JoinError) -> Self {
		Self::Task { message: err.to_string() }
	}
}
