use thiserror::Error;
use trackeame_carriers::AdapterError;

use crate::ingest::IngestError;

/// Why a sync job did not complete.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("shipment {0} not found")]
    ShipmentNotFound(String),

    /// The carrier exists but no adapter serves it.
    #[error("no adapter registered for carrier {0:?}")]
    UnknownCarrier(String),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("invalid job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("unknown job name {0:?}")]
    UnknownJob(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),
}

impl SyncError {
    /// Whether redelivering the job may succeed.
    ///
    /// Missing data, configuration gaps and malformed input are final;
    /// transport, markup and persistence failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Adapter(err) => err.is_retryable(),
            SyncError::Ingest(_) | SyncError::Persistence(_) => true,
            SyncError::ShipmentNotFound(_)
            | SyncError::UnknownCarrier(_)
            | SyncError::Payload(_)
            | SyncError::UnknownJob(_) => false,
        }
    }

    /// Short machine-readable kind, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Adapter(AdapterError::InvalidInput { .. }) => "invalid_input",
            SyncError::Adapter(AdapterError::NotFound { .. }) | SyncError::ShipmentNotFound(_) => "not_found",
            SyncError::Adapter(AdapterError::FetchTimeout { .. }) => "fetch_timeout",
            SyncError::Adapter(AdapterError::FetchFailure { .. }) => "fetch_failure",
            SyncError::Adapter(AdapterError::ParseFailure { .. }) => "parse_failure",
            SyncError::Adapter(AdapterError::Rules { .. } | AdapterError::ClientSetup(_))
            | SyncError::UnknownCarrier(_) => "configuration",
            SyncError::Ingest(_) | SyncError::Persistence(_) => "persistence_failure",
            SyncError::Payload(_) | SyncError::UnknownJob(_) => "bad_job",
        }
    }
}

/// Why a shipment could not be registered.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    InvalidInput(AdapterError),

    #[error("unknown carrier {0:?}")]
    UnknownCarrier(String),

    #[error("carrier {0:?} is not supported yet")]
    UnsupportedCarrier(String),

    #[error("shipment {tracking_code} with {carrier} is already registered")]
    Duplicate { carrier: String, tracking_code: String },

    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),
}
