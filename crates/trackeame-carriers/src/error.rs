use std::time::Duration;

use thiserror::Error;

/// Errors an adapter can surface while tracking a shipment.
///
/// The variants map one-to-one onto the pipeline's failure kinds so the worker
/// can decide whether a job is worth redelivering.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// The tracking code does not have the shape this carrier issues.
    #[error("invalid {carrier} tracking code {tracking_code:?}: {reason}")]
    InvalidInput {
        carrier: String,
        tracking_code: String,
        reason: String,
    },

    /// The carrier has no record for this tracking code.
    #[error("{carrier} has no tracking data for {tracking_code}")]
    NotFound {
        carrier: String,
        tracking_code: String,
    },

    /// Navigation or rendering exceeded its deadline.
    #[error("fetching {url} timed out after {}s", .after.as_secs())]
    FetchTimeout { url: String, after: Duration },

    /// Transport-level failure or an unexpected HTTP status.
    #[error("fetching {url} failed: {message}")]
    FetchFailure { url: String, message: String },

    /// The page did not have the shape the adapter expects.
    #[error("unexpected {carrier} markup: {message}")]
    ParseFailure { carrier: String, message: String },

    /// The HTTP client could not be constructed.
    #[error("http client setup failed: {0}")]
    ClientSetup(String),

    /// A keyword rule document could not be loaded.
    #[error("invalid keyword rules for {carrier}: {message}")]
    Rules { carrier: String, message: String },
}

impl AdapterError {
    /// Whether another attempt may succeed without anyone changing anything.
    ///
    /// Parse failures count as retryable: carrier pages flap, although a
    /// persistent one usually means the adapter needs updating.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::FetchTimeout { .. }
                | AdapterError::FetchFailure { .. }
                | AdapterError::ParseFailure { .. }
        )
    }

    pub(crate) fn fetch(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AdapterError::FetchTimeout {
                url: url.to_owned(),
                after: Duration::ZERO,
            }
        } else {
            AdapterError::FetchFailure {
                url: url.to_owned(),
                message: err.to_string(),
            }
        }
    }

    pub(crate) fn parse(carrier: &str, message: impl Into<String>) -> Self {
        AdapterError::ParseFailure {
            carrier: carrier.to_owned(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_kinds_are_retryable() {
        let not_found = AdapterError::NotFound {
            carrier: "andreani".into(),
            tracking_code: "X".into(),
        };
        let invalid = AdapterError::InvalidInput {
            carrier: "andreani".into(),
            tracking_code: "X".into(),
            reason: "too short".into(),
        };
        let timeout = AdapterError::FetchTimeout {
            url: "https://example.test".into(),
            after: Duration::from_secs(30),
        };
        assert!(!not_found.is_retryable());
        assert!(!invalid.is_retryable());
        assert!(timeout.is_retryable());
        assert!(AdapterError::parse("andreani", "no timeline").is_retryable());
    }

    #[test]
    fn timeout_message_reports_seconds() {
        let err = AdapterError::FetchTimeout {
            url: "https://example.test".into(),
            after: Duration::from_secs(30),
        };
        assert_eq!(
            err.to_string(),
            "fetching https://example.test timed out after 30s"
        );
    }
}
