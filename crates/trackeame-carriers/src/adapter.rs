use std::fmt;

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use trackeame_types::EventCandidate;

use crate::error::AdapterError;
use crate::normalize::squash_whitespace;

/// What an adapter needs to look a shipment up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRequest {
    pub shipment_id: String,
    pub carrier_slug: String,
    pub tracking_code: String,
}

/// Carrier-specific logic that turns a carrier's tracking surface into an
/// ascending list of normalized events.
#[async_trait]
pub trait CarrierAdapter: Send + Sync + fmt::Debug {
    /// Slug of the carrier this adapter serves, e.g. `"andreani"`.
    fn slug(&self) -> &str;

    /// Local shape check of a tracking code. Never touches the network.
    fn validate(&self, tracking_code: &str) -> Result<(), AdapterError>;

    /// Acquire and parse the carrier's timeline.
    ///
    /// Implementations return events sorted by `occurred_at` ascending and
    /// fail with [`AdapterError::NotFound`] rather than returning an empty
    /// list when the carrier has nothing for the code.
    async fn fetch_timeline(&self, request: &TrackRequest) -> Result<Vec<EventCandidate>, AdapterError>;

    /// Validate, then fetch.
    async fn track(&self, request: &TrackRequest) -> Result<Vec<EventCandidate>, AdapterError> {
        self.validate(&request.tracking_code)?;
        let events = self.fetch_timeline(request).await?;
        debug!(
            carrier = self.slug(),
            shipment_id = %request.shipment_id,
            events = events.len(),
            "carrier timeline fetched"
        );
        Ok(events)
    }
}

/// Check that `code` is exactly `len` ASCII uppercase letters or digits.
pub fn check_code_shape(carrier: &str, code: &str, len: usize, hint: &str) -> Result<(), AdapterError> {
    let valid = code.len() == len
        && code
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(AdapterError::InvalidInput {
            carrier: carrier.to_owned(),
            tracking_code: code.to_owned(),
            reason: hint.to_owned(),
        })
    }
}

pub(crate) fn selector(carrier: &str, css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::parse(carrier, format!("bad selector {css:?}: {e}")))
}

/// Whitespace-normalized text content of an element.
pub(crate) fn text_of(element: ElementRef<'_>) -> String {
    squash_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

pub(crate) fn page_text(document: &Html) -> String {
    text_of(document.root_element())
}
