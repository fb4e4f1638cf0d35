//! Shared domain model for the trackeame workspace.
//!
//! These types are plain data: they carry no persistence or I/O logic so that
//! the carrier adapters, the sync pipeline and the HTTP surface can all agree
//! on one vocabulary.

mod carrier;
mod event;
mod shipment;
mod status;

pub use carrier::Carrier;
pub use event::{EventCandidate, TrackingEvent};
pub use shipment::{Shipment, ShipmentSnapshot, User};
pub use status::{ParseStatusError, Status};

use chrono::{DateTime, SecondsFormat, Utc};

/// Canonical text form used for every persisted timestamp.
///
/// Fixed precision and a `Z` suffix keep the text lexicographically ordered,
/// which the store relies on for `(shipment, occurred_at)` uniqueness and for
/// comparing event times in SQL.
pub fn timestamp_text(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Generate a fresh surrogate identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
