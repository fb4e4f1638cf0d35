use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};
use thiserror::Error;

/// Coarse lifecycle state of a shipment or of a single tracking event.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Status {
    Pending,
    InTransit,
    Delivered,
    Failed,
    Cancelled,
}

/// Returned when a persisted or configured status string is not recognised.
#[derive(Debug, Clone, Error)]
#[error("unknown shipment status: {0:?}")]
pub struct ParseStatusError(pub String);

impl Status {
    /// Statuses that end scheduled polling for a shipment.
    pub const TERMINAL: [Status; 2] = [Status::Delivered, Status::Cancelled];

    /// Order in which keyword categories are tried when classifying carrier
    /// text. The first category that matches wins.
    pub const CLASSIFICATION_ORDER: [Status; 5] = [
        Status::Pending,
        Status::InTransit,
        Status::Failed,
        Status::Delivered,
        Status::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }

    /// Position of this status in [`Self::CLASSIFICATION_ORDER`].
    pub fn classification_rank(self) -> usize {
        Self::CLASSIFICATION_ORDER
            .iter()
            .position(|s| *s == self)
            .unwrap_or(Self::CLASSIFICATION_ORDER.len())
    }

    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Parse the stored text form, e.g. `"in_transit"`.
    pub fn parse(raw: &str) -> Result<Self, ParseStatusError> {
        raw.parse().map_err(|_| ParseStatusError(raw.to_owned()))
    }
}
