use serde::{Deserialize, Serialize};

/// A supported shipping provider.
///
/// Carriers are reference data: they are seeded out-of-band and only read by
/// the pipeline, which uses `slug` to pick the adapter for a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Carrier {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub website: Option<String>,
}
