use serde::{Deserialize, Serialize};
use trackeame_types::Carrier;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CarrierResponse {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub website: Option<String>,
    /// Whether tracking codes for this carrier can be registered.
    pub supported: bool,
}

impl CarrierResponse {
    pub fn new(carrier: Carrier, supported: bool) -> Self {
        Self {
            id: carrier.id,
            name: carrier.name,
            slug: carrier.slug,
            website: carrier.website,
            supported,
        }
    }
}
