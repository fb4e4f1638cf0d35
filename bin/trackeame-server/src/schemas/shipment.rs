use serde::{Deserialize, Serialize};
use trackeame_core::store::TrackedShipment;
use trackeame_types::TrackingEvent;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, Validate)]
pub struct CreateShipmentRequest {
    /// Carrier slug, e.g. `andreani`.
    #[validate(length(min = 1, max = 64))]
    pub carrier_slug: String,
    #[validate(length(min = 1, max = 64))]
    pub tracking_code: String,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    /// Page size, clamped to 1..=100 (default 10).
    pub limit: Option<u32>,
    /// 1-based page number.
    pub page: Option<u32>,
}

impl PageQuery {
    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.limit())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShipmentCarrier {
    pub slug: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShipmentResponse {
    pub id: String,
    pub carrier: ShipmentCarrier,
    pub tracking_code: String,
    /// Coarse status of the most recent event; absent before the first fetch.
    pub last_status: Option<String>,
    pub last_event_at: Option<String>,
    /// Advances on every successful sync.
    pub last_checked_at: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<TrackedShipment> for ShipmentResponse {
    fn from(TrackedShipment { shipment, carrier }: TrackedShipment) -> Self {
        Self {
            id: shipment.id,
            carrier: ShipmentCarrier {
                slug: carrier.slug,
                name: carrier.name,
            },
            tracking_code: shipment.tracking_code,
            last_status: shipment.last_status.map(|s| s.as_str().to_owned()),
            last_event_at: shipment.last_event_at.map(|t| t.to_rfc3339()),
            last_checked_at: shipment.last_checked_at.to_rfc3339(),
            created_at: shipment.created_at.to_rfc3339(),
            updated_at: shipment.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ShipmentPage {
    pub shipments: Vec<ShipmentResponse>,
    pub total: u64,
    pub limit: u32,
    pub page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventResponse {
    pub id: String,
    pub occurred_at: String,
    pub status: Option<String>,
    /// Carrier wording the status was classified from.
    pub raw_status: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
}

impl From<TrackingEvent> for EventResponse {
    fn from(event: TrackingEvent) -> Self {
        Self {
            id: event.id,
            occurred_at: event.occurred_at.to_rfc3339(),
            status: event.status.map(|s| s.as_str().to_owned()),
            raw_status: event.raw_status,
            description: event.description,
            location: event.location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_clamps() {
        let q = PageQuery {
            limit: Some(500),
            page: Some(0),
        };
        assert_eq!((q.limit(), q.page(), q.offset()), (100, 1, 0));

        let q = PageQuery {
            limit: Some(0),
            page: Some(3),
        };
        assert_eq!((q.limit(), q.page(), q.offset()), (1, 3, 2));

        let q = PageQuery::default();
        assert_eq!((q.limit(), q.page()), (10, 1));
    }

    #[test]
    fn create_request_rejects_blank_fields() {
        let req = CreateShipmentRequest {
            carrier_slug: "andreani".into(),
            tracking_code: String::new(),
        };
        assert!(req.validate().is_err());
    }
}
