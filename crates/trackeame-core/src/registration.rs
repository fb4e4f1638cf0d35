use chrono::Utc;
use tracing::{info, warn};
use trackeame_types::{Shipment, User, new_id};

use crate::error::RegistrationError;
use crate::pipeline::{Pipeline, PipelineStore};
use crate::queue::{FetchEvents, Job, initial_fetch_key};
use crate::store::{CarrierStore, ShipmentStore, TrackedShipment, UserStore, is_unique_violation};

impl<S: PipelineStore> Pipeline<S> {
    /// Register a tracking code for `user` and schedule its first fetch.
    ///
    /// The shipment is returned as soon as it is persisted; events arrive
    /// asynchronously through the queued fetch.
    pub async fn register(
        &self,
        user: &User,
        carrier_slug: &str,
        tracking_code: &str,
    ) -> Result<TrackedShipment, RegistrationError> {
        let tracking_code = tracking_code.trim();
        let carrier = self
            .store()
            .get_carrier_by_slug(carrier_slug)
            .await?
            .ok_or_else(|| RegistrationError::UnknownCarrier(carrier_slug.to_owned()))?;
        let adapter = self
            .adapters()
            .get(&carrier.slug)
            .ok_or_else(|| RegistrationError::UnsupportedCarrier(carrier.slug.clone()))?;
        adapter
            .validate(tracking_code)
            .map_err(RegistrationError::InvalidInput)?;

        self.store().upsert_user(&user.id, &user.email).await?;

        let now = Utc::now();
        let shipment = Shipment {
            id: new_id(),
            user_id: user.id.clone(),
            carrier_id: carrier.id.clone(),
            tracking_code: tracking_code.to_owned(),
            last_status: None,
            last_event_at: None,
            last_checked_at: now,
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.store().insert_shipment(&shipment).await {
            return Err(if is_unique_violation(&e) {
                RegistrationError::Duplicate {
                    carrier: carrier.slug,
                    tracking_code: shipment.tracking_code,
                }
            } else {
                e.into()
            });
        }
        info!(shipment_id = %shipment.id, user_id = %user.id, carrier = %carrier.slug, "shipment registered");

        let job = Job::FetchEvents(FetchEvents {
            shipment_id: shipment.id.clone(),
            carrier_slug: Some(carrier.slug.clone()),
            tracking_code: Some(shipment.tracking_code.clone()),
        });
        // The periodic resync picks the shipment up if this enqueue is lost.
        if let Err(e) = self
            .queue()
            .enqueue(&initial_fetch_key(&carrier.slug, &shipment.tracking_code), &job)
            .await
        {
            warn!(shipment_id = %shipment.id, error = %e, "failed to enqueue initial fetch");
        }

        Ok(TrackedShipment { shipment, carrier })
    }
}
