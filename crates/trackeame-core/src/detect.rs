//! Change detection between the pre- and post-fetch state of a shipment.

use trackeame_types::ShipmentSnapshot;

/// What changed across a fetch, if anything worth telling the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    StatusChanged,
    /// Same coarse status, but the timeline grew.
    NewEvents { added: u64 },
}

/// Compare snapshots taken before and after ingestion.
pub fn detect(before: &ShipmentSnapshot, after: &ShipmentSnapshot) -> Option<Change> {
    if before.last_status != after.last_status {
        Some(Change::StatusChanged)
    } else if after.event_count > before.event_count {
        Some(Change::NewEvents {
            added: after.event_count - before.event_count,
        })
    } else {
        None
    }
}
