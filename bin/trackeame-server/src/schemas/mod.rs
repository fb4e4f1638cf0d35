//! Request and response bodies of the HTTP surface.

pub mod carrier;
pub mod job;
pub mod shipment;
