//! Carrier adapters.
//!
//! An adapter validates a tracking code, acquires the carrier's tracking page
//! through a [`PageFetcher`] and turns the timeline it finds into
//! [`EventCandidate`](trackeame_types::EventCandidate)s sorted oldest first.
//! Status classification is driven by per-carrier [`KeywordRules`].

pub mod adapter;
pub mod andreani;
pub mod correo_argentino;
pub mod error;
pub mod fetch;
pub mod normalize;
pub mod registry;
pub mod rules;
pub mod timeline;

pub use adapter::{CarrierAdapter, TrackRequest};
pub use error::AdapterError;
pub use fetch::{HttpFetcher, PageFetcher, PageMethod, PageRequest, RenderPermit, RenderedFetcher, Reveal};
pub use registry::{AcquisitionConfig, AdapterRegistry};
pub use rules::{KeywordRules, RuleBook};
