//! utm-core: Pure airspace rule engine for drone traffic management.
//!
//! No async, no I/O — just geometry predicates, the airspace data model,
//! and the violation detector. This crate is the shared core used by both
//! `utm-server` (ingest + web server) and `utm-sim` (telemetry simulator).

pub mod detect;
pub mod geometry;
pub mod snapshot;
pub mod types;
pub mod wire;

// Re-export commonly used items at crate root
pub use detect::detect;
pub use snapshot::AirspaceSnapshot;
pub use types::*;
pub use wire::{FeedEvent, RawTelemetry};
