//! Reconciliation engine between a device fleet and a hub.
//!
//! This crate owns the translator's logic; transports live in
//! `bulbsync-api` behind the [`HubChannel`](bulbsync_api::HubChannel) and
//! [`DeviceClient`](bulbsync_api::DeviceClient) traits.
//!
//! - **[`Bridge`]** drives the runtime: it turns device observations into
//!   hub `create`/`set`/`tag` commands and answers batched hub commands by
//!   invoking device methods. Cycles for one device are serialized.
//!
//! - **[`Reconciler`]** computes the minimal [`PatchSet`] that brings hub
//!   records in line with observed devices.
//!
//! - **[`Translator`]** resolves an inbound command to a device operation or
//!   a system directive.
//!
//! - **[`MappingTable`]** holds the declarative rules both directions use.
//!   Tables load from YAML; computed values resolve through a
//!   [`ComputeRegistry`].
//!
//! - **[`RelationStore`]** indexes `hub id <-> device id` links.

pub mod bridge;
pub mod config;
pub mod convert;
pub mod error;
pub mod flatten;
pub mod mapping;
pub mod model;
pub mod reconcile;
pub mod store;
pub mod translate;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bridge::{Bridge, CycleReport};
pub use config::BridgeConfig;
pub use error::{BulbError, CoreError, ErrorCode};
pub use flatten::flatten;
pub use mapping::{ComputeRegistry, MappingTable};
pub use model::{DeviceRecord, HubRecord, SourceLink};
pub use reconcile::{PatchSet, Reconciler};
pub use store::{Relation, RelationStore};
pub use translate::{DeviceOperation, SystemDirective, Translation, Translator};
