// ── Domain model ──
//
// The two record shapes the reconciler compares. Wire decoding lives in
// `crate::convert`.

pub mod device;
pub mod hub;

pub use device::DeviceRecord;
pub use hub::{HubRecord, SourceLink};
