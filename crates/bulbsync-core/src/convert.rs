// ── Wire-to-domain conversions ──
//
// Device records arrive as raw JSON from the device proxy or the bus;
// hub records arrive as `HubThing`s inside NVA responses. Both are
// normalized into `crate::model` here.

use serde_json::Value;

use bulbsync_api::{HubThing, SourceRef};

use crate::error::CoreError;
use crate::model::{DeviceRecord, HubRecord, SourceLink};

// ── Device ─────────────────────────────────────────────────────────

impl TryFrom<Value> for DeviceRecord {
    type Error = CoreError;

    /// The payload must be an object with a string `id`. An empty id is
    /// accepted; hub-side naming falls back to a sentinel for it.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(state) = value else {
            return Err(CoreError::InvalidDeviceRecord {
                message: format!("expected an object, got {}", json_kind(&value)),
            });
        };

        let id = match state.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => {
                return Err(CoreError::InvalidDeviceRecord {
                    message: format!("`id` must be a string, got {}", json_kind(other)),
                });
            }
            None => {
                return Err(CoreError::InvalidDeviceRecord {
                    message: "missing `id`".into(),
                });
            }
        };

        Ok(Self { id, state })
    }
}

// ── Hub ────────────────────────────────────────────────────────────

impl From<HubThing> for HubRecord {
    fn from(thing: HubThing) -> Self {
        Self {
            id: thing.id,
            source: thing.source.map(|s| SourceLink {
                translator_id: s.translator,
                device_id: s.id,
            }),
            reachable: thing.reachable,
            tags: thing.tags,
            attributes: thing.attributes,
        }
    }
}

impl From<HubRecord> for HubThing {
    fn from(record: HubRecord) -> Self {
        Self {
            id: record.id,
            source: record.source.map(|s| SourceRef {
                translator: s.translator_id,
                id: s.device_id,
            }),
            reachable: record.reachable,
            tags: record.tags,
            attributes: record.attributes,
        }
    }
}

impl TryFrom<Value> for HubRecord {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        serde_json::from_value::<HubThing>(value)
            .map(Self::from)
            .map_err(|e| CoreError::InvalidHubRecord {
                message: e.to_string(),
            })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
