// ── Device-side record ──

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A device's latest reported state.
///
/// `state` is the full record as reported, `id` included, with key order
/// preserved. The core only reads it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct DeviceRecord {
    pub(crate) id: String,
    pub(crate) state: Map<String, Value>,
}

impl DeviceRecord {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &Map<String, Value> {
        &self.state
    }

    /// Look up a value by dotted key path (`"color.hue"`).
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.state.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

impl From<DeviceRecord> for Value {
    fn from(record: DeviceRecord) -> Self {
        Value::Object(record.state)
    }
}
