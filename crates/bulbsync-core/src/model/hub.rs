// ── Hub-side record ──

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use bulbsync_api::HubThing;

/// Back-reference from a hub record to the device it mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLink {
    pub translator_id: String,
    pub device_id: String,
}

/// The hub's canonical view of one device.
///
/// `attributes` holds every top-level key besides `id`, `source`,
/// `reachable` and `tags`. `reachable` is `None` when the hub never set it.
/// Serializes in the hub's wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "HubThing")]
pub struct HubRecord {
    pub id: String,
    pub source: Option<SourceLink>,
    pub reachable: Option<bool>,
    pub tags: Map<String, Value>,
    pub attributes: Map<String, Value>,
}

impl HubRecord {
    /// Device id this record mirrors, if it carries a source link.
    pub fn device_id(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.device_id.as_str())
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable == Some(true)
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}
