// ── NVA wire types ──
//
// The noun-verb-adverb triple is the unit exchanged with the hub in both
// directions. Hub things come back inside `{ data: ... }` envelopes whose
// payload may be a single record, a list, or nothing at all.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Verb used to create a hub thing.
pub const VERB_CREATE: &str = "create";
/// Verb used to set attributes on a hub thing.
pub const VERB_SET: &str = "set";
/// Verb used to attach tags to a hub thing.
pub const VERB_TAG: &str = "tag";
/// Verb used to query hub things.
pub const VERB_GET: &str = "get";

/// A noun-verb-adverb command.
///
/// `noun` is the hub thing id and is omitted for `create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nva {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noun: Option<String>,
    pub verb: String,
    #[serde(default)]
    pub adverb: Map<String, Value>,
}

impl Nva {
    pub fn create(adverb: Map<String, Value>) -> Self {
        Self {
            noun: None,
            verb: VERB_CREATE.into(),
            adverb,
        }
    }

    pub fn set(noun: impl Into<String>, adverb: Map<String, Value>) -> Self {
        Self {
            noun: Some(noun.into()),
            verb: VERB_SET.into(),
            adverb,
        }
    }

    pub fn tag(noun: impl Into<String>, adverb: Map<String, Value>) -> Self {
        Self {
            noun: Some(noun.into()),
            verb: VERB_TAG.into(),
            adverb,
        }
    }

    pub fn get(adverb: Map<String, Value>) -> Self {
        Self {
            noun: None,
            verb: VERB_GET.into(),
            adverb,
        }
    }
}

/// Back-reference from a hub thing to the device it mirrors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    /// Translator that owns the thing.
    pub translator: String,
    /// Device identifier on the device side.
    pub id: String,
}

/// A hub thing as the hub serializes it.
///
/// Everything besides the well-known keys lands in `attributes`, so
/// nothing the hub sends is silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubThing {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reachable: Option<bool>,
    #[serde(default)]
    pub tags: Map<String, Value>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// One entry of an `execute` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NvaResponse {
    #[serde(default)]
    pub data: Value,
}

impl NvaResponse {
    /// Decode the payload as hub things.
    ///
    /// Accepts a single object, a list of objects, or `null` (no things).
    pub fn things(&self) -> Result<Vec<HubThing>, serde_json::Error> {
        match &self.data {
            Value::Null => Ok(Vec::new()),
            Value::Array(_) => serde_json::from_value(self.data.clone()),
            _ => serde_json::from_value(self.data.clone()).map(|thing| vec![thing]),
        }
    }
}

/// Structured failure carried back to the command issuer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NvaErrorBody {
    pub code: String,
    pub reason: String,
}

/// Per-command outcome of a batched NVA message.
///
/// `status` is `1` on success and `0` on failure, matching what the hub
/// expects on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NvaStatus {
    pub status: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NvaErrorBody>,
}

impl NvaStatus {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            status: 1,
            data,
            error: None,
        }
    }

    pub fn failed(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: 0,
            data: None,
            error: Some(NvaErrorBody {
                code: code.into(),
                reason: reason.into(),
            }),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 1
    }
}
