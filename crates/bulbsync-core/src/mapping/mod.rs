// ── Attribute mapping table ──
//
// Declarative rules in two directions:
//
// - `to_hub`: device key path -> hub attribute objects, flat fields, tags
// - `to_device`: hub verb -> device method + args, or a system directive
//
// Values are either static JSON or a named function resolved from a
// `ComputeRegistry` at load time. Tables are immutable once built and
// shared behind an `Arc`.

mod builtin;
mod compute;
mod load;

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use bulbsync_api::Nva;

use crate::model::DeviceRecord;

pub use compute::ComputeRegistry;

/// Projection from a device record to a hub value.
pub type StateFn = fn(&DeviceRecord) -> Value;

/// Projection from an inbound command to a device method name or args.
pub type CommandFn = fn(&CommandContext<'_>) -> Value;

/// Input to a [`CommandFn`].
#[derive(Debug, Clone, Copy)]
pub struct CommandContext<'a> {
    pub command: &'a Nva,
    pub current_state: Option<&'a DeviceRecord>,
}

impl CommandContext<'_> {
    pub fn adverb(&self, key: &str) -> Option<&Value> {
        self.command.adverb.get(key)
    }
}

// ── ValueSpec ────────────────────────────────────────────────────────

/// A named function pointer from the registry.
#[derive(Debug, Clone, Copy)]
pub struct Computed<F> {
    pub name: &'static str,
    pub func: F,
}

/// A mapped value: literal, or computed at read time.
#[derive(Debug, Clone)]
pub enum ValueSpec<F> {
    Static(Value),
    Computed(Computed<F>),
}

impl ValueSpec<StateFn> {
    pub fn resolve(&self, device: &DeviceRecord) -> Value {
        match self {
            Self::Static(value) => value.clone(),
            Self::Computed(c) => (c.func)(device),
        }
    }
}

impl ValueSpec<CommandFn> {
    pub fn resolve(&self, ctx: &CommandContext<'_>) -> Value {
        match self {
            Self::Static(value) => value.clone(),
            Self::Computed(c) => (c.func)(ctx),
        }
    }
}

impl<F> PartialEq for ValueSpec<F> {
    /// Computed values compare by registry name.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Static(a), Self::Static(b)) => a == b,
            (Self::Computed(a), Self::Computed(b)) => a.name == b.name,
            _ => false,
        }
    }
}

impl<F> Serialize for ValueSpec<F> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Static(value) => value.serialize(serializer),
            Self::Computed(c) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(load::COMPUTE_KEY, c.name)?;
                map.end()
            }
        }
    }
}

// ── Table schema ─────────────────────────────────────────────────────

/// The full mapping table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingTable {
    pub to_hub: ToHub,
    pub to_device: ToDevice,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToHub {
    /// Device key path -> nested hub attribute objects plus tags.
    pub state_objects: IndexMap<String, StateObjectEntry>,
    /// Device key path -> one flat hub field.
    pub state_fields: IndexMap<String, StateFieldEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateObjectEntry {
    /// Hub key -> value. Object values become nested hub sub-objects.
    pub thing_state: IndexMap<String, ValueSpec<StateFn>>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub tags: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateFieldEntry {
    pub thing_state: FieldProjection,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldProjection {
    pub name: String,
    pub value: ValueSpec<StateFn>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToDevice {
    /// First verb segment that marks a system command.
    pub system_namespace: String,
    pub device: IndexMap<String, DeviceVerb>,
    pub system: IndexMap<String, SystemVerb>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceVerb {
    /// Device method to invoke.
    pub name: ValueSpec<CommandFn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<ValueSpec<CommandFn>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemVerb {
    pub is_system_configurable: bool,
}

pub const DEFAULT_SYSTEM_NAMESPACE: &str = "darwin";

impl MappingTable {
    /// The light-bulb table used when no mapping file is configured.
    pub fn builtin() -> Self {
        builtin::table()
    }

    /// `true` when the verb's first `/` segment is the system namespace.
    pub fn is_system_verb(&self, verb: &str) -> bool {
        verb.split('/').next() == Some(self.to_device.system_namespace.as_str())
    }

    /// `true` if either direction table knows the verb.
    pub fn is_supported_verb(&self, verb: &str) -> bool {
        self.to_device.device.contains_key(verb) || self.to_device.system.contains_key(verb)
    }
}
