// ── Mapping file loading ──
//
// YAML (or JSON, which parses as YAML) in camelCase:
//
//   toHub:
//     stateObjects: { <path>: { thingState: { <hubKey>: value }, tags: {..} } }
//     stateFields:  { <path>: { thingState: { name, value } } }
//   toDevice:
//     systemNamespace: darwin
//     device: { <verb>: { name, args, requiredFields } }
//     system: { <verb>: { isSystemConfigurable } }
//
// Any value may be `{ compute: "<name>" }`, resolved against a registry.

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{
    CommandFn, ComputeRegistry, DEFAULT_SYSTEM_NAMESPACE, DeviceVerb, FieldProjection,
    MappingTable, StateFieldEntry, StateFn, StateObjectEntry, SystemVerb, ToDevice, ToHub,
    ValueSpec,
};
use crate::error::CoreError;

pub(super) const COMPUTE_KEY: &str = "compute";

// ── Raw schema ───────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawTable {
    #[serde(default)]
    to_hub: RawToHub,
    #[serde(default)]
    to_device: RawToDevice,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawToHub {
    #[serde(default)]
    state_objects: IndexMap<String, RawStateObject>,
    #[serde(default)]
    state_fields: IndexMap<String, RawStateField>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawStateObject {
    #[serde(default)]
    thing_state: IndexMap<String, Value>,
    #[serde(default)]
    tags: Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawStateField {
    thing_state: RawFieldProjection,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFieldProjection {
    name: String,
    value: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawToDevice {
    #[serde(default = "default_namespace")]
    system_namespace: String,
    #[serde(default)]
    device: IndexMap<String, RawDeviceVerb>,
    #[serde(default)]
    system: IndexMap<String, RawSystemVerb>,
}

impl Default for RawToDevice {
    fn default() -> Self {
        Self {
            system_namespace: default_namespace(),
            device: IndexMap::new(),
            system: IndexMap::new(),
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_SYSTEM_NAMESPACE.to_owned()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawDeviceVerb {
    name: Value,
    #[serde(default)]
    args: Option<Value>,
    #[serde(default)]
    required_fields: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawSystemVerb {
    #[serde(default)]
    is_system_configurable: bool,
}

// ── Resolution ───────────────────────────────────────────────────────

fn compute_name(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get(COMPUTE_KEY)?.as_str(),
        _ => None,
    }
}

fn mapping_error(message: String) -> CoreError {
    CoreError::Mapping { message }
}

fn state_spec(
    value: Value,
    registry: &ComputeRegistry,
    at: &str,
) -> Result<ValueSpec<StateFn>, CoreError> {
    match compute_name(&value) {
        Some(name) => registry
            .state(name)
            .map(ValueSpec::Computed)
            .ok_or_else(|| mapping_error(format!("{at}: unknown state function `{name}`"))),
        None => Ok(ValueSpec::Static(value)),
    }
}

fn command_spec(
    value: Value,
    registry: &ComputeRegistry,
    at: &str,
) -> Result<ValueSpec<CommandFn>, CoreError> {
    match compute_name(&value) {
        Some(name) => registry
            .command(name)
            .map(ValueSpec::Computed)
            .ok_or_else(|| mapping_error(format!("{at}: unknown command function `{name}`"))),
        None => Ok(ValueSpec::Static(value)),
    }
}

fn resolve(raw: RawTable, registry: &ComputeRegistry) -> Result<MappingTable, CoreError> {
    let mut state_objects = IndexMap::with_capacity(raw.to_hub.state_objects.len());
    for (path, entry) in raw.to_hub.state_objects {
        let mut thing_state = IndexMap::with_capacity(entry.thing_state.len());
        for (hub_key, value) in entry.thing_state {
            let at = format!("stateObjects.{path}.{hub_key}");
            thing_state.insert(hub_key, state_spec(value, registry, &at)?);
        }
        state_objects.insert(
            path,
            StateObjectEntry {
                thing_state,
                tags: entry.tags,
            },
        );
    }

    let mut state_fields = IndexMap::with_capacity(raw.to_hub.state_fields.len());
    for (path, entry) in raw.to_hub.state_fields {
        let at = format!("stateFields.{path}");
        let RawFieldProjection { name, value } = entry.thing_state;
        let value = state_spec(value, registry, &at)?;
        state_fields.insert(
            path,
            StateFieldEntry {
                thing_state: FieldProjection { name, value },
            },
        );
    }

    let namespace = raw.to_device.system_namespace;
    if namespace.is_empty() || namespace.contains('/') {
        return Err(mapping_error(format!(
            "systemNamespace must be a single verb segment, got `{namespace}`"
        )));
    }
    let in_namespace = |verb: &str| verb.split('/').next() == Some(namespace.as_str());

    let mut device = IndexMap::with_capacity(raw.to_device.device.len());
    for (verb, entry) in raw.to_device.device {
        if in_namespace(&verb) {
            return Err(mapping_error(format!(
                "device verb `{verb}` uses the system namespace `{namespace}`"
            )));
        }
        let at = format!("device.{verb}");
        let name = command_spec(entry.name, registry, &format!("{at}.name"))?;
        let args = entry
            .args
            .map(|args| command_spec(args, registry, &format!("{at}.args")))
            .transpose()?;
        device.insert(
            verb,
            DeviceVerb {
                name,
                args,
                required_fields: entry.required_fields,
            },
        );
    }

    let mut system = IndexMap::with_capacity(raw.to_device.system.len());
    for (verb, entry) in raw.to_device.system {
        if !in_namespace(&verb) {
            return Err(mapping_error(format!(
                "system verb `{verb}` is outside the system namespace `{namespace}`"
            )));
        }
        system.insert(
            verb,
            SystemVerb {
                is_system_configurable: entry.is_system_configurable,
            },
        );
    }

    Ok(MappingTable {
        to_hub: ToHub {
            state_objects,
            state_fields,
        },
        to_device: ToDevice {
            system_namespace: namespace,
            device,
            system,
        },
    })
}

impl MappingTable {
    /// Parse a table from YAML or JSON text.
    pub fn from_yaml_str(source: &str, registry: &ComputeRegistry) -> Result<Self, CoreError> {
        let raw: RawTable = serde_yaml::from_str(source)
            .map_err(|e| mapping_error(format!("invalid mapping table: {e}")))?;
        resolve(raw, registry)
    }

    /// Read and parse a table file.
    pub fn load(path: &Path, registry: &ComputeRegistry) -> Result<Self, CoreError> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| mapping_error(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml_str(&source, registry)
    }

    /// Render the table in the same format `from_yaml_str` reads.
    pub fn to_yaml(&self) -> Result<String, CoreError> {
        serde_yaml::to_string(self).map_err(|e| CoreError::Internal(e.to_string()))
    }
}
