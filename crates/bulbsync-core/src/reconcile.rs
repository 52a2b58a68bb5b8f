// ── State reconciliation ──
//
// Compares observed device records against the hub's records and emits
// the smallest command set that brings the hub in line:
//
// - unknown device       -> one `create`
// - known device         -> `tag` and/or `set` with changed values only
// - vanished + reachable -> `set { reachable: false }`
//
// String values compare case-insensitively; everything else strictly.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value, json};

use bulbsync_api::Nva;

use crate::flatten::flatten;
use crate::mapping::MappingTable;
use crate::model::{DeviceRecord, HubRecord};

/// Hub-side name used when a device reports an empty id.
pub const UNSIGNED_NAME: &str = "unsigned";

/// Output of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatchSet {
    pub create: Vec<Nva>,
    pub update: Vec<Nva>,
}

impl PatchSet {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty()
    }
}

/// A device record projected through the `to_hub` table.
#[derive(Debug, Default)]
struct Projection {
    objects: Map<String, Value>,
    fields: Map<String, Value>,
    tags: Map<String, Value>,
}

/// Computes hub patches for one translator.
#[derive(Debug, Clone)]
pub struct Reconciler {
    translator_id: String,
    table: Arc<MappingTable>,
}

impl Reconciler {
    pub fn new(translator_id: impl Into<String>, table: Arc<MappingTable>) -> Self {
        Self {
            translator_id: translator_id.into(),
            table,
        }
    }

    pub fn translator_id(&self) -> &str {
        &self.translator_id
    }

    /// Diff `observed` against `current`.
    ///
    /// Duplicate ids on either side resolve last-write-wins. Commands keep
    /// input order: observed records first, then disappearances.
    pub fn reconcile(&self, observed: &[DeviceRecord], current: &[HubRecord]) -> PatchSet {
        let mut hub_by_device: IndexMap<&str, &HubRecord> = IndexMap::new();
        for record in current {
            if let Some(device_id) = record.device_id() {
                hub_by_device.insert(device_id, record);
            }
        }

        let mut observed_by_id: IndexMap<&str, &DeviceRecord> = IndexMap::new();
        for record in observed {
            observed_by_id.insert(record.id(), record);
        }

        let mut patch = PatchSet::default();

        for (device_id, device) in &observed_by_id {
            match hub_by_device.get(device_id) {
                Some(hub) => patch.update.extend(self.diff(device, hub)),
                None => patch.create.push(self.create_command(device)),
            }
        }

        for (device_id, hub) in &hub_by_device {
            if !observed_by_id.contains_key(device_id) && hub.is_reachable() {
                tracing::debug!(%device_id, hub_id = %hub.id, "device vanished, marking unreachable");
                patch.update.push(Nva::set(hub.id.clone(), object(json!({ "reachable": false }))));
            }
        }

        patch
    }

    /// `tag` then `set` for a known device; either may be absent.
    pub fn diff(&self, device: &DeviceRecord, hub: &HubRecord) -> Vec<Nva> {
        let projection = self.project(device);
        let mut changes = Map::new();

        for (hub_key, projected) in projection.objects {
            let current = hub.attribute(&hub_key);
            match projected {
                Value::Object(inner) => {
                    let changed = changed_entries(inner, current.and_then(Value::as_object));
                    if !changed.is_empty() {
                        changes.insert(hub_key, Value::Object(changed));
                    }
                }
                scalar => {
                    if !values_match(&scalar, current) {
                        changes.insert(hub_key, scalar);
                    }
                }
            }
        }

        for (name, projected) in projection.fields {
            if !values_match(&projected, hub.attribute(&name)) {
                changes.insert(name, projected);
            }
        }

        if hub.reachable == Some(false) {
            changes.insert("reachable".into(), Value::Bool(true));
        }

        let tags = changed_entries(projection.tags, Some(&hub.tags));

        let mut commands = Vec::with_capacity(2);
        if !tags.is_empty() {
            commands.push(Nva::tag(hub.id.clone(), tags));
        }
        if !changes.is_empty() {
            commands.push(Nva::set(hub.id.clone(), changes));
        }
        commands
    }

    /// `create` for a device the hub has never seen.
    pub fn create_command(&self, device: &DeviceRecord) -> Nva {
        let projection = self.project(device);

        let name = if device.id().is_empty() {
            UNSIGNED_NAME.to_owned()
        } else {
            device.id().to_lowercase()
        };

        let mut adverb = Map::new();
        adverb.insert("name".into(), Value::String(name));
        adverb.insert("tags".into(), Value::Object(projection.tags));
        adverb.insert(
            "source".into(),
            json!({ "translator": self.translator_id, "id": device.id() }),
        );
        adverb.extend(projection.objects);

        Nva::create(adverb)
    }

    fn project(&self, device: &DeviceRecord) -> Projection {
        let to_hub = &self.table.to_hub;
        let mut projection = Projection::default();

        for path in flatten(device.state()) {
            if let Some(entry) = to_hub.state_objects.get(&path) {
                for (hub_key, spec) in &entry.thing_state {
                    projection.objects.insert(hub_key.clone(), spec.resolve(device));
                }
                projection
                    .tags
                    .extend(entry.tags.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            if let Some(entry) = to_hub.state_fields.get(&path) {
                let field = &entry.thing_state;
                projection.fields.insert(field.name.clone(), field.value.resolve(device));
            }
        }

        projection
    }
}

/// Entries of `projected` that differ from `current`.
fn changed_entries(
    projected: Map<String, Value>,
    current: Option<&Map<String, Value>>,
) -> Map<String, Value> {
    projected
        .into_iter()
        .filter(|(key, value)| !values_match(value, current.and_then(|c| c.get(key))))
        .collect()
}

/// Case-insensitive for two strings, strict otherwise. A missing current
/// value never matches.
pub fn values_match(projected: &Value, current: Option<&Value>) -> bool {
    match (projected, current) {
        (Value::String(a), Some(Value::String(b))) => a.to_lowercase() == b.to_lowercase(),
        (a, Some(b)) => a == b,
        (_, None) => false,
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
