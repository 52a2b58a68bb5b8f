// ── Built-in light bulb table ──

use indexmap::IndexMap;
use serde_json::{Map, Value, json};

use super::compute::{self, command_fn, state_fn};
use super::{
    DEFAULT_SYSTEM_NAMESPACE, DeviceVerb, FieldProjection, MappingTable, StateFieldEntry,
    StateObjectEntry, SystemVerb, ToDevice, ToHub, ValueSpec,
};

fn tags(pairs: &[(&str, &str)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), Value::String((*v).to_owned())))
        .collect()
}

fn static_verb(method: &str, args: Value) -> DeviceVerb {
    DeviceVerb {
        name: ValueSpec::Static(json!(method)),
        args: Some(ValueSpec::Static(args)),
        required_fields: Vec::new(),
    }
}

pub(super) fn table() -> MappingTable {
    let mut state_objects = IndexMap::new();
    state_objects.insert(
        "on".to_owned(),
        StateObjectEntry {
            thing_state: IndexMap::from([(
                "state".to_owned(),
                ValueSpec::Computed(state_fn("power_state", compute::power_state)),
            )]),
            tags: tags(&[
                ("power", "base/power"),
                ("light", "light"),
                ("bulb", "darwin-demo-bulb"),
            ]),
        },
    );
    state_objects.insert(
        "color".to_owned(),
        StateObjectEntry {
            thing_state: IndexMap::from([(
                "color".to_owned(),
                ValueSpec::Computed(state_fn("color", compute::color)),
            )]),
            tags: tags(&[("color", "base/color")]),
        },
    );

    let mut state_fields = IndexMap::new();
    state_fields.insert(
        "label".to_owned(),
        StateFieldEntry {
            thing_state: FieldProjection {
                name: "label".to_owned(),
                value: ValueSpec::Computed(state_fn("label", compute::label)),
            },
        },
    );

    let mut device = IndexMap::new();
    device.insert("base/power/on".to_owned(), static_verb("setPower", json!({ "on": true })));
    device.insert("base/power/off".to_owned(), static_verb("setPower", json!({ "on": false })));
    device.insert(
        "base/power/toggle".to_owned(),
        DeviceVerb {
            name: ValueSpec::Static(json!("setPower")),
            args: Some(ValueSpec::Computed(command_fn(
                "power_toggle_args",
                compute::power_toggle_args,
            ))),
            required_fields: Vec::new(),
        },
    );
    device.insert(
        "base/color/set".to_owned(),
        DeviceVerb {
            name: ValueSpec::Static(json!("setColor")),
            args: Some(ValueSpec::Computed(command_fn("color_args", compute::color_args))),
            required_fields: vec!["hue".to_owned()],
        },
    );
    device.insert(
        "base/label/set".to_owned(),
        DeviceVerb {
            name: ValueSpec::Static(json!("setLabel")),
            args: Some(ValueSpec::Computed(command_fn("label_args", compute::label_args))),
            required_fields: vec!["value".to_owned()],
        },
    );

    let mut system = IndexMap::new();
    system.insert(
        format!("{DEFAULT_SYSTEM_NAMESPACE}/thing/setsource_id"),
        SystemVerb {
            is_system_configurable: true,
        },
    );

    MappingTable {
        to_hub: ToHub {
            state_objects,
            state_fields,
        },
        to_device: ToDevice {
            system_namespace: DEFAULT_SYSTEM_NAMESPACE.to_owned(),
            device,
            system,
        },
    }
}
