// ── Computed value registry ──
//
// Mapping files reference functions by name (`{ compute: "power_state" }`).
// The registry resolves those names to function pointers once, at load.

use std::collections::HashMap;

use serde_json::{Map, Value, json};

use super::{CommandContext, CommandFn, Computed, StateFn};
use crate::model::DeviceRecord;

/// Named projection functions available to mapping tables.
#[derive(Debug, Clone, Default)]
pub struct ComputeRegistry {
    state: HashMap<&'static str, StateFn>,
    command: HashMap<&'static str, CommandFn>,
}

impl ComputeRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in function.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register_state("power_state", power_state)
            .register_state("color", color)
            .register_state("label", label)
            .register_command("power_toggle_args", power_toggle_args)
            .register_command("color_args", color_args)
            .register_command("label_args", label_args);
        registry
    }

    pub fn register_state(&mut self, name: &'static str, func: StateFn) -> &mut Self {
        self.state.insert(name, func);
        self
    }

    pub fn register_command(&mut self, name: &'static str, func: CommandFn) -> &mut Self {
        self.command.insert(name, func);
        self
    }

    pub(crate) fn state(&self, name: &str) -> Option<Computed<StateFn>> {
        self.state
            .get_key_value(name)
            .map(|(name, func)| Computed {
                name: *name,
                func: *func,
            })
    }

    pub(crate) fn command(&self, name: &str) -> Option<Computed<CommandFn>> {
        self.command
            .get_key_value(name)
            .map(|(name, func)| Computed {
                name: *name,
                func: *func,
            })
    }
}

pub(super) fn state_fn(name: &'static str, func: StateFn) -> Computed<StateFn> {
    Computed { name, func }
}

pub(super) fn command_fn(name: &'static str, func: CommandFn) -> Computed<CommandFn> {
    Computed { name, func }
}

// ── Device -> hub ────────────────────────────────────────────────────

const COLOR_COMPONENTS: [&str; 4] = ["hue", "saturation", "brightness", "kelvin"];

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n.abs() > 0.0),
        Some(Value::String(s)) => !s.is_empty() && !s.eq_ignore_ascii_case("off"),
        Some(Value::Array(_) | Value::Object(_)) => true,
        Some(Value::Null) | None => false,
    }
}

/// `"on"` / `"off"` from the device's `on` flag.
pub(super) fn power_state(device: &DeviceRecord) -> Value {
    let state = if truthy(device.get("on")) { "on" } else { "off" };
    Value::String(state.into())
}

/// The known color components of `color`, in canonical order.
pub(super) fn color(device: &DeviceRecord) -> Value {
    let mut out = Map::new();
    if let Some(Value::Object(color)) = device.get("color") {
        for component in COLOR_COMPONENTS {
            if let Some(v) = color.get(component) {
                out.insert(component.into(), v.clone());
            }
        }
    }
    Value::Object(out)
}

pub(super) fn label(device: &DeviceRecord) -> Value {
    device.get("label").cloned().unwrap_or(Value::Null)
}

// ── Hub -> device ────────────────────────────────────────────────────

fn duration(ctx: &CommandContext<'_>) -> Value {
    ctx.adverb("duration").cloned().unwrap_or_else(|| json!(0))
}

/// Flip the current power state. An unknown state toggles to on.
pub(super) fn power_toggle_args(ctx: &CommandContext<'_>) -> Value {
    let on = ctx
        .current_state
        .is_some_and(|device| truthy(device.get("on")));
    json!({ "on": !on, "duration": duration(ctx) })
}

pub(super) fn color_args(ctx: &CommandContext<'_>) -> Value {
    let mut args = Map::new();
    for component in COLOR_COMPONENTS {
        if let Some(v) = ctx.adverb(component) {
            args.insert(component.into(), v.clone());
        }
    }
    args.insert("duration".into(), duration(ctx));
    Value::Object(args)
}

pub(super) fn label_args(ctx: &CommandContext<'_>) -> Value {
    json!({ "label": ctx.adverb("value").cloned().unwrap_or(Value::Null) })
}
