// ── Hub command translation ──
//
// Resolves an inbound NVA against the `to_device` table. Device verbs
// become a `{method, args}` call; verbs in the system namespace become a
// directive whose effect the caller applies.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use bulbsync_api::Nva;

use crate::error::BulbError;
use crate::mapping::{CommandContext, DeviceVerb, MappingTable, SystemVerb};
use crate::model::DeviceRecord;

/// A device method call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceOperation {
    pub method: String,
    pub args: Value,
}

/// A system verb to be applied by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemDirective {
    pub verb: String,
    pub is_system_configurable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Translation {
    Device(DeviceOperation),
    System(SystemDirective),
}

/// Translates hub commands through a shared mapping table.
#[derive(Debug, Clone)]
pub struct Translator {
    table: Arc<MappingTable>,
}

impl Translator {
    pub fn new(table: Arc<MappingTable>) -> Self {
        Self { table }
    }

    pub fn is_supported_verb(&self, verb: &str) -> bool {
        self.table.is_supported_verb(verb)
    }

    pub fn is_system_verb(&self, verb: &str) -> bool {
        self.table.is_system_verb(verb)
    }

    /// Check the verb and its required adverb fields without running any
    /// projection. System verbs carry no required fields.
    pub fn validate(&self, command: &Nva) -> Result<(), BulbError> {
        let verb = command.verb.as_str();
        if self.is_system_verb(verb) {
            self.system_entry(verb)?;
            return Ok(());
        }
        self.device_entry(command)?;
        Ok(())
    }

    /// Translate `command` given the device's current state, if known.
    ///
    /// Required adverb fields are checked in declaration order before any
    /// computed value runs; the first missing one is reported.
    pub fn translate(
        &self,
        command: &Nva,
        current_state: Option<&DeviceRecord>,
    ) -> Result<Translation, BulbError> {
        let verb = command.verb.as_str();

        if self.is_system_verb(verb) {
            let entry = self.system_entry(verb)?;
            return Ok(Translation::System(SystemDirective {
                verb: verb.into(),
                is_system_configurable: entry.is_system_configurable,
            }));
        }

        let entry = self.device_entry(command)?;
        let ctx = CommandContext {
            command,
            current_state,
        };

        let method = match entry.name.resolve(&ctx) {
            Value::String(method) => method,
            other => other.to_string(),
        };
        let args = entry
            .args
            .as_ref()
            .map_or(Value::Null, |args| args.resolve(&ctx));

        tracing::trace!(%verb, %method, "translated command");
        Ok(Translation::Device(DeviceOperation { method, args }))
    }

    fn system_entry(&self, verb: &str) -> Result<&SystemVerb, BulbError> {
        self.table
            .to_device
            .system
            .get(verb)
            .ok_or_else(|| BulbError::VerbNotSupported { verb: verb.into() })
    }

    /// The device entry for `command`, once its required fields are present.
    fn device_entry(&self, command: &Nva) -> Result<&DeviceVerb, BulbError> {
        let verb = command.verb.as_str();
        let entry = self
            .table
            .to_device
            .device
            .get(verb)
            .ok_or_else(|| BulbError::VerbNotSupported { verb: verb.into() })?;

        match entry
            .required_fields
            .iter()
            .find(|field| !command.adverb.contains_key(field.as_str()))
        {
            Some(field) => Err(BulbError::AdverbFieldRequired {
                field: field.clone(),
                verb: verb.into(),
            }),
            None => Ok(entry),
        }
    }
}
