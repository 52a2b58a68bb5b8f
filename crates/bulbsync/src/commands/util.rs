//! Shared helpers for command handlers.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use bulbsync_config::Config;
use bulbsync_core::{ComputeRegistry, MappingTable};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Read and parse a JSON file.
pub fn read_json_file(path: &Path) -> Result<Value, CliError> {
    let contents = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| CliError::Json {
        path: path.display().to_string(),
        source,
    })
}

/// A JSON file holding one object or a list of them, as a list.
pub fn read_json_items(path: &Path) -> Result<Vec<Value>, CliError> {
    Ok(match read_json_file(path)? {
        Value::Array(items) => items,
        single => vec![single],
    })
}

/// The mapping table: `--mapping`, then the configured file, then the
/// built-in bulb table.
pub fn load_mapping(global: &GlobalOpts, config: &Config) -> Result<Arc<MappingTable>, CliError> {
    let table = match global.mapping.as_ref().or(config.mapping.as_ref()) {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading mapping table");
            MappingTable::load(path, &ComputeRegistry::builtin())?
        }
        None => MappingTable::builtin(),
    };
    Ok(Arc::new(table))
}
