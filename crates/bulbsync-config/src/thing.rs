// ── Thing config ──
//
// User-facing translator settings live in `<storage>/config.json`. On first
// start that file is seeded from `<defaults>/default-config.json`.
// `<defaults>/schema.json` holds the settings form (`schema`) and the rules
// (`validation`) checked before the translator starts.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::ConfigError;
use crate::rules::Rules;

/// File name of the persisted thing configuration.
pub const THING_CONFIG_FILE: &str = "config.json";

/// Seed for the thing configuration, read from the defaults directory.
pub const DEFAULT_THING_CONFIG_FILE: &str = "default-config.json";

/// Settings form and validation rules, read from the defaults directory.
pub const SCHEMA_FILE: &str = "schema.json";

/// The thing configuration with its schema and rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThingConfig {
    pub config: Map<String, Value>,
    /// Settings form, kept as-is for whoever renders it.
    pub schema: Option<Value>,
    pub validation: Rules,
}

impl ThingConfig {
    /// Check the config against the validation rules, one error per field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validation.check(&self.config)
    }
}

#[derive(Deserialize)]
struct SchemaFile {
    #[serde(default)]
    schema: Option<Value>,
    #[serde(default)]
    validation: Option<Map<String, Value>>,
}

/// Load the thing config, seeding `<storage>/config.json` from the defaults
/// directory on first start. Missing defaults mean an empty config and no
/// rules.
pub fn load_thing_config(
    storage_path: &Path,
    defaults_path: &Path,
) -> Result<ThingConfig, ConfigError> {
    let (schema, validation) = read_schema(&defaults_path.join(SCHEMA_FILE))?;

    let path = storage_path.join(THING_CONFIG_FILE);
    let config = if path.exists() {
        read_object(&path)?
    } else {
        let seed = defaults_path.join(DEFAULT_THING_CONFIG_FILE);
        let defaults = if seed.exists() {
            read_object(&seed)?
        } else {
            tracing::debug!(path = %seed.display(), "no default thing config");
            Map::new()
        };
        let written = save_thing_config(storage_path, &defaults)?;
        tracing::info!(path = %written.display(), "created thing config from defaults");
        defaults
    };

    Ok(ThingConfig {
        config,
        schema,
        validation,
    })
}

/// Write `config` to `<storage>/config.json`, returning the file path.
pub fn save_thing_config(
    storage_path: &Path,
    config: &Map<String, Value>,
) -> Result<PathBuf, ConfigError> {
    let path = storage_path.join(THING_CONFIG_FILE);
    let body = serde_json::to_string_pretty(config).map_err(|source| ConfigError::ThingConfig {
        path: path.clone(),
        source,
    })?;
    std::fs::create_dir_all(storage_path)?;
    std::fs::write(&path, body)?;
    Ok(path)
}

fn read_schema(path: &Path) -> Result<(Option<Value>, Rules), ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no thing config schema");
        return Ok((None, Rules::default()));
    }

    let raw = std::fs::read_to_string(path)?;
    let file: SchemaFile = serde_json::from_str(&raw).map_err(|source| ConfigError::ThingConfig {
        path: path.to_path_buf(),
        source,
    })?;
    let rules = match &file.validation {
        Some(rules) => Rules::from_json(rules)?,
        None => Rules::default(),
    };
    Ok((file.schema, rules))
}

fn read_object(path: &Path) -> Result<Map<String, Value>, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::ThingConfig {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn write(dir: &Path, name: &str, value: &Value) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), value.to_string()).unwrap();
    }

    #[test]
    fn first_start_seeds_from_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = dir.path().join("etc");
        let storage = dir.path().join("state");
        write(&defaults, DEFAULT_THING_CONFIG_FILE, &json!({ "pollInterval": 10 }));

        let thing = load_thing_config(&storage, &defaults).unwrap();
        assert_eq!(thing.config["pollInterval"], json!(10));
        assert!(thing.schema.is_none());
        assert!(thing.validation.is_empty());

        let stored: Value =
            serde_json::from_str(&std::fs::read_to_string(storage.join(THING_CONFIG_FILE)).unwrap())
                .unwrap();
        assert_eq!(stored, json!({ "pollInterval": 10 }));

        // later starts read the stored file, not the seed
        write(&storage, THING_CONFIG_FILE, &json!({ "pollInterval": 30 }));
        let thing = load_thing_config(&storage, &defaults).unwrap();
        assert_eq!(thing.config["pollInterval"], json!(30));
    }

    #[test]
    fn missing_defaults_yield_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let thing = load_thing_config(&dir.path().join("state"), &dir.path().join("etc")).unwrap();
        assert_eq!(thing, ThingConfig::default());
        assert!(dir.path().join("state").join(THING_CONFIG_FILE).exists());
    }

    #[test]
    fn schema_rules_are_checked_per_field() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = dir.path().join("etc");
        write(
            &defaults,
            SCHEMA_FILE,
            &json!({
                "schema": { "host": { "type": "string", "label": "Hub host" } },
                "validation": {
                    "host": "required",
                    "pollInterval": ["positive_integer", { "number_between": [1, 60] }]
                }
            }),
        );
        write(&defaults, DEFAULT_THING_CONFIG_FILE, &json!({ "pollInterval": 90 }));

        let thing = load_thing_config(&dir.path().join("state"), &defaults).unwrap();
        assert_eq!(thing.schema.as_ref().unwrap()["host"]["label"], json!("Hub host"));
        assert_eq!(thing.validation.len(), 2);

        let err = thing.validate().unwrap_err();
        let ConfigError::InvalidThingConfig { errors } = &err else {
            panic!("unexpected error {err}");
        };
        let fields: Vec<String> = errors.iter().map(ToString::to_string).collect();
        assert_eq!(
            fields,
            ["invalid host: REQUIRED", "invalid pollInterval: TOO_HIGH"]
        );
    }

    #[test]
    fn saved_config_passes_validation() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = dir.path().join("etc");
        let storage = dir.path().join("state");
        write(&defaults, SCHEMA_FILE, &json!({ "validation": { "host": "required" } }));

        let mut thing = load_thing_config(&storage, &defaults).unwrap();
        assert!(thing.validate().is_err());

        thing.config.insert("host".into(), json!("hub.local"));
        let path = save_thing_config(&storage, &thing.config).unwrap();
        assert_eq!(path, storage.join(THING_CONFIG_FILE));

        let reloaded = load_thing_config(&storage, &defaults).unwrap();
        assert_eq!(reloaded.config, thing.config);
        reloaded.validate().unwrap();
    }

    #[test]
    fn malformed_files_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(THING_CONFIG_FILE), "{ nope").unwrap();
        let err = load_thing_config(dir.path(), &dir.path().join("etc")).unwrap_err();
        assert!(matches!(err, ConfigError::ThingConfig { .. }));

        let defaults = dir.path().join("etc");
        std::fs::create_dir_all(&defaults).unwrap();
        std::fs::write(defaults.join(SCHEMA_FILE), "[").unwrap();
        let err = load_thing_config(dir.path(), &defaults).unwrap_err();
        assert!(matches!(err, ConfigError::ThingConfig { ref path, .. } if path.ends_with(SCHEMA_FILE)));
    }
}
