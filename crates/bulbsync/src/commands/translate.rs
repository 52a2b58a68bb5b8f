//! `bulbsync translate`: offline hub command translation.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabled::Tabled;

use bulbsync_api::{Nva, NvaErrorBody};
use bulbsync_config::Config;
use bulbsync_core::{BulbError, DeviceRecord, Translation, Translator};

use crate::cli::{GlobalOpts, TranslateArgs};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct TranslatedCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    noun: Option<String>,
    verb: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    translation: Option<Translation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<NvaErrorBody>,
}

#[derive(Tabled)]
struct TranslatedRow {
    #[tabled(rename = "Verb")]
    verb: String,
    #[tabled(rename = "Result")]
    result: String,
    #[tabled(rename = "Args")]
    args: String,
}

fn translated_row(c: &TranslatedCommand) -> TranslatedRow {
    let (result, args) = match (&c.translation, &c.error) {
        (Some(Translation::Device(op)), _) => (op.method.clone(), output::inline_json(&op.args)),
        (Some(Translation::System(directive)), _) => {
            let kind = if directive.is_system_configurable {
                "system (configurable)"
            } else {
                "system"
            };
            (kind.to_owned(), "-".to_owned())
        }
        (None, Some(error)) => (format!("{}: {}", error.code, error.reason), "-".to_owned()),
        (None, None) => ("-".to_owned(), "-".to_owned()),
    };
    TranslatedRow {
        verb: c.verb.clone(),
        result,
        args,
    }
}

fn translate_one(
    translator: &Translator,
    raw: &Value,
    state: Option<&DeviceRecord>,
) -> TranslatedCommand {
    let Ok(nva) = Nva::deserialize(raw) else {
        let status = BulbError::WrongNvaType {
            nvas: raw.to_string(),
        }
        .to_status();
        return TranslatedCommand {
            noun: None,
            verb: raw.get("verb").and_then(Value::as_str).unwrap_or("-").to_owned(),
            translation: None,
            error: status.error,
        };
    };

    match translator.translate(&nva, state) {
        Ok(translation) => TranslatedCommand {
            noun: nva.noun,
            verb: nva.verb,
            translation: Some(translation),
            error: None,
        },
        Err(e) => TranslatedCommand {
            noun: nva.noun,
            verb: nva.verb,
            translation: None,
            error: e.to_status().error,
        },
    }
}

pub fn handle(args: &TranslateArgs, config: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let translator = Translator::new(util::load_mapping(global, config)?);

    let state = match &args.state {
        Some(path) => Some(DeviceRecord::try_from(util::read_json_file(path)?).map_err(|e| {
            CliError::Input {
                path: path.display().to_string(),
                reason: e.to_string(),
            }
        })?),
        None => None,
    };

    let translated: Vec<TranslatedCommand> = util::read_json_items(&args.nva)?
        .iter()
        .map(|raw| translate_one(&translator, raw, state.as_ref()))
        .collect();

    let out = output::render_list(global.output, &translated, translated_row);
    output::print_output(&out, global.quiet);
    Ok(())
}
