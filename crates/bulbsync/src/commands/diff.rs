//! `bulbsync diff`: offline reconciliation of device records against hub things.

use serde::Serialize;
use tabled::Tabled;

use bulbsync_api::Nva;
use bulbsync_config::Config;
use bulbsync_core::{DeviceRecord, HubRecord, Reconciler};

use crate::cli::{DiffArgs, GlobalOpts};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

/// Translator id used when neither `--translator-id` nor the config sets one.
const OFFLINE_TRANSLATOR_ID: &str = "bulbsync";

#[derive(Debug, Serialize)]
struct PlannedCommand {
    kind: &'static str,
    #[serde(flatten)]
    nva: Nva,
}

#[derive(Tabled)]
struct PlannedRow {
    #[tabled(rename = "Kind")]
    kind: &'static str,
    #[tabled(rename = "Noun")]
    noun: String,
    #[tabled(rename = "Verb")]
    verb: String,
    #[tabled(rename = "Adverb")]
    adverb: String,
}

fn planned_row(c: &PlannedCommand) -> PlannedRow {
    PlannedRow {
        kind: c.kind,
        noun: c.nva.noun.clone().unwrap_or_else(|| "-".into()),
        verb: c.nva.verb.clone(),
        adverb: output::inline_json(&serde_json::Value::Object(c.nva.adverb.clone())),
    }
}

pub fn handle(args: &DiffArgs, config: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let table = util::load_mapping(global, config)?;
    let translator_id = args
        .translator_id
        .clone()
        .or_else(|| Some(config.translator_id.clone()).filter(|id| !id.is_empty()))
        .unwrap_or_else(|| OFFLINE_TRANSLATOR_ID.into());

    let observed = util::read_json_items(&args.device)?
        .into_iter()
        .map(DeviceRecord::try_from)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CliError::Input {
            path: args.device.display().to_string(),
            reason: e.to_string(),
        })?;

    let current = match &args.hub {
        Some(path) => util::read_json_items(path)?
            .into_iter()
            .map(HubRecord::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CliError::Input {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?,
        None => Vec::new(),
    };

    let patch = Reconciler::new(translator_id, table).reconcile(&observed, &current);
    tracing::debug!(
        creates = patch.create.len(),
        updates = patch.update.len(),
        "computed patch"
    );

    let planned: Vec<PlannedCommand> = patch
        .create
        .into_iter()
        .map(|nva| PlannedCommand { kind: "create", nva })
        .chain(
            patch
                .update
                .into_iter()
                .map(|nva| PlannedCommand { kind: "update", nva }),
        )
        .collect();

    let out = output::render_list(global.output, &planned, planned_row);
    output::print_output(&out, global.quiet);
    Ok(())
}
