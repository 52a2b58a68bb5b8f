//! `bulbsync mapping`: print the effective mapping table.

use bulbsync_config::Config;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::commands::util;
use crate::error::CliError;
use crate::output;

pub fn handle(config: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let table = util::load_mapping(global, config)?;

    // the table is nested too deeply for rows; table mode prints YAML
    let out = match global.output {
        OutputFormat::Table => table.to_yaml()?,
        format => output::render_single(format, &*table, |_| String::new()),
    };
    output::print_output(&out, global.quiet);
    Ok(())
}
