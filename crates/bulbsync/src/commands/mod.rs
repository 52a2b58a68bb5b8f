//! Command handlers: CLI args -> core calls -> output formatting.

pub mod diff;
pub mod mapping;
pub mod run;
pub mod translate;
pub mod util;

use bulbsync_config::Config;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a configured command to its handler.
pub async fn dispatch(cmd: Command, config: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Run => run::handle(config, global).await,
        Command::Diff(args) => diff::handle(&args, config, global),
        Command::Translate(args) => translate::handle(&args, config, global),
        Command::Mapping => mapping::handle(config, global),
        Command::Completions(_) => Err(CliError::Internal(
            "completions are generated before configuration is loaded".into(),
        )),
    }
}
