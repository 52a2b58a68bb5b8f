//! Clap derive structures for the `bulbsync` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// bulbsync -- keeps a hub in step with a fleet of smart bulbs
#[derive(Debug, Parser)]
#[command(
    name = "bulbsync",
    version,
    about = "Hub translator for smart light bulbs",
    long_about = "Mirrors device state into the hub as minimal create/set/tag commands\n\
        and translates hub commands into device method calls.\n\n\
        `run` starts the translator; `diff`, `translate` and `mapping` work offline.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, env = "BULBSYNC_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Mapping table file (overrides the configured one)
    #[arg(long, short = 'm', env = "BULBSYNC_MAPPING", global = true)]
    pub mapping: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "BULBSYNC_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the translator against the hub, the bus and the device proxy
    Run,

    /// Compute the hub commands an observation would produce
    Diff(DiffArgs),

    /// Translate hub commands into device operations
    Translate(TranslateArgs),

    /// Print the effective mapping table
    Mapping,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Observed device record(s), JSON object or list
    #[arg(long, short = 'd')]
    pub device: PathBuf,

    /// Current hub things, JSON list (none when omitted)
    #[arg(long)]
    pub hub: Option<PathBuf>,

    /// Translator id to stamp on created things (defaults to the configured one)
    #[arg(long)]
    pub translator_id: Option<String>,
}

#[derive(Debug, Args)]
pub struct TranslateArgs {
    /// Hub command(s), JSON object or list
    #[arg(long, short = 'n')]
    pub nva: PathBuf,

    /// Current device record used by computed arguments
    #[arg(long, short = 's')]
    pub state: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}
