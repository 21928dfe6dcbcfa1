//! Clap derive structures for the `wpas` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// wpas -- inspect and exercise the WPA/WPS station state machine
#[derive(Debug, Parser)]
#[command(
    name = "wpas",
    version,
    about = "Run WPA/WPS network selection and event replays offline",
    long_about = "Offline tooling for the wpas station state machine.\n\n\
        Evaluates scan results against configured networks, replays scripted\n\
        driver events against a simulated radio, and validates configuration.",
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
    #[arg(long, short = 'c', env = "WPAS_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// How results are printed
    #[arg(
        long,
        short = 'o',
        env = "WPAS_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Colorize verdicts and the selected BSS
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Print nothing but errors
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

// ── Output ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Candidate and event tables
    Table,
    /// Indented JSON
    Json,
    /// One JSON document per line
    JsonCompact,
    /// Bare values for shell pipelines
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Color when stdout is a terminal and NO_COLOR is unset
    Auto,
    Always,
    Never,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Evaluate a scan against the configured networks
    #[command(alias = "sel")]
    Select(SelectArgs),

    /// Feed a scripted event sequence to a simulated station
    Replay(ReplayArgs),

    /// Validate the configuration file
    #[command(alias = "check")]
    CheckConfig,

    /// Generate a WPS device PIN
    WpsPin(WpsPinArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct SelectArgs {
    /// JSON file with the scan results
    #[arg(long, short = 's')]
    pub scan: PathBuf,

    /// Own MAC address used for WPS authorized-MAC checks
    #[arg(long)]
    pub own_addr: Option<String>,
}

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// JSON scenario file
    pub scenario: PathBuf,
}

#[derive(Debug, Args)]
pub struct WpsPinArgs {
    /// Validate this PIN instead of generating one
    #[arg(long)]
    pub check: Option<String>,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
