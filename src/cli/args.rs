//! CLI argument parsing using clap.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Hot-load freshly compiled classes
#[derive(Parser, Debug)]
#[command(
    name = "classwatch",
    version = env!("CARGO_PKG_VERSION"),
    about = "Watch build-output folders and hot-load new classes",
    long_about = "Watch build-output folders recursively and hand every newly compiled class to the reload engine.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Examples:\n  classwatch init\n  classwatch watch\n  classwatch watch build/classes/java/main build/classes/kotlin/main\n  classwatch watch --settle-ms 0 --context devtools"
)]
pub struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize project
    #[command(about = "Set up .classwatch directory with default configuration")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Watch roots and hot-load new classes until interrupted
    #[command(about = "Watch build-output roots and hot-load new classes")]
    Watch(WatchArgs),

    /// Show current configuration settings
    #[command(about = "Display active settings from .classwatch/settings.toml")]
    Config,
}

/// Overrides for a single `watch` run. Unset values come from settings.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct WatchArgs {
    /// Roots to watch, in priority order (replaces the configured roots)
    #[arg(value_name = "ROOT")]
    pub roots: Vec<PathBuf>,

    /// File suffix identifying a compiled artifact
    #[arg(long, value_name = "SUFFIX")]
    pub suffix: Option<String>,

    /// Milliseconds an artifact's size must stay unchanged before loading
    #[arg(long, value_name = "MS")]
    pub settle_ms: Option<u64>,

    /// Upper bound in milliseconds on each wait for file-system signals
    #[arg(long, value_name = "MS")]
    pub poll_ms: Option<u64>,

    /// Parent loading context the reload registry is bound to
    #[arg(long)]
    pub context: Option<String>,
}
