use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Bare `--due` expands to this marker, which resolves to the configured
/// default offset at dispatch time.
pub const DEFAULT_DUE_KEYWORD: &str = "default";

#[derive(Parser, Debug)]
#[command(
    name = "minder",
    version,
    about = "Minder: a task list with due-date reminders",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    /// Settings file override.
    #[arg(long = "settings", value_name = "FILE", global = true)]
    pub settings: Option<PathBuf>,

    /// Task file override.
    #[arg(long = "data", value_name = "FILE", global = true)]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new task.
    Add(AddArgs),
    /// List tasks, optionally filtered.
    List(ListArgs),
    /// Print one task in full.
    Show { id: u64 },
    /// Toggle a task between open and completed.
    Done { id: u64 },
    /// Delete a task.
    Delete { id: u64 },
    /// Change fields of an existing task.
    Modify(ModifyArgs),
    /// Drop every completed task.
    ClearCompleted,
    /// Show counts by state, category and priority.
    Stats,
    /// Write all tasks to a date-stamped export file.
    Export(ExportArgs),
    /// Replace all tasks from a JSON or CSV file.
    Import(ImportArgs),
    /// Read or change persisted settings.
    Config(ConfigArgs),
    /// Stay running and deliver reminders until interrupted.
    Watch,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Title words, joined with spaces.
    #[arg(required = true)]
    pub title: Vec<String>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub priority: Option<String>,

    /// Due expression: RFC 3339, `YYYY-MM-DD [HH:MM]` or `+N[mhd]`.
    /// A bare `--due` applies the configured default offset.
    #[arg(long, num_args = 0..=1, default_missing_value = DEFAULT_DUE_KEYWORD)]
    pub due: Option<String>,

    #[arg(long)]
    pub description: Option<String>,

    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub priority: Option<String>,

    /// Case-insensitive title substring.
    #[arg(long)]
    pub search: Option<String>,

    /// Keep tasks created on or after this date (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    pub from: Option<String>,

    /// Keep tasks created on or before this date (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    pub to: Option<String>,

    /// Only completed tasks.
    #[arg(long, conflicts_with = "open")]
    pub completed: bool,

    /// Only open tasks.
    #[arg(long)]
    pub open: bool,

    /// Include completed tasks even when settings hide them.
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug)]
pub struct ModifyArgs {
    pub id: u64,

    #[arg(long)]
    pub title: Option<String>,

    #[arg(long)]
    pub category: Option<String>,

    #[arg(long)]
    pub priority: Option<String>,

    #[arg(long, conflicts_with = "clear_due")]
    pub due: Option<String>,

    /// Remove the due date (and any armed reminder).
    #[arg(long)]
    pub clear_due: bool,

    #[arg(long, conflicts_with = "clear_description")]
    pub description: Option<String>,

    #[arg(long)]
    pub clear_description: bool,

    #[arg(long, conflicts_with = "clear_notes")]
    pub notes: Option<String>,

    #[arg(long)]
    pub clear_notes: bool,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output format: json or csv.
    #[arg(long, default_value = "json")]
    pub format: String,

    /// Target directory (defaults to the current directory).
    #[arg(long, value_name = "DIR")]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    pub path: PathBuf,

    /// Input format, inferred from the file extension when omitted.
    #[arg(long)]
    pub format: Option<String>,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print every settings key.
    Show,
    /// Change one settings key.
    Set { key: String, value: String },
    /// Print the settings file location.
    Path,
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}
