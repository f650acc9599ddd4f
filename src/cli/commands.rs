//! CLI command definitions

use clap::Args;

/// Run a pipeline ending at a build configuration
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Target build configuration id
    pub target: String,

    /// Path to project YAML file
    #[arg(short, long, default_value = "conveyor.yml")]
    pub file: String,

    /// Commit revision to attribute the run to
    #[arg(long)]
    pub revision: Option<String>,

    /// Branch ref of the attributed commit
    #[arg(long, default_value = "refs/heads/main")]
    pub branch: String,

    /// Don't save runs to history
    #[arg(long)]
    pub no_history: bool,

    /// Working directory for step scripts
    #[arg(short, long)]
    pub workdir: Option<String>,
}

/// Validate a project configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to project YAML file
    #[arg(short, long, default_value = "conveyor.yml")]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Build configuration id to filter by
    #[arg(short, long)]
    pub configuration: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run by id
    #[arg(long)]
    pub run_id: Option<String>,
}
