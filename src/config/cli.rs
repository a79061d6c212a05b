use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "refresh-jobs")]
#[command(about = "Periodically download remote resources when the local copy is stale")]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "refresh-jobs.toml")]
    pub config: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Run every job once right away instead of registering hourly triggers
    #[arg(long)]
    pub run_now: bool,

    /// Show the configured jobs and whether they are stale, then exit
    #[arg(long)]
    pub dry_run: bool,
}
