use crate::build_info;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    about = "Inspect and manage branch export configuration and state",
    version = build_info::VERSION_WITH_COMMIT,
    long_version = build_info::VERSION_WITH_COMMIT
)]
pub struct Cli {
    /// Postgres URL; overrides DATABASE_URL
    #[arg(long = "database-url", global = true)]
    pub database_url: Option<String>,

    #[arg(long = "log-level", default_value = "info", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Apply pending schema migrations
    Migrate,
    /// Export configuration of branches
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Export state of branches
    #[command(subcommand)]
    State(StateCommand),
}

#[derive(Args, Debug, Clone)]
pub struct BranchArgs {
    #[arg(long)]
    pub repository: String,
    #[arg(long)]
    pub branch: String,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the export configuration of one branch
    Get(BranchArgs),
    /// Replace the export configuration of one branch
    Put {
        #[command(flatten)]
        target: BranchArgs,
        /// Export destination
        #[arg(long)]
        path: String,
        /// Where export status is published
        #[arg(long = "status-path")]
        status_path: String,
        /// Regexp matching the last key in a prefix; repeat for several
        #[arg(long = "last-keys-regexp")]
        last_keys_in_prefix_regexp: Vec<String>,
        /// Export incrementally on every commit instead of once
        #[arg(long)]
        continuous: bool,
    },
    /// Print every configured branch
    List,
}

#[derive(Subcommand, Debug)]
pub enum StateCommand {
    /// Print the export state of one branch
    Get(BranchArgs),
    /// Mark the export of a ref as started
    Start {
        #[command(flatten)]
        target: BranchArgs,
        #[arg(long = "ref")]
        export_ref: String,
    },
    /// Mark the running export of a ref as finished
    Finish {
        #[command(flatten)]
        target: BranchArgs,
        #[arg(long = "ref")]
        export_ref: String,
        /// Record the export as failed with this message
        #[arg(long)]
        error: Option<String>,
    },
    /// Clear a failed export so a new one may start
    Repair(BranchArgs),
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
