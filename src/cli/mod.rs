pub mod commands;
pub mod output;

use crate::errors::Result;
use clap::{Parser, Subcommand};
use commands::branch::StatusArg;
use commands::stack::StackAction;

#[derive(Parser)]
#[command(name = "gr")]
#[command(about = "Graphene - manage stacks of dependent Git branches")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure the base branches of this repository
    Init {
        /// Base branches to use instead of prompting
        #[arg(long = "base", short)]
        base_branches: Vec<String>,
    },

    /// Create a branch on top of the current one
    #[command(alias = "c")]
    Create {
        /// Name of the new branch
        name: String,
    },

    /// Add an existing branch to the top of the current stack
    Track {
        /// Branch to track
        branch: String,
    },

    /// Remove a branch from its stack (defaults to the current branch)
    Untrack {
        branch: Option<String>,
    },

    /// Merge the current branch into the branch below it
    Fold {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Check out the branch above in the current stack
    Up,

    /// Check out the branch below in the current stack
    Down,

    /// Set the status of a tracked branch
    Mark {
        #[arg(value_enum)]
        status: StatusArg,
        /// Branch to mark (defaults to the current branch)
        branch: Option<String>,
    },

    /// List tracked branches grouped by stack
    #[command(alias = "ls")]
    List,

    /// Show where a branch sits in its stack
    About {
        /// Branch name (defaults to the current branch)
        branch: Option<String>,
    },

    /// Rebase the current stack onto its base branch
    Restack {
        /// Rebase the whole stack instead of stopping at the current branch
        #[arg(long)]
        all: bool,
    },

    /// Continue a paused restack or fold after resolving conflicts
    Continue,

    /// Abort a paused restack or fold
    Abort,

    /// Stack management
    Stack {
        #[command(subcommand)]
        action: StackAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., stack.name_prefix)
        key: String,
        /// Configuration value
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// List all configuration values
    List,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        self.setup_logging();

        match self.command {
            Commands::Init { base_branches } => commands::repo::init(base_branches).await,
            Commands::Create { name } => commands::branch::create(&name).await,
            Commands::Track { branch } => commands::branch::track(&branch).await,
            Commands::Untrack { branch } => commands::branch::untrack(branch).await,
            Commands::Fold { yes } => commands::branch::fold(yes).await,
            Commands::Up => commands::branch::up().await,
            Commands::Down => commands::branch::down().await,
            Commands::Mark { status, branch } => commands::branch::mark(status, branch).await,
            Commands::List => commands::branch::list().await,
            Commands::About { branch } => commands::branch::about(branch).await,
            Commands::Restack { all } => commands::restack::restack(all).await,
            Commands::Continue => commands::restack::continue_operation().await,
            Commands::Abort => commands::restack::abort_operation().await,
            Commands::Stack { action } => commands::stack::run(action).await,
            Commands::Config { action } => commands::config::run(action).await,
        }
    }

    fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .without_time();

        if self.no_color {
            console::set_colors_enabled(false);
            subscriber.with_ansi(false).init();
        } else {
            subscriber.init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_commands() {
        let cli = Cli::try_parse_from(["gr", "create", "feat-a"]).unwrap();
        assert!(matches!(cli.command, Commands::Create { name } if name == "feat-a"));

        let cli = Cli::try_parse_from(["gr", "-v", "restack", "--all"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Restack { all: true }));

        let cli = Cli::try_parse_from(["gr", "init", "--base", "main", "--base", "develop"]).unwrap();
        assert!(
            matches!(cli.command, Commands::Init { base_branches } if base_branches == ["main", "develop"])
        );

        let cli = Cli::try_parse_from(["gr", "mark", "merged", "feat-a"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Mark { status: StatusArg::Merged, branch: Some(_) }
        ));

        assert!(Cli::try_parse_from(["gr", "track"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
