use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "courier")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Email as a declarative resource: plan, send once, keep state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Host state file
    #[arg(
        long,
        global = true,
        env = "COURIER_STATE",
        default_value = "courier.state.json"
    )]
    pub state: PathBuf,

    /// Provider config file (default: ~/.config/courier/config.toml)
    #[arg(long, global = true, env = "COURIER_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the schema of every resource type
    Schema {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what apply would do
    Plan(PlanArgs),

    /// Converge state to the declarations, sending email where needed
    Apply(ApplyArgs),

    /// Read every stored resource and update state
    Refresh,

    /// Remove every stored resource from state (never sends)
    Destroy {
        /// Only destroy matching resources: "type" or "type.name"
        #[arg(short, long)]
        target: Option<String>,

        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Adopt an already sent email by its dispatch marker
    Import {
        /// Address to store it under, e.g. email.welcome
        address: String,

        /// Dispatch marker (b3:...)
        id: String,
    },

    /// Inspect host state
    #[command(subcommand)]
    State(StateCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Parser)]
pub struct PlanArgs {
    /// Declaration files (.toml or .json)
    #[arg(default_value = "courier.toml")]
    pub files: Vec<PathBuf>,

    /// Only consider matching resources: "type" or "type.name"
    #[arg(short, long)]
    pub target: Option<String>,
}

#[derive(Parser)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub plan: PlanArgs,

    /// Show the plan without making lifecycle calls
    #[arg(long)]
    pub dry_run: bool,

    /// Number of lifecycle calls to run in parallel
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Skip confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Re-invoke a call this many times while it fails with a retryable error
    #[arg(short, long, default_value = "0")]
    pub retries: u32,
}

#[derive(Subcommand)]
pub enum StateCommand {
    /// List managed addresses
    List,

    /// Show the stored attributes of one address (secrets redacted)
    Show {
        /// Address, e.g. message_email.welcome
        address: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply() {
        let cli = Cli::try_parse_from([
            "courier", "-vv", "apply", "a.toml", "b.json", "--jobs", "8", "--yes", "--retries",
            "2", "--state", "s.json",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.state, PathBuf::from("s.json"));
        match cli.command {
            Command::Apply(args) => {
                assert_eq!(args.plan.files, [PathBuf::from("a.toml"), PathBuf::from("b.json")]);
                assert_eq!(args.jobs, 8);
                assert_eq!(args.retries, 2);
                assert!(args.yes);
                assert!(!args.dry_run);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_plan_defaults() {
        let cli = Cli::try_parse_from(["courier", "plan"]).unwrap();
        match cli.command {
            Command::Plan(args) => {
                assert_eq!(args.files, [PathBuf::from("courier.toml")]);
                assert!(args.target.is_none());
            }
            _ => panic!("expected plan"),
        }
    }
}
