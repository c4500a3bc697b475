use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    author = "Tony Kan, Ted Yu",
    version,
    about = "ewaldmc CLI - Continue and verify Monte Carlo simulations from their checkpoints.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resume a simulation from a checkpoint and run more attempts.
    Resume(ResumeArgs),
    /// Restore a checkpoint and verify its energy against a full recomputation.
    Check(CheckArgs),
}

/// Arguments for the `resume` subcommand.
#[derive(Args, Debug)]
pub struct ResumeArgs {
    /// Path to the main checkpoint file.
    #[arg(required = true, value_name = "PATH")]
    pub checkpoint: PathBuf,

    /// Number of trial attempts to run.
    #[arg(short = 'n', long, required = true, value_name = "INT")]
    pub attempts: u64,

    /// Write the final checkpoint here instead of over the input checkpoint.
    #[arg(short = 'o', long, value_name = "PATH")]
    pub checkpoint_out: Option<PathBuf>,
}

/// Arguments for the `check` subcommand.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the main checkpoint file.
    #[arg(required = true, value_name = "PATH")]
    pub checkpoint: PathBuf,

    /// Largest accepted difference between stored and recomputed energy, in kJ/mol.
    #[arg(short, long, value_name = "FLOAT", default_value_t = 1e-7)]
    pub tolerance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn resume_arguments_are_parsed() {
        let cli = Cli::parse_from(["ewaldmc", "-vv", "resume", "run.rst", "-n", "500", "-o", "next.rst"]);
        assert_eq!(cli.verbose, 2);
        let Commands::Resume(args) = cli.command else {
            panic!("expected resume");
        };
        assert_eq!(args.checkpoint, PathBuf::from("run.rst"));
        assert_eq!(args.attempts, 500);
        assert_eq!(args.checkpoint_out, Some(PathBuf::from("next.rst")));
    }

    #[test]
    fn check_uses_default_tolerance() {
        let cli = Cli::parse_from(["ewaldmc", "check", "run.rst"]);
        let Commands::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.tolerance, 1e-7);
    }

    #[test]
    fn quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["ewaldmc", "-q", "-v", "check", "run.rst"]).is_err());
    }
}
