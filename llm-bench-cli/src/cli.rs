use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::commands::{
    log::LogArgs, rerun::RerunArgs, run::RunArgs, show::ShowArgs, suite::SuiteArgs,
};
use crate::output::OutputFormat;

/// Run and score LLM benchmark experiments
#[derive(Debug, Parser)]
#[command(name = "llm-bench", version, about, long_about = None)]
pub struct Cli {
    /// Settings file layered over config/default.toml and config/local.toml
    #[arg(short, long, global = true, env = "LLM_BENCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding one sub-directory per task
    #[arg(long, global = true)]
    pub tasks_dir: Option<PathBuf>,

    /// Directory for experiment records and the experiment log
    #[arg(long, global = true)]
    pub results_dir: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the tasks found in the tasks directory
    ListTasks,

    /// Run one configuration against one or more tasks
    Run(RunArgs),

    /// Run every combination of the given axes against a task
    Suite(SuiteArgs),

    /// Re-run logged experiments with their saved configuration
    #[command(alias = "update-all")]
    Rerun(RerunArgs),

    /// Show logged experiments
    Log(LogArgs),

    /// Show a saved experiment record
    Show(ShowArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_suite_axes() {
        let cli = Cli::try_parse_from([
            "llm-bench",
            "suite",
            "--task",
            "htan_family_history",
            "--model",
            "a",
            "--model",
            "b",
            "--temperature",
            "0",
            "--temperature",
            "0.7",
            "--thinking",
            "false",
            "--thinking",
            "true",
        ])
        .unwrap();

        match cli.command {
            Commands::Suite(args) => {
                assert_eq!(args.models, vec!["a", "b"]);
                assert_eq!(args.temperatures, vec![0.0, 0.7]);
                assert_eq!(args.thinking, vec![false, true]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_update_all_alias() {
        let cli = Cli::try_parse_from(["llm-bench", "update-all", "--every-task"]).unwrap();
        assert!(matches!(cli.command, Commands::Rerun(ref args) if args.every_task && args.task.is_none()));
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from(["llm-bench", "log", "--output", "json", "--all"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Log(ref args) if args.all));
    }
}
