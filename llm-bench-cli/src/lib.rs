//! # llm-bench CLI
//!
//! Command-line front end for the benchmarking harness: loads tasks from
//! disk, runs experiments and suites against the messages endpoint, and
//! reads back saved results.

pub mod batch;
pub mod cli;
pub mod commands;
pub mod context;
pub mod output;
pub mod settings;
pub mod tasks;

pub use batch::{BatchReport, RunSummary, TaskFailure};
pub use cli::{Cli, Commands, LogFormat};
pub use context::Context;
pub use output::{OutputFormat, OutputWriter};
pub use settings::BenchSettings;
pub use tasks::TaskLoader;
