pub mod events;
pub mod formatting;
pub mod registry;
pub mod runner;
pub mod suite;

pub use events::RunEvent;
pub use formatting::{resolve_system_instructions, DefaultPromptFormatter};
pub use registry::TaskRegistry;
pub use runner::ExperimentRunner;
pub use suite::{SuiteAxes, SuiteRunner};

// Re-export the cancellation handle callers pass to the runners
pub use tokio_util::sync::CancellationToken;
