pub mod ids;
pub mod config;
pub mod task;
pub mod experiment;

pub use ids::*;
pub use config::*;
pub use task::*;
pub use experiment::*;
