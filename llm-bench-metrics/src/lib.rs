pub mod aggregators;
pub mod parsing;
pub mod scorers;

pub use aggregators::*;
pub use parsing::*;
pub use scorers::*;
