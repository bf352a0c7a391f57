pub mod default;
pub mod field_accuracy;
pub mod hybrid;
pub mod jaccard;

pub use default::*;
pub use field_accuracy::*;
pub use hybrid::*;
pub use jaccard::*;
