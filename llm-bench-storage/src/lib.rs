pub mod log;
pub mod records;
pub mod store;

pub use log::{latest_entries, parse_log, read_log, LogEntry, LogWriter};
pub use records::RecordStore;
pub use store::FileResultStore;
