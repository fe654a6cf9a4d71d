pub mod event_log;
pub mod transactional;

pub use event_log::{AppendLog, EventLogAdapter, EventRecord};
pub use transactional::{ResourceTransaction, TransactionalAdapter, TransactionalResource};
