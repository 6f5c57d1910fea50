pub mod daily_log;
pub mod models;

pub use daily_log::DailyLog;
pub use models::{CaptureOrigin, LogEntry, NotesStatus, StoredEntry};
