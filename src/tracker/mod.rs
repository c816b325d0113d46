//! Sleep tracking
//!
//! The session stopwatch and the persisted sleep log.

pub mod history;
pub mod store;
pub mod timer;

pub use history::{render_lines, HistoryEntry, SleepHistory, EMPTY_PLACEHOLDER, HISTORY_KEY};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use timer::{
    format_duration, format_elapsed, Clock, ManualClock, SessionTimer, SystemClock, TimerDisplay,
    TimerState, STATUS_STARTED, STATUS_STOPPED, ZERO_ELAPSED,
};
