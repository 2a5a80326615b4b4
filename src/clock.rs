//! Wall-clock source shared by the dialog engine and the scheduler.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};

/// Returns the current local wall-clock time. Swappable in tests.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// The process's local time.
pub fn system_clock() -> Clock {
    Arc::new(|| Local::now().naive_local())
}

/// A clock frozen at `at`.
pub fn fixed_clock(at: NaiveDateTime) -> Clock {
    Arc::new(move || at)
}
