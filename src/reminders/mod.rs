//! Reminders: daily repeating notifications at a chosen time of day.

pub mod model;
pub mod scheduler;

pub use model::{delay_until, next_occurrence, parse_time_of_day};
pub use scheduler::ReminderScheduler;
