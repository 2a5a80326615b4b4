//! Care bot: a scripted wellbeing companion.

pub mod bot;
pub mod channels;
pub mod clock;
pub mod config;
pub mod dialog;
pub mod error;
pub mod reminders;
pub mod session;
pub mod store;
