//! Dialog: the scripted conversation flows.

pub mod command;
pub mod engine;
pub mod texts;

pub use command::{Intent, IntentParser};
pub use engine::{DialogEngine, PersistAction, Transition};
