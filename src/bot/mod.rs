//! Bot: the service context and per-user dispatch.

pub mod dispatcher;
pub mod service;

pub use dispatcher::Dispatcher;
pub use service::{BotDeps, BotService};
