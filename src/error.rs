//! Error types for care-bot.

/// Error surfaced by the bot's message loop and handlers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Dialog error: {0}")]
    Dialog(#[from] DialogError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity already exists: {entity} with id {id}")]
    Conflict { entity: String, id: String },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DatabaseError {
    /// Whether this is a first-write-wins rejection rather than a failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Errors produced while driving a dialog transition.
#[derive(Debug, thiserror::Error)]
pub enum DialogError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Record store unavailable: {0}")]
    StoreUnavailable(#[from] DatabaseError),
}

impl DialogError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Reminder scheduling errors.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("Unrecognized time of day: {label:?}")]
    InvalidTime { label: String },

    #[error("Repeat count must be at least 1, got {count}")]
    InvalidRepeatCount { count: u32 },

    #[error("Scheduler is shut down")]
    ShutDown,

    #[error("Failed to persist reminder: {0}")]
    Store(#[from] DatabaseError),
}
