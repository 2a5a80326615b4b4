//! Persistence layer: libSQL-backed record store.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    DiaryEntry, InteractionRecord, QuestionnaireSubmission, RecordStore, ReminderTask, UserId,
};
