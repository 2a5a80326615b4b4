//! Session state: per-user step and captured answers.

pub mod manager;
pub mod state;

pub use manager::{SessionManager, SessionSlot};
pub use state::{
    DiaryStep, DialogStep, Flow, QuestionnaireStep, RegistrationStep, ReminderStep, Session, Step,
};
