//! `RecordStore` trait: the narrow persistence contract the bot depends on.
//!
//! Four append-only record sets (profile, diary, questionnaire, interaction
//! log) keyed by user id, plus the pending reminder table that lets
//! scheduled reminders survive a restart.

use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;

/// Stable numeric user identity (the Telegram user id).
pub type UserId = i64;

/// One completed health questionnaire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionnaireSubmission {
    pub user_id: UserId,
    pub submitted_at: NaiveDateTime,
    pub mood: String,
    pub pressure: String,
    pub temperature: String,
    pub blood_sugar: String,
}

/// A free-text diary entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiaryEntry {
    pub user_id: UserId,
    pub written_at: NaiveDateTime,
    pub text: String,
}

/// An audit-log row for a notable interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionRecord {
    pub user_id: UserId,
    pub recorded_at: NaiveDateTime,
    pub category: String,
    pub text: String,
}

/// A scheduled reminder, as persisted between deliveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderTask {
    pub id: Uuid,
    pub user_id: UserId,
    pub message: String,
    /// The label the user picked, e.g. "At 18:00".
    pub time_label: String,
    pub fire_at: NaiveTime,
    /// Deliveries still owed.
    pub remaining: u32,
    /// Local wall-clock time of the next delivery.
    pub next_fire_at: NaiveDateTime,
}

/// Backend-agnostic persistence trait.
///
/// Every write is durable before the returned future resolves, so a read of
/// the same key issued afterwards observes it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ── Users ───────────────────────────────────────────────────────

    /// Look up the registered display name for a user.
    async fn get_username(&self, user_id: UserId) -> Result<Option<String>, DatabaseError>;

    /// Register a display name. First write wins: returns
    /// `DatabaseError::Conflict` if the user already has one.
    async fn set_username(&self, user_id: UserId, username: &str) -> Result<(), DatabaseError>;

    // ── Questionnaires ──────────────────────────────────────────────

    async fn append_questionnaire(
        &self,
        submission: &QuestionnaireSubmission,
    ) -> Result<(), DatabaseError>;

    /// All submissions for a user, oldest first.
    async fn list_questionnaires(
        &self,
        user_id: UserId,
    ) -> Result<Vec<QuestionnaireSubmission>, DatabaseError>;

    // ── Diary ───────────────────────────────────────────────────────

    async fn append_diary(
        &self,
        user_id: UserId,
        text: &str,
        written_at: NaiveDateTime,
    ) -> Result<(), DatabaseError>;

    /// All diary entries for a user ordered by timestamp ascending.
    async fn list_diary(&self, user_id: UserId) -> Result<Vec<DiaryEntry>, DatabaseError>;

    // ── Interaction log ─────────────────────────────────────────────

    async fn append_interaction(
        &self,
        user_id: UserId,
        category: &str,
        text: &str,
    ) -> Result<(), DatabaseError>;

    async fn list_interactions(
        &self,
        user_id: UserId,
    ) -> Result<Vec<InteractionRecord>, DatabaseError>;

    // ── Reminders ───────────────────────────────────────────────────

    async fn save_reminder(&self, task: &ReminderTask) -> Result<(), DatabaseError>;

    /// Record a delivery: new remaining count and next fire time.
    async fn update_reminder_progress(
        &self,
        id: Uuid,
        remaining: u32,
        next_fire_at: NaiveDateTime,
    ) -> Result<(), DatabaseError>;

    async fn delete_reminder(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// All reminders that still owe deliveries.
    async fn list_reminders(&self) -> Result<Vec<ReminderTask>, DatabaseError>;
}
