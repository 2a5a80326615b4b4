//! Shared stubs for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use uuid::Uuid;

use care_bot::channels::{Channel, IncomingMessage, MessageStream, OutgoingResponse};
use care_bot::clock::Clock;
use care_bot::error::{ChannelError, DatabaseError};
use care_bot::store::{
    DiaryEntry, InteractionRecord, QuestionnaireSubmission, RecordStore, ReminderTask, UserId,
};

// ── Store ───────────────────────────────────────────────────────────

#[derive(Default)]
struct MemoryState {
    usernames: Vec<(UserId, String)>,
    questionnaires: Vec<QuestionnaireSubmission>,
    diary: Vec<DiaryEntry>,
    interactions: Vec<InteractionRecord>,
    reminders: Vec<ReminderTask>,
}

/// In-process `RecordStore` with no I/O, safe under a paused clock.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    failing_interactions: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` interaction writes fail.
    pub fn fail_next_interactions(&self, count: usize) {
        self.failing_interactions.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_username(&self, user_id: UserId) -> Result<Option<String>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .usernames
            .iter()
            .find(|(id, _)| *id == user_id)
            .map(|(_, name)| name.clone()))
    }

    async fn set_username(&self, user_id: UserId, username: &str) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        if state.usernames.iter().any(|(id, _)| *id == user_id) {
            return Err(DatabaseError::Conflict {
                entity: "user".into(),
                id: user_id.to_string(),
            });
        }
        state.usernames.push((user_id, username.to_string()));
        Ok(())
    }

    async fn append_questionnaire(
        &self,
        submission: &QuestionnaireSubmission,
    ) -> Result<(), DatabaseError> {
        self.state
            .lock()
            .unwrap()
            .questionnaires
            .push(submission.clone());
        Ok(())
    }

    async fn list_questionnaires(
        &self,
        user_id: UserId,
    ) -> Result<Vec<QuestionnaireSubmission>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .questionnaires
            .iter()
            .filter(|q| q.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn append_diary(
        &self,
        user_id: UserId,
        text: &str,
        written_at: NaiveDateTime,
    ) -> Result<(), DatabaseError> {
        self.state.lock().unwrap().diary.push(DiaryEntry {
            user_id,
            written_at,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn list_diary(&self, user_id: UserId) -> Result<Vec<DiaryEntry>, DatabaseError> {
        let state = self.state.lock().unwrap();
        let mut entries: Vec<DiaryEntry> = state
            .diary
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.written_at);
        Ok(entries)
    }

    async fn append_interaction(
        &self,
        user_id: UserId,
        category: &str,
        text: &str,
    ) -> Result<(), DatabaseError> {
        let pending = self.failing_interactions.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_interactions.store(pending - 1, Ordering::SeqCst);
            return Err(unavailable());
        }
        self.state.lock().unwrap().interactions.push(InteractionRecord {
            user_id,
            recorded_at: NaiveDateTime::default(),
            category: category.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn list_interactions(
        &self,
        user_id: UserId,
    ) -> Result<Vec<InteractionRecord>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .interactions
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn save_reminder(&self, task: &ReminderTask) -> Result<(), DatabaseError> {
        self.state.lock().unwrap().reminders.push(task.clone());
        Ok(())
    }

    async fn update_reminder_progress(
        &self,
        id: Uuid,
        remaining: u32,
        next_fire_at: NaiveDateTime,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.lock().unwrap();
        let task = state
            .reminders
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "reminder".into(),
                id: id.to_string(),
            })?;
        task.remaining = remaining;
        task.next_fire_at = next_fire_at;
        Ok(())
    }

    async fn delete_reminder(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let mut state = self.state.lock().unwrap();
        let before = state.reminders.len();
        state.reminders.retain(|t| t.id != id);
        Ok(state.reminders.len() < before)
    }

    async fn list_reminders(&self) -> Result<Vec<ReminderTask>, DatabaseError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .reminders
            .iter()
            .filter(|t| t.remaining > 0)
            .cloned()
            .collect())
    }
}

/// A store whose every call fails, as if the database were gone.
pub struct FailingStore;

fn unavailable() -> DatabaseError {
    DatabaseError::Query("database is locked".into())
}

#[async_trait]
impl RecordStore for FailingStore {
    async fn get_username(&self, _: UserId) -> Result<Option<String>, DatabaseError> {
        Err(unavailable())
    }

    async fn set_username(&self, _: UserId, _: &str) -> Result<(), DatabaseError> {
        Err(unavailable())
    }

    async fn append_questionnaire(&self, _: &QuestionnaireSubmission) -> Result<(), DatabaseError> {
        Err(unavailable())
    }

    async fn list_questionnaires(
        &self,
        _: UserId,
    ) -> Result<Vec<QuestionnaireSubmission>, DatabaseError> {
        Err(unavailable())
    }

    async fn append_diary(&self, _: UserId, _: &str, _: NaiveDateTime) -> Result<(), DatabaseError> {
        Err(unavailable())
    }

    async fn list_diary(&self, _: UserId) -> Result<Vec<DiaryEntry>, DatabaseError> {
        Err(unavailable())
    }

    async fn append_interaction(&self, _: UserId, _: &str, _: &str) -> Result<(), DatabaseError> {
        Err(unavailable())
    }

    async fn list_interactions(&self, _: UserId) -> Result<Vec<InteractionRecord>, DatabaseError> {
        Err(unavailable())
    }

    async fn save_reminder(&self, _: &ReminderTask) -> Result<(), DatabaseError> {
        Err(unavailable())
    }

    async fn update_reminder_progress(
        &self,
        _: Uuid,
        _: u32,
        _: NaiveDateTime,
    ) -> Result<(), DatabaseError> {
        Err(unavailable())
    }

    async fn delete_reminder(&self, _: Uuid) -> Result<bool, DatabaseError> {
        Err(unavailable())
    }

    async fn list_reminders(&self) -> Result<Vec<ReminderTask>, DatabaseError> {
        Err(unavailable())
    }
}

/// Wraps a `MemoryStore` but never reports a username on read, as if
/// another handler registered the user between the check and the write.
pub struct StaleNameStore {
    pub inner: MemoryStore,
}

#[async_trait]
impl RecordStore for StaleNameStore {
    async fn get_username(&self, _: UserId) -> Result<Option<String>, DatabaseError> {
        Ok(None)
    }

    async fn set_username(&self, user_id: UserId, username: &str) -> Result<(), DatabaseError> {
        self.inner.set_username(user_id, username).await
    }

    async fn append_questionnaire(
        &self,
        submission: &QuestionnaireSubmission,
    ) -> Result<(), DatabaseError> {
        self.inner.append_questionnaire(submission).await
    }

    async fn list_questionnaires(
        &self,
        user_id: UserId,
    ) -> Result<Vec<QuestionnaireSubmission>, DatabaseError> {
        self.inner.list_questionnaires(user_id).await
    }

    async fn append_diary(
        &self,
        user_id: UserId,
        text: &str,
        written_at: NaiveDateTime,
    ) -> Result<(), DatabaseError> {
        self.inner.append_diary(user_id, text, written_at).await
    }

    async fn list_diary(&self, user_id: UserId) -> Result<Vec<DiaryEntry>, DatabaseError> {
        self.inner.list_diary(user_id).await
    }

    async fn append_interaction(
        &self,
        user_id: UserId,
        category: &str,
        text: &str,
    ) -> Result<(), DatabaseError> {
        self.inner.append_interaction(user_id, category, text).await
    }

    async fn list_interactions(
        &self,
        user_id: UserId,
    ) -> Result<Vec<InteractionRecord>, DatabaseError> {
        self.inner.list_interactions(user_id).await
    }

    async fn save_reminder(&self, task: &ReminderTask) -> Result<(), DatabaseError> {
        self.inner.save_reminder(task).await
    }

    async fn update_reminder_progress(
        &self,
        id: Uuid,
        remaining: u32,
        next_fire_at: NaiveDateTime,
    ) -> Result<(), DatabaseError> {
        self.inner
            .update_reminder_progress(id, remaining, next_fire_at)
            .await
    }

    async fn delete_reminder(&self, id: Uuid) -> Result<bool, DatabaseError> {
        self.inner.delete_reminder(id).await
    }

    async fn list_reminders(&self) -> Result<Vec<ReminderTask>, DatabaseError> {
        self.inner.list_reminders().await
    }
}

// ── Channel ─────────────────────────────────────────────────────────

/// One delivered message and when (in tokio time) it went out.
#[derive(Debug, Clone)]
pub struct Sent {
    pub user_id: UserId,
    pub response: OutgoingResponse,
    pub at: tokio::time::Instant,
}

/// Records every outbound message.
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<Sent>>,
    fail_sends: bool,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A channel whose sends all fail (after being recorded).
    pub fn failing() -> Self {
        Self {
            fail_sends: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn contents(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.response.content).collect()
    }

    pub fn last(&self) -> Option<OutgoingResponse> {
        self.sent().pop().map(|s| s.response)
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn send(&self, user_id: UserId, response: OutgoingResponse) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push(Sent {
            user_id,
            response,
            at: tokio::time::Instant::now(),
        });
        if self.fail_sends {
            return Err(ChannelError::SendFailed {
                name: "recording".into(),
                reason: "blocked by user".into(),
            });
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

pub const USER: UserId = 7;

pub fn msg(text: &str) -> IncomingMessage {
    IncomingMessage::new("recording", USER, text).with_user_name("Anna Petrova")
}

pub fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, 0)
        .unwrap()
}

/// A wall clock that starts at `base` and advances with tokio time, so a
/// paused runtime moves both together.
pub fn tokio_clock(base: NaiveDateTime) -> Clock {
    let start = tokio::time::Instant::now();
    Arc::new(move || base + TimeDelta::from_std(start.elapsed()).unwrap())
}
