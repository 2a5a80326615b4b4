//! libSQL backend: async `RecordStore` implementation.
//!
//! Supports local file and in-memory databases. All writes go through a
//! single connection, which serializes concurrent writers from different
//! users' handlers and from reminder tasks.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, NaiveTime};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    DiaryEntry, InteractionRecord, QuestionnaireSubmission, RecordStore, ReminderTask, UserId,
};

/// Canonical write format for local wall-clock timestamps.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        migrations::run_migrations(backend.conn()).await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored timestamp, with or without fractional seconds.
fn parse_timestamp(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| DatabaseError::Serialization(format!("bad timestamp {s:?}: {e}")))
}

fn row_to_diary(row: &libsql::Row) -> Result<DiaryEntry, DatabaseError> {
    let written_at: String = row.get(1).map_err(query_err("list_diary"))?;
    Ok(DiaryEntry {
        user_id: row.get(0).map_err(query_err("list_diary"))?,
        written_at: parse_timestamp(&written_at)?,
        text: row.get(2).map_err(query_err("list_diary"))?,
    })
}

fn row_to_questionnaire(row: &libsql::Row) -> Result<QuestionnaireSubmission, DatabaseError> {
    let submitted_at: String = row.get(1).map_err(query_err("list_questionnaires"))?;
    Ok(QuestionnaireSubmission {
        user_id: row.get(0).map_err(query_err("list_questionnaires"))?,
        submitted_at: parse_timestamp(&submitted_at)?,
        mood: row.get(2).map_err(query_err("list_questionnaires"))?,
        pressure: row.get(3).map_err(query_err("list_questionnaires"))?,
        temperature: row.get(4).map_err(query_err("list_questionnaires"))?,
        blood_sugar: row.get(5).map_err(query_err("list_questionnaires"))?,
    })
}

fn row_to_interaction(row: &libsql::Row) -> Result<InteractionRecord, DatabaseError> {
    let recorded_at: String = row.get(1).map_err(query_err("list_interactions"))?;
    Ok(InteractionRecord {
        user_id: row.get(0).map_err(query_err("list_interactions"))?,
        recorded_at: parse_timestamp(&recorded_at)?,
        category: row.get(2).map_err(query_err("list_interactions"))?,
        text: row.get(3).map_err(query_err("list_interactions"))?,
    })
}

/// Column order: 0:id, 1:user_id, 2:message, 3:time_label, 4:fire_at,
/// 5:remaining, 6:next_fire_at
fn row_to_reminder(row: &libsql::Row) -> Result<ReminderTask, DatabaseError> {
    let id_str: String = row.get(0).map_err(query_err("list_reminders"))?;
    let fire_at_str: String = row.get(4).map_err(query_err("list_reminders"))?;
    let remaining: i64 = row.get(5).map_err(query_err("list_reminders"))?;
    let next_fire_str: String = row.get(6).map_err(query_err("list_reminders"))?;

    Ok(ReminderTask {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| DatabaseError::Serialization(format!("bad reminder id {id_str:?}: {e}")))?,
        user_id: row.get(1).map_err(query_err("list_reminders"))?,
        message: row.get(2).map_err(query_err("list_reminders"))?,
        time_label: row.get(3).map_err(query_err("list_reminders"))?,
        fire_at: NaiveTime::parse_from_str(&fire_at_str, "%H:%M:%S").map_err(|e| {
            DatabaseError::Serialization(format!("bad fire time {fire_at_str:?}: {e}"))
        })?,
        remaining: u32::try_from(remaining).unwrap_or(0),
        next_fire_at: parse_timestamp(&next_fire_str)?,
    })
}

fn query_err(op: &'static str) -> impl Fn(libsql::Error) -> DatabaseError {
    move |e| DatabaseError::Query(format!("{op}: {e}"))
}

// ── RecordStore implementation ──────────────────────────────────────

#[async_trait]
impl RecordStore for LibSqlBackend {
    // ── Users ───────────────────────────────────────────────────────

    async fn get_username(&self, user_id: UserId) -> Result<Option<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT username FROM users WHERE user_id = ?1",
                params![user_id],
            )
            .await
            .map_err(query_err("get_username"))?;

        match rows.next().await.map_err(query_err("get_username"))? {
            Some(row) => Ok(Some(row.get(0).map_err(query_err("get_username"))?)),
            None => Ok(None),
        }
    }

    async fn set_username(&self, user_id: UserId, username: &str) -> Result<(), DatabaseError> {
        let now = format_timestamp(&Local::now().naive_local());
        let inserted = self
            .conn()
            .execute(
                "INSERT INTO users (user_id, username, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (user_id) DO NOTHING",
                params![user_id, username, now],
            )
            .await
            .map_err(query_err("set_username"))?;

        if inserted == 0 {
            return Err(DatabaseError::Conflict {
                entity: "user".into(),
                id: user_id.to_string(),
            });
        }
        debug!(user_id, "Username registered");
        Ok(())
    }

    // ── Questionnaires ──────────────────────────────────────────────

    async fn append_questionnaire(
        &self,
        submission: &QuestionnaireSubmission,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO questionnaires
                    (user_id, submitted_at, mood, pressure, temperature, blood_sugar)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    submission.user_id,
                    format_timestamp(&submission.submitted_at),
                    submission.mood.as_str(),
                    submission.pressure.as_str(),
                    submission.temperature.as_str(),
                    submission.blood_sugar.as_str()
                ],
            )
            .await
            .map_err(query_err("append_questionnaire"))?;
        Ok(())
    }

    async fn list_questionnaires(
        &self,
        user_id: UserId,
    ) -> Result<Vec<QuestionnaireSubmission>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, submitted_at, mood, pressure, temperature, blood_sugar
                 FROM questionnaires WHERE user_id = ?1
                 ORDER BY submitted_at ASC, id ASC",
                params![user_id],
            )
            .await
            .map_err(query_err("list_questionnaires"))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err("list_questionnaires"))? {
            out.push(row_to_questionnaire(&row)?);
        }
        Ok(out)
    }

    // ── Diary ───────────────────────────────────────────────────────

    async fn append_diary(
        &self,
        user_id: UserId,
        text: &str,
        written_at: NaiveDateTime,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO diary_entries (user_id, written_at, text) VALUES (?1, ?2, ?3)",
                params![user_id, format_timestamp(&written_at), text],
            )
            .await
            .map_err(query_err("append_diary"))?;
        Ok(())
    }

    async fn list_diary(&self, user_id: UserId) -> Result<Vec<DiaryEntry>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, written_at, text FROM diary_entries
                 WHERE user_id = ?1 ORDER BY written_at ASC, id ASC",
                params![user_id],
            )
            .await
            .map_err(query_err("list_diary"))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err("list_diary"))? {
            out.push(row_to_diary(&row)?);
        }
        Ok(out)
    }

    // ── Interaction log ─────────────────────────────────────────────

    async fn append_interaction(
        &self,
        user_id: UserId,
        category: &str,
        text: &str,
    ) -> Result<(), DatabaseError> {
        let now = Local::now().naive_local();
        self.conn()
            .execute(
                "INSERT INTO interactions (user_id, recorded_at, category, text)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user_id, format_timestamp(&now), category, text],
            )
            .await
            .map_err(query_err("append_interaction"))?;
        Ok(())
    }

    async fn list_interactions(
        &self,
        user_id: UserId,
    ) -> Result<Vec<InteractionRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT user_id, recorded_at, category, text FROM interactions
                 WHERE user_id = ?1 ORDER BY recorded_at ASC, id ASC",
                params![user_id],
            )
            .await
            .map_err(query_err("list_interactions"))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err("list_interactions"))? {
            out.push(row_to_interaction(&row)?);
        }
        Ok(out)
    }

    // ── Reminders ───────────────────────────────────────────────────

    async fn save_reminder(&self, task: &ReminderTask) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO reminders
                    (id, user_id, message, time_label, fire_at, remaining, next_fire_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    task.id.to_string(),
                    task.user_id,
                    task.message.as_str(),
                    task.time_label.as_str(),
                    task.fire_at.format("%H:%M:%S").to_string(),
                    i64::from(task.remaining),
                    format_timestamp(&task.next_fire_at)
                ],
            )
            .await
            .map_err(query_err("save_reminder"))?;
        Ok(())
    }

    async fn update_reminder_progress(
        &self,
        id: Uuid,
        remaining: u32,
        next_fire_at: NaiveDateTime,
    ) -> Result<(), DatabaseError> {
        let updated = self
            .conn()
            .execute(
                "UPDATE reminders SET remaining = ?2, next_fire_at = ?3 WHERE id = ?1",
                params![
                    id.to_string(),
                    i64::from(remaining),
                    format_timestamp(&next_fire_at)
                ],
            )
            .await
            .map_err(query_err("update_reminder_progress"))?;

        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "reminder".into(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete_reminder(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let count = self
            .conn()
            .execute("DELETE FROM reminders WHERE id = ?1", params![id.to_string()])
            .await
            .map_err(query_err("delete_reminder"))?;
        Ok(count > 0)
    }

    async fn list_reminders(&self) -> Result<Vec<ReminderTask>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, user_id, message, time_label, fire_at, remaining, next_fire_at
                 FROM reminders WHERE remaining > 0 ORDER BY next_fire_at ASC",
                (),
            )
            .await
            .map_err(query_err("list_reminders"))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err("list_reminders"))? {
            out.push(row_to_reminder(&row)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    // ── User tests ──────────────────────────────────────────────────

    #[tokio::test]
    async fn username_absent_until_set() {
        let db = test_db().await;
        assert_eq!(db.get_username(7).await.unwrap(), None);

        db.set_username(7, "Olga").await.unwrap();
        assert_eq!(db.get_username(7).await.unwrap().as_deref(), Some("Olga"));
    }

    #[tokio::test]
    async fn username_first_write_wins() {
        let db = test_db().await;
        db.set_username(7, "Olga").await.unwrap();

        let err = db.set_username(7, "Someone else").await.unwrap_err();
        assert!(err.is_conflict(), "expected conflict, got {err}");
        assert_eq!(db.get_username(7).await.unwrap().as_deref(), Some("Olga"));
    }

    #[tokio::test]
    async fn user_created_at_uses_local_timestamp_format() {
        let db = test_db().await;
        let before = Local::now().naive_local();
        db.set_username(7, "Olga").await.unwrap();

        let mut rows = db
            .conn()
            .query("SELECT created_at FROM users WHERE user_id = 7", ())
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        let raw: String = row.get(0).unwrap();
        assert!(NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).is_ok(), "{raw}");
        assert!(parse_timestamp(&raw).unwrap() >= before);
    }

    // ── Diary tests ─────────────────────────────────────────────────

    #[tokio::test]
    async fn diary_listed_in_timestamp_order() {
        let db = test_db().await;
        db.append_diary(1, "second", at(2, 10, 0)).await.unwrap();
        db.append_diary(1, "first", at(1, 10, 0)).await.unwrap();
        db.append_diary(1, "third", at(3, 10, 0)).await.unwrap();
        db.append_diary(2, "other user", at(1, 9, 0)).await.unwrap();

        let entries = db.list_diary(1).await.unwrap();
        let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(entries[0].written_at, at(1, 10, 0));
    }

    #[tokio::test]
    async fn diary_equal_timestamps_keep_insertion_order() {
        let db = test_db().await;
        db.append_diary(1, "a", at(1, 10, 0)).await.unwrap();
        db.append_diary(1, "b", at(1, 10, 0)).await.unwrap();

        let entries = db.list_diary(1).await.unwrap();
        assert_eq!(entries[0].text, "a");
        assert_eq!(entries[1].text, "b");
    }

    #[tokio::test]
    async fn diary_empty_for_unknown_user() {
        let db = test_db().await;
        assert!(db.list_diary(999).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn diary_preserves_subsecond_timestamps() {
        let db = test_db().await;
        let ts = at(1, 10, 0) + chrono::Duration::microseconds(123_456);
        db.append_diary(1, "precise", ts).await.unwrap();
        assert_eq!(db.list_diary(1).await.unwrap()[0].written_at, ts);
    }

    // ── Questionnaire tests ─────────────────────────────────────────

    #[tokio::test]
    async fn questionnaire_fields_round_trip() {
        let db = test_db().await;
        let submission = QuestionnaireSubmission {
            user_id: 5,
            submitted_at: at(4, 8, 30),
            mood: "tired".into(),
            pressure: "130/85".into(),
            temperature: "36.9".into(),
            blood_sugar: "5.4".into(),
        };
        db.append_questionnaire(&submission).await.unwrap();

        let stored = db.list_questionnaires(5).await.unwrap();
        assert_eq!(stored, vec![submission]);
    }

    // ── Interaction tests ───────────────────────────────────────────

    #[tokio::test]
    async fn interactions_are_appended() {
        let db = test_db().await;
        db.append_interaction(3, "new user", "3").await.unwrap();
        db.append_interaction(3, "question", "why?").await.unwrap();

        let log = db.list_interactions(3).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].category, "new user");
        assert_eq!(log[1].text, "why?");
    }

    // ── Reminder tests ──────────────────────────────────────────────

    fn make_reminder(remaining: u32) -> ReminderTask {
        ReminderTask {
            id: Uuid::new_v4(),
            user_id: 11,
            message: "take pills".into(),
            time_label: "At 18:00".into(),
            fire_at: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
            remaining,
            next_fire_at: at(5, 18, 0),
        }
    }

    #[tokio::test]
    async fn reminder_save_and_list() {
        let db = test_db().await;
        let task = make_reminder(3);
        db.save_reminder(&task).await.unwrap();

        let listed = db.list_reminders().await.unwrap();
        assert_eq!(listed, vec![task]);
    }

    #[tokio::test]
    async fn reminder_progress_updates() {
        let db = test_db().await;
        let task = make_reminder(3);
        db.save_reminder(&task).await.unwrap();

        db.update_reminder_progress(task.id, 2, at(6, 18, 0))
            .await
            .unwrap();

        let listed = db.list_reminders().await.unwrap();
        assert_eq!(listed[0].remaining, 2);
        assert_eq!(listed[0].next_fire_at, at(6, 18, 0));
    }

    #[tokio::test]
    async fn reminder_progress_unknown_id_is_not_found() {
        let db = test_db().await;
        let err = db
            .update_reminder_progress(Uuid::new_v4(), 1, at(6, 18, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn reminder_delete() {
        let db = test_db().await;
        let task = make_reminder(1);
        db.save_reminder(&task).await.unwrap();

        assert!(db.delete_reminder(task.id).await.unwrap());
        assert!(!db.delete_reminder(task.id).await.unwrap());
        assert!(db.list_reminders().await.unwrap().is_empty());
    }

    // ── File-backed tests ───────────────────────────────────────────

    #[tokio::test]
    async fn local_file_creates_directory_and_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("care-bot.db");

        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.set_username(1, "Ivan").await.unwrap();
        }
        assert!(path.exists());

        let reopened = LibSqlBackend::new_local(&path).await.unwrap();
        assert_eq!(
            reopened.get_username(1).await.unwrap().as_deref(),
            Some("Ivan")
        );
    }
}
