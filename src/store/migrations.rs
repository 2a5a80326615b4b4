//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.
//! If the database still carries the tables written by the previous bot
//! (`IdData`, `DiaryData`, `FormData`, `StatData`), their rows are copied
//! into the new schema once, right after V1 is applied.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
            );

            CREATE TABLE IF NOT EXISTS diary_entries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                written_at TEXT NOT NULL,
                text TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_diary_user ON diary_entries(user_id, written_at);

            CREATE TABLE IF NOT EXISTS questionnaires (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                submitted_at TEXT NOT NULL,
                mood TEXT NOT NULL,
                pressure TEXT NOT NULL,
                temperature TEXT NOT NULL,
                blood_sugar TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_questionnaires_user ON questionnaires(user_id);

            CREATE TABLE IF NOT EXISTS interactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                recorded_at TEXT NOT NULL,
                category TEXT NOT NULL,
                text TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_interactions_user ON interactions(user_id);
        "#,
    },
    Migration {
        version: 2,
        name: "pending_reminders",
        sql: r#"
            CREATE TABLE IF NOT EXISTS reminders (
                id TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                message TEXT NOT NULL,
                time_label TEXT NOT NULL,
                fire_at TEXT NOT NULL,
                remaining INTEGER NOT NULL,
                next_fire_at TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
            );
            CREATE INDEX IF NOT EXISTS idx_reminders_user ON reminders(user_id);
        "#,
    },
];

/// Copies rows from the previous bot's tables. Its dates were written as
/// `%y-%m-%d` and times as `%H:%M:%S`, hence the `'20' ||` prefix.
/// `FormData` was filled positionally in (state, pressure, temperature,
/// sugar) order against columns declared as (state, temperature, pressure,
/// sugar), so the two middle columns are swapped back here.
const LEGACY_IMPORT_SQL: &str = r#"
    INSERT OR IGNORE INTO users (user_id, username)
        SELECT user_id, username FROM IdData;
    INSERT INTO diary_entries (user_id, written_at, text)
        SELECT user_id, '20' || date || ' ' || time, text FROM DiaryData;
    INSERT INTO questionnaires (user_id, submitted_at, mood, pressure, temperature, blood_sugar)
        SELECT user_id, '20' || date || ' ' || time,
               COALESCE(state, ''), COALESCE(temperature, ''),
               COALESCE(pressure, ''), COALESCE(sugar, '')
        FROM FormData;
    INSERT INTO interactions (user_id, recorded_at, category, text)
        SELECT user_id, '20' || date || ' ' || time, message_type, text FROM StatData;
"#;

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now', 'localtime'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;

            if migration.version == 1 && legacy_tables_exist(conn).await? {
                conn.execute_batch(LEGACY_IMPORT_SQL).await.map_err(|e| {
                    DatabaseError::Migration(format!("Failed to import legacy tables: {e}"))
                })?;
                tracing::info!("Legacy bot tables detected: rows imported into V1 schema");
            }

            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    tracing::info!(
        "Database migrations complete (at V{})",
        get_current_version(conn).await?
    );

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Check whether all four tables of the previous bot are present.
async fn legacy_tables_exist(conn: &Connection) -> Result<bool, DatabaseError> {
    let mut rows = conn
        .query(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table'
             AND name IN ('IdData', 'DiaryData', 'FormData', 'StatData')",
            (),
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("Failed to check legacy tables: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Query(format!("Failed to read legacy check: {e}")))?;

    match row {
        Some(row) => {
            let count: i64 = row.get(0).unwrap_or(0);
            Ok(count == 4)
        }
        None => Ok(false),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
