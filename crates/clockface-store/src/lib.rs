//! clockface-store: SQLite persistence for employees, departments, work schedule and attendance.
//!
//! All queries run on the `tokio-rusqlite` connection thread; the [`Store`]
//! handle is cheap to clone and safe to share between request tasks.

pub mod attendance;
pub mod departments;
pub mod employees;
pub mod error;
pub mod schedule;
pub mod time_fmt;

use std::path::Path;
use tokio_rusqlite::Connection;

pub use attendance::{
    late_minutes, Attendance, AttendanceEntry, AttendanceFilter, AttendanceStatus,
    AttendanceUpdate, AuthMethod, Registration,
};
pub use departments::{Department, DepartmentInput};
pub use employees::{Employee, EmployeeUpdate, NewEmployee};
pub use error::StoreError;
pub use schedule::{ScheduleUpdate, WorkSchedule};

const SCHEMA: &str = "
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS employees (
        id              TEXT PRIMARY KEY,
        name            TEXT NOT NULL,
        position        TEXT NOT NULL,
        department      TEXT NOT NULL,
        internal_code   TEXT NOT NULL UNIQUE,
        qr_code         TEXT NOT NULL,
        face_embedding  TEXT,
        created_at      TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS departments (
        id          TEXT PRIMARY KEY,
        name        TEXT NOT NULL UNIQUE,
        created_at  TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS work_schedule (
        id                TEXT PRIMARY KEY,
        start_time        TEXT NOT NULL,
        end_time          TEXT NOT NULL,
        work_days         TEXT NOT NULL,
        late_tolerance    INTEGER NOT NULL,
        daily_hours       REAL NOT NULL,
        auto_checkout     INTEGER NOT NULL,
        require_location  INTEGER NOT NULL,
        created_at        TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS attendance (
        id            TEXT PRIMARY KEY,
        employee_id   TEXT NOT NULL REFERENCES employees(id) ON DELETE CASCADE,
        date          TEXT NOT NULL,
        check_in      TEXT NOT NULL,
        check_out     TEXT,
        late_minutes  INTEGER NOT NULL,
        status        TEXT NOT NULL,
        observations  TEXT,
        auth_method   TEXT NOT NULL,
        created_at    TEXT NOT NULL,
        UNIQUE (employee_id, date)
    );

    CREATE INDEX IF NOT EXISTS attendance_by_date ON attendance (date);
";

/// Handle to the attendance database.
#[derive(Clone)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (creating if needed) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).await?;
        tracing::info!(path = %path.display(), "database opened");
        Self::init(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().await?).await
    }

    async fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Wrap a text-column parse failure as a rusqlite conversion error.
pub(crate) fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_creates_file_and_is_reopenable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("clockface.db");

        let store = Store::open(&path).await.unwrap();
        store
            .create_employee(NewEmployee {
                name: "Ana".into(),
                position: "Nurse".into(),
                department: "Ward".into(),
                internal_code: Some("AEM100".into()),
            })
            .await
            .unwrap();
        drop(store);
        assert!(path.exists());

        let reopened = Store::open(&path).await.unwrap();
        let all = reopened.all_employees().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].internal_code, "AEM100");
    }
}
