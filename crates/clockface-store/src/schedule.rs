//! The single company-wide work schedule.

use crate::time_fmt::{format_hhmm, hhmm, parse_hhmm};
use crate::{conversion_error, new_id, now_rfc3339, Store, StoreError};
use chrono::NaiveTime;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

const COLUMNS: &str = "id, start_time, end_time, work_days, late_tolerance, daily_hours, \
                       auto_checkout, require_location, created_at";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkSchedule {
    pub id: String,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    /// ISO weekdays, 1 = Monday.
    pub work_days: Vec<u8>,
    /// Minutes after `start_time` before a clock-in counts as late.
    pub late_tolerance: i64,
    pub daily_hours: f64,
    pub auto_checkout: bool,
    pub require_location: bool,
    pub created_at: String,
}

impl WorkSchedule {
    fn with_defaults() -> Self {
        Self {
            id: new_id(),
            start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
            work_days: vec![1, 2, 3, 4, 5],
            late_tolerance: 15,
            daily_hours: 8.0,
            auto_checkout: false,
            require_location: false,
            created_at: now_rfc3339(),
        }
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let time = |index: usize| -> rusqlite::Result<NaiveTime> {
            let text: String = row.get(index)?;
            parse_hhmm(&text).ok_or_else(|| conversion_error(index, format!("bad time {text:?}")))
        };
        let days: String = row.get(3)?;
        let work_days = serde_json::from_str(&days)
            .map_err(|e| conversion_error(3, format!("bad work_days {days:?}: {e}")))?;

        Ok(Self {
            id: row.get(0)?,
            start_time: time(1)?,
            end_time: time(2)?,
            work_days,
            late_tolerance: row.get(4)?,
            daily_hours: row.get(5)?,
            auto_checkout: row.get(6)?,
            require_location: row.get(7)?,
            created_at: row.get(8)?,
        })
    }
}

/// Partial schedule change. Times are validated as `HH:MM` by [`Store::upsert_schedule`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleUpdate {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub work_days: Option<Vec<u8>>,
    pub late_tolerance: Option<i64>,
    pub daily_hours: Option<f64>,
    pub auto_checkout: Option<bool>,
    pub require_location: Option<bool>,
}

impl ScheduleUpdate {
    fn apply(self, schedule: &mut WorkSchedule) -> Result<(), StoreError> {
        let time = |field: &str, text: &str| {
            parse_hhmm(text).ok_or_else(|| {
                StoreError::Invalid(format!("{field} must be HH:MM (00:00-23:59), got {text:?}"))
            })
        };

        if let Some(text) = &self.start_time {
            schedule.start_time = time("start_time", text)?;
        }
        if let Some(text) = &self.end_time {
            schedule.end_time = time("end_time", text)?;
        }
        if let Some(mut days) = self.work_days {
            if let Some(bad) = days.iter().find(|d| !(1..=7).contains(*d)) {
                return Err(StoreError::Invalid(format!("work day {bad} out of range 1-7")));
            }
            days.sort_unstable();
            days.dedup();
            schedule.work_days = days;
        }
        if let Some(minutes) = self.late_tolerance {
            if minutes < 0 {
                return Err(StoreError::Invalid("late_tolerance must not be negative".into()));
            }
            schedule.late_tolerance = minutes;
        }
        if let Some(hours) = self.daily_hours {
            if !(hours.is_finite() && hours > 0.0 && hours <= 24.0) {
                return Err(StoreError::Invalid(format!("daily_hours {hours} out of range")));
            }
            schedule.daily_hours = hours;
        }
        if let Some(flag) = self.auto_checkout {
            schedule.auto_checkout = flag;
        }
        if let Some(flag) = self.require_location {
            schedule.require_location = flag;
        }
        Ok(())
    }
}

pub(crate) fn current_schedule(conn: &rusqlite::Connection) -> rusqlite::Result<Option<WorkSchedule>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM work_schedule ORDER BY created_at LIMIT 1"),
        [],
        WorkSchedule::from_row,
    )
    .optional()
}

impl Store {
    pub async fn schedule(&self) -> Result<Option<WorkSchedule>, StoreError> {
        Ok(self.conn().call(|conn| Ok(current_schedule(conn)?)).await?)
    }

    /// Update the schedule, creating it from the defaults on first use.
    pub async fn upsert_schedule(&self, update: ScheduleUpdate) -> Result<WorkSchedule, StoreError> {
        let schedule = self
            .conn()
            .call(move |conn| {
                let existing = current_schedule(conn)?;
                let created = existing.is_none();
                let mut schedule = existing.unwrap_or_else(WorkSchedule::with_defaults);
                if let Err(e) = update.apply(&mut schedule) {
                    return Ok(Err(e));
                }

                let days = serde_json::to_string(&schedule.work_days)
                    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
                conn.execute(
                    &format!(
                        "INSERT INTO work_schedule ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                         ON CONFLICT(id) DO UPDATE SET
                             start_time = excluded.start_time,
                             end_time = excluded.end_time,
                             work_days = excluded.work_days,
                             late_tolerance = excluded.late_tolerance,
                             daily_hours = excluded.daily_hours,
                             auto_checkout = excluded.auto_checkout,
                             require_location = excluded.require_location"
                    ),
                    params![
                        schedule.id,
                        format_hhmm(&schedule.start_time),
                        format_hhmm(&schedule.end_time),
                        days,
                        schedule.late_tolerance,
                        schedule.daily_hours,
                        schedule.auto_checkout,
                        schedule.require_location,
                        schedule.created_at,
                    ],
                )?;
                Ok(Ok((schedule, created)))
            })
            .await??;

        let (schedule, created) = schedule;
        tracing::info!(
            start = %format_hhmm(&schedule.start_time),
            end = %format_hhmm(&schedule.end_time),
            created,
            "work schedule saved"
        );
        Ok(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_absent_until_upserted() {
        let store = Store::open_in_memory().await.unwrap();
        assert_eq!(store.schedule().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_creates_with_defaults() {
        let store = Store::open_in_memory().await.unwrap();
        let schedule = store.upsert_schedule(ScheduleUpdate::default()).await.unwrap();

        assert_eq!(format_hhmm(&schedule.start_time), "08:00");
        assert_eq!(format_hhmm(&schedule.end_time), "17:00");
        assert_eq!(schedule.work_days, vec![1, 2, 3, 4, 5]);
        assert_eq!(schedule.late_tolerance, 15);
        assert_eq!(schedule.daily_hours, 8.0);
        assert!(!schedule.auto_checkout && !schedule.require_location);
        assert_eq!(store.schedule().await.unwrap(), Some(schedule));
    }

    #[tokio::test]
    async fn test_upsert_updates_in_place() {
        let store = Store::open_in_memory().await.unwrap();
        let first = store.upsert_schedule(ScheduleUpdate::default()).await.unwrap();
        let second = store
            .upsert_schedule(ScheduleUpdate {
                start_time: Some("9:30".into()),
                work_days: Some(vec![6, 1, 1]),
                late_tolerance: Some(5),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(format_hhmm(&second.start_time), "09:30");
        assert_eq!(format_hhmm(&second.end_time), "17:00");
        assert_eq!(second.work_days, vec![1, 6]);
        assert_eq!(second.late_tolerance, 5);
        assert_eq!(store.schedule().await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_invalid_values_rejected() {
        let store = Store::open_in_memory().await.unwrap();
        let err = store
            .upsert_schedule(ScheduleUpdate {
                end_time: Some("25:00".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(ref m) if m.contains("end_time")));

        let err = store
            .upsert_schedule(ScheduleUpdate {
                work_days: Some(vec![0, 3]),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));

        // Nothing was written by the failed attempts.
        assert_eq!(store.schedule().await.unwrap(), None);
    }

    #[test]
    fn test_serializes_times_as_hhmm() {
        let json = serde_json::to_value(WorkSchedule::with_defaults()).unwrap();
        assert_eq!(json["start_time"], "08:00");
        assert_eq!(json["work_days"], serde_json::json!([1, 2, 3, 4, 5]));
    }
}
