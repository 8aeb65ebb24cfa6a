//! Daily attendance: one record per employee per day, clock-in then clock-out.

use crate::schedule::current_schedule;
use crate::time_fmt::{format_hhmm, hhmm, hhmm_option, parse_hhmm};
use crate::{conversion_error, new_id, now_rfc3339, Store, StoreError};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const COLUMNS: &str = "a.id, a.employee_id, a.date, a.check_in, a.check_out, a.late_minutes, \
                       a.status, a.observations, a.auth_method, a.created_at";

const DATE_FORMAT: &str = "%Y-%m-%d";
const OBSERVATION_SEPARATOR: &str = " | ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Late => "late",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(Self::Present),
            "late" => Ok(Self::Late),
            other => Err(StoreError::Invalid(format!("unknown status {other:?}"))),
        }
    }
}

/// How the employee proved who they were at the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    #[default]
    Code,
    Id,
    Face,
}

impl AuthMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Id => "id",
            Self::Face => "face",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethod {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "code" => Ok(Self::Code),
            "id" => Ok(Self::Id),
            "face" => Ok(Self::Face),
            other => Err(StoreError::Invalid(format!("unknown auth method {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attendance {
    pub id: String,
    pub employee_id: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub check_in: NaiveTime,
    #[serde(with = "hhmm_option")]
    pub check_out: Option<NaiveTime>,
    pub late_minutes: i64,
    pub status: AttendanceStatus,
    pub observations: Option<String>,
    pub auth_method: AuthMethod,
    pub created_at: String,
}

impl Attendance {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let text = |index: usize| -> rusqlite::Result<String> { row.get(index) };
        let time = |index: usize, value: String| {
            parse_hhmm(&value).ok_or_else(|| conversion_error(index, format!("bad time {value:?}")))
        };

        let date = text(2)?;
        let check_out: Option<String> = row.get(4)?;
        Ok(Self {
            id: text(0)?,
            employee_id: text(1)?,
            date: NaiveDate::parse_from_str(&date, DATE_FORMAT)
                .map_err(|e| conversion_error(2, format!("bad date {date:?}: {e}")))?,
            check_in: time(3, text(3)?)?,
            check_out: check_out.map(|value| time(4, value)).transpose()?,
            late_minutes: row.get(5)?,
            status: text(6)?
                .parse()
                .map_err(|e: StoreError| conversion_error(6, e.to_string()))?,
            observations: row.get(7)?,
            auth_method: text(8)?
                .parse()
                .map_err(|e: StoreError| conversion_error(8, e.to_string()))?,
            created_at: text(9)?,
        })
    }
}

/// Who a record belongs to, as shown in listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeSummary {
    pub id: String,
    pub name: String,
    pub internal_code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceEntry {
    #[serde(flatten)]
    pub attendance: Attendance,
    pub employee: EmployeeSummary,
}

/// Listing filters. `date` takes precedence over the range bounds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttendanceFilter {
    pub employee_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttendanceUpdate {
    pub check_in: Option<String>,
    pub check_out: Option<String>,
    pub status: Option<AttendanceStatus>,
    pub observations: Option<String>,
}

/// Outcome of a terminal registration.
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    CheckIn(Attendance),
    CheckOut(Attendance),
}

impl Registration {
    pub fn attendance(&self) -> &Attendance {
        match self {
            Self::CheckIn(a) | Self::CheckOut(a) => a,
        }
    }

    pub fn into_attendance(self) -> Attendance {
        match self {
            Self::CheckIn(a) | Self::CheckOut(a) => a,
        }
    }
}

/// Whole minutes `check_in` falls after `start`, never negative.
pub fn late_minutes(check_in: NaiveTime, start: NaiveTime) -> i64 {
    let minutes = |t: NaiveTime| i64::from(t.hour() * 60 + t.minute());
    (minutes(check_in) - minutes(start)).max(0)
}

fn to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

fn append_observation(existing: Option<String>, new: Option<String>) -> Option<String> {
    match (existing, new) {
        (Some(old), Some(new)) => Some(format!("{old}{OBSERVATION_SEPARATOR}{new}")),
        (old, None) => old,
        (None, new) => new,
    }
}

fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

fn select_by(conn: &rusqlite::Connection, clause: &str, values: &[&str]) -> rusqlite::Result<Option<Attendance>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM attendance a WHERE {clause}"),
        params_from_iter(values.iter()),
        Attendance::from_row,
    )
    .optional()
}

fn write(conn: &rusqlite::Connection, a: &Attendance) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO attendance
             (id, employee_id, date, check_in, check_out, late_minutes, status, observations, auth_method, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
             check_in = excluded.check_in,
             check_out = excluded.check_out,
             late_minutes = excluded.late_minutes,
             status = excluded.status,
             observations = excluded.observations",
        params![
            a.id,
            a.employee_id,
            a.date.format(DATE_FORMAT).to_string(),
            format_hhmm(&a.check_in),
            a.check_out.as_ref().map(format_hhmm),
            a.late_minutes,
            a.status.as_str(),
            a.observations,
            a.auth_method.as_str(),
            a.created_at,
        ],
    )
}

impl Store {
    /// Record a terminal event for `employee_id` at local time `now`.
    ///
    /// The first event of the day clocks in, the second clocks out, and a
    /// third is rejected with [`StoreError::AlreadyCompleted`].
    pub async fn register_attendance(
        &self,
        employee_id: &str,
        auth_method: AuthMethod,
        observations: Option<String>,
        now: NaiveDateTime,
    ) -> Result<Registration, StoreError> {
        let employee_id = employee_id.to_string();
        let observations = non_blank(observations);
        let date = now.date();
        let time = to_minute(now.time());

        let registration = self
            .conn()
            .call(move |conn| {
                let tx = conn.transaction()?;
                let day = date.format(DATE_FORMAT).to_string();
                let existing = select_by(
                    &tx,
                    "a.employee_id = ?1 AND a.date = ?2",
                    &[employee_id.as_str(), day.as_str()],
                )?;

                let registration = match existing {
                    None => {
                        let known = tx
                            .query_row("SELECT 1 FROM employees WHERE id = ?1", params![employee_id], |_| Ok(()))
                            .optional()?;
                        if known.is_none() {
                            return Ok(Err(StoreError::NotFound("employee")));
                        }
                        let Some(schedule) = current_schedule(&tx)? else {
                            return Ok(Err(StoreError::NotFound("work schedule")));
                        };

                        let late = late_minutes(time, schedule.start_time);
                        let status = if late > schedule.late_tolerance {
                            AttendanceStatus::Late
                        } else {
                            AttendanceStatus::Present
                        };
                        let record = Attendance {
                            id: new_id(),
                            employee_id,
                            date,
                            check_in: time,
                            check_out: None,
                            late_minutes: late,
                            status,
                            observations,
                            auth_method,
                            created_at: now_rfc3339(),
                        };
                        write(&tx, &record)?;
                        Registration::CheckIn(record)
                    }
                    Some(mut record) if record.check_out.is_none() => {
                        record.check_out = Some(time);
                        record.status = AttendanceStatus::Present;
                        record.observations = append_observation(record.observations, observations);
                        write(&tx, &record)?;
                        Registration::CheckOut(record)
                    }
                    Some(_) => return Ok(Err(StoreError::AlreadyCompleted(employee_id))),
                };

                tx.commit()?;
                Ok(Ok(registration))
            })
            .await??;

        match &registration {
            Registration::CheckIn(a) => tracing::info!(
                employee_id = %a.employee_id,
                check_in = %format_hhmm(&a.check_in),
                late_minutes = a.late_minutes,
                auth_method = %a.auth_method,
                "clock-in recorded"
            ),
            Registration::CheckOut(a) => tracing::info!(
                employee_id = %a.employee_id,
                check_out = ?a.check_out.as_ref().map(format_hhmm),
                auth_method = %a.auth_method,
                "clock-out recorded"
            ),
        }
        Ok(registration)
    }

    /// Records matching `filter`, newest date first.
    pub async fn list_attendance(&self, filter: AttendanceFilter) -> Result<Vec<AttendanceEntry>, StoreError> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();
        if let Some(id) = filter.employee_id {
            clauses.push("a.employee_id = ?");
            values.push(id);
        }
        if let Some(date) = filter.date {
            clauses.push("a.date = ?");
            values.push(date.format(DATE_FORMAT).to_string());
        } else {
            if let Some(start) = filter.start_date {
                clauses.push("a.date >= ?");
                values.push(start.format(DATE_FORMAT).to_string());
            }
            if let Some(end) = filter.end_date {
                clauses.push("a.date <= ?");
                values.push(end.format(DATE_FORMAT).to_string());
            }
        }
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        Ok(self
            .conn()
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {COLUMNS}, e.name, e.internal_code
                     FROM attendance a JOIN employees e ON e.id = a.employee_id
                     {where_clause}
                     ORDER BY a.date DESC, a.check_in DESC"
                ))?;
                let rows = stmt
                    .query_map(params_from_iter(values.iter()), |row| {
                        let attendance = Attendance::from_row(row)?;
                        Ok(AttendanceEntry {
                            employee: EmployeeSummary {
                                id: attendance.employee_id.clone(),
                                name: row.get(10)?,
                                internal_code: row.get(11)?,
                            },
                            attendance,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?)
    }

    /// Administrative correction. A new check-in time recomputes the late
    /// minutes against the current schedule, when one exists.
    pub async fn update_attendance(&self, id: &str, update: AttendanceUpdate) -> Result<Attendance, StoreError> {
        let parse = |field: &str, value: Option<&String>| {
            value
                .map(|text| {
                    parse_hhmm(text)
                        .ok_or_else(|| StoreError::Invalid(format!("{field} must be HH:MM, got {text:?}")))
                })
                .transpose()
        };
        let check_in = parse("check_in", update.check_in.as_ref())?;
        let check_out = parse("check_out", update.check_out.as_ref())?;
        let id = id.to_string();

        let record = self
            .conn()
            .call(move |conn| {
                let Some(mut record) = select_by(conn, "a.id = ?1", &[id.as_str()])? else {
                    return Ok(Err(StoreError::NotFound("attendance record")));
                };

                if let Some(time) = check_in {
                    record.check_in = time;
                    if let Some(schedule) = current_schedule(conn)? {
                        record.late_minutes = late_minutes(time, schedule.start_time);
                    }
                }
                if check_out.is_some() {
                    record.check_out = check_out;
                }
                if let Some(status) = update.status {
                    record.status = status;
                }
                if update.observations.is_some() {
                    record.observations = non_blank(update.observations);
                }

                write(conn, &record)?;
                Ok(Ok(record))
            })
            .await??;

        tracing::info!(attendance_id = %record.id, "attendance record updated");
        Ok(record)
    }

    pub async fn delete_attendance(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        let removed = self
            .conn()
            .call({
                let id = id.clone();
                move |conn| Ok(conn.execute("DELETE FROM attendance WHERE id = ?1", params![id])?)
            })
            .await?;
        if removed == 0 {
            return Err(StoreError::NotFound("attendance record"));
        }
        tracing::info!(attendance_id = %id, "attendance record deleted");
        Ok(())
    }
}
