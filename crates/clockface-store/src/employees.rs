//! Employee records and the face directory view over them.

use crate::{new_id, now_rfc3339, Store, StoreError};
use async_trait::async_trait;
use clockface_core::{DirectoryError, EmployeeDirectory, FaceRecord};
use rand::Rng;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize, Serializer};

const COLUMNS: &str =
    "id, name, position, department, internal_code, qr_code, face_embedding, created_at";

const CODE_PREFIX: &str = "AEM";
const CODE_ATTEMPTS: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Employee {
    pub id: String,
    pub name: String,
    pub position: String,
    pub department: String,
    pub internal_code: String,
    pub qr_code: String,
    /// Exposed to clients only as whether a face is enrolled.
    #[serde(rename = "face_enrolled", serialize_with = "serialize_enrolled")]
    pub face_embedding: Option<String>,
    pub created_at: String,
}

impl Employee {
    pub fn face_enrolled(&self) -> bool {
        self.face_embedding.is_some()
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            position: row.get(2)?,
            department: row.get(3)?,
            internal_code: row.get(4)?,
            qr_code: row.get(5)?,
            face_embedding: row.get(6)?,
            created_at: row.get(7)?,
        })
    }
}

fn serialize_enrolled<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_bool(value.is_some())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewEmployee {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub department: String,
    /// Generated as `AEM` + three digits when absent.
    #[serde(default)]
    pub internal_code: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmployeeUpdate {
    pub name: Option<String>,
    pub position: Option<String>,
    pub department: Option<String>,
    pub internal_code: Option<String>,
}

fn required(field: &str, value: &str) -> Result<String, StoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::Invalid(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn code_taken(conn: &rusqlite::Connection, code: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM employees WHERE internal_code = ?1",
        params![code],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
}

fn generate_code(conn: &rusqlite::Connection) -> rusqlite::Result<Option<String>> {
    let mut rng = rand::thread_rng();
    for _ in 0..CODE_ATTEMPTS {
        let code = format!("{CODE_PREFIX}{}", rng.gen_range(100..=999));
        if !code_taken(conn, &code)? {
            return Ok(Some(code));
        }
    }
    Ok(None)
}

fn select_one(
    conn: &rusqlite::Connection,
    column: &str,
    value: &str,
) -> rusqlite::Result<Option<Employee>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM employees WHERE {column} = ?1"),
        params![value],
        Employee::from_row,
    )
    .optional()
}

impl Store {
    pub async fn create_employee(&self, new: NewEmployee) -> Result<Employee, StoreError> {
        let name = required("name", &new.name)?;
        let position = required("position", &new.position)?;
        let department = required("department", &new.department)?;
        let supplied_code = match new.internal_code.as_deref().map(str::trim) {
            Some("") | None => None,
            Some(code) => Some(code.to_string()),
        };

        let employee = self
            .conn()
            .call(move |conn| {
                let internal_code = match supplied_code {
                    Some(code) => {
                        if code_taken(conn, &code)? {
                            return Ok(Err(StoreError::Conflict(format!(
                                "internal code {code} already in use"
                            ))));
                        }
                        code
                    }
                    None => match generate_code(conn)? {
                        Some(code) => code,
                        None => {
                            return Ok(Err(StoreError::Conflict(
                                "no free internal code available".into(),
                            )))
                        }
                    },
                };

                let employee = Employee {
                    id: new_id(),
                    name,
                    position,
                    department,
                    qr_code: internal_code.clone(),
                    internal_code,
                    face_embedding: None,
                    created_at: now_rfc3339(),
                };
                conn.execute(
                    &format!("INSERT INTO employees ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                    params![
                        employee.id,
                        employee.name,
                        employee.position,
                        employee.department,
                        employee.internal_code,
                        employee.qr_code,
                        employee.face_embedding,
                        employee.created_at,
                    ],
                )?;
                Ok(Ok(employee))
            })
            .await??;

        tracing::info!(
            employee_id = %employee.id,
            internal_code = %employee.internal_code,
            "employee created"
        );
        Ok(employee)
    }

    pub async fn employee(&self, id: &str) -> Result<Option<Employee>, StoreError> {
        let id = id.to_string();
        Ok(self
            .conn()
            .call(move |conn| Ok(select_one(conn, "id", &id)?))
            .await?)
    }

    pub async fn employee_by_code(&self, code: &str) -> Result<Option<Employee>, StoreError> {
        let code = code.trim().to_string();
        Ok(self
            .conn()
            .call(move |conn| Ok(select_one(conn, "internal_code", &code)?))
            .await?)
    }

    /// Every employee, ordered by name.
    pub async fn all_employees(&self) -> Result<Vec<Employee>, StoreError> {
        Ok(self
            .conn()
            .call(|conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {COLUMNS} FROM employees ORDER BY name, id"))?;
                let rows = stmt
                    .query_map([], Employee::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?)
    }

    /// Apply the fields present in `update`. Changing the internal code also
    /// changes the QR code.
    pub async fn update_employee(&self, id: &str, update: EmployeeUpdate) -> Result<Employee, StoreError> {
        let name = update.name.as_deref().map(|v| required("name", v)).transpose()?;
        let position = update.position.as_deref().map(|v| required("position", v)).transpose()?;
        let department = update
            .department
            .as_deref()
            .map(|v| required("department", v))
            .transpose()?;
        let internal_code = update
            .internal_code
            .as_deref()
            .map(|v| required("internal_code", v))
            .transpose()?;
        let id = id.to_string();

        let employee = self
            .conn()
            .call(move |conn| {
                let Some(mut employee) = select_one(conn, "id", &id)? else {
                    return Ok(Err(StoreError::NotFound("employee")));
                };
                if let Some(name) = name {
                    employee.name = name;
                }
                if let Some(position) = position {
                    employee.position = position;
                }
                if let Some(department) = department {
                    employee.department = department;
                }
                if let Some(code) = internal_code {
                    employee.qr_code = code.clone();
                    employee.internal_code = code;
                }

                let result = conn.execute(
                    "UPDATE employees
                     SET name = ?2, position = ?3, department = ?4, internal_code = ?5, qr_code = ?6
                     WHERE id = ?1",
                    params![
                        employee.id,
                        employee.name,
                        employee.position,
                        employee.department,
                        employee.internal_code,
                        employee.qr_code,
                    ],
                );
                match result {
                    Ok(_) => Ok(Ok(employee)),
                    Err(e) if is_unique_violation(&e) => Ok(Err(StoreError::Conflict(format!(
                        "internal code {} already in use",
                        employee.internal_code
                    )))),
                    Err(e) => Err(e.into()),
                }
            })
            .await??;

        tracing::info!(employee_id = %employee.id, "employee updated");
        Ok(employee)
    }

    /// Delete the employee and, through the foreign key, their attendance.
    pub async fn delete_employee(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        let removed = self
            .conn()
            .call({
                let id = id.clone();
                move |conn| Ok(conn.execute("DELETE FROM employees WHERE id = ?1", params![id])?)
            })
            .await?;
        if removed == 0 {
            return Err(StoreError::NotFound("employee"));
        }
        tracing::info!(employee_id = %id, "employee deleted");
        Ok(())
    }
}

fn directory_error(err: StoreError) -> DirectoryError {
    DirectoryError(err.to_string())
}

#[async_trait]
impl EmployeeDirectory for Store {
    async fn get_employee(&self, id: &str) -> Result<Option<FaceRecord>, DirectoryError> {
        let employee = self.employee(id).await.map_err(directory_error)?;
        Ok(employee.map(|e| FaceRecord {
            employee_id: e.id,
            face_embedding: e.face_embedding,
        }))
    }

    async fn list_employees(&self) -> Result<Vec<FaceRecord>, DirectoryError> {
        self.conn()
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT id, face_embedding FROM employees ORDER BY id")?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(FaceRecord {
                            employee_id: row.get(0)?,
                            face_embedding: row.get(1)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
            .map_err(|e| directory_error(e.into()))
    }

    async fn update_employee_embedding(&self, id: &str, encoded: &str) -> Result<(), DirectoryError> {
        let (id, encoded) = (id.to_string(), encoded.to_string());
        let updated = self
            .conn()
            .call(move |conn| {
                Ok(conn.execute(
                    "UPDATE employees SET face_embedding = ?2 WHERE id = ?1",
                    params![id, encoded],
                )?)
            })
            .await
            .map_err(|e| directory_error(e.into()))?;
        if updated == 0 {
            return Err(directory_error(StoreError::NotFound("employee")));
        }
        Ok(())
    }
}
