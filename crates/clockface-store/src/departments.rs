//! Department records. Employees refer to a department by name.

use crate::{new_id, now_rfc3339, Store, StoreError};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Department {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

impl Department {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at: row.get(2)?,
        })
    }
}

/// Body of a create or rename request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DepartmentInput {
    #[serde(default)]
    pub name: String,
}

fn department_name(input: &DepartmentInput) -> Result<String, StoreError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(StoreError::Invalid("department name is required".into()));
    }
    Ok(name.to_string())
}

fn select_one(conn: &rusqlite::Connection, id: &str) -> rusqlite::Result<Option<Department>> {
    conn.query_row(
        "SELECT id, name, created_at FROM departments WHERE id = ?1",
        params![id],
        Department::from_row,
    )
    .optional()
}

/// Whether a department other than `except` already uses `name`.
fn name_taken(conn: &rusqlite::Connection, name: &str, except: Option<&str>) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM departments WHERE name = ?1 AND id IS NOT ?2",
        params![name, except],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
}

fn duplicate(name: &str) -> StoreError {
    StoreError::Conflict(format!("department {name} already exists"))
}

impl Store {
    /// Every department, ordered by name.
    pub async fn all_departments(&self) -> Result<Vec<Department>, StoreError> {
        Ok(self
            .conn()
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, name, created_at FROM departments ORDER BY name, id")?;
                let rows = stmt
                    .query_map([], Department::from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?)
    }

    pub async fn department(&self, id: &str) -> Result<Option<Department>, StoreError> {
        let id = id.to_string();
        Ok(self
            .conn()
            .call(move |conn| Ok(select_one(conn, &id)?))
            .await?)
    }

    pub async fn create_department(&self, input: DepartmentInput) -> Result<Department, StoreError> {
        let name = department_name(&input)?;

        let department = self
            .conn()
            .call(move |conn| {
                if name_taken(conn, &name, None)? {
                    return Ok(Err(duplicate(&name)));
                }
                let department = Department {
                    id: new_id(),
                    name,
                    created_at: now_rfc3339(),
                };
                conn.execute(
                    "INSERT INTO departments (id, name, created_at) VALUES (?1, ?2, ?3)",
                    params![department.id, department.name, department.created_at],
                )?;
                Ok(Ok(department))
            })
            .await??;

        tracing::info!(department_id = %department.id, name = %department.name, "department created");
        Ok(department)
    }

    /// Rename a department. Employees keep the department name they were
    /// stored with.
    pub async fn update_department(
        &self,
        id: &str,
        input: DepartmentInput,
    ) -> Result<Department, StoreError> {
        let name = department_name(&input)?;
        let id = id.to_string();

        let department = self
            .conn()
            .call(move |conn| {
                let Some(mut department) = select_one(conn, &id)? else {
                    return Ok(Err(StoreError::NotFound("department")));
                };
                if name_taken(conn, &name, Some(id.as_str()))? {
                    return Ok(Err(duplicate(&name)));
                }
                conn.execute(
                    "UPDATE departments SET name = ?2 WHERE id = ?1",
                    params![id, name],
                )?;
                department.name = name;
                Ok(Ok(department))
            })
            .await??;

        tracing::info!(department_id = %department.id, name = %department.name, "department updated");
        Ok(department)
    }

    /// Delete a department no employee belongs to.
    pub async fn delete_department(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        let name = self
            .conn()
            .call({
                let id = id.clone();
                move |conn| {
                    let tx = conn.transaction()?;
                    let Some(department) = select_one(&tx, &id)? else {
                        return Ok(Err(StoreError::NotFound("department")));
                    };
                    let members: i64 = tx.query_row(
                        "SELECT COUNT(*) FROM employees WHERE department = ?1",
                        params![department.name],
                        |row| row.get(0),
                    )?;
                    if members > 0 {
                        return Ok(Err(StoreError::InUse(format!(
                            "department {} still has {members} employee(s)",
                            department.name
                        ))));
                    }
                    tx.execute("DELETE FROM departments WHERE id = ?1", params![id])?;
                    tx.commit()?;
                    Ok(Ok(department.name))
                }
            })
            .await??;

        tracing::info!(department_id = %id, %name, "department deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewEmployee;

    fn input(name: &str) -> DepartmentInput {
        DepartmentInput { name: name.into() }
    }

    #[tokio::test]
    async fn test_create_and_list_by_name() {
        let store = Store::open_in_memory().await.unwrap();
        for name in ["Logistics", "Accounting", "Maintenance"] {
            store.create_department(input(name)).await.unwrap();
        }
        let names: Vec<_> = store
            .all_departments()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, ["Accounting", "Logistics", "Maintenance"]);
    }

    #[tokio::test]
    async fn test_name_required() {
        let store = Store::open_in_memory().await.unwrap();
        let err = store.create_department(input("   ")).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));

        let created = store.create_department(input("Ward")).await.unwrap();
        let err = store.update_department(&created.id, input("")).await.unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let store = Store::open_in_memory().await.unwrap();
        store.create_department(input("Ward")).await.unwrap();
        let err = store.create_department(input(" Ward ")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_rename_checks_other_rows_only() {
        let store = Store::open_in_memory().await.unwrap();
        let ward = store.create_department(input("Ward")).await.unwrap();
        store.create_department(input("Kitchen")).await.unwrap();

        let same = store.update_department(&ward.id, input("Ward")).await.unwrap();
        assert_eq!(same.name, "Ward");

        let err = store.update_department(&ward.id, input("Kitchen")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let renamed = store.update_department(&ward.id, input("Ward B")).await.unwrap();
        assert_eq!(store.department(&ward.id).await.unwrap(), Some(renamed));
    }

    #[tokio::test]
    async fn test_delete_refused_while_staffed() {
        let store = Store::open_in_memory().await.unwrap();
        let ward = store.create_department(input("Ward")).await.unwrap();
        let nurse = store
            .create_employee(NewEmployee {
                name: "Ana".into(),
                position: "Nurse".into(),
                department: "Ward".into(),
                internal_code: None,
            })
            .await
            .unwrap();

        let err = store.delete_department(&ward.id).await.unwrap_err();
        assert!(matches!(err, StoreError::InUse(_)));
        assert!(store.department(&ward.id).await.unwrap().is_some());

        store.delete_employee(&nurse.id).await.unwrap();
        store.delete_department(&ward.id).await.unwrap();
        assert_eq!(store.department(&ward.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_department() {
        let store = Store::open_in_memory().await.unwrap();
        assert_eq!(store.department("nope").await.unwrap(), None);
        let err = store.update_department("nope", input("X")).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("department")));
        let err = store.delete_department("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("department")));
    }
}
