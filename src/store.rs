use crate::model::{AttendanceRecord, AttendanceStatus, ClassRoom, RecordKey, SessionKey, Student, Subject};
use chrono::NaiveDate;
use rusqlite::types::{Type, Value};
use rusqlite::{params_from_iter, Connection, ErrorCode, Row};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("table {table} is missing from the workspace database")]
    SchemaMissing { table: String },
    #[error("failed to save {table}: {reason}")]
    WriteRejected { table: String, reason: String },
    #[error("query failed on {table}: {reason}")]
    Query { table: String, reason: String },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "store_unavailable",
            StoreError::SchemaMissing { .. } => "schema_missing",
            StoreError::WriteRejected { .. } => "write_rejected",
            StoreError::Query { .. } => "db_query_failed",
        }
    }

    pub fn table(&self) -> Option<&str> {
        match self {
            StoreError::Unavailable(_) => None,
            StoreError::SchemaMissing { table }
            | StoreError::WriteRejected { table, .. }
            | StoreError::Query { table, .. } => Some(table),
        }
    }

    fn from_sqlite(table: &str, writing: bool, e: rusqlite::Error) -> Self {
        let reason = e.to_string();
        if reason.contains("no such table") {
            return StoreError::SchemaMissing {
                table: table.to_string(),
            };
        }
        let code = match &e {
            rusqlite::Error::SqliteFailure(f, _) => Some(f.code),
            _ => None,
        };
        match code {
            Some(ErrorCode::ConstraintViolation) => StoreError::WriteRejected {
                table: table.to_string(),
                reason,
            },
            Some(
                ErrorCode::CannotOpen
                | ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::SystemIoFailure
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt,
            ) => StoreError::Unavailable(reason),
            _ if writing => StoreError::WriteRejected {
                table: table.to_string(),
                reason,
            },
            _ => StoreError::Query {
                table: table.to_string(),
                reason,
            },
        }
    }
}

/// A table the store knows how to read and upsert by key.
pub trait Entity: Sized {
    type Key;

    const TABLE: &'static str;
    const SELECT_SQL: &'static str;
    const UPSERT_SQL: &'static str;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
    fn to_params(&self) -> Vec<Value>;
    fn key_params(key: &Self::Key) -> Vec<Value>;
}

impl Entity for ClassRoom {
    type Key = String;

    const TABLE: &'static str = "classes";
    const SELECT_SQL: &'static str = "SELECT id, name FROM classes ORDER BY rowid";
    const UPSERT_SQL: &'static str = "INSERT INTO classes(id, name) VALUES(?, ?)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(ClassRoom {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    }

    fn to_params(&self) -> Vec<Value> {
        vec![Value::Text(self.id.clone()), Value::Text(self.name.clone())]
    }

    fn key_params(key: &String) -> Vec<Value> {
        vec![Value::Text(key.clone())]
    }
}

impl Entity for Student {
    type Key = String;

    const TABLE: &'static str = "students";
    const SELECT_SQL: &'static str =
        "SELECT id, nisn, name, class_id FROM students ORDER BY rowid";
    const UPSERT_SQL: &'static str = "INSERT INTO students(id, nisn, name, class_id) VALUES(?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           nisn = excluded.nisn,
           name = excluded.name,
           class_id = excluded.class_id";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Student {
            id: row.get(0)?,
            nisn: row.get(1)?,
            name: row.get(2)?,
            class_id: row.get(3)?,
        })
    }

    fn to_params(&self) -> Vec<Value> {
        vec![
            Value::Text(self.id.clone()),
            Value::Text(self.nisn.clone()),
            Value::Text(self.name.clone()),
            Value::Text(self.class_id.clone()),
        ]
    }

    fn key_params(key: &String) -> Vec<Value> {
        vec![Value::Text(key.clone())]
    }
}

impl Entity for Subject {
    type Key = String;

    const TABLE: &'static str = "subjects";
    const SELECT_SQL: &'static str = "SELECT id, name FROM subjects ORDER BY rowid";
    const UPSERT_SQL: &'static str = "INSERT INTO subjects(id, name) VALUES(?, ?)
         ON CONFLICT(id) DO UPDATE SET name = excluded.name";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Subject {
            id: row.get(0)?,
            name: row.get(1)?,
        })
    }

    fn to_params(&self) -> Vec<Value> {
        vec![Value::Text(self.id.clone()), Value::Text(self.name.clone())]
    }

    fn key_params(key: &String) -> Vec<Value> {
        vec![Value::Text(key.clone())]
    }
}

fn text_conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
}

impl Entity for AttendanceRecord {
    type Key = RecordKey;

    const TABLE: &'static str = "attendance";
    const SELECT_SQL: &'static str =
        "SELECT class_id, subject_id, date, student_id, status FROM attendance ORDER BY rowid";
    const UPSERT_SQL: &'static str =
        "INSERT INTO attendance(class_id, subject_id, date, student_id, status) VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(class_id, subject_id, date, student_id) DO UPDATE SET
           status = excluded.status";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let date_raw: String = row.get(2)?;
        let date = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d")
            .map_err(|e| text_conversion_err(2, e))?;
        let status_raw: String = row.get(4)?;
        let status = status_raw
            .parse::<AttendanceStatus>()
            .map_err(|e| text_conversion_err(4, e))?;
        let session = SessionKey {
            class_id: row.get(0)?,
            subject_id: row.get(1)?,
            date,
        };
        Ok(AttendanceRecord::new(&session, row.get::<_, String>(3)?, status))
    }

    fn to_params(&self) -> Vec<Value> {
        let mut params = Self::key_params(&self.key);
        params.push(Value::Text(self.status.as_str().to_string()));
        params
    }

    fn key_params(key: &RecordKey) -> Vec<Value> {
        vec![
            Value::Text(key.session.class_id.clone()),
            Value::Text(key.session.subject_id.clone()),
            Value::Text(key.session.date.format("%Y-%m-%d").to_string()),
            Value::Text(key.student_id.clone()),
        ]
    }
}

fn session_params(key: &SessionKey) -> Vec<Value> {
    vec![
        Value::Text(key.class_id.clone()),
        Value::Text(key.subject_id.clone()),
        Value::Text(key.date.format("%Y-%m-%d").to_string()),
    ]
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeCounts {
    pub students: usize,
    pub records: usize,
}

/// Full-table read and upsert-by-key.
///
/// `replace_session` and the cascade deletes run in one transaction each,
/// dependents first.
pub trait RecordStore {
    fn read_all<E: Entity>(&self) -> Result<Vec<E>, StoreError>;
    fn upsert<E: Entity>(&self, rows: &[E]) -> Result<(), StoreError>;

    /// Makes `fresh` the complete record set of `key`'s session.
    /// Returns how many stored records of that session were dropped.
    fn replace_session(&self, key: &SessionKey, fresh: &[AttendanceRecord]) -> Result<usize, StoreError>;

    fn delete_class_cascade(&self, class_id: &str) -> Result<CascadeCounts, StoreError>;
    fn delete_student_cascade(&self, student_id: &str) -> Result<usize, StoreError>;
    fn delete_subject_cascade(&self, subject_id: &str) -> Result<usize, StoreError>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn delete_in_tx(
        tx: &rusqlite::Transaction<'_>,
        table: &str,
        sql: &str,
        id: &str,
    ) -> Result<usize, StoreError> {
        tx.execute(sql, [id])
            .map_err(|e| StoreError::from_sqlite(table, true, e))
    }
}

impl RecordStore for SqliteStore {
    fn read_all<E: Entity>(&self) -> Result<Vec<E>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(E::SELECT_SQL)
            .map_err(|e| StoreError::from_sqlite(E::TABLE, false, e))?;
        let rows = stmt
            .query_map([], |row| E::from_row(row))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(|e| StoreError::from_sqlite(E::TABLE, false, e))?;
        Ok(rows)
    }

    fn upsert<E: Entity>(&self, rows: &[E]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| StoreError::from_sqlite(E::TABLE, true, e))?;
        {
            let mut stmt = tx
                .prepare(E::UPSERT_SQL)
                .map_err(|e| StoreError::from_sqlite(E::TABLE, true, e))?;
            for row in rows {
                stmt.execute(params_from_iter(row.to_params()))
                    .map_err(|e| StoreError::from_sqlite(E::TABLE, true, e))?;
            }
        }
        tx.commit()
            .map_err(|e| StoreError::from_sqlite(E::TABLE, true, e))
    }

    fn replace_session(&self, key: &SessionKey, fresh: &[AttendanceRecord]) -> Result<usize, StoreError> {
        let table = AttendanceRecord::TABLE;
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| StoreError::from_sqlite(table, true, e))?;
        let stale = {
            let mut select = tx
                .prepare(
                    "SELECT student_id FROM attendance
                     WHERE class_id = ? AND subject_id = ? AND date = ?",
                )
                .map_err(|e| StoreError::from_sqlite(table, true, e))?;
            let stored = select
                .query_map(params_from_iter(session_params(key)), |row| row.get::<_, String>(0))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(|e| StoreError::from_sqlite(table, true, e))?;
            stored
                .into_iter()
                .filter(|id| !fresh.iter().any(|r| r.student_id() == id))
                .collect::<Vec<_>>()
        };
        {
            let mut delete = tx
                .prepare(
                    "DELETE FROM attendance
                     WHERE class_id = ? AND subject_id = ? AND date = ? AND student_id = ?",
                )
                .map_err(|e| StoreError::from_sqlite(table, true, e))?;
            for student_id in &stale {
                let record_key = key.record_key(student_id.as_str());
                delete
                    .execute(params_from_iter(AttendanceRecord::key_params(&record_key)))
                    .map_err(|e| StoreError::from_sqlite(table, true, e))?;
            }
            let mut upsert = tx
                .prepare(AttendanceRecord::UPSERT_SQL)
                .map_err(|e| StoreError::from_sqlite(table, true, e))?;
            for row in fresh {
                upsert
                    .execute(params_from_iter(row.to_params()))
                    .map_err(|e| StoreError::from_sqlite(table, true, e))?;
            }
        }
        tx.commit()
            .map_err(|e| StoreError::from_sqlite(table, true, e))?;
        Ok(stale.len())
    }

    fn delete_class_cascade(&self, class_id: &str) -> Result<CascadeCounts, StoreError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| StoreError::from_sqlite("classes", true, e))?;
        let records = Self::delete_in_tx(
            &tx,
            "attendance",
            "DELETE FROM attendance
             WHERE class_id = ?1
                OR student_id IN (SELECT id FROM students WHERE class_id = ?1)",
            class_id,
        )?;
        let students = Self::delete_in_tx(
            &tx,
            "students",
            "DELETE FROM students WHERE class_id = ?",
            class_id,
        )?;
        Self::delete_in_tx(&tx, "classes", "DELETE FROM classes WHERE id = ?", class_id)?;
        tx.commit()
            .map_err(|e| StoreError::from_sqlite("classes", true, e))?;
        Ok(CascadeCounts { students, records })
    }

    fn delete_student_cascade(&self, student_id: &str) -> Result<usize, StoreError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| StoreError::from_sqlite("students", true, e))?;
        let records = Self::delete_in_tx(
            &tx,
            "attendance",
            "DELETE FROM attendance WHERE student_id = ?",
            student_id,
        )?;
        Self::delete_in_tx(&tx, "students", "DELETE FROM students WHERE id = ?", student_id)?;
        tx.commit()
            .map_err(|e| StoreError::from_sqlite("students", true, e))?;
        Ok(records)
    }

    fn delete_subject_cascade(&self, subject_id: &str) -> Result<usize, StoreError> {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| StoreError::from_sqlite("subjects", true, e))?;
        let records = Self::delete_in_tx(
            &tx,
            "attendance",
            "DELETE FROM attendance WHERE subject_id = ?",
            subject_id,
        )?;
        Self::delete_in_tx(&tx, "subjects", "DELETE FROM subjects WHERE id = ?", subject_id)?;
        tx.commit()
            .map_err(|e| StoreError::from_sqlite("subjects", true, e))?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteStore {
        let conn = Connection::open_in_memory().expect("open memory db");
        crate::db::init_schema(&conn).expect("schema");
        SqliteStore::new(conn)
    }

    fn seed(store: &SqliteStore) -> SessionKey {
        store
            .upsert(&[ClassRoom {
                id: "C1".into(),
                name: "7A".into(),
            }])
            .expect("class");
        store
            .upsert(&[Subject {
                id: "M1".into(),
                name: "Math".into(),
            }])
            .expect("subject");
        store
            .upsert(&[Student {
                id: "S1".into(),
                nisn: "001".into(),
                name: "Ani".into(),
                class_id: "C1".into(),
            }])
            .expect("student");
        SessionKey::new("C1", "M1", NaiveDate::from_ymd_opt(2024, 3, 1).expect("date"))
    }

    #[test]
    fn upsert_replaces_by_composite_key() {
        let store = store();
        let key = seed(&store);
        store
            .upsert(&[AttendanceRecord::new(&key, "S1", AttendanceStatus::Sick)])
            .expect("first write");
        store
            .upsert(&[AttendanceRecord::new(&key, "S1", AttendanceStatus::Present)])
            .expect("second write");
        let all: Vec<AttendanceRecord> = store.read_all().expect("read");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, AttendanceStatus::Present);
        assert_eq!(all[0].date(), key.date);
    }

    #[test]
    fn unknown_student_is_write_rejected() {
        let store = store();
        let key = seed(&store);
        let err = store
            .upsert(&[AttendanceRecord::new(&key, "NOPE", AttendanceStatus::Absent)])
            .expect_err("foreign key");
        assert_eq!(err.code(), "write_rejected");
        assert_eq!(err.table(), Some("attendance"));
        assert!(err.to_string().starts_with("failed to save attendance"));
    }

    #[test]
    fn missing_table_is_reported_as_schema_missing() {
        let store = store();
        store
            .conn()
            .execute("DROP TABLE attendance", [])
            .expect("drop table");
        let err = store.read_all::<AttendanceRecord>().expect_err("missing table");
        assert!(matches!(err, StoreError::SchemaMissing { ref table } if table == "attendance"));
    }

    #[test]
    fn class_cascade_removes_students_and_records() {
        let store = store();
        let key = seed(&store);
        store
            .upsert(&[AttendanceRecord::new(&key, "S1", AttendanceStatus::Absent)])
            .expect("record");
        let counts = store.delete_class_cascade("C1").expect("cascade");
        assert_eq!(counts, CascadeCounts { students: 1, records: 1 });
        assert!(store.read_all::<Student>().expect("students").is_empty());
        assert!(store.read_all::<AttendanceRecord>().expect("records").is_empty());
        assert!(store.read_all::<ClassRoom>().expect("classes").is_empty());
    }

    #[test]
    fn replace_session_drops_students_no_longer_listed() {
        let store = store();
        let key = seed(&store);
        store
            .upsert(&[Student {
                id: "S2".into(),
                nisn: "002".into(),
                name: "Budi".into(),
                class_id: "C1".into(),
            }])
            .expect("second student");
        let both = [
            AttendanceRecord::new(&key, "S1", AttendanceStatus::Present),
            AttendanceRecord::new(&key, "S2", AttendanceStatus::Sick),
        ];
        assert_eq!(store.replace_session(&key, &both).expect("first"), 0);

        let only_s1 = [AttendanceRecord::new(&key, "S1", AttendanceStatus::Absent)];
        assert_eq!(store.replace_session(&key, &only_s1).expect("second"), 1);
        let all: Vec<AttendanceRecord> = store.read_all().expect("read");
        assert_eq!(all, only_s1.to_vec());
    }

    #[test]
    fn replace_session_is_all_or_nothing() {
        let store = store();
        let key = seed(&store);
        let saved = [AttendanceRecord::new(&key, "S1", AttendanceStatus::Present)];
        store.replace_session(&key, &saved).expect("first");

        // S1 is dropped first, then the insert for an unknown student fails.
        let broken = [AttendanceRecord::new(&key, "NOPE", AttendanceStatus::Absent)];
        let err = store.replace_session(&key, &broken).expect_err("foreign key");
        assert_eq!(err.code(), "write_rejected");
        let all: Vec<AttendanceRecord> = store.read_all().expect("read");
        assert_eq!(all, saved.to_vec());
    }
}
