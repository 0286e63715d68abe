use crate::config::{BackendConfig, StoreConfig};
use crate::error::{StoreError, StoreResult};
use crate::records::{ExportRow, StudentRecord, StudentSummary, Topper};
use crate::validate::{RollNumber, Score, StudentName, Subject};
use rusqlite::{ffi, Connection, ErrorCode, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[cfg(feature = "postgres")]
pub mod pg;

/// Storage operations over validated input.
///
/// Implementations own connection handling. Multi-statement operations
/// (`delete_student`, `upsert_grade`) must commit as one transaction.
pub trait Backend {
    fn kind(&self) -> &'static str;

    /// Fails with `DuplicateKey` when the roll number is taken.
    fn insert_student(&self, roll: &RollNumber, name: &StudentName) -> StoreResult<()>;

    /// Removes the student and every grade row for it. Returns false if no
    /// student row existed.
    fn delete_student(&self, roll: &RollNumber) -> StoreResult<bool>;

    fn list_students(&self) -> StoreResult<Vec<StudentSummary>>;

    fn count_students(&self) -> StoreResult<i64>;

    fn student(&self, roll: &RollNumber) -> StoreResult<Option<StudentRecord>>;

    /// Insert-or-overwrite keyed on (roll, subject). Fails with `NotFound`
    /// when the student does not exist.
    fn upsert_grade(&self, roll: &RollNumber, subject: &Subject, score: Score) -> StoreResult<()>;

    /// Unrounded mean; `None` when the student has no grades.
    fn student_mean(&self, roll: &RollNumber) -> StoreResult<Option<f64>>;

    /// Unrounded mean; `None` when nobody has the subject.
    fn subject_mean(&self, subject: &Subject) -> StoreResult<Option<f64>>;

    fn subject_topper(&self, subject: &Subject) -> StoreResult<Option<Topper>>;

    fn export_rows(&self) -> StoreResult<Vec<ExportRow>>;
}

/// Opens the configured backend and makes sure the schema exists.
pub fn open_backend(config: &StoreConfig) -> StoreResult<Box<dyn Backend>> {
    match &config.backend {
        BackendConfig::Sqlite {
            path,
            busy_timeout_ms,
        } => Ok(Box::new(SqliteBackend::open(path, *busy_timeout_ms)?)),
        #[cfg(feature = "postgres")]
        BackendConfig::Postgres { url } => Ok(Box::new(pg::PostgresBackend::open(url)?)),
        #[cfg(not(feature = "postgres"))]
        BackendConfig::Postgres { .. } => Err(StoreError::storage(
            "postgres backend requested but this build lacks the `postgres` feature",
        )),
    }
}

pub(crate) fn missing_student(roll: &RollNumber) -> StoreError {
    StoreError::NotFound(format!("student {} not found", roll))
}

pub(crate) fn duplicate_student(roll: &RollNumber) -> StoreError {
    StoreError::DuplicateKey(format!("roll number {} already exists", roll))
}

pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    pub fn open(path: &Path, busy_timeout_ms: u64) -> StoreResult<Self> {
        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::storage(format!(
                        "failed to create directory {}: {}",
                        parent.to_string_lossy(),
                        e
                    ))
                })?;
            }
            Connection::open(path)?
        };
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        init_schema(&conn)?;
        Ok(SqliteBackend { conn })
    }
}

fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            roll_number TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            roll_number TEXT NOT NULL,
            subject TEXT NOT NULL,
            grade INTEGER NOT NULL CHECK(grade BETWEEN 0 AND 100),
            UNIQUE(roll_number, subject),
            FOREIGN KEY(roll_number) REFERENCES students(roll_number) ON DELETE CASCADE
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_subject ON grades(subject)",
        [],
    )?;
    Ok(())
}

/// Extended result code of a constraint violation, if that is what `e` is.
fn constraint_violation(e: &rusqlite::Error) -> Option<i32> {
    match e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            Some(err.extended_code)
        }
        _ => None,
    }
}

impl Backend for SqliteBackend {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn insert_student(&self, roll: &RollNumber, name: &StudentName) -> StoreResult<()> {
        self.conn
            .execute(
                "INSERT INTO students(roll_number, name) VALUES(?, ?)",
                (roll.as_str(), name.as_str()),
            )
            .map_err(|e| match constraint_violation(&e) {
                Some(ffi::SQLITE_CONSTRAINT_PRIMARYKEY) | Some(ffi::SQLITE_CONSTRAINT_UNIQUE) => {
                    duplicate_student(roll)
                }
                _ => e.into(),
            })?;
        Ok(())
    }

    fn delete_student(&self, roll: &RollNumber) -> StoreResult<bool> {
        // Dropping `tx` on any early return rolls back.
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM grades WHERE roll_number = ?",
            [roll.as_str()],
        )?;
        let removed = tx.execute(
            "DELETE FROM students WHERE roll_number = ?",
            [roll.as_str()],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn list_students(&self) -> StoreResult<Vec<StudentSummary>> {
        let mut stmt = self
            .conn
            .prepare("SELECT roll_number, name FROM students ORDER BY roll_number")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(StudentSummary {
                    roll_number: row.get(0)?,
                    name: row.get(1)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(rows)
    }

    fn count_students(&self) -> StoreResult<i64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM students", [], |r| r.get(0))?;
        Ok(count)
    }

    fn student(&self, roll: &RollNumber) -> StoreResult<Option<StudentRecord>> {
        let tx = self.conn.unchecked_transaction()?;
        let name: Option<String> = tx
            .query_row(
                "SELECT name FROM students WHERE roll_number = ?",
                [roll.as_str()],
                |r| r.get(0),
            )
            .optional()?;
        let Some(name) = name else {
            return Ok(None);
        };

        let grades = {
            let mut stmt = tx.prepare(
                "SELECT subject, grade FROM grades WHERE roll_number = ? ORDER BY subject",
            )?;
            let grades: BTreeMap<String, i64> = stmt
                .query_map([roll.as_str()], |r| {
                    Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
                })
                .and_then(|it| it.collect::<Result<BTreeMap<_, _>, _>>())?;
            grades
        };
        tx.commit()?;

        Ok(Some(StudentRecord {
            name,
            roll_number: roll.to_string(),
            grades,
        }))
    }

    fn upsert_grade(&self, roll: &RollNumber, subject: &Subject, score: Score) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO grades(roll_number, subject, grade) VALUES(?, ?, ?)
             ON CONFLICT(roll_number, subject) DO UPDATE SET grade = excluded.grade",
            (roll.as_str(), subject.as_str(), score.value()),
        )
        .map_err(|e| match constraint_violation(&e) {
            Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => missing_student(roll),
            _ => e.into(),
        })?;
        tx.commit()?;
        Ok(())
    }

    fn student_mean(&self, roll: &RollNumber) -> StoreResult<Option<f64>> {
        let avg: Option<f64> = self.conn.query_row(
            "SELECT AVG(grade) FROM grades WHERE roll_number = ?",
            [roll.as_str()],
            |r| r.get(0),
        )?;
        Ok(avg)
    }

    fn subject_mean(&self, subject: &Subject) -> StoreResult<Option<f64>> {
        let avg: Option<f64> = self.conn.query_row(
            "SELECT AVG(grade) FROM grades WHERE subject = ?",
            [subject.as_str()],
            |r| r.get(0),
        )?;
        Ok(avg)
    }

    fn subject_topper(&self, subject: &Subject) -> StoreResult<Option<Topper>> {
        let topper = self
            .conn
            .query_row(
                "SELECT s.roll_number, s.name, g.grade
                 FROM grades g
                 JOIN students s ON s.roll_number = g.roll_number
                 WHERE g.subject = ?
                 ORDER BY g.grade DESC, s.name ASC, s.roll_number ASC
                 LIMIT 1",
                [subject.as_str()],
                |r| {
                    Ok(Topper {
                        roll_number: r.get(0)?,
                        name: r.get(1)?,
                        grade: r.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(topper)
    }

    fn export_rows(&self) -> StoreResult<Vec<ExportRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.roll_number, s.name, g.subject, g.grade
             FROM students s
             LEFT JOIN grades g ON g.roll_number = s.roll_number
             ORDER BY s.roll_number, g.subject",
        )?;
        let rows = stmt
            .query_map([], |r| {
                Ok(ExportRow {
                    roll_number: r.get(0)?,
                    name: r.get(1)?,
                    subject: r.get(2)?,
                    grade: r.get(3)?,
                })
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::{normalize_name, normalize_roll, normalize_subject};

    fn roll(s: &str) -> RollNumber {
        normalize_roll(s).expect("roll")
    }

    #[test]
    fn schema_enforces_grade_range_and_foreign_key() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        let conn = &backend.conn;
        conn.execute(
            "INSERT INTO students(roll_number, name) VALUES('R1', 'Alice')",
            [],
        )
        .expect("insert student");

        let out_of_range = conn.execute(
            "INSERT INTO grades(roll_number, subject, grade) VALUES('R1', 'Math', 101)",
            [],
        );
        assert!(out_of_range.is_err());

        let orphan = conn
            .execute(
                "INSERT INTO grades(roll_number, subject, grade) VALUES('R9', 'Math', 50)",
                [],
            )
            .expect_err("orphan grade must fail");
        assert_eq!(
            constraint_violation(&orphan),
            Some(ffi::SQLITE_CONSTRAINT_FOREIGNKEY)
        );
    }

    #[test]
    fn upsert_for_missing_student_maps_to_not_found() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        let subject = normalize_subject("math").expect("subject");
        let res = backend.upsert_grade(&roll("R404"), &subject, Score::new(10).expect("score"));
        assert!(matches!(res, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn duplicate_insert_maps_to_duplicate_key() {
        let backend = SqliteBackend::open_in_memory().expect("open");
        let name = normalize_name("Alice").expect("name");
        backend.insert_student(&roll("R1"), &name).expect("first");
        let res = backend.insert_student(&roll("R1"), &name);
        assert!(matches!(res, Err(StoreError::DuplicateKey(_))));
    }

    #[test]
    fn open_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested/deeper/students.db");
        let backend = SqliteBackend::open(&path, 1_000).expect("open");
        assert_eq!(backend.count_students().expect("count"), 0);
        assert!(path.is_file());
    }
}
