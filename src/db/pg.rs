use super::{duplicate_student, missing_student, Backend};
use crate::error::{StoreError, StoreResult};
use crate::records::{ExportRow, StudentRecord, StudentSummary, Topper};
use crate::validate::{RollNumber, Score, StudentName, Subject};
use postgres::error::SqlState;
use postgres::{Client, NoTls};
use std::collections::BTreeMap;

/// PostgreSQL backend. Every operation opens its own client and drops it
/// before returning.
///
/// Text ordering uses `COLLATE "C"` so results sort by byte order, the same as
/// SQLite's BINARY collation, whatever the database locale is.
pub struct PostgresBackend {
    url: String,
}

impl PostgresBackend {
    pub fn open(url: &str) -> StoreResult<Self> {
        let backend = PostgresBackend {
            url: url.to_string(),
        };
        let mut client = backend.connect()?;
        client.batch_execute(
            "CREATE TABLE IF NOT EXISTS students(
                roll_number TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS grades(
                id SERIAL PRIMARY KEY,
                roll_number TEXT NOT NULL,
                subject TEXT NOT NULL,
                grade INTEGER NOT NULL CHECK (grade BETWEEN 0 AND 100),
                UNIQUE (roll_number, subject),
                FOREIGN KEY (roll_number) REFERENCES students(roll_number) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_grades_subject ON grades(subject);",
        )?;
        Ok(backend)
    }

    fn connect(&self) -> StoreResult<Client> {
        Client::connect(&self.url, NoTls)
            .map_err(|e| StoreError::storage(format!("failed to connect to postgres: {}", e)))
    }
}

fn sql_state(e: &postgres::Error) -> Option<&SqlState> {
    e.code()
}

impl Backend for PostgresBackend {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    fn insert_student(&self, roll: &RollNumber, name: &StudentName) -> StoreResult<()> {
        let mut client = self.connect()?;
        client
            .execute(
                "INSERT INTO students(roll_number, name) VALUES($1, $2)",
                &[&roll.as_str(), &name.as_str()],
            )
            .map_err(|e| {
                if sql_state(&e) == Some(&SqlState::UNIQUE_VIOLATION) {
                    duplicate_student(roll)
                } else {
                    e.into()
                }
            })?;
        Ok(())
    }

    fn delete_student(&self, roll: &RollNumber) -> StoreResult<bool> {
        let mut client = self.connect()?;
        let mut tx = client.transaction()?;
        tx.execute(
            "DELETE FROM grades WHERE roll_number = $1",
            &[&roll.as_str()],
        )?;
        let removed = tx.execute(
            "DELETE FROM students WHERE roll_number = $1",
            &[&roll.as_str()],
        )?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn list_students(&self) -> StoreResult<Vec<StudentSummary>> {
        let mut client = self.connect()?;
        let rows = client.query(
            "SELECT roll_number, name FROM students ORDER BY roll_number COLLATE \"C\"",
            &[],
        )?;
        Ok(rows
            .iter()
            .map(|r| StudentSummary {
                roll_number: r.get(0),
                name: r.get(1),
            })
            .collect())
    }

    fn count_students(&self) -> StoreResult<i64> {
        let mut client = self.connect()?;
        let row = client.query_one("SELECT COUNT(*) FROM students", &[])?;
        Ok(row.get(0))
    }

    fn student(&self, roll: &RollNumber) -> StoreResult<Option<StudentRecord>> {
        let mut client = self.connect()?;
        let mut tx = client.transaction()?;
        let Some(row) = tx.query_opt(
            "SELECT name FROM students WHERE roll_number = $1",
            &[&roll.as_str()],
        )?
        else {
            return Ok(None);
        };
        let name: String = row.get(0);
        let grades: BTreeMap<String, i64> = tx
            .query(
                "SELECT subject, grade FROM grades WHERE roll_number = $1
                 ORDER BY subject COLLATE \"C\"",
                &[&roll.as_str()],
            )?
            .iter()
            .map(|r| (r.get::<_, String>(0), i64::from(r.get::<_, i32>(1))))
            .collect();
        tx.commit()?;
        Ok(Some(StudentRecord {
            name,
            roll_number: roll.to_string(),
            grades,
        }))
    }

    fn upsert_grade(&self, roll: &RollNumber, subject: &Subject, score: Score) -> StoreResult<()> {
        let grade = score.value() as i32;
        let mut client = self.connect()?;
        let mut tx = client.transaction()?;
        tx.execute(
            "INSERT INTO grades(roll_number, subject, grade) VALUES($1, $2, $3)
             ON CONFLICT(roll_number, subject) DO UPDATE SET grade = EXCLUDED.grade",
            &[&roll.as_str(), &subject.as_str(), &grade],
        )
        .map_err(|e| {
            if sql_state(&e) == Some(&SqlState::FOREIGN_KEY_VIOLATION) {
                missing_student(roll)
            } else {
                e.into()
            }
        })?;
        tx.commit()?;
        Ok(())
    }

    fn student_mean(&self, roll: &RollNumber) -> StoreResult<Option<f64>> {
        let mut client = self.connect()?;
        let row = client.query_one(
            "SELECT AVG(grade)::DOUBLE PRECISION FROM grades WHERE roll_number = $1",
            &[&roll.as_str()],
        )?;
        Ok(row.get(0))
    }

    fn subject_mean(&self, subject: &Subject) -> StoreResult<Option<f64>> {
        let mut client = self.connect()?;
        let row = client.query_one(
            "SELECT AVG(grade)::DOUBLE PRECISION FROM grades WHERE subject = $1",
            &[&subject.as_str()],
        )?;
        Ok(row.get(0))
    }

    fn subject_topper(&self, subject: &Subject) -> StoreResult<Option<Topper>> {
        let mut client = self.connect()?;
        let row = client.query_opt(
            "SELECT s.roll_number, s.name, g.grade
             FROM grades g
             JOIN students s ON s.roll_number = g.roll_number
             WHERE g.subject = $1
             ORDER BY g.grade DESC, s.name COLLATE \"C\" ASC, s.roll_number COLLATE \"C\" ASC
             LIMIT 1",
            &[&subject.as_str()],
        )?;
        Ok(row.map(|r| Topper {
            roll_number: r.get(0),
            name: r.get(1),
            grade: i64::from(r.get::<_, i32>(2)),
        }))
    }

    fn export_rows(&self) -> StoreResult<Vec<ExportRow>> {
        let mut client = self.connect()?;
        let rows = client.query(
            "SELECT s.roll_number, s.name, g.subject, g.grade
             FROM students s
             LEFT JOIN grades g ON g.roll_number = s.roll_number
             ORDER BY s.roll_number COLLATE \"C\", g.subject COLLATE \"C\" NULLS FIRST",
            &[],
        )?;
        Ok(rows
            .iter()
            .map(|r| ExportRow {
                roll_number: r.get(0),
                name: r.get(1),
                subject: r.get(2),
                grade: r.get::<_, Option<i32>>(3).map(i64::from),
            })
            .collect())
    }
}
