use crate::config::StoreConfig;
use crate::db::{self, Backend};
use crate::error::StoreResult;
use crate::records::{ExportRow, StudentRecord, StudentSummary, Topper};
use crate::validate::{
    normalize_name, normalize_roll, normalize_subject, parse_grade, RollNumber, Score, Subject,
};

/// Rounds to two decimals. Only applied to values leaving the store.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Student records over a pluggable backend.
///
/// Every method normalizes its raw input first, so invalid input fails with
/// `InvalidInput` before the backend is touched.
pub struct Store {
    backend: Box<dyn Backend>,
}

impl Store {
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        Ok(Store {
            backend: db::open_backend(config)?,
        })
    }

    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Store { backend }
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    pub fn add_student(&self, name: &str, roll: &str) -> StoreResult<StudentSummary> {
        let name = normalize_name(name)?;
        let roll = normalize_roll(roll)?;
        self.backend.insert_student(&roll, &name)?;
        Ok(StudentSummary {
            roll_number: roll.into_string(),
            name: name.into_string(),
        })
    }

    pub fn delete_student(&self, roll: &str) -> StoreResult<()> {
        let roll = normalize_roll(roll)?;
        if self.backend.delete_student(&roll)? {
            Ok(())
        } else {
            Err(db::missing_student(&roll))
        }
    }

    pub fn list_students(&self) -> StoreResult<Vec<StudentSummary>> {
        self.backend.list_students()
    }

    /// Case-insensitive substring match on name or roll number. A blank query
    /// matches everyone.
    pub fn search_students(&self, query: &str) -> StoreResult<Vec<StudentSummary>> {
        let q = query.trim().to_lowercase();
        let students = self.backend.list_students()?;
        if q.is_empty() {
            return Ok(students);
        }
        Ok(students
            .into_iter()
            .filter(|s| {
                s.name.to_lowercase().contains(&q) || s.roll_number.to_lowercase().contains(&q)
            })
            .collect())
    }

    pub fn student_count(&self) -> StoreResult<i64> {
        self.backend.count_students()
    }

    pub fn get_student(&self, roll: &str) -> StoreResult<Option<StudentRecord>> {
        let roll = normalize_roll(roll)?;
        self.backend.student(&roll)
    }

    pub fn add_grade(&self, roll: &str, subject: &str, grade: Score) -> StoreResult<()> {
        let roll = normalize_roll(roll)?;
        let subject = normalize_subject(subject)?;
        self.record_grade(&roll, &subject, grade)
    }

    /// [`Store::add_grade`] for callers that already hold canonical keys.
    pub fn record_grade(
        &self,
        roll: &RollNumber,
        subject: &Subject,
        grade: Score,
    ) -> StoreResult<()> {
        self.backend.upsert_grade(roll, subject, grade)
    }

    /// Like [`Store::add_grade`], parsing the grade from raw text first.
    pub fn add_grade_raw(&self, roll: &str, subject: &str, grade: &str) -> StoreResult<()> {
        let roll = normalize_roll(roll)?;
        let subject = normalize_subject(subject)?;
        let grade = parse_grade(grade)?;
        self.record_grade(&roll, &subject, grade)
    }

    /// Mean score of one student, 0.0 without grades. Does not check that the
    /// student exists.
    pub fn student_average(&self, roll: &str) -> StoreResult<f64> {
        let roll = normalize_roll(roll)?;
        Ok(round2(self.backend.student_mean(&roll)?.unwrap_or(0.0)))
    }

    /// Student details plus average, or `None` when the student is absent.
    pub fn student_report(&self, roll: &str) -> StoreResult<Option<(StudentRecord, f64)>> {
        let roll = normalize_roll(roll)?;
        let Some(record) = self.backend.student(&roll)? else {
            return Ok(None);
        };
        let average = round2(self.backend.student_mean(&roll)?.unwrap_or(0.0));
        Ok(Some((record, average)))
    }

    pub fn class_average(&self, subject: &str) -> StoreResult<f64> {
        self.subject_average(&normalize_subject(subject)?)
    }

    pub fn subject_average(&self, subject: &Subject) -> StoreResult<f64> {
        Ok(round2(self.backend.subject_mean(subject)?.unwrap_or(0.0)))
    }

    /// Highest score for the subject; ties go to the alphabetically first name.
    pub fn subject_topper(&self, subject: &str) -> StoreResult<Option<Topper>> {
        self.topper_of(&normalize_subject(subject)?)
    }

    pub fn topper_of(&self, subject: &Subject) -> StoreResult<Option<Topper>> {
        self.backend.subject_topper(subject)
    }

    pub fn export_all(&self) -> StoreResult<Vec<ExportRow>> {
        self.backend.export_rows()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("backend", &self.backend.kind())
            .finish()
    }
}
