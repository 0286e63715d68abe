use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSummary {
    pub roll_number: String,
    pub name: String,
}

/// A student together with every grade on file, keyed by canonical subject.
///
/// Serializes as `{ name, roll_number, grades }`, which is also the JSON export shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub name: String,
    pub roll_number: String,
    pub grades: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topper {
    pub roll_number: String,
    pub name: String,
    pub grade: i64,
}

/// One line of the flat export: a (student, grade) pair, or a bare student
/// when no grades exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRow {
    pub roll_number: String,
    pub name: String,
    pub subject: Option<String>,
    pub grade: Option<i64>,
}
