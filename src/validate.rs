use crate::error::{StoreError, StoreResult};
use std::fmt;

pub const MAX_ROLL_LEN: usize = 20;
pub const MAX_NAME_LEN: usize = 80;
pub const MAX_SUBJECT_LEN: usize = 60;
pub const MIN_GRADE: i64 = 0;
pub const MAX_GRADE: i64 = 100;

/// Trimmed roll number, 1..=20 characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RollNumber(String);

/// Whitespace-collapsed display name, 1..=80 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StudentName(String);

/// Canonical subject: whitespace-collapsed and title-cased, 1..=60 characters.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Subject(String);

/// Integer score in 0..=100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Score(u8);

macro_rules! text_newtype {
    ($ty:ident) => {
        impl $ty {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

text_newtype!(RollNumber);
text_newtype!(StudentName);
text_newtype!(Subject);

impl Score {
    pub fn new(value: i64) -> StoreResult<Self> {
        if !(MIN_GRADE..=MAX_GRADE).contains(&value) {
            return Err(StoreError::invalid("grade must be between 0 and 100"));
        }
        // Range checked above.
        Ok(Score(value as u8))
    }

    pub fn value(self) -> i64 {
        i64::from(self.0)
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Upper-cases the first letter of every alphabetic run and lower-cases the rest.
/// Any non-alphabetic character starts a new run, so `o'neil` becomes `O'Neil`.
/// A letter whose case mapping expands to several characters (`ß`) is kept as
/// is, so the result has the same character count and is a fixed point.
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.push(single_char(ch.to_lowercase()).unwrap_or(ch));
            } else {
                out.push(single_char(ch.to_uppercase()).unwrap_or(ch));
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}

fn single_char(mut mapped: impl Iterator<Item = char>) -> Option<char> {
    match (mapped.next(), mapped.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

pub fn normalize_roll(s: &str) -> StoreResult<RollNumber> {
    let roll = s.trim();
    if roll.is_empty() {
        return Err(StoreError::invalid("roll number is required"));
    }
    if roll.chars().count() > MAX_ROLL_LEN {
        return Err(StoreError::invalid("roll number too long"));
    }
    Ok(RollNumber(roll.to_string()))
}

pub fn normalize_name(s: &str) -> StoreResult<StudentName> {
    let name = collapse_whitespace(s);
    if name.is_empty() {
        return Err(StoreError::invalid("name is required"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(StoreError::invalid("name too long"));
    }
    Ok(StudentName(name))
}

pub fn normalize_subject(s: &str) -> StoreResult<Subject> {
    let subject = title_case(&collapse_whitespace(s));
    if subject.is_empty() {
        return Err(StoreError::invalid("subject is required"));
    }
    if subject.chars().count() > MAX_SUBJECT_LEN {
        return Err(StoreError::invalid("subject too long"));
    }
    Ok(Subject(subject))
}

pub fn parse_grade(s: &str) -> StoreResult<Score> {
    let value = s
        .trim()
        .parse::<i64>()
        .map_err(|_| StoreError::invalid("grade must be an integer"))?;
    Score::new(value)
}
