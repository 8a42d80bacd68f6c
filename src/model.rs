use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_MARKS: i64 = 100;
pub const MAX_SEMESTERS: u32 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub id: String,
    pub name: String,
    pub start_year: i64,
    pub active: bool,
    pub semesters: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub name: String,
    pub max_marks: i64,
}

impl Subject {
    pub fn new(name: impl Into<String>, max_marks: i64) -> Self {
        Self {
            name: name.into(),
            max_marks,
        }
    }

    /// Stored values of 0 or less are treated as out of 100.
    pub fn effective_max(&self) -> i64 {
        if self.max_marks > 0 {
            self.max_marks
        } else {
            DEFAULT_MAX_MARKS
        }
    }
}

/// batch id -> semester -> ordered subject list (insertion order is display order).
pub type SubjectCatalog = BTreeMap<String, BTreeMap<u32, Vec<Subject>>>;

pub fn catalog_subjects<'a>(catalog: &'a SubjectCatalog, batch_id: &str, semester: u32) -> &'a [Subject] {
    catalog
        .get(batch_id)
        .and_then(|by_sem| by_sem.get(&semester))
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub roll_no: String,
    pub batch: String,
    pub semester: u32,
    pub section: String,
    #[serde(default)]
    pub marks: BTreeMap<String, i64>,
}

impl Student {
    /// Marks are sparse: a subject with no entry scored zero.
    pub fn mark(&self, subject: &str) -> i64 {
        self.marks.get(subject).copied().unwrap_or(0)
    }

    pub fn roll_key(&self) -> RollKey<'_> {
        RollKey {
            batch: &self.batch,
            roll_no: &self.roll_no,
        }
    }
}

/// Join key linking one physical student's per-semester records.
///
/// Roll numbers are only unique within a batch, so the batch id is part of
/// the key. Matching is exact (case-sensitive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RollKey<'a> {
    pub batch: &'a str,
    pub roll_no: &'a str,
}

/// The (batch, semester, section) triple every scoped view is computed over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub batch_id: String,
    pub semester: u32,
    pub section: String,
}

impl Scope {
    pub fn new(batch_id: impl Into<String>, semester: u32, section: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            semester,
            section: section.into(),
        }
    }

    pub fn is_set(&self) -> bool {
        !self.batch_id.is_empty()
    }

    pub fn contains(&self, s: &Student) -> bool {
        self.is_set()
            && s.batch == self.batch_id
            && s.semester == self.semester
            && s.section == self.section
    }
}

pub fn default_subject_template() -> Vec<Subject> {
    ["Mathematics", "Physics", "Chemistry", "Programming", "English"]
        .into_iter()
        .map(|name| Subject::new(name, DEFAULT_MAX_MARKS))
        .collect()
}
