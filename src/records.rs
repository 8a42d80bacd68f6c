use crate::db::{self, Collection};
use crate::model::{
    catalog_subjects, default_subject_template, Batch, Scope, Student, Subject, SubjectCatalog,
    DEFAULT_MAX_MARKS, MAX_SEMESTERS,
};
use crate::sheet::ParsedSheet;
use std::collections::BTreeMap;
use rusqlite::Connection;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Rejected actions. Nothing is modified when one of these is returned.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("batch id must be a year such as 2024, got {0:?}")]
    InvalidBatchId(String),
    #[error("batch {0} already exists")]
    DuplicateBatch(String),
    #[error("semester count must be in 1..=12, got {0}")]
    InvalidSemesterCount(i64),
    #[error("batch {0} not found")]
    UnknownBatch(String),
    #[error("cannot remove the only batch")]
    LastBatch,
    #[error("maximum 12 semesters allowed")]
    SemesterLimit,
    #[error("cannot remove the only semester")]
    LastSemester,
    #[error("semester {semester} is outside batch {batch_id} (1..={semesters})")]
    SemesterOutOfRange {
        batch_id: String,
        semester: u32,
        semesters: u32,
    },
    #[error("subject name must not be empty")]
    EmptySubjectName,
    #[error("subject {0} already exists for this semester")]
    DuplicateSubject(String),
    #[error("subject {0} not found for this semester")]
    UnknownSubject(String),
    #[error("cannot remove the only subject of a semester")]
    LastSubject,
    #[error("max marks must be positive, got {0}")]
    InvalidMaxMarks(i64),
    #[error("student name and roll number are required")]
    MissingStudentFields,
    #[error("student {0} not found")]
    UnknownStudent(String),
}

impl ActionError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidBatchId(_)
            | Self::InvalidSemesterCount(_)
            | Self::SemesterOutOfRange { .. }
            | Self::EmptySubjectName
            | Self::InvalidMaxMarks(_)
            | Self::MissingStudentFields => "bad_params",
            Self::DuplicateBatch(_) | Self::DuplicateSubject(_) => "conflict",
            Self::UnknownBatch(_) | Self::UnknownSubject(_) | Self::UnknownStudent(_) => {
                "not_found"
            }
            Self::LastBatch | Self::LastSemester | Self::LastSubject => "last_remaining",
            Self::SemesterLimit => "limit_reached",
        }
    }
}

/// Defaults applied when batches and semesters are created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Defaults {
    pub semester_count: u32,
    pub subject_template: Vec<Subject>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            semester_count: 6,
            subject_template: default_subject_template(),
        }
    }
}

pub const SEED_BATCH_IDS: [&str; 3] = ["2021", "2022", "2023"];

pub fn seed_batches(defaults: &Defaults) -> Vec<Batch> {
    SEED_BATCH_IDS
        .iter()
        .map(|id| new_batch(id, defaults.semester_count))
        .collect()
}

pub fn seed_catalog(batches: &[Batch], defaults: &Defaults) -> SubjectCatalog {
    batches
        .iter()
        .map(|b| {
            let by_sem = (1..=b.semesters)
                .map(|sem| (sem, defaults.subject_template.clone()))
                .collect::<BTreeMap<_, _>>();
            (b.id.clone(), by_sem)
        })
        .collect()
}

fn new_batch(id: &str, semesters: u32) -> Batch {
    Batch {
        id: id.to_string(),
        name: format!("{} Batch", id),
        start_year: id.parse().unwrap_or(0),
        active: true,
        semesters,
    }
}

pub fn new_student_id() -> String {
    Uuid::now_v7().to_string()
}

/// The three persisted collections, owned by the sidecar.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Records {
    pub batches: Vec<Batch>,
    pub catalog: SubjectCatalog,
    pub students: Vec<Student>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewStudent {
    pub name: String,
    pub roll_no: String,
    pub marks: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub imported: usize,
    pub new_subjects: Vec<String>,
}

fn loaded_or_default<T>(
    loaded: anyhow::Result<Option<T>>,
    collection: Collection,
    seeded: &mut Vec<Collection>,
    default: impl FnOnce() -> T,
) -> T {
    match loaded {
        Ok(Some(v)) => v,
        Ok(None) => {
            seeded.push(collection);
            default()
        }
        Err(e) => {
            warn!(collection = collection.as_str(), error = %format!("{e:#}"), "load failed; using defaults");
            seeded.push(collection);
            default()
        }
    }
}

impl Records {
    /// Reads every collection from the workspace store. Absent or unreadable
    /// collections fall back to the seed data and are written back; the
    /// returned list names those collections.
    pub fn load(conn: &Connection, defaults: &Defaults) -> (Records, Vec<Collection>) {
        let mut seeded = Vec::new();
        let batches = loaded_or_default(
            db::load_batches(conn),
            Collection::Batches,
            &mut seeded,
            || seed_batches(defaults),
        );
        let catalog = loaded_or_default(
            db::load_subject_catalog(conn),
            Collection::Subjects,
            &mut seeded,
            || seed_catalog(&batches, defaults),
        );
        let students = loaded_or_default(
            db::load_students(conn),
            Collection::Students,
            &mut seeded,
            Vec::new,
        );
        let records = Records {
            batches,
            catalog,
            students,
        };
        info!(
            batches = records.batches.len(),
            students = records.students.len(),
            seeded = seeded.len(),
            "records loaded"
        );
        if !seeded.is_empty() {
            records.save(conn, &seeded);
        }
        (records, seeded)
    }

    fn save_collection(&self, conn: &Connection, collection: Collection) -> anyhow::Result<()> {
        match collection {
            Collection::Batches => db::save_batches(conn, &self.batches),
            Collection::Subjects => db::save_subject_catalog(conn, &self.catalog),
            Collection::Students => db::save_students(conn, &self.students),
        }
    }

    /// Writes the named collections. Failures are logged and reported as
    /// `false`; the in-memory state is kept either way.
    pub fn save(&self, conn: &Connection, collections: &[Collection]) -> bool {
        let mut persisted = true;
        for &c in collections {
            match self.save_collection(conn, c) {
                Ok(()) => info!(collection = c.as_str(), "collection saved"),
                Err(e) => {
                    warn!(collection = c.as_str(), error = %format!("{e:#}"), "save failed");
                    persisted = false;
                }
            }
        }
        persisted
    }

    pub fn batch(&self, id: &str) -> Option<&Batch> {
        self.batches.iter().find(|b| b.id == id)
    }

    fn require_batch(&self, id: &str) -> Result<&Batch, ActionError> {
        self.batch(id)
            .ok_or_else(|| ActionError::UnknownBatch(id.to_string()))
    }

    fn require_semester(&self, batch_id: &str, semester: u32) -> Result<(), ActionError> {
        let batch = self.require_batch(batch_id)?;
        if semester == 0 || semester > batch.semesters {
            return Err(ActionError::SemesterOutOfRange {
                batch_id: batch_id.to_string(),
                semester,
                semesters: batch.semesters,
            });
        }
        Ok(())
    }

    pub fn subjects(&self, batch_id: &str, semester: u32) -> &[Subject] {
        catalog_subjects(&self.catalog, batch_id, semester)
    }

    pub fn add_batch(&mut self, raw_id: &str, semesters: i64, defaults: &Defaults) -> Result<&Batch, ActionError> {
        let id = raw_id.trim();
        if id.is_empty() || id.parse::<u32>().is_err() {
            return Err(ActionError::InvalidBatchId(raw_id.to_string()));
        }
        if self.batch(id).is_some() {
            return Err(ActionError::DuplicateBatch(id.to_string()));
        }
        if !(1..=MAX_SEMESTERS as i64).contains(&semesters) {
            return Err(ActionError::InvalidSemesterCount(semesters));
        }

        let batch = new_batch(id, semesters as u32);
        let by_sem = (1..=batch.semesters)
            .map(|sem| (sem, defaults.subject_template.clone()))
            .collect::<BTreeMap<_, _>>();
        self.catalog.insert(batch.id.clone(), by_sem);
        self.batches.push(batch);
        info!(batch_id = id, semesters, "batch created");
        Ok(&self.batches[self.batches.len() - 1])
    }

    /// Removes the batch with its students and catalog entry.
    /// Returns the number of student records removed.
    pub fn remove_batch(&mut self, id: &str) -> Result<usize, ActionError> {
        self.require_batch(id)?;
        if self.batches.len() <= 1 {
            return Err(ActionError::LastBatch);
        }
        self.batches.retain(|b| b.id != id);
        self.catalog.remove(id);
        let before = self.students.len();
        self.students.retain(|s| s.batch != id);
        let removed = before - self.students.len();
        info!(batch_id = id, removed_students = removed, "batch removed");
        Ok(removed)
    }

    pub fn add_semester(&mut self, batch_id: &str, defaults: &Defaults) -> Result<&Batch, ActionError> {
        let idx = self
            .batches
            .iter()
            .position(|b| b.id == batch_id)
            .ok_or_else(|| ActionError::UnknownBatch(batch_id.to_string()))?;
        if self.batches[idx].semesters >= MAX_SEMESTERS {
            return Err(ActionError::SemesterLimit);
        }
        self.batches[idx].semesters += 1;
        let semester = self.batches[idx].semesters;
        self.catalog
            .entry(batch_id.to_string())
            .or_default()
            .insert(semester, defaults.subject_template.clone());
        Ok(&self.batches[idx])
    }

    /// Drops the batch's last semester: its catalog entry and every student
    /// enrolled in it. Returns the number of student records removed.
    pub fn remove_semester(&mut self, batch_id: &str) -> Result<usize, ActionError> {
        let idx = self
            .batches
            .iter()
            .position(|b| b.id == batch_id)
            .ok_or_else(|| ActionError::UnknownBatch(batch_id.to_string()))?;
        let last = self.batches[idx].semesters;
        if last <= 1 {
            return Err(ActionError::LastSemester);
        }
        let before = self.students.len();
        self.students
            .retain(|s| !(s.batch == batch_id && s.semester == last));
        if let Some(by_sem) = self.catalog.get_mut(batch_id) {
            by_sem.remove(&last);
        }
        self.batches[idx].semesters = last - 1;
        Ok(before - self.students.len())
    }

    /// Appends a subject to the (batch, semester) list and gives every
    /// student in `scope` a zero mark for it.
    pub fn add_subject(&mut self, scope: &Scope, name: &str, max_marks: i64) -> Result<&[Subject], ActionError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ActionError::EmptySubjectName);
        }
        if max_marks <= 0 {
            return Err(ActionError::InvalidMaxMarks(max_marks));
        }
        self.require_semester(&scope.batch_id, scope.semester)?;
        if self
            .subjects(&scope.batch_id, scope.semester)
            .iter()
            .any(|s| s.name == name)
        {
            return Err(ActionError::DuplicateSubject(name.to_string()));
        }

        self.catalog
            .entry(scope.batch_id.clone())
            .or_default()
            .entry(scope.semester)
            .or_default()
            .push(Subject::new(name, max_marks));
        for s in self.students.iter_mut().filter(|s| scope.contains(s)) {
            s.marks.insert(name.to_string(), 0);
        }
        Ok(self.subjects(&scope.batch_id, scope.semester))
    }

    /// Removes the subject and its mark from every student of that batch and
    /// semester, in every section.
    pub fn remove_subject(&mut self, batch_id: &str, semester: u32, name: &str) -> Result<&[Subject], ActionError> {
        self.require_semester(batch_id, semester)?;
        let current = self.subjects(batch_id, semester);
        if !current.iter().any(|s| s.name == name) {
            return Err(ActionError::UnknownSubject(name.to_string()));
        }
        if current.len() <= 1 {
            return Err(ActionError::LastSubject);
        }
        if let Some(list) = self
            .catalog
            .get_mut(batch_id)
            .and_then(|by_sem| by_sem.get_mut(&semester))
        {
            list.retain(|s| s.name != name);
        }
        for s in self
            .students
            .iter_mut()
            .filter(|s| s.batch == batch_id && s.semester == semester)
        {
            s.marks.remove(name);
        }
        Ok(self.subjects(batch_id, semester))
    }

    pub fn set_max_marks(&mut self, batch_id: &str, semester: u32, name: &str, max_marks: i64) -> Result<&[Subject], ActionError> {
        if max_marks <= 0 {
            return Err(ActionError::InvalidMaxMarks(max_marks));
        }
        let subject = self
            .catalog
            .get_mut(batch_id)
            .and_then(|by_sem| by_sem.get_mut(&semester))
            .and_then(|list| list.iter_mut().find(|s| s.name == name))
            .ok_or_else(|| ActionError::UnknownSubject(name.to_string()))?;
        subject.max_marks = max_marks;
        Ok(self.subjects(batch_id, semester))
    }

    fn clamp_mark(&self, batch_id: &str, semester: u32, subject: &str, value: i64) -> i64 {
        let max = self
            .subjects(batch_id, semester)
            .iter()
            .find(|s| s.name == subject)
            .map(Subject::effective_max)
            .unwrap_or(DEFAULT_MAX_MARKS);
        value.clamp(0, max)
    }

    pub fn add_student(&mut self, scope: &Scope, new: NewStudent) -> Result<&Student, ActionError> {
        let name = new.name.trim();
        let roll_no = new.roll_no.trim();
        if name.is_empty() || roll_no.is_empty() {
            return Err(ActionError::MissingStudentFields);
        }
        self.require_semester(&scope.batch_id, scope.semester)?;

        let marks = new
            .marks
            .iter()
            .map(|(subject, v)| {
                (
                    subject.clone(),
                    self.clamp_mark(&scope.batch_id, scope.semester, subject, *v),
                )
            })
            .collect();
        self.students.push(Student {
            id: new_student_id(),
            name: name.to_string(),
            roll_no: roll_no.to_string(),
            batch: scope.batch_id.clone(),
            semester: scope.semester,
            section: scope.section.clone(),
            marks,
        });
        Ok(&self.students[self.students.len() - 1])
    }

    pub fn remove_student(&mut self, id: &str) -> Result<(), ActionError> {
        let before = self.students.len();
        self.students.retain(|s| s.id != id);
        if self.students.len() == before {
            return Err(ActionError::UnknownStudent(id.to_string()));
        }
        Ok(())
    }

    /// Records a mark clamped to `0..=maxMarks` of the student's subject
    /// (100 when the subject is not in the student's semester list).
    pub fn set_mark(&mut self, student_id: &str, subject: &str, value: i64) -> Result<&Student, ActionError> {
        let idx = self
            .students
            .iter()
            .position(|s| s.id == student_id)
            .ok_or_else(|| ActionError::UnknownStudent(student_id.to_string()))?;
        let (batch_id, semester) = {
            let s = &self.students[idx];
            (s.batch.clone(), s.semester)
        };
        let mark = self.clamp_mark(&batch_id, semester, subject, value);
        self.students[idx].marks.insert(subject.to_string(), mark);
        Ok(&self.students[idx])
    }

    /// Applies a parsed sheet to the target scope: new subjects are appended
    /// to the scope's list and the students are appended to the collection.
    /// Rows naming an unknown batch, or a semester outside their batch,
    /// reject the whole import.
    pub fn import_sheet(&mut self, scope: &Scope, sheet: ParsedSheet) -> Result<ImportOutcome, ActionError> {
        self.require_semester(&scope.batch_id, scope.semester)?;
        for s in &sheet.students {
            self.require_semester(&s.batch, s.semester)?;
        }

        let new_subjects = sheet
            .new_subjects
            .iter()
            .map(|s| s.name.clone())
            .collect::<Vec<_>>();
        self.catalog
            .entry(scope.batch_id.clone())
            .or_default()
            .entry(scope.semester)
            .or_default()
            .extend(sheet.new_subjects);

        let imported = sheet.students.len();
        for mut student in sheet.students {
            let marks = student
                .marks
                .iter()
                .map(|(subject, v)| {
                    (
                        subject.clone(),
                        self.clamp_mark(&scope.batch_id, scope.semester, subject, *v),
                    )
                })
                .collect();
            student.marks = marks;
            self.students.push(student);
        }
        info!(
            batch_id = %scope.batch_id,
            semester = scope.semester,
            imported,
            new_subjects = new_subjects.len(),
            "students imported"
        );
        Ok(ImportOutcome {
            imported,
            new_subjects,
        })
    }
}
