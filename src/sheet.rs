//! Spreadsheet exchange: CSV rosters with one column per subject.
//!
//! Import recognises the standard columns (name, roll number, batch,
//! semester, section) case-insensitively and treats every other column as a
//! subject. Export writes the standard columns followed by the scope's
//! subjects.

use crate::model::{Scope, Student, Subject, DEFAULT_MAX_MARKS};
use crate::records::new_student_id;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const EXPORT_HEADERS: [&str; 5] = ["Name", "Roll No", "Batch", "Semester", "Section"];

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to write csv: {0}")]
    Write(#[source] std::io::Error),
    #[error("no data found in the file")]
    Empty,
    #[error("no students found to export")]
    NothingToExport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StandardColumn {
    Name,
    RollNo,
    Batch,
    Semester,
    Section,
}

fn standard_column(header: &str) -> Option<StandardColumn> {
    match header.trim().to_lowercase().as_str() {
        "name" => Some(StandardColumn::Name),
        "roll no" | "rollno" | "roll_no" | "roll number" => Some(StandardColumn::RollNo),
        "batch" => Some(StandardColumn::Batch),
        "semester" | "sem" => Some(StandardColumn::Semester),
        "section" => Some(StandardColumn::Section),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct StandardColumns {
    name: Option<usize>,
    roll_no: Option<usize>,
    batch: Option<usize>,
    semester: Option<usize>,
    section: Option<usize>,
}

impl StandardColumns {
    fn slot(&mut self, col: StandardColumn) -> &mut Option<usize> {
        match col {
            StandardColumn::Name => &mut self.name,
            StandardColumn::RollNo => &mut self.roll_no,
            StandardColumn::Batch => &mut self.batch,
            StandardColumn::Semester => &mut self.semester,
            StandardColumn::Section => &mut self.section,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSheet {
    pub new_subjects: Vec<Subject>,
    pub students: Vec<Student>,
}

/// Integer prefix of a cell: `"88.5"` -> 88, `"abc"` -> None.
pub fn parse_int_prefix(raw: &str) -> Option<i64> {
    let t = raw.trim();
    let end = t
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
        .last()
        .map(|(i, c)| i + c.len_utf8())?;
    t[..end].parse().ok()
}

fn cell<'r>(record: &'r csv::StringRecord, idx: Option<usize>) -> Option<&'r str> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Subject headers match catalog names regardless of case.
fn same_subject(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Parses a roster for `scope`. Subject columns missing from `existing`
/// become new subjects out of 100. Every student gets a mark for each
/// existing and new subject; blank or non-numeric cells count as 0.
pub fn parse_students_csv<R: Read>(
    input: R,
    scope: &Scope,
    existing: &[Subject],
) -> Result<ParsedSheet, SheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let headers = reader
        .headers()?
        .iter()
        .map(|h| h.trim_matches('\u{feff}').trim().to_string())
        .collect::<Vec<_>>();

    let mut standard = StandardColumns::default();
    let mut subject_columns: Vec<(usize, String)> = Vec::new();
    for (i, h) in headers.iter().enumerate() {
        if let Some(col) = standard_column(h) {
            standard.slot(col).get_or_insert(i);
        } else if !h.is_empty() && !subject_columns.iter().any(|(_, n)| same_subject(n, h)) {
            subject_columns.push((i, h.clone()));
        }
    }

    let new_subjects = subject_columns
        .iter()
        .filter(|(_, name)| !existing.iter().any(|s| same_subject(&s.name, name)))
        .map(|(_, name)| Subject::new(name.clone(), DEFAULT_MAX_MARKS))
        .collect::<Vec<_>>();

    // Exact header first, then a case-insensitive match.
    let mark_columns = existing
        .iter()
        .chain(new_subjects.iter())
        .map(|sub| {
            let idx = headers
                .iter()
                .position(|h| *h == sub.name)
                .or_else(|| {
                    headers
                        .iter()
                        .position(|h| same_subject(h, &sub.name))
                });
            (sub.name.clone(), idx)
        })
        .collect::<Vec<_>>();

    let mut students = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        let n = students.len() + 1;

        let marks = mark_columns
            .iter()
            .map(|(name, idx)| {
                let mark = cell(&record, *idx).and_then(parse_int_prefix).unwrap_or(0);
                (name.clone(), mark)
            })
            .collect::<BTreeMap<_, _>>();

        let semester = cell(&record, standard.semester)
            .and_then(parse_int_prefix)
            .filter(|v| *v > 0)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(scope.semester);

        students.push(Student {
            id: new_student_id(),
            name: cell(&record, standard.name)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Student {}", n)),
            roll_no: cell(&record, standard.roll_no)
                .map(str::to_string)
                .unwrap_or_else(|| format!("R{}", n)),
            batch: cell(&record, standard.batch)
                .map(str::to_string)
                .unwrap_or_else(|| scope.batch_id.clone()),
            semester,
            section: cell(&record, standard.section)
                .map(str::to_string)
                .unwrap_or_else(|| scope.section.clone()),
            marks,
        });
    }

    if students.is_empty() {
        return Err(SheetError::Empty);
    }
    Ok(ParsedSheet {
        new_subjects,
        students,
    })
}

pub fn read_students_csv(path: &Path, scope: &Scope, existing: &[Subject]) -> Result<ParsedSheet, SheetError> {
    let file = File::open(path).map_err(|source| SheetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_students_csv(file, scope, existing)
}

/// Writes one row per student; returns the number of rows written.
pub fn write_students_csv<W: Write>(
    out: W,
    students: &[&Student],
    subjects: &[Subject],
) -> Result<usize, SheetError> {
    if students.is_empty() {
        return Err(SheetError::NothingToExport);
    }
    let mut writer = csv::Writer::from_writer(out);

    let mut header = EXPORT_HEADERS
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    header.extend(subjects.iter().map(|s| s.name.clone()));
    writer.write_record(&header)?;

    for s in students {
        let mut row = vec![
            s.name.clone(),
            s.roll_no.clone(),
            s.batch.clone(),
            s.semester.to_string(),
            s.section.clone(),
        ];
        row.extend(subjects.iter().map(|sub| s.mark(&sub.name).to_string()));
        writer.write_record(&row)?;
    }
    writer.flush().map_err(SheetError::Write)?;
    Ok(students.len())
}

pub fn export_students_csv(
    path: &Path,
    students: &[&Student],
    subjects: &[Subject],
) -> Result<usize, SheetError> {
    if students.is_empty() {
        return Err(SheetError::NothingToExport);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| SheetError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = File::create(path).map_err(|source| SheetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_students_csv(file, students, subjects)
}

pub fn export_file_name(scope: &Scope) -> String {
    format!(
        "Students_{}_Sem{}_{}.csv",
        scope.batch_id, scope.semester, scope.section
    )
}
