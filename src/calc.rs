use crate::model::{catalog_subjects, Batch, RollKey, Scope, Student, Subject, SubjectCatalog};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

/// A mark passes when it reaches this fraction of the subject's maximum.
pub const PASS_FRACTION: f64 = 0.4;
/// Below this percentage of the maximum a subject is weak for the student.
pub const WEAK_PERCENT: f64 = 50.0;
/// Below this fraction of the class's positive-mark average a subject is weak.
pub const WEAK_CLASS_AVERAGE_RATIO: f64 = 0.7;
pub const HIGH_RISK_BELOW: f64 = 40.0;
pub const MEDIUM_RISK_BELOW: f64 = 50.0;

/// Half-up rounding to 2 decimals: `Int(100*x + 0.5) / 100`.
pub fn round_off_2_decimals(x: f64) -> f64 {
    ((100.0 * x) + 0.5).floor() / 100.0
}

pub fn display_2_decimals(x: f64) -> String {
    format!("{:.2}", x)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortKey {
    #[serde(rename = "name")]
    Name,
    #[serde(rename = "rollNo")]
    RollNo,
    #[serde(rename = "average")]
    Average,
}

impl SortKey {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "name" => Some(Self::Name),
            "rollNo" => Some(Self::RollNo),
            "average" => Some(Self::Average),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub key: SortKey,
    pub direction: SortDir,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentQuery {
    pub search: Option<String>,
    pub sort: Option<SortSpec>,
}

/// Students whose batch/semester/section match the scope, in collection order.
pub fn scope_students<'a>(students: &'a [Student], scope: &Scope) -> Vec<&'a Student> {
    if !scope.is_set() {
        return Vec::new();
    }
    students.iter().filter(|s| scope.contains(s)).collect()
}

/// Sum of marks over `subjects` as a percentage of the sum of their maximums.
pub fn overall_percentage(student: &Student, subjects: &[Subject]) -> f64 {
    let total_marks: i64 = subjects.iter().map(|sub| student.mark(&sub.name)).sum();
    let total_max: i64 = subjects.iter().map(Subject::effective_max).sum();
    if total_max > 0 {
        100.0 * total_marks as f64 / total_max as f64
    } else {
        0.0
    }
}

/// Scope filter, then case-insensitive search on name/roll number, then an
/// optional stable sort. `subjects` is only read for the average sort key.
pub fn filter_students<'a>(
    students: &'a [Student],
    scope: &Scope,
    query: &StudentQuery,
    subjects: &[Subject],
) -> Vec<&'a Student> {
    let mut rows = scope_students(students, scope);

    let term = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase);
    if let Some(term) = term {
        rows.retain(|s| {
            s.name.to_lowercase().contains(&term) || s.roll_no.to_lowercase().contains(&term)
        });
    }

    if let Some(sort) = query.sort {
        rows.sort_by(|a, b| {
            let ord = match sort.key {
                SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
                SortKey::RollNo => a.roll_no.to_lowercase().cmp(&b.roll_no.to_lowercase()),
                SortKey::Average => overall_percentage(a, subjects)
                    .partial_cmp(&overall_percentage(b, subjects))
                    .unwrap_or(Ordering::Equal),
            };
            match sort.direction {
                SortDir::Asc => ord,
                SortDir::Desc => ord.reverse(),
            }
        });
    }

    rows
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectStat {
    pub subject: String,
    pub max_marks: i64,
    pub average: f64,
    pub average_display: String,
    pub pass_count: usize,
    pub fail_count: usize,
    pub total_count: usize,
}

pub fn subject_stats(scope_students: &[&Student], subjects: &[Subject]) -> Vec<SubjectStat> {
    if scope_students.is_empty() {
        return Vec::new();
    }

    subjects
        .iter()
        .map(|sub| {
            let cutoff = PASS_FRACTION * sub.effective_max() as f64;
            let mut sum: i64 = 0;
            let mut pass_count = 0usize;
            let mut fail_count = 0usize;
            for s in scope_students {
                let mark = s.mark(&sub.name);
                sum += mark;
                if mark as f64 >= cutoff {
                    pass_count += 1;
                } else {
                    fail_count += 1;
                }
            }
            let average = sum as f64 / scope_students.len() as f64;
            SubjectStat {
                subject: sub.name.clone(),
                max_marks: sub.effective_max(),
                average,
                average_display: display_2_decimals(average),
                pass_count,
                fail_count,
                total_count: scope_students.len(),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    High,
    Medium,
    Low,
}

impl RiskLevel {
    pub fn from_percentage(pct: f64) -> Self {
        if pct < HIGH_RISK_BELOW {
            Self::High
        } else if pct < MEDIUM_RISK_BELOW {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakStudent {
    #[serde(flatten)]
    pub student: Student,
    pub weak_subjects: Vec<String>,
    pub average_percentage: f64,
    pub average_display: String,
    pub risk_level: RiskLevel,
}

/// Mean of the strictly positive marks; 0 when nobody scored.
fn positive_average(scope_students: &[&Student], subject: &str) -> f64 {
    let positive = scope_students
        .iter()
        .map(|s| s.mark(subject))
        .filter(|m| *m > 0)
        .collect::<Vec<_>>();
    if positive.is_empty() {
        0.0
    } else {
        positive.iter().sum::<i64>() as f64 / positive.len() as f64
    }
}

pub fn weak_students(scope_students: &[&Student], subjects: &[Subject]) -> Vec<WeakStudent> {
    if scope_students.is_empty() {
        return Vec::new();
    }

    let class_averages = subjects
        .iter()
        .map(|sub| positive_average(scope_students, &sub.name))
        .collect::<Vec<_>>();

    let mut out = scope_students
        .iter()
        .filter_map(|student| {
            let weak_subjects = subjects
                .iter()
                .zip(class_averages.iter())
                .filter(|(sub, avg)| {
                    let mark = student.mark(&sub.name) as f64;
                    let percentage = 100.0 * mark / sub.effective_max() as f64;
                    percentage < WEAK_PERCENT || mark < WEAK_CLASS_AVERAGE_RATIO * **avg
                })
                .map(|(sub, _)| sub.name.clone())
                .collect::<Vec<_>>();
            if weak_subjects.is_empty() {
                return None;
            }
            let pct = overall_percentage(student, subjects);
            Some(WeakStudent {
                student: (*student).clone(),
                weak_subjects,
                average_percentage: pct,
                average_display: display_2_decimals(pct),
                risk_level: RiskLevel::from_percentage(pct),
            })
        })
        .collect::<Vec<_>>();

    // Stable: students with equal weak counts keep their scope order.
    out.sort_by(|a, b| b.weak_subjects.len().cmp(&a.weak_subjects.len()));
    out
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub semester: u32,
    pub semester_label: String,
    pub average: f64,
    pub total_marks: i64,
    pub total_max_marks: i64,
}

impl TrendPoint {
    fn empty(semester: u32) -> Self {
        Self {
            semester,
            semester_label: format!("Sem {}", semester),
            average: 0.0,
            total_marks: 0,
            total_max_marks: 0,
        }
    }
}

/// Per-semester series for the physical student behind `student_id`.
///
/// Records are joined on roll number within `batch`. A semester without a
/// record (or without subjects) yields a zero point; when a roll number has
/// several records in one semester the first one is used.
pub fn student_trend(
    batch: &Batch,
    student_id: &str,
    students: &[Student],
    catalog: &SubjectCatalog,
) -> Vec<TrendPoint> {
    let Some(target) = students.iter().find(|s| s.id == student_id) else {
        return Vec::new();
    };
    let key = RollKey {
        batch: &batch.id,
        roll_no: &target.roll_no,
    };

    (1..=batch.semesters)
        .map(|semester| {
            let record = students
                .iter()
                .find(|s| s.semester == semester && s.roll_key() == key);
            let subjects = catalog_subjects(catalog, &batch.id, semester);
            let Some(record) = record else {
                return TrendPoint::empty(semester);
            };
            if subjects.is_empty() {
                return TrendPoint::empty(semester);
            }
            let total_marks: i64 = subjects.iter().map(|sub| record.mark(&sub.name)).sum();
            let total_max_marks: i64 = subjects.iter().map(Subject::effective_max).sum();
            let average = if total_max_marks > 0 {
                round_off_2_decimals(100.0 * total_marks as f64 / total_max_marks as f64)
            } else {
                0.0
            };
            TrendPoint {
                semester,
                semester_label: format!("Sem {}", semester),
                average,
                total_marks,
                total_max_marks,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSummary {
    pub semester_count: usize,
    pub semesters_with_data: usize,
    pub average: Option<f64>,
    pub best: Option<f64>,
    pub worst: Option<f64>,
}

pub fn summarize_trend(points: &[TrendPoint]) -> TrendSummary {
    let averages = points
        .iter()
        .filter(|p| p.total_max_marks > 0)
        .map(|p| p.average)
        .collect::<Vec<_>>();
    let average = if averages.is_empty() {
        None
    } else {
        Some(round_off_2_decimals(
            averages.iter().sum::<f64>() / averages.len() as f64,
        ))
    };
    TrendSummary {
        semester_count: points.len(),
        semesters_with_data: averages.len(),
        average,
        best: averages
            .iter()
            .copied()
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal)),
        worst: averages
            .iter()
            .copied()
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentOption {
    pub value: String,
    pub label: String,
    pub roll_no: String,
}

/// One option per distinct roll number in the batch; the first record wins.
pub fn student_options(students: &[Student], batch_id: &str) -> Vec<StudentOption> {
    let mut seen = HashSet::new();
    students
        .iter()
        .filter(|s| !batch_id.is_empty() && s.batch == batch_id)
        .filter(|s| seen.insert(s.roll_no.as_str()))
        .map(|s| StudentOption {
            value: s.id.clone(),
            label: format!("{} ({})", s.name, s.roll_no),
            roll_no: s.roll_no.clone(),
        })
        .collect()
}

pub fn unique_roll_count(students: &[Student], batch_id: &str) -> usize {
    students
        .iter()
        .filter(|s| s.batch == batch_id)
        .map(|s| s.roll_no.as_str())
        .collect::<HashSet<_>>()
        .len()
}

/// `<s>A`, `<s>B`, `<s>C`, then any other labels already used in that semester.
pub fn section_labels(students: &[Student], batch_id: &str, semester: u32) -> Vec<String> {
    let mut labels = ["A", "B", "C"]
        .iter()
        .map(|suffix| format!("{}{}", semester, suffix))
        .collect::<Vec<_>>();
    for s in students {
        if s.batch == batch_id && s.semester == semester && !labels.contains(&s.section) {
            labels.push(s.section.clone());
        }
    }
    labels
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentMarksRow {
    pub student_id: String,
    pub name: String,
    pub roll_no: String,
    pub marks: BTreeMap<String, i64>,
}

/// The first `limit` scope students with a zero-filled mark per subject.
pub fn student_marks_rows(
    scope_students: &[&Student],
    subjects: &[Subject],
    limit: usize,
) -> Vec<StudentMarksRow> {
    scope_students
        .iter()
        .take(limit)
        .map(|s| StudentMarksRow {
            student_id: s.id.clone(),
            name: s.name.clone(),
            roll_no: s.roll_no.clone(),
            marks: subjects
                .iter()
                .map(|sub| (sub.name.clone(), s.mark(&sub.name)))
                .collect(),
        })
        .collect()
}
