use crate::model::{Batch, Student, Subject, SubjectCatalog};
use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::Path;

pub const DB_FILE_NAME: &str = "marksheet.sqlite3";

/// The three whole-collection units the store reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Batches,
    Subjects,
    Students,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Batches => "batches",
            Collection::Subjects => "subjects",
            Collection::Students => "students",
        }
    }

    fn stamp_key(self) -> String {
        format!("store.{}", self.as_str())
    }
}

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("create workspace {}", workspace.display()))?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("open {}", db_path.display()))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batches(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            start_year INTEGER NOT NULL,
            active INTEGER NOT NULL,
            semesters INTEGER NOT NULL,
            sort_order INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            batch_id TEXT NOT NULL,
            semester INTEGER NOT NULL,
            name TEXT NOT NULL,
            max_marks INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            PRIMARY KEY(batch_id, semester, name)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            roll_no TEXT NOT NULL,
            batch_id TEXT NOT NULL,
            semester INTEGER NOT NULL,
            section TEXT NOT NULL,
            sort_order INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_scope ON students(batch_id, semester, section)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student_marks(
            student_id TEXT NOT NULL,
            subject TEXT NOT NULL,
            mark INTEGER NOT NULL,
            PRIMARY KEY(student_id, subject),
            FOREIGN KEY(student_id) REFERENCES students(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    // Workspaces created before per-row timestamps lack updated_at.
    ensure_students_updated_at(&conn)?;

    Ok(conn)
}

fn ensure_students_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "students", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => {
            let v = serde_json::from_str(&s).with_context(|| format!("settings {key}"))?;
            Ok(Some(v))
        }
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

/// A collection is present once it has been saved at least once.
pub fn collection_saved(conn: &Connection, collection: Collection) -> anyhow::Result<bool> {
    Ok(settings_get_json(conn, &collection.stamp_key())?.is_some())
}

fn stamp(conn: &Connection, collection: Collection, count: usize) -> anyhow::Result<()> {
    settings_set_json(
        conn,
        &collection.stamp_key(),
        &json!({
            "savedAt": chrono::Utc::now().to_rfc3339(),
            "count": count,
        }),
    )
}

pub fn load_batches(conn: &Connection) -> anyhow::Result<Option<Vec<Batch>>> {
    if !collection_saved(conn, Collection::Batches)? {
        return Ok(None);
    }
    let mut stmt = conn.prepare(
        "SELECT id, name, start_year, active, semesters FROM batches ORDER BY sort_order, rowid",
    )?;
    let batches = stmt
        .query_map([], |r| {
            Ok(Batch {
                id: r.get(0)?,
                name: r.get(1)?,
                start_year: r.get(2)?,
                active: r.get::<_, i64>(3)? != 0,
                semesters: r.get(4)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("read batches")?;
    Ok(Some(batches))
}

pub fn save_batches(conn: &Connection, batches: &[Batch]) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM batches", [])?;
    {
        let mut insert = tx.prepare(
            "INSERT INTO batches(id, name, start_year, active, semesters, sort_order)
             VALUES(?, ?, ?, ?, ?, ?)",
        )?;
        for (i, b) in batches.iter().enumerate() {
            insert.execute((
                &b.id,
                &b.name,
                b.start_year,
                b.active as i64,
                b.semesters,
                i as i64,
            ))?;
        }
    }
    stamp(&tx, Collection::Batches, batches.len())?;
    tx.commit()?;
    Ok(())
}

pub fn load_subject_catalog(conn: &Connection) -> anyhow::Result<Option<SubjectCatalog>> {
    if !collection_saved(conn, Collection::Subjects)? {
        return Ok(None);
    }
    let mut stmt = conn.prepare(
        "SELECT batch_id, semester, name, max_marks FROM subjects
         ORDER BY batch_id, semester, sort_order",
    )?;
    let mut rows = stmt.query([])?;
    let mut catalog = SubjectCatalog::new();
    while let Some(row) = rows.next()? {
        let batch_id: String = row.get(0)?;
        let semester: u32 = row.get(1)?;
        catalog
            .entry(batch_id)
            .or_default()
            .entry(semester)
            .or_default()
            .push(Subject::new(row.get::<_, String>(2)?, row.get(3)?));
    }
    Ok(Some(catalog))
}

pub fn save_subject_catalog(conn: &Connection, catalog: &SubjectCatalog) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM subjects", [])?;
    let mut count = 0usize;
    {
        let mut insert = tx.prepare(
            "INSERT INTO subjects(batch_id, semester, name, max_marks, sort_order)
             VALUES(?, ?, ?, ?, ?)",
        )?;
        for (batch_id, by_sem) in catalog {
            for (semester, subjects) in by_sem {
                for (i, s) in subjects.iter().enumerate() {
                    insert.execute((batch_id, semester, &s.name, s.max_marks, i as i64))?;
                    count += 1;
                }
            }
        }
    }
    stamp(&tx, Collection::Subjects, count)?;
    tx.commit()?;
    Ok(())
}

pub fn load_students(conn: &Connection) -> anyhow::Result<Option<Vec<Student>>> {
    if !collection_saved(conn, Collection::Students)? {
        return Ok(None);
    }
    let mut marks_by_student: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    {
        let mut stmt = conn.prepare("SELECT student_id, subject, mark FROM student_marks")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            marks_by_student
                .entry(row.get(0)?)
                .or_default()
                .insert(row.get(1)?, row.get(2)?);
        }
    }

    let mut stmt = conn.prepare(
        "SELECT id, name, roll_no, batch_id, semester, section FROM students
         ORDER BY sort_order, rowid",
    )?;
    let mut students = stmt
        .query_map([], |r| {
            Ok(Student {
                id: r.get(0)?,
                name: r.get(1)?,
                roll_no: r.get(2)?,
                batch: r.get(3)?,
                semester: r.get(4)?,
                section: r.get(5)?,
                marks: BTreeMap::new(),
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("read students")?;
    for s in students.iter_mut() {
        if let Some(m) = marks_by_student.remove(&s.id) {
            s.marks = m;
        }
    }
    Ok(Some(students))
}

pub fn save_students(conn: &Connection, students: &[Student]) -> anyhow::Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM student_marks", [])?;
    tx.execute("DELETE FROM students", [])?;
    {
        let mut insert_student = tx.prepare(
            "INSERT INTO students(id, name, roll_no, batch_id, semester, section, sort_order, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        let mut insert_mark =
            tx.prepare("INSERT INTO student_marks(student_id, subject, mark) VALUES(?, ?, ?)")?;
        for (i, s) in students.iter().enumerate() {
            insert_student.execute((
                &s.id,
                &s.name,
                &s.roll_no,
                &s.batch,
                s.semester,
                &s.section,
                i as i64,
                &now,
            ))?;
            for (subject, mark) in &s.marks {
                insert_mark.execute((&s.id, subject, mark))?;
            }
        }
    }
    stamp(&tx, Collection::Students, students.len())?;
    tx.commit()?;
    Ok(())
}
