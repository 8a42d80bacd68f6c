use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::model::{default_subject_template, Subject, MAX_SEMESTERS};
use crate::records::Defaults;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::warn;

const DEFAULT_PAGE_SIZE: usize = 10;
const DEFAULT_PERFORMANCE_LIMIT: usize = 10;

#[derive(Clone, Copy)]
enum SetupSection {
    Defaults,
    Display,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "defaults" => Some(Self::Defaults),
            "display" => Some(Self::Display),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Defaults => "setup.defaults",
            Self::Display => "setup.display",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Defaults => json!({
            "semesterCount": 6,
            "subjectTemplate": default_subject_template()
        }),
        SetupSection::Display => json!({
            "pageSize": DEFAULT_PAGE_SIZE,
            "performanceLimit": DEFAULT_PERFORMANCE_LIMIT
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_string_max(v: &Value, key: &str, max_len: usize) -> Result<String, String> {
    let s = v.as_str().ok_or_else(|| format!("{} must be string", key))?;
    let s = s.trim();
    if s.len() > max_len {
        return Err(format!("{} length must be <= {}", key, max_len));
    }
    Ok(s.to_string())
}

fn parse_subject_template(v: &Value) -> Result<Vec<Subject>, String> {
    let items = v
        .as_array()
        .ok_or_else(|| "subjectTemplate must be an array".to_string())?;
    if items.is_empty() {
        return Err("subjectTemplate must not be empty".into());
    }
    let mut out: Vec<Subject> = Vec::with_capacity(items.len());
    for item in items {
        let name = item
            .get("name")
            .ok_or_else(|| "subjectTemplate entries need a name".to_string())
            .and_then(|n| parse_string_max(n, "subjectTemplate.name", 80))?;
        if name.is_empty() {
            return Err("subjectTemplate.name must not be empty".into());
        }
        if out.iter().any(|s| s.name == name) {
            return Err(format!("duplicate subject in template: {}", name));
        }
        let max_marks = match item.get("maxMarks") {
            Some(m) => parse_i64_range(m, "subjectTemplate.maxMarks", 1, 1000)?,
            None => crate::model::DEFAULT_MAX_MARKS,
        };
        out.push(Subject::new(name, max_marks));
    }
    Ok(out)
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Defaults => match k.as_str() {
                "semesterCount" => {
                    obj.insert(
                        k.clone(),
                        Value::from(parse_i64_range(v, k, 1, MAX_SEMESTERS as i64)?),
                    );
                }
                "subjectTemplate" => {
                    obj.insert(k.clone(), json!(parse_subject_template(v)?));
                }
                _ => return Err(format!("unknown defaults field: {}", k)),
            },
            SetupSection::Display => match k.as_str() {
                "pageSize" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 500)?));
                }
                "performanceLimit" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 100)?));
                }
                _ => return Err(format!("unknown display field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed stored values keep the defaults.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefaultsSection {
    semester_count: u32,
    subject_template: Vec<Subject>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Display {
    pub page_size: usize,
    pub performance_limit: usize,
}

impl Default for Display {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            performance_limit: DEFAULT_PERFORMANCE_LIMIT,
        }
    }
}

/// Batch and semester defaults for the workspace.
pub fn load_defaults(conn: &rusqlite::Connection) -> Defaults {
    let parsed = load_section(conn, SetupSection::Defaults)
        .and_then(|v| Ok(serde_json::from_value::<DefaultsSection>(v)?));
    match parsed {
        Ok(d) => Defaults {
            semester_count: d.semester_count,
            subject_template: d.subject_template,
        },
        Err(e) => {
            warn!(error = %format!("{e:#}"), "setup.defaults unreadable; using built-in defaults");
            Defaults::default()
        }
    }
}

pub fn load_display(conn: &rusqlite::Connection) -> Display {
    let parsed = load_section(conn, SetupSection::Display)
        .and_then(|v| Ok(serde_json::from_value::<Display>(v)?));
    match parsed {
        Ok(d) => d,
        Err(e) => {
            warn!(error = %format!("{e:#}"), "setup.display unreadable; using built-in defaults");
            Display::default()
        }
    }
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let defaults = match load_section(conn, SetupSection::Defaults) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let display = match load_section(conn, SetupSection::Display) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "defaults": defaults,
            "display": display
        }),
    )
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
