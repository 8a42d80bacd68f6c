use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::model::Scope;
use crate::records::{ActionError, Records};
use rusqlite::Connection;
use serde_json::Value;

pub fn required_str(req: &Request, key: &str) -> Result<String, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

/// Batch ids are numeric strings; callers may send them as JSON numbers.
pub fn required_id(req: &Request, key: &str) -> Result<String, Value> {
    match req.params.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
    }
}

pub fn required_i64(req: &Request, key: &str) -> Result<i64, Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_i64())
        .ok_or_else(|| err(&req.id, "bad_params", format!("{} must be an integer", key), None))
}

pub fn optional_i64(req: &Request, key: &str) -> Result<Option<i64>, Value> {
    match req.params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| {
            err(&req.id, "bad_params", format!("{} must be an integer", key), None)
        }),
    }
}

pub fn required_semester(req: &Request) -> Result<u32, Value> {
    let n = required_i64(req, "semester")?;
    u32::try_from(n)
        .ok()
        .filter(|s| *s >= 1)
        .ok_or_else(|| err(&req.id, "bad_params", "semester must be >= 1", None))
}

/// `batchId`, `semester` and `section` from the params.
pub fn required_scope(req: &Request) -> Result<Scope, Value> {
    let batch_id = required_id(req, "batchId")?;
    let semester = required_semester(req)?;
    let section = required_str(req, "section")?;
    Ok(Scope::new(batch_id, semester, section))
}

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn loaded_records<'a>(state: &'a AppState, req: &Request) -> Result<&'a Records, Value> {
    state
        .records
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn workspace_mut<'a>(
    state: &'a mut AppState,
    req: &Request,
) -> Result<(&'a Connection, &'a mut Records), Value> {
    match (state.db.as_ref(), state.records.as_mut()) {
        (Some(conn), Some(records)) => Ok((conn, records)),
        _ => Err(err(&req.id, "no_workspace", "select a workspace first", None)),
    }
}

pub fn action_err(req: &Request, e: ActionError) -> Value {
    err(&req.id, e.code(), e.to_string(), None)
}
