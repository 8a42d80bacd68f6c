use crate::db::Collection;
use crate::ipc::error::ok;
use crate::ipc::helpers::{
    action_err, loaded_records, optional_i64, required_i64, required_id, required_scope,
    required_semester, required_str, workspace_mut,
};
use crate::ipc::types::{AppState, Request};
use crate::model::DEFAULT_MAX_MARKS;
use serde_json::json;

const CATALOG_AND_MARKS: [Collection; 2] = [Collection::Subjects, Collection::Students];

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let batch_id = match required_id(req, "batchId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let semester = match required_semester(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let records = match loaded_records(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({ "subjects": records.subjects(&batch_id, semester) }),
    )
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match required_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let max_marks = match optional_i64(req, "maxMarks") {
        Ok(v) => v.unwrap_or(DEFAULT_MAX_MARKS),
        Err(e) => return e,
    };
    let (conn, records) = match workspace_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subjects = match records.add_subject(&scope, &name, max_marks) {
        Ok(list) => list.to_vec(),
        Err(e) => return action_err(req, e),
    };
    let persisted = records.save(conn, &CATALOG_AND_MARKS);
    ok(
        &req.id,
        json!({ "subjects": subjects, "persisted": persisted }),
    )
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let batch_id = match required_id(req, "batchId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let semester = match required_semester(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (conn, records) = match workspace_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subjects = match records.remove_subject(&batch_id, semester, &name) {
        Ok(list) => list.to_vec(),
        Err(e) => return action_err(req, e),
    };
    let persisted = records.save(conn, &CATALOG_AND_MARKS);
    ok(
        &req.id,
        json!({ "subjects": subjects, "persisted": persisted }),
    )
}

fn handle_subjects_update_max_marks(state: &mut AppState, req: &Request) -> serde_json::Value {
    let batch_id = match required_id(req, "batchId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let semester = match required_semester(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let max_marks = match required_i64(req, "maxMarks") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (conn, records) = match workspace_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subjects = match records.set_max_marks(&batch_id, semester, &name, max_marks) {
        Ok(list) => list.to_vec(),
        Err(e) => return action_err(req, e),
    };
    // Existing marks above the new maximum are kept as entered.
    let persisted = records.save(conn, &[Collection::Subjects]);
    ok(
        &req.id,
        json!({ "subjects": subjects, "persisted": persisted }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.delete" => Some(handle_subjects_delete(state, req)),
        "subjects.updateMaxMarks" => Some(handle_subjects_update_max_marks(state, req)),
        _ => None,
    }
}
