use crate::calc;
use crate::db::Collection;
use crate::ipc::error::ok;
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    action_err, loaded_records, optional_i64, required_id, required_semester, workspace_mut,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

const ALL_COLLECTIONS: [Collection; 3] = [
    Collection::Batches,
    Collection::Subjects,
    Collection::Students,
];

fn handle_batches_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let records = match loaded_records(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let batches = records
        .batches
        .iter()
        .map(|b| {
            let mut row = json!(b);
            row["uniqueStudentCount"] = json!(calc::unique_roll_count(&records.students, &b.id));
            row
        })
        .collect::<Vec<_>>();
    ok(&req.id, json!({ "batches": batches }))
}

fn handle_batches_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let id = match required_id(req, "id") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let semesters = match optional_i64(req, "semesters") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (conn, records) = match workspace_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let defaults = setup::load_defaults(conn);
    let semesters = semesters.unwrap_or(defaults.semester_count as i64);

    let batch = match records.add_batch(&id, semesters, &defaults) {
        Ok(b) => b.clone(),
        Err(e) => return action_err(req, e),
    };
    let persisted = records.save(conn, &[Collection::Batches, Collection::Subjects]);
    ok(&req.id, json!({ "batch": batch, "persisted": persisted }))
}

fn handle_batches_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let batch_id = match required_id(req, "batchId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (conn, records) = match workspace_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let removed = match records.remove_batch(&batch_id) {
        Ok(n) => n,
        Err(e) => return action_err(req, e),
    };
    let persisted = records.save(conn, &ALL_COLLECTIONS);
    ok(
        &req.id,
        json!({ "removedStudents": removed, "persisted": persisted }),
    )
}

fn handle_batches_add_semester(state: &mut AppState, req: &Request) -> serde_json::Value {
    let batch_id = match required_id(req, "batchId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (conn, records) = match workspace_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let defaults = setup::load_defaults(conn);
    let batch = match records.add_semester(&batch_id, &defaults) {
        Ok(b) => b.clone(),
        Err(e) => return action_err(req, e),
    };
    let persisted = records.save(conn, &[Collection::Batches, Collection::Subjects]);
    ok(&req.id, json!({ "batch": batch, "persisted": persisted }))
}

fn handle_batches_remove_semester(state: &mut AppState, req: &Request) -> serde_json::Value {
    let batch_id = match required_id(req, "batchId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (conn, records) = match workspace_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let removed = match records.remove_semester(&batch_id) {
        Ok(n) => n,
        Err(e) => return action_err(req, e),
    };
    let batch = records.batch(&batch_id).cloned();
    let persisted = records.save(conn, &ALL_COLLECTIONS);
    ok(
        &req.id,
        json!({
            "batch": batch,
            "removedStudents": removed,
            "persisted": persisted
        }),
    )
}

fn handle_sections_list(state: &mut AppState, req: &Request) -> serde_json::Value {
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
        json!({ "sections": calc::section_labels(&records.students, &batch_id, semester) }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "batches.list" => Some(handle_batches_list(state, req)),
        "batches.create" => Some(handle_batches_create(state, req)),
        "batches.delete" => Some(handle_batches_delete(state, req)),
        "batches.addSemester" => Some(handle_batches_add_semester(state, req)),
        "batches.removeSemester" => Some(handle_batches_remove_semester(state, req)),
        "sections.list" => Some(handle_sections_list(state, req)),
        _ => None,
    }
}
