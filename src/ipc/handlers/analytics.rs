use crate::calc;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup;
use crate::ipc::helpers::{
    db_conn, loaded_records, optional_i64, required_id, required_scope, required_str,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_subject_stats(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match required_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let records = match loaded_records(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let in_scope = calc::scope_students(&records.students, &scope);
    let rows = calc::subject_stats(&in_scope, records.subjects(&scope.batch_id, scope.semester));
    ok(
        &req.id,
        json!({ "studentCount": in_scope.len(), "rows": rows }),
    )
}

fn handle_weak_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match required_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let records = match loaded_records(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let in_scope = calc::scope_students(&records.students, &scope);
    let rows = calc::weak_students(&in_scope, records.subjects(&scope.batch_id, scope.semester));
    ok(&req.id, json!({ "rows": rows }))
}

fn handle_student_options(state: &mut AppState, req: &Request) -> serde_json::Value {
    let batch_id = match required_id(req, "batchId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let records = match loaded_records(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({ "options": calc::student_options(&records.students, &batch_id) }),
    )
}

fn handle_student_trend(state: &mut AppState, req: &Request) -> serde_json::Value {
    let batch_id = match required_id(req, "batchId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let records = match loaded_records(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(batch) = records.batch(&batch_id) else {
        return err(
            &req.id,
            "not_found",
            format!("batch {} not found", batch_id),
            None,
        );
    };
    let points = calc::student_trend(batch, &student_id, &records.students, &records.catalog);
    let summary = calc::summarize_trend(&points);
    ok(
        &req.id,
        json!({ "points": points, "summary": summary }),
    )
}

fn handle_student_marks(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match required_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let limit = match optional_i64(req, "limit") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let limit = match limit {
        Some(n) if n >= 1 => n as usize,
        Some(_) => return err(&req.id, "bad_params", "limit must be >= 1", None),
        None => match db_conn(state, req) {
            Ok(conn) => setup::load_display(conn).performance_limit,
            Err(e) => return e,
        },
    };
    let records = match loaded_records(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let subjects = records.subjects(&scope.batch_id, scope.semester);
    let in_scope = calc::scope_students(&records.students, &scope);
    ok(
        &req.id,
        json!({
            "subjects": subjects.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            "rows": calc::student_marks_rows(&in_scope, subjects, limit)
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "analytics.subjectStats" => Some(handle_subject_stats(state, req)),
        "analytics.weakStudents" => Some(handle_weak_students(state, req)),
        "analytics.studentOptions" => Some(handle_student_options(state, req)),
        "analytics.studentTrend" => Some(handle_student_trend(state, req)),
        "analytics.studentMarks" => Some(handle_student_marks(state, req)),
        _ => None,
    }
}
