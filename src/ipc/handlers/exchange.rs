use crate::calc;
use crate::db::Collection;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{action_err, loaded_records, required_scope, required_str, workspace_mut};
use crate::ipc::types::{AppState, Request};
use crate::sheet;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

const EXPORT_DIR: &str = "exports";

fn handle_import_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = match required_str(req, "path") {
        Ok(v) => PathBuf::from(v),
        Err(e) => return e,
    };
    let scope = match required_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (conn, records) = match workspace_mut(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let parsed = match sheet::read_students_csv(
        &path,
        &scope,
        records.subjects(&scope.batch_id, scope.semester),
    ) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "import_failed",
                e.to_string(),
                Some(json!({ "path": path.to_string_lossy() })),
            )
        }
    };
    let outcome = match records.import_sheet(&scope, parsed) {
        Ok(v) => v,
        Err(e) => return action_err(req, e),
    };
    let persisted = records.save(conn, &[Collection::Subjects, Collection::Students]);
    ok(
        &req.id,
        json!({
            "imported": outcome.imported,
            "newSubjects": outcome.new_subjects,
            "persisted": persisted
        }),
    )
}

fn handle_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let scope = match required_scope(req) {
        Ok(v) => v,
        Err(e) => return e,
    };
    let out_path = match req.params.get("outPath").and_then(|v| v.as_str()) {
        Some(p) => PathBuf::from(p),
        None => match state.workspace.as_ref() {
            Some(ws) => ws.join(EXPORT_DIR).join(sheet::export_file_name(&scope)),
            None => return err(&req.id, "no_workspace", "select a workspace first", None),
        },
    };
    let records = match loaded_records(state, req) {
        Ok(v) => v,
        Err(e) => return e,
    };

    let in_scope = calc::scope_students(&records.students, &scope);
    let subjects = records.subjects(&scope.batch_id, scope.semester);
    match sheet::export_students_csv(&out_path, &in_scope, subjects) {
        Ok(rows) => {
            info!(path = %out_path.display(), rows, "students exported");
            ok(
                &req.id,
                json!({
                    "path": out_path.to_string_lossy(),
                    "rowsExported": rows
                }),
            )
        }
        Err(e) => err(&req.id, "export_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exchange.importCsv" => Some(handle_import_csv(state, req)),
        "exchange.exportCsv" => Some(handle_export_csv(state, req)),
        _ => None,
    }
}
