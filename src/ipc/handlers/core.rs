use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::setup;
use crate::ipc::types::{AppState, Request};
use crate::records::Records;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
}

/// Opens the workspace store and loads its records, replacing any workspace
/// already open. Returns the names of the collections that were seeded.
pub fn open_workspace(state: &mut AppState, path: &Path) -> anyhow::Result<Vec<&'static str>> {
    let conn = db::open_db(path)?;
    let defaults = setup::load_defaults(&conn);
    let (records, seeded) = Records::load(&conn, &defaults);
    info!(
        workspace = %path.display(),
        batches = records.batches.len(),
        students = records.students.len(),
        "workspace opened"
    );
    state.workspace = Some(path.to_path_buf());
    state.db = Some(conn);
    state.records = Some(records);
    Ok(seeded.iter().map(|c| c.as_str()).collect())
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    match open_workspace(state, &path) {
        Ok(seeded) => ok(
            &req.id,
            json!({
                "workspacePath": path.to_string_lossy(),
                "seeded": seeded
            }),
        ),
        Err(e) => err(&req.id, "db_open_failed", format!("{e:#}"), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
