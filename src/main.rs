mod calc;
mod db;
mod ipc;
mod logging;
mod model;
mod records;
mod sheet;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, debug_span, info, warn};

const WORKSPACE_ENV: &str = "MARKSHEETD_WORKSPACE";

fn main() {
    logging::init_logging();
    info!(version = env!("CARGO_PKG_VERSION"), "marksheetd starting");

    let mut state = ipc::AppState::default();
    if let Some(path) = std::env::var_os(WORKSPACE_ENV).map(PathBuf::from) {
        if let Err(e) = ipc::open_workspace(&mut state, &path) {
            warn!(workspace = %path.display(), error = %format!("{e:#}"), "startup workspace not opened");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let span = debug_span!("request", method = %req.method, id = %req.id);
        let resp = span.in_scope(|| {
            debug!("handling request");
            ipc::handle_request(&mut state, req)
        });
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("stdin closed; exiting");
}
