use crate::book::Rollbook;
use crate::db;
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::store::SqliteStore;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Opens (or creates) the workspace database and loads its snapshot.
/// Any open session drafts belong to the previous workspace and are dropped.
pub fn open_workspace(state: &mut AppState, path: &Path) -> Result<(), HandlerErr> {
    let conn = db::open_db(path).map_err(|e| {
        warn!(path = %path.display(), error = %e, "workspace open failed");
        HandlerErr::new("db_open_failed", format!("{e:?}"))
    })?;
    let book = Rollbook::open(SqliteStore::new(conn))?;
    info!(
        path = %path.display(),
        classes = book.snapshot().classes.len(),
        students = book.snapshot().students.len(),
        records = book.snapshot().records.len(),
        "workspace opened"
    );
    state.workspace = Some(path.to_path_buf());
    state.book = Some(book);
    state.drafts.clear();
    Ok(())
}

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
        }),
    )
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
        Ok(()) => ok(&req.id, json!({ "workspacePath": path.to_string_lossy() })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_workspace_refresh(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    match book.refresh() {
        Ok(()) => ok(
            &req.id,
            json!({
                "classes": book.snapshot().classes.len(),
                "students": book.snapshot().students.len(),
                "subjects": book.snapshot().subjects.len(),
                "records": book.snapshot().records.len()
            }),
        ),
        Err(e) => HandlerErr::from(e).response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "workspace.refresh" => Some(handle_workspace_refresh(state, req)),
        _ => None,
    }
}
