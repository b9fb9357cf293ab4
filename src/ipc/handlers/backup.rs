use crate::backup;
use crate::ipc::error::{err, ok};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::get_optional_str;
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

fn required_path(req: &Request, key: &str) -> Result<PathBuf, serde_json::Value> {
    match get_optional_str(&req.params, key) {
        Ok(Some(v)) => Ok(PathBuf::from(v)),
        Ok(None) => Err(err(&req.id, "bad_params", format!("missing {}", key), None)),
        Err(e) => Err(e.response(&req.id)),
    }
}

fn handle_backup_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace_path) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let out_path = match required_path(req, "outPath") {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    if let Some(book) = state.book.as_ref() {
        let _ = book.store().conn().execute_batch("PRAGMA wal_checkpoint(FULL)");
    }

    let export = match backup::export_workspace_bundle(&workspace_path, &out_path) {
        Ok(v) => v,
        Err(e) => {
            warn!(path = %out_path.display(), error = %e, "backup export failed");
            return err(
                &req.id,
                "io_failed",
                format!("{e:#}"),
                Some(json!({ "path": out_path.to_string_lossy() })),
            );
        }
    };
    info!(
        path = %out_path.display(),
        sha256 = %export.db_sha256,
        "workspace backup written"
    );

    ok(
        &req.id,
        json!({
            "ok": true,
            "path": out_path.to_string_lossy(),
            "bundleFormat": export.bundle_format,
            "entryCount": export.entry_count,
            "dbSha256": export.db_sha256
        }),
    )
}

fn handle_backup_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(workspace_path) = state.workspace.clone() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let src = match required_path(req, "inPath") {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    if !src.is_file() {
        return err(
            &req.id,
            "not_found",
            "bundle file not found",
            Some(json!({ "path": src.to_string_lossy() })),
        );
    }

    // Release the connection before the database file is replaced.
    state.book = None;
    state.drafts.clear();

    let imported = backup::import_workspace_bundle(&src, &workspace_path);
    let reopened = open_workspace(state, &workspace_path);

    let import = match imported {
        Ok(v) => v,
        Err(e) => {
            warn!(path = %src.display(), error = %e, "backup import failed");
            return err(
                &req.id,
                "io_failed",
                format!("{e:#}"),
                Some(json!({ "path": src.to_string_lossy() })),
            );
        }
    };
    if let Err(e) = reopened {
        return e.response(&req.id);
    }
    info!(
        path = %src.display(),
        format = %import.bundle_format_detected,
        "workspace restored from backup"
    );

    ok(
        &req.id,
        json!({
            "ok": true,
            "workspacePath": workspace_path.to_string_lossy(),
            "bundleFormatDetected": import.bundle_format_detected
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "backup.export" => Some(handle_backup_export(state, req)),
        "backup.import" => Some(handle_backup_import(state, req)),
        _ => None,
    }
}
