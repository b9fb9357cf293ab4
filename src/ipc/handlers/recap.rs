use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_str, parse_date, respond};
use crate::ipc::types::{AppState, Book, Request};
use crate::recap::{self, AttendanceBand, RecapFilters};
use crate::transfer;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

fn recap_student(book: &Book, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let filters = recap::parse_recap_filters(params)?;
    if book.snapshot().student(&student_id).is_none() {
        return Err(HandlerErr {
            code: "not_found",
            message: "student not found".to_string(),
            details: Some(json!({ "studentId": student_id })),
        });
    }
    let stats = recap::student_stats(&book.snapshot().records, &student_id, &filters);
    Ok(json!({
        "studentId": student_id,
        "present": stats.present,
        "excused": stats.excused,
        "sick": stats.sick,
        "absent": stats.absent,
        "total": stats.total,
        "percentage": stats.percentage,
        "percentageLabel": stats.percentage_label(),
        "band": AttendanceBand::for_percentage(stats.percentage)
    }))
}

fn recap_rows(book: &Book, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let filters = recap::parse_recap_filters(params)?;
    let rows = recap::recap_rows(book.snapshot(), &filters);
    Ok(json!({ "rows": rows }))
}

/// Resolves the export target. A directory gets a generated file name.
fn export_target(book: &Book, filters: &RecapFilters, raw: PathBuf) -> PathBuf {
    if !raw.is_dir() {
        return raw;
    }
    let snapshot = book.snapshot();
    let class_name = filters
        .class_id
        .as_deref()
        .and_then(|id| snapshot.class(id))
        .map(|c| c.name.as_str());
    let subject_name = filters
        .subject_id
        .as_deref()
        .and_then(|id| snapshot.subject(id))
        .map(|s| s.name.as_str());
    let today = chrono::Local::now().date_naive();
    raw.join(transfer::suggested_recap_file_name(class_name, subject_name, today))
}

fn recap_export(book: &Book, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let raw = PathBuf::from(get_required_str(params, "path")?);
    let filters = recap::parse_recap_filters(params)?;
    let rows = recap::recap_rows(book.snapshot(), &filters);
    if rows.is_empty() {
        return Err(HandlerErr::new("export_empty", "no students to export"));
    }

    let path = export_target(book, &filters, raw);
    transfer::write_recap(&path, &rows).map_err(|e| {
        warn!(path = %path.display(), error = %e, "recap export failed");
        HandlerErr {
            code: "export_failed",
            message: format!("{e:#}"),
            details: Some(json!({ "path": path.to_string_lossy() })),
        }
    })?;
    info!(path = %path.display(), rows = rows.len(), "recap exported");
    Ok(json!({ "path": path.to_string_lossy(), "rowCount": rows.len() }))
}

fn dashboard_summary(book: &Book, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let today = match get_optional_str(params, "today")? {
        Some(raw) => parse_date(&raw)?,
        None => chrono::Local::now().date_naive(),
    };
    let summary = recap::dashboard(book.snapshot(), today);
    serde_json::to_value(summary).map_err(|e| HandlerErr::new("recap_failed", e.to_string()))
}

fn handle_recap_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(&req.id, recap_student(book, &req.params))
}

fn handle_recap_rows(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_ref() else {
        return ok(&req.id, json!({ "rows": [] }));
    };
    respond(&req.id, recap_rows(book, &req.params))
}

fn handle_recap_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(&req.id, recap_export(book, &req.params))
}

fn handle_dashboard_summary(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(&req.id, dashboard_summary(book, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "recap.student" => Some(handle_recap_student(state, req)),
        "recap.rows" => Some(handle_recap_rows(state, req)),
        "recap.export" => Some(handle_recap_export(state, req)),
        "dashboard.summary" => Some(handle_dashboard_summary(state, req)),
        _ => None,
    }
}
