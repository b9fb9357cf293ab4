use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{get_optional_str, get_required_str, respond};
use crate::ipc::types::{AppState, Book, Request};
use crate::transfer;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

fn students_list(book: &Book, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_optional_str(params, "classId")?;
    let query = get_optional_str(params, "query")?;
    let students = book.list_students(class_id.as_deref(), query.as_deref());
    Ok(json!({ "students": students }))
}

fn students_create(book: &mut Book, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let nisn = get_required_str(params, "nisn")?;
    let name = get_required_str(params, "name")?;
    let student = book.create_student(&class_id, &nisn, &name)?;
    Ok(json!({ "studentId": student.id, "student": student }))
}

fn students_delete(book: &mut Book, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let student_id = get_required_str(params, "studentId")?;
    let removed = book.delete_student(&student_id)?;
    Ok(json!({ "ok": true, "removedRecords": removed }))
}

fn students_import(book: &mut Book, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let path = PathBuf::from(get_required_str(params, "path")?);
    if book.snapshot().class(&class_id).is_none() {
        return Err(HandlerErr::new("not_found", "class not found"));
    }
    if !path.is_file() {
        return Err(HandlerErr {
            code: "not_found",
            message: "spreadsheet file not found".to_string(),
            details: Some(json!({ "path": path.to_string_lossy() })),
        });
    }

    let outcome = transfer::read_student_rows(&path).map_err(|e| {
        warn!(path = %path.display(), error = %e, "student import failed");
        HandlerErr {
            code: "import_failed",
            message: format!("{e:#}"),
            details: Some(json!({ "path": path.to_string_lossy() })),
        }
    })?;
    if outcome.rows.is_empty() && outcome.skipped == 0 {
        return Err(HandlerErr::new(
            "import_empty",
            "spreadsheet is empty or not in the expected format",
        ));
    }

    let skipped = outcome.skipped;
    let imported = book.import_students(&class_id, outcome.rows)?;
    info!(
        class_id = %class_id,
        imported = imported.len(),
        skipped,
        "student import finished"
    );
    Ok(json!({ "imported": imported.len(), "skipped": skipped }))
}

fn students_write_template(params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let path = PathBuf::from(get_required_str(params, "path")?);
    transfer::write_import_template(&path).map_err(|e| HandlerErr {
        code: "export_failed",
        message: format!("{e:#}"),
        details: Some(json!({ "path": path.to_string_lossy() })),
    })?;
    Ok(json!({ "path": path.to_string_lossy() }))
}

fn handle_students_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_ref() else {
        return ok(&req.id, json!({ "students": [] }));
    };
    respond(&req.id, students_list(book, &req.params))
}

fn handle_students_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(&req.id, students_create(book, &req.params))
}

fn handle_students_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(&req.id, students_delete(book, &req.params))
}

fn handle_students_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(&req.id, students_import(book, &req.params))
}

fn handle_students_write_template(_state: &mut AppState, req: &Request) -> serde_json::Value {
    respond(&req.id, students_write_template(&req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_students_list(state, req)),
        "students.create" => Some(handle_students_create(state, req)),
        "students.delete" => Some(handle_students_delete(state, req)),
        "students.import" => Some(handle_students_import(state, req)),
        "students.writeTemplate" => Some(handle_students_write_template(state, req)),
        _ => None,
    }
}
