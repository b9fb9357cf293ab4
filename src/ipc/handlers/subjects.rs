use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{get_required_str, respond};
use crate::ipc::types::{AppState, Book, Request};
use serde_json::json;

fn subjects_create(book: &mut Book, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let subject = book.create_subject(&name)?;
    Ok(json!({ "subjectId": subject.id, "name": subject.name }))
}

fn subjects_delete(book: &mut Book, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let subject_id = get_required_str(params, "subjectId")?;
    let removed = book.delete_subject(&subject_id)?;
    Ok(json!({ "ok": true, "removedRecords": removed }))
}

fn handle_subjects_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_ref() else {
        return ok(&req.id, json!({ "subjects": [] }));
    };
    ok(&req.id, json!({ "subjects": book.snapshot().subjects }))
}

fn handle_subjects_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(&req.id, subjects_create(book, &req.params))
}

fn handle_subjects_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let result = subjects_delete(book, &req.params);
    if result.is_ok() {
        if let Some(subject_id) = req.params.get("subjectId").and_then(|v| v.as_str()) {
            state.drafts.retain(|k, _| k.subject_id != subject_id);
        }
    }
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "subjects.list" => Some(handle_subjects_list(state, req)),
        "subjects.create" => Some(handle_subjects_create(state, req)),
        "subjects.delete" => Some(handle_subjects_delete(state, req)),
        _ => None,
    }
}
