use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{get_required_str, respond};
use crate::ipc::types::{AppState, Book, Request};
use serde_json::json;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_ref() else {
        return ok(&req.id, json!({ "classes": [] }));
    };

    let snapshot = book.snapshot();
    let mut classes: Vec<serde_json::Value> = snapshot
        .classes
        .iter()
        .map(|c| {
            json!({
                "id": c.id,
                "name": c.name,
                "studentCount": snapshot.students.iter().filter(|s| s.class_id == c.id).count()
            })
        })
        .collect();
    classes.sort_by(|a, b| {
        let an = a.get("name").and_then(|v| v.as_str()).unwrap_or("");
        let bn = b.get("name").and_then(|v| v.as_str()).unwrap_or("");
        an.cmp(bn)
    });
    ok(&req.id, json!({ "classes": classes }))
}

fn classes_create(book: &mut Book, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let name = get_required_str(params, "name")?;
    let class = book.create_class(&name)?;
    Ok(json!({ "classId": class.id, "name": class.name }))
}

fn classes_delete(book: &mut Book, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let counts = book.delete_class(&class_id)?;
    Ok(json!({
        "ok": true,
        "removedStudents": counts.students,
        "removedRecords": counts.records
    }))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(&req.id, classes_create(book, &req.params))
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let result = classes_delete(book, &req.params);
    if result.is_ok() {
        if let Some(class_id) = req.params.get("classId").and_then(|v| v.as_str()) {
            state.drafts.retain(|k, _| k.class_id != class_id);
        }
    }
    respond(&req.id, result)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        _ => None,
    }
}
