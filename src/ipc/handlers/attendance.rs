use crate::ipc::error::{err, HandlerErr};
use crate::ipc::helpers::{parse_session_key, parse_status, respond};
use crate::ipc::types::{AppState, Book, Request};
use crate::model::{AttendanceStatus, SessionKey};
use crate::session::{SessionDraft, SessionPhase, DEFAULT_STATUS};
use serde_json::json;
use std::collections::HashMap;

type Drafts = HashMap<SessionKey, SessionDraft>;

/// Returns the open draft for `key`, loading it from the snapshot if needed.
fn draft_for<'a>(book: &Book, drafts: &'a mut Drafts, key: &SessionKey) -> Result<&'a mut SessionDraft, HandlerErr> {
    book.check_session(key)?;
    if !drafts.contains_key(key) {
        let draft = book.open_session(key.clone())?;
        drafts.insert(key.clone(), draft);
    }
    drafts
        .get_mut(key)
        .ok_or_else(|| HandlerErr::new("not_found", "session not open"))
}

fn require_roster_student(book: &Book, key: &SessionKey, student_id: &str) -> Result<(), HandlerErr> {
    let on_roster = book
        .snapshot()
        .student(student_id)
        .map(|s| s.class_id == key.class_id)
        .unwrap_or(false);
    if !on_roster {
        return Err(HandlerErr {
            code: "not_found",
            message: "student not found in class".to_string(),
            details: Some(json!({ "studentId": student_id })),
        });
    }
    Ok(())
}

fn session_view(book: &Book, draft: &SessionDraft) -> serde_json::Value {
    let roster = book.snapshot().roster(&draft.key.class_id);
    let students: Vec<serde_json::Value> = roster
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "name": s.name,
                "nisn": s.nisn,
                "status": draft.status_of(&s.id)
            })
        })
        .collect();
    json!({
        "classId": draft.key.class_id,
        "subjectId": draft.key.subject_id,
        "date": draft.key.date,
        "phase": draft.phase,
        "defaultStatus": DEFAULT_STATUS,
        "students": students
    })
}

fn session_open(book: &Book, drafts: &mut Drafts, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let key = parse_session_key(params)?;
    let reload = params.get("reload").and_then(|v| v.as_bool()).unwrap_or(false);
    book.check_session(&key)?;

    let keep = !reload
        && drafts
            .get(&key)
            .map(|d| d.phase == SessionPhase::Draft)
            .unwrap_or(false);
    if !keep {
        drafts.insert(key.clone(), book.open_session(key.clone())?);
    }
    let draft = draft_for(book, drafts, &key)?;
    Ok(session_view(book, draft))
}

fn set_status(book: &Book, drafts: &mut Drafts, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let key = parse_session_key(params)?;
    let student_id = params
        .get("studentId")
        .and_then(|v| v.as_str())
        .ok_or_else(|| HandlerErr::bad_params("missing studentId"))?;
    let status = parse_status(params.get("status"))?;
    require_roster_student(book, &key, student_id)?;

    let draft = draft_for(book, drafts, &key)?;
    draft.set_status(student_id, status);
    Ok(json!({ "phase": draft.phase }))
}

fn mark_all(book: &Book, drafts: &mut Drafts, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let key = parse_session_key(params)?;
    let status = parse_status(params.get("status"))?;
    let roster = book.snapshot().roster(&key.class_id);

    let draft = draft_for(book, drafts, &key)?;
    draft.mark_all(&roster, status);
    Ok(json!({ "phase": draft.phase, "marked": roster.len() }))
}

fn parse_statuses(
    book: &Book,
    key: &SessionKey,
    raw: Option<&serde_json::Value>,
) -> Result<Vec<(String, AttendanceStatus)>, HandlerErr> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    if raw.is_null() {
        return Ok(Vec::new());
    }
    let Some(obj) = raw.as_object() else {
        return Err(HandlerErr::bad_params(
            "statuses must be an object of studentId -> status",
        ));
    };
    obj.iter()
        .map(|(student_id, v)| {
            require_roster_student(book, key, student_id)?;
            Ok((student_id.clone(), parse_status(Some(v))?))
        })
        .collect()
}

fn session_save(book: &mut Book, drafts: &mut Drafts, params: &serde_json::Value) -> Result<serde_json::Value, HandlerErr> {
    let key = parse_session_key(params)?;
    let statuses = parse_statuses(book, &key, params.get("statuses"))?;

    let draft = draft_for(book, drafts, &key)?;
    for (student_id, status) in statuses {
        draft.set_status(student_id, status);
    }
    let saved = book.save_session(draft)?;
    let phase = draft.phase;
    // Saved sessions reopen from the snapshot.
    drafts.remove(&key);
    Ok(json!({
        "phase": phase,
        "records": saved
    }))
}

fn handle_session_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(&req.id, session_open(book, &mut state.drafts, &req.params))
}

fn handle_set_status(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(&req.id, set_status(book, &mut state.drafts, &req.params))
}

fn handle_mark_all(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(&req.id, mark_all(book, &mut state.drafts, &req.params))
}

fn handle_session_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(book) = state.book.as_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(&req.id, session_save(book, &mut state.drafts, &req.params))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "attendance.sessionOpen" => Some(handle_session_open(state, req)),
        "attendance.setStatus" => Some(handle_set_status(state, req)),
        "attendance.markAll" => Some(handle_mark_all(state, req)),
        "attendance.sessionSave" => Some(handle_session_save(state, req)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use rusqlite::Connection;

    fn book_with_roster() -> (Book, String, String) {
        let conn = Connection::open_in_memory().expect("open memory db");
        crate::db::init_schema(&conn).expect("schema");
        let mut book = Book::open(SqliteStore::new(conn)).expect("open book");
        let class_id = book.create_class("7A").expect("class").id;
        let subject_id = book.create_subject("Math").expect("subject").id;
        book.create_student(&class_id, "001", "Ani").expect("student");
        (book, class_id, subject_id)
    }

    #[test]
    fn saved_sessions_do_not_stay_in_drafts() {
        let (mut book, class_id, subject_id) = book_with_roster();
        let mut drafts = Drafts::new();
        for day in 1..=20 {
            let params = json!({
                "classId": class_id,
                "subjectId": subject_id,
                "date": format!("2024-03-{:02}", day)
            });
            let saved = session_save(&mut book, &mut drafts, &params).expect("save");
            assert_eq!(saved["phase"], json!("saved"));
        }
        assert!(drafts.is_empty());
        assert_eq!(book.snapshot().records.len(), 20);
    }

    #[test]
    fn failed_save_keeps_the_draft() {
        let (mut book, class_id, subject_id) = book_with_roster();
        let mut drafts = Drafts::new();
        let key = json!({ "classId": class_id, "subjectId": subject_id, "date": "2024-03-01" });
        let student_id = book.snapshot().students[0].id.clone();
        let mut marked = key.clone();
        marked["studentId"] = json!(student_id);
        marked["status"] = json!("sick");
        set_status(&book, &mut drafts, &marked).expect("set status");

        let mut bad = key.clone();
        bad["statuses"] = json!({ "nobody": "present" });
        assert!(session_save(&mut book, &mut drafts, &bad).is_err());

        let session = parse_session_key(&key).expect("key");
        let draft = drafts.get(&session).expect("draft kept");
        assert_eq!(draft.phase, SessionPhase::Draft);
        assert_eq!(draft.status_of(&student_id), Some(AttendanceStatus::Sick));
    }
}
