use crate::ipc::error::{ok, HandlerErr};
use crate::model::{AttendanceStatus, SessionKey};
use chrono::{Datelike, NaiveDate};

pub fn respond(id: &str, result: Result<serde_json::Value, HandlerErr>) -> serde_json::Value {
    match result {
        Ok(v) => ok(id, v),
        Err(e) => e.response(id),
    }
}

pub fn get_required_str(params: &serde_json::Value, key: &str) -> Result<String, HandlerErr> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

/// Missing, null and blank all read as `None`.
pub fn get_optional_str(params: &serde_json::Value, key: &str) -> Result<Option<String>, HandlerErr> {
    match params.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(HandlerErr::bad_params(format!("{} must be string or null", key)));
            };
            let t = s.trim();
            if t.is_empty() {
                Ok(None)
            } else {
                Ok(Some(t.to_string()))
            }
        }
    }
}

/// Register dates are four-digit years; chrono alone would accept signed ones.
pub fn parse_date(raw: &str) -> Result<NaiveDate, HandlerErr> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params("date must be YYYY-MM-DD"))?;
    if !(1000..=9999).contains(&date.year()) {
        return Err(HandlerErr::bad_params("date year must be between 1000 and 9999"));
    }
    Ok(date)
}

pub fn parse_status(v: Option<&serde_json::Value>) -> Result<AttendanceStatus, HandlerErr> {
    let Some(s) = v.and_then(|v| v.as_str()) else {
        return Err(HandlerErr::bad_params("missing status"));
    };
    s.parse::<AttendanceStatus>().map_err(HandlerErr::bad_params)
}

pub fn parse_session_key(params: &serde_json::Value) -> Result<SessionKey, HandlerErr> {
    let class_id = get_required_str(params, "classId")?;
    let subject_id = get_required_str(params, "subjectId")?;
    let date = parse_date(&get_required_str(params, "date")?)?;
    Ok(SessionKey::new(class_id, subject_id, date))
}
