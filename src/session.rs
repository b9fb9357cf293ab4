use crate::model::{AttendanceRecord, AttendanceStatus, SessionKey, Student};
use serde::Serialize;
use std::collections::HashMap;

/// Status written for roster students nobody marked.
pub const DEFAULT_STATUS: AttendanceStatus = AttendanceStatus::Absent;

/// Full replacement record set for `key`: one record per roster student,
/// in roster order. Selections for students outside the roster are ignored.
pub fn resolve_session(
    key: &SessionKey,
    roster: &[&Student],
    selections: &HashMap<String, AttendanceStatus>,
    default: AttendanceStatus,
) -> Vec<AttendanceRecord> {
    roster
        .iter()
        .map(|s| {
            let status = selections.get(&s.id).copied().unwrap_or(default);
            AttendanceRecord::new(key, s.id.clone(), status)
        })
        .collect()
}

/// Drops every record of `key`'s session, then appends `fresh`.
pub fn replace_session(records: &mut Vec<AttendanceRecord>, key: &SessionKey, fresh: Vec<AttendanceRecord>) {
    records.retain(|r| r.session() != key);
    records.extend(fresh);
}

pub fn session_records<'a>(
    records: &'a [AttendanceRecord],
    key: &'a SessionKey,
) -> impl Iterator<Item = &'a AttendanceRecord> + 'a {
    records.iter().filter(move |r| r.session() == key)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Unsaved,
    Draft,
    Saved,
}

#[derive(Debug, Clone)]
pub struct SessionDraft {
    pub key: SessionKey,
    pub phase: SessionPhase,
    pub statuses: HashMap<String, AttendanceStatus>,
}

impl SessionDraft {
    /// Loads whatever is stored for `key`; `Saved` if anything was.
    pub fn open(key: SessionKey, records: &[AttendanceRecord]) -> Self {
        let statuses: HashMap<String, AttendanceStatus> = session_records(records, &key)
            .map(|r| (r.student_id().to_string(), r.status))
            .collect();
        let phase = if statuses.is_empty() {
            SessionPhase::Unsaved
        } else {
            SessionPhase::Saved
        };
        Self {
            key,
            phase,
            statuses,
        }
    }

    pub fn set_status(&mut self, student_id: impl Into<String>, status: AttendanceStatus) {
        self.statuses.insert(student_id.into(), status);
        self.phase = SessionPhase::Draft;
    }

    pub fn mark_all(&mut self, roster: &[&Student], status: AttendanceStatus) {
        self.statuses = roster.iter().map(|s| (s.id.clone(), status)).collect();
        self.phase = SessionPhase::Draft;
    }

    pub fn status_of(&self, student_id: &str) -> Option<AttendanceStatus> {
        self.statuses.get(student_id).copied()
    }

    pub fn resolve(&self, roster: &[&Student]) -> Vec<AttendanceRecord> {
        resolve_session(&self.key, roster, &self.statuses, DEFAULT_STATUS)
    }

    /// Call only once the store has accepted `saved`.
    pub fn mark_saved(&mut self, saved: &[AttendanceRecord]) {
        self.statuses = saved
            .iter()
            .map(|r| (r.student_id().to_string(), r.status))
            .collect();
        self.phase = SessionPhase::Saved;
    }
}
