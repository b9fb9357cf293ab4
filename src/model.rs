use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassRoom {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    /// External registration number. Not unique.
    pub nisn: String,
    pub name: String,
    pub class_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Excused,
    Sick,
    Absent,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 4] = [
        AttendanceStatus::Present,
        AttendanceStatus::Excused,
        AttendanceStatus::Sick,
        AttendanceStatus::Absent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Excused => "excused",
            AttendanceStatus::Sick => "sick",
            AttendanceStatus::Absent => "absent",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = String;

    /// Accepts the wire names plus the legacy register codes
    /// (HADIR/IZIN/SAKIT/ALPHA and their initials).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" | "hadir" | "h" => Ok(AttendanceStatus::Present),
            "excused" | "izin" | "i" => Ok(AttendanceStatus::Excused),
            "sick" | "sakit" | "s" => Ok(AttendanceStatus::Sick),
            "absent" | "alpha" | "alpa" | "a" => Ok(AttendanceStatus::Absent),
            other => Err(format!("unknown attendance status: {}", other)),
        }
    }
}

/// One (class, subject, date) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
    pub class_id: String,
    pub subject_id: String,
    pub date: NaiveDate,
}

impl SessionKey {
    pub fn new(class_id: impl Into<String>, subject_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            class_id: class_id.into(),
            subject_id: subject_id.into(),
            date,
        }
    }

    pub fn record_key(&self, student_id: impl Into<String>) -> RecordKey {
        RecordKey {
            session: self.clone(),
            student_id: student_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub session: SessionKey,
    pub student_id: String,
}

/// Serialized flat: `{studentId, classId, subjectId, date, status}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub key: RecordKey,
    pub status: AttendanceStatus,
}

impl AttendanceRecord {
    pub fn new(session: &SessionKey, student_id: impl Into<String>, status: AttendanceStatus) -> Self {
        Self {
            key: session.record_key(student_id),
            status,
        }
    }

    pub fn student_id(&self) -> &str {
        &self.key.student_id
    }

    pub fn class_id(&self) -> &str {
        &self.key.session.class_id
    }

    pub fn subject_id(&self) -> &str {
        &self.key.session.subject_id
    }

    pub fn date(&self) -> NaiveDate {
        self.key.session.date
    }

    pub fn session(&self) -> &SessionKey {
        &self.key.session
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FlatRecord {
    student_id: String,
    class_id: String,
    subject_id: String,
    date: NaiveDate,
    status: AttendanceStatus,
}

impl Serialize for AttendanceRecord {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        FlatRecord {
            student_id: self.key.student_id.clone(),
            class_id: self.key.session.class_id.clone(),
            subject_id: self.key.session.subject_id.clone(),
            date: self.key.session.date,
            status: self.status,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AttendanceRecord {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let flat = FlatRecord::deserialize(deserializer)?;
        Ok(AttendanceRecord {
            key: RecordKey {
                session: SessionKey {
                    class_id: flat.class_id,
                    subject_id: flat.subject_id,
                    date: flat.date,
                },
                student_id: flat.student_id,
            },
            status: flat.status,
        })
    }
}

/// Everything the daemon knows, as read from the store.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub classes: Vec<ClassRoom>,
    pub students: Vec<Student>,
    pub subjects: Vec<Subject>,
    pub records: Vec<AttendanceRecord>,
}

impl Snapshot {
    pub fn class(&self, id: &str) -> Option<&ClassRoom> {
        self.classes.iter().find(|c| c.id == id)
    }

    pub fn student(&self, id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == id)
    }

    pub fn subject(&self, id: &str) -> Option<&Subject> {
        self.subjects.iter().find(|s| s.id == id)
    }

    /// Students currently assigned to `class_id`, in name order.
    pub fn roster(&self, class_id: &str) -> Vec<&Student> {
        let mut out: Vec<&Student> = self
            .students
            .iter()
            .filter(|s| s.class_id == class_id)
            .collect();
        out.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        out
    }
}
