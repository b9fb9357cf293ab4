use crate::model::{AttendanceRecord, ClassRoom, SessionKey, Snapshot, Student, Subject};
use crate::session::{replace_session, SessionDraft};
use crate::store::{CascadeCounts, RecordStore, StoreError};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BookError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Invalid(String),
}

impl BookError {
    pub fn code(&self) -> &'static str {
        match self {
            BookError::Store(e) => e.code(),
            BookError::NotFound(_) => "not_found",
            BookError::Invalid(_) => "bad_params",
        }
    }
}

pub struct NewStudent {
    pub nisn: String,
    pub name: String,
}

fn required(value: &str, field: &str) -> Result<String, BookError> {
    let t = value.trim();
    if t.is_empty() {
        return Err(BookError::Invalid(format!("{} must not be empty", field)));
    }
    Ok(t.to_string())
}

/// The store plus the last committed snapshot of it.
///
/// Every mutation writes to the store first and only touches the
/// snapshot once the write has been accepted.
pub struct Rollbook<S: RecordStore> {
    store: S,
    snapshot: Snapshot,
}

impl<S: RecordStore> Rollbook<S> {
    pub fn open(store: S) -> Result<Self, BookError> {
        let mut book = Self {
            store,
            snapshot: Snapshot::default(),
        };
        book.refresh()?;
        Ok(book)
    }

    pub fn refresh(&mut self) -> Result<(), BookError> {
        let snapshot = Snapshot {
            classes: self.store.read_all()?,
            students: self.store.read_all()?,
            subjects: self.store.read_all()?,
            records: self.store.read_all()?,
        };
        self.snapshot = snapshot;
        Ok(())
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn create_class(&mut self, name: &str) -> Result<ClassRoom, BookError> {
        let class = ClassRoom {
            id: Uuid::new_v4().to_string(),
            name: required(name, "name")?,
        };
        self.store.upsert(std::slice::from_ref(&class))?;
        info!(class_id = %class.id, name = %class.name, "class created");
        self.snapshot.classes.push(class.clone());
        Ok(class)
    }

    /// Removes the class, its roster and every attendance record of it.
    pub fn delete_class(&mut self, class_id: &str) -> Result<CascadeCounts, BookError> {
        if self.snapshot.class(class_id).is_none() {
            return Err(BookError::NotFound("class"));
        }
        let counts = self.store.delete_class_cascade(class_id).map_err(|e| {
            warn!(class_id, error = %e, "class delete failed");
            e
        })?;

        let removed: Vec<String> = self
            .snapshot
            .students
            .iter()
            .filter(|s| s.class_id == class_id)
            .map(|s| s.id.clone())
            .collect();
        self.snapshot.classes.retain(|c| c.id != class_id);
        self.snapshot.students.retain(|s| s.class_id != class_id);
        self.snapshot
            .records
            .retain(|r| r.class_id() != class_id && !removed.iter().any(|id| id == r.student_id()));
        info!(
            class_id,
            students = counts.students,
            records = counts.records,
            "class deleted"
        );
        Ok(counts)
    }

    pub fn create_subject(&mut self, name: &str) -> Result<Subject, BookError> {
        let subject = Subject {
            id: Uuid::new_v4().to_string(),
            name: required(name, "name")?,
        };
        self.store.upsert(std::slice::from_ref(&subject))?;
        info!(subject_id = %subject.id, name = %subject.name, "subject created");
        self.snapshot.subjects.push(subject.clone());
        Ok(subject)
    }

    pub fn delete_subject(&mut self, subject_id: &str) -> Result<usize, BookError> {
        if self.snapshot.subject(subject_id).is_none() {
            return Err(BookError::NotFound("subject"));
        }
        let records = self.store.delete_subject_cascade(subject_id)?;
        self.snapshot.subjects.retain(|s| s.id != subject_id);
        self.snapshot.records.retain(|r| r.subject_id() != subject_id);
        info!(subject_id, records, "subject deleted");
        Ok(records)
    }

    pub fn create_student(&mut self, class_id: &str, nisn: &str, name: &str) -> Result<Student, BookError> {
        let mut created = self.import_students(
            class_id,
            vec![NewStudent {
                nisn: nisn.to_string(),
                name: name.to_string(),
            }],
        )?;
        created
            .pop()
            .ok_or_else(|| BookError::Invalid("student was not created".to_string()))
    }

    /// Inserts every row in one batch; a rejected batch leaves nothing behind.
    pub fn import_students(&mut self, class_id: &str, rows: Vec<NewStudent>) -> Result<Vec<Student>, BookError> {
        if self.snapshot.class(class_id).is_none() {
            return Err(BookError::NotFound("class"));
        }
        let students = rows
            .into_iter()
            .map(|row| {
                Ok(Student {
                    id: Uuid::new_v4().to_string(),
                    nisn: required(&row.nisn, "nisn")?,
                    name: required(&row.name, "name")?,
                    class_id: class_id.to_string(),
                })
            })
            .collect::<Result<Vec<_>, BookError>>()?;
        self.store.upsert(&students)?;
        info!(class_id, count = students.len(), "students added");
        self.snapshot.students.extend(students.iter().cloned());
        Ok(students)
    }

    /// Removes the student and their attendance records.
    pub fn delete_student(&mut self, student_id: &str) -> Result<usize, BookError> {
        if self.snapshot.student(student_id).is_none() {
            return Err(BookError::NotFound("student"));
        }
        let records = self.store.delete_student_cascade(student_id)?;
        self.snapshot.students.retain(|s| s.id != student_id);
        self.snapshot.records.retain(|r| r.student_id() != student_id);
        info!(student_id, records, "student deleted");
        Ok(records)
    }

    /// Case-insensitive search over name and nisn, in name order.
    pub fn list_students(&self, class_id: Option<&str>, query: Option<&str>) -> Vec<&Student> {
        let needle = query.map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty());
        let mut out: Vec<&Student> = self
            .snapshot
            .students
            .iter()
            .filter(|s| class_id.map(|c| s.class_id == c).unwrap_or(true))
            .filter(|s| match &needle {
                Some(n) => s.name.to_lowercase().contains(n) || s.nisn.to_lowercase().contains(n),
                None => true,
            })
            .collect();
        out.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        out
    }

    pub fn check_session(&self, key: &SessionKey) -> Result<(), BookError> {
        if self.snapshot.class(&key.class_id).is_none() {
            return Err(BookError::NotFound("class"));
        }
        if self.snapshot.subject(&key.subject_id).is_none() {
            return Err(BookError::NotFound("subject"));
        }
        Ok(())
    }

    pub fn open_session(&self, key: SessionKey) -> Result<SessionDraft, BookError> {
        self.check_session(&key)?;
        Ok(SessionDraft::open(key, &self.snapshot.records))
    }

    /// Makes the resolved records the whole of the draft's session in one
    /// store transaction, dropping records of students who left the roster.
    /// The snapshot is replaced only after the store accepted the write.
    pub fn save_session(&mut self, draft: &mut SessionDraft) -> Result<Vec<AttendanceRecord>, BookError> {
        self.check_session(&draft.key)?;
        let roster = self.snapshot.roster(&draft.key.class_id);
        let fresh = draft.resolve(&roster);

        let dropped = match self.store.replace_session(&draft.key, &fresh) {
            Ok(n) => n,
            Err(e) => {
                warn!(
                    class_id = %draft.key.class_id,
                    subject_id = %draft.key.subject_id,
                    date = %draft.key.date,
                    error = %e,
                    "attendance save failed"
                );
                return Err(e.into());
            }
        };

        replace_session(&mut self.snapshot.records, &draft.key, fresh.clone());
        draft.mark_saved(&fresh);
        info!(
            class_id = %draft.key.class_id,
            subject_id = %draft.key.subject_id,
            date = %draft.key.date,
            records = fresh.len(),
            dropped,
            "attendance saved"
        );
        Ok(fresh)
    }
}
