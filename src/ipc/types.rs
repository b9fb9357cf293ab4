use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::book::Rollbook;
use crate::model::SessionKey;
use crate::session::SessionDraft;
use crate::store::SqliteStore;

pub type Book = Rollbook<SqliteStore>;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub book: Option<Book>,
    /// Open attendance sessions, keyed by (class, subject, date).
    pub drafts: HashMap<SessionKey, SessionDraft>,
}
