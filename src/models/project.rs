use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::Record;

/// A project board. `columns` and `milestones` are nested JSON arrays that the
/// remote schema stores in JSON columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub columns: Vec<Value>,
    #[serde(default)]
    pub milestones: Vec<Value>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Record,
}

impl Project {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            columns: Vec::new(),
            milestones: Vec::new(),
            is_archived: false,
            created_at: Some(Utc::now()),
            extra: Record::new(),
        }
    }

    /// Appends a board column and returns its generated id.
    pub fn add_column(&mut self, title: impl Into<String>) -> String {
        let id = Uuid::new_v4().to_string();
        self.columns.push(json!({ "id": id, "title": title.into() }));
        id
    }
}
