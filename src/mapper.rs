//! Field mapping between the local record shape and the remote row shape.
//!
//! Local records use camelCase keys and may carry device-only data. Remote
//! rows use snake_case column names and carry an ownership column. Only the
//! keys listed here are touched; every other key passes through unchanged in
//! both directions.
//!
//! Both directions check key *existence*, never truthiness, so `false`,
//! `null` and `0` values are renamed like any other.

use crate::models::{Record, StoreName};

/// Renamed fields as `(local, remote)` pairs.
pub const FIELD_PAIRS: [(&str, &str); 8] = [
    ("dueDate", "due_date"),
    ("isCompleted", "is_completed"),
    ("createdAt", "created_at"),
    ("projectId", "project_id"),
    ("columnId", "column_id"),
    ("completedDates", "completed_dates"),
    ("isArchived", "is_archived"),
    ("lastInteraction", "last_interaction"),
];

/// Fields with no remote column. Dropped silently on the way out.
pub const LOCAL_ONLY_FIELDS: [&str; 1] = ["attachments"];

/// Ownership column present only on remote rows.
pub const OWNER_FIELD: &str = "user_id";

/// Nested JSON fields forwarded as-is for stores whose remote table has
/// matching JSON columns.
pub fn json_columns(store: StoreName) -> &'static [&'static str] {
    match store {
        StoreName::Projects => &["columns", "milestones"],
        StoreName::Tasks
        | StoreName::Thoughts
        | StoreName::Journal
        | StoreName::Habits
        | StoreName::ChatSessions
        | StoreName::Memories => &[],
    }
}

/// Every JSON column name used by any store.
fn all_json_columns() -> impl Iterator<Item = &'static str> {
    StoreName::ALL
        .into_iter()
        .flat_map(|store| json_columns(store).iter().copied())
}

/// Translates a local record into the remote row shape for `store`.
///
/// Does not attach the ownership column; that is the sync coordinator's job.
pub fn to_remote_shape(store: StoreName, record: &Record) -> Record {
    let mut row = record.clone();

    for field in LOCAL_ONLY_FIELDS {
        row.remove(field);
    }

    let allowed = json_columns(store);
    for field in all_json_columns() {
        if !allowed.contains(&field) {
            row.remove(field);
        }
    }

    for (local, remote) in FIELD_PAIRS {
        if let Some(value) = row.remove(local) {
            row.insert(remote.to_string(), value);
        }
    }

    row
}

/// Translates a remote row back into the local record shape.
pub fn to_local_shape(row: &Record) -> Record {
    let mut record = row.clone();
    record.remove(OWNER_FIELD);

    for (local, remote) in FIELD_PAIRS {
        if let Some(value) = record.remove(remote) {
            record.insert(local.to_string(), value);
        }
    }

    record
}
