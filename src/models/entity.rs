use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::{ChatSession, Habit, JournalEntry, Memory, Project, StoreName, Task, Thought};

/// Untyped record shape shared by the mapper, the local store and the remote client.
pub type Record = Map<String, Value>;

/// A typed entity that lives in exactly one store.
pub trait Entity: Serialize + DeserializeOwned {
    const STORE: StoreName;

    fn id(&self) -> &str;

    /// Serializes into the untyped local shape.
    fn to_record(&self) -> Result<Record, serde_json::Error> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "entity serialized to non-object value: {}",
                other
            ))),
        }
    }

    fn from_record(record: Record) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(record))
    }
}

/// Returns the record's `id` when it is a string.
pub fn record_id(record: &Record) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

impl Entity for Task {
    const STORE: StoreName = StoreName::Tasks;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Thought {
    const STORE: StoreName = StoreName::Thoughts;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for JournalEntry {
    const STORE: StoreName = StoreName::Journal;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Project {
    const STORE: StoreName = StoreName::Projects;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Habit {
    const STORE: StoreName = StoreName::Habits;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for ChatSession {
    const STORE: StoreName = StoreName::ChatSessions;
    fn id(&self) -> &str {
        &self.id
    }
}

impl Entity for Memory {
    const STORE: StoreName = StoreName::Memories;
    fn id(&self) -> &str {
        &self.id
    }
}

/// Closed set of entity variants, one per store.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityRecord {
    Task(Task),
    Thought(Thought),
    Journal(JournalEntry),
    Project(Project),
    Habit(Habit),
    ChatSession(ChatSession),
    Memory(Memory),
}

impl EntityRecord {
    /// Validates an untyped record against the entity type of `store`.
    pub fn decode(store: StoreName, record: Record) -> Result<Self, serde_json::Error> {
        Ok(match store {
            StoreName::Tasks => EntityRecord::Task(Task::from_record(record)?),
            StoreName::Thoughts => EntityRecord::Thought(Thought::from_record(record)?),
            StoreName::Journal => EntityRecord::Journal(JournalEntry::from_record(record)?),
            StoreName::Projects => EntityRecord::Project(Project::from_record(record)?),
            StoreName::Habits => EntityRecord::Habit(Habit::from_record(record)?),
            StoreName::ChatSessions => {
                EntityRecord::ChatSession(ChatSession::from_record(record)?)
            }
            StoreName::Memories => EntityRecord::Memory(Memory::from_record(record)?),
        })
    }

    pub fn store(&self) -> StoreName {
        match self {
            EntityRecord::Task(_) => Task::STORE,
            EntityRecord::Thought(_) => Thought::STORE,
            EntityRecord::Journal(_) => JournalEntry::STORE,
            EntityRecord::Project(_) => Project::STORE,
            EntityRecord::Habit(_) => Habit::STORE,
            EntityRecord::ChatSession(_) => ChatSession::STORE,
            EntityRecord::Memory(_) => Memory::STORE,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            EntityRecord::Task(e) => e.id(),
            EntityRecord::Thought(e) => e.id(),
            EntityRecord::Journal(e) => e.id(),
            EntityRecord::Project(e) => e.id(),
            EntityRecord::Habit(e) => e.id(),
            EntityRecord::ChatSession(e) => e.id(),
            EntityRecord::Memory(e) => e.id(),
        }
    }

    /// One-line human summary, used by the CLI listing.
    pub fn summary(&self) -> String {
        match self {
            EntityRecord::Task(t) => {
                let mark = if t.is_completed { "x" } else { " " };
                format!("[{}] {}", mark, t.title)
            }
            EntityRecord::Thought(t) => first_line(&t.content),
            EntityRecord::Journal(j) => first_line(&j.content),
            EntityRecord::Project(p) => format!("{} ({} columns)", p.title, p.columns.len()),
            EntityRecord::Habit(h) => format!("{} ({} check-ins)", h.title, h.completed_dates.len()),
            EntityRecord::ChatSession(c) => format!("{} ({} messages)", c.title, c.messages.len()),
            EntityRecord::Memory(m) => first_line(&m.content),
        }
    }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_record_id() {
        assert_eq!(record_id(&obj(json!({"id": "t1"}))), Some("t1"));
        assert_eq!(record_id(&obj(json!({"id": 7}))), None);
        assert_eq!(record_id(&obj(json!({"title": "x"}))), None);
    }

    #[test]
    fn test_decode_picks_variant_by_store() {
        let record = obj(json!({"id": "t1", "title": "Buy milk", "isCompleted": true}));
        let decoded = EntityRecord::decode(StoreName::Tasks, record).unwrap();

        assert_eq!(decoded.store(), StoreName::Tasks);
        assert_eq!(decoded.id(), "t1");
        assert_eq!(decoded.summary(), "[x] Buy milk");
    }

    #[test]
    fn test_decode_rejects_missing_id() {
        let record = obj(json!({"content": "no id here"}));
        assert!(EntityRecord::decode(StoreName::Memories, record).is_err());
    }

    #[test]
    fn test_to_record_keeps_unknown_keys() {
        let record = obj(json!({"id": "m1", "content": "likes tea", "pinned": true}));
        let memory = Memory::from_record(record).unwrap();
        let back = memory.to_record().unwrap();

        assert_eq!(back.get("pinned"), Some(&json!(true)));
        assert_eq!(back.get("content"), Some(&json!("likes tea")));
    }
}
