use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifies one entity-type partition, both locally and remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreName {
    Tasks,
    Thoughts,
    Journal,
    Projects,
    Habits,
    ChatSessions,
    Memories,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown store '{0}'. Valid stores: tasks, thoughts, journal, projects, habits, chat_sessions, memories")]
pub struct StoreNameError(pub String);

impl StoreName {
    pub const ALL: [StoreName; 7] = [
        StoreName::Tasks,
        StoreName::Thoughts,
        StoreName::Journal,
        StoreName::Projects,
        StoreName::Habits,
        StoreName::ChatSessions,
        StoreName::Memories,
    ];

    /// Table name used by both the local and the remote store.
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreName::Tasks => "tasks",
            StoreName::Thoughts => "thoughts",
            StoreName::Journal => "journal",
            StoreName::Projects => "projects",
            StoreName::Habits => "habits",
            StoreName::ChatSessions => "chat_sessions",
            StoreName::Memories => "memories",
        }
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreName {
    type Err = StoreNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StoreName::ALL
            .into_iter()
            .find(|store| store.as_str() == s.to_lowercase())
            .ok_or_else(|| StoreNameError(s.to_string()))
    }
}
