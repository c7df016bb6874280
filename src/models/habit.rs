use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Record;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Habit {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub completed_dates: Vec<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Record,
}

impl Habit {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            completed_dates: Vec::new(),
            created_at: Some(Utc::now()),
            extra: Record::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_completed_dates_serialize_as_strings() {
        let mut habit = Habit::new("Walk");
        habit.completed_dates.push(day(7));
        let value = serde_json::to_value(&habit).unwrap();
        assert_eq!(value["completedDates"][0], "2025-03-07");
    }
}
