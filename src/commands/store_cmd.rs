//! Record-level commands over the persistence facade.

use clap::Args;
use serde_json::Value;
use uuid::Uuid;

use brainsync::models::{record_id, EntityRecord, Record, StoreName};
use brainsync::Persistence;

/// List every record held locally for a store
#[derive(Args)]
pub struct ListCommand {
    /// Store name (tasks, thoughts, journal, projects, habits, chat_sessions, memories)
    pub store: StoreName,

    /// Print raw records as JSON
    #[arg(long)]
    pub json: bool,
}

impl ListCommand {
    pub async fn run(&self, persistence: &Persistence) -> Result<(), Box<dyn std::error::Error>> {
        let mut records = persistence.get_records(self.store).await?;
        records.sort_by(|a, b| record_id(a).cmp(&record_id(b)));

        if self.json {
            println!("{}", serde_json::to_string_pretty(&records)?);
            return Ok(());
        }

        if records.is_empty() {
            println!("No records in {}.", self.store);
            return Ok(());
        }

        for record in records {
            let id = record_id(&record).unwrap_or_default().to_string();
            match EntityRecord::decode(self.store, record) {
                Ok(entity) => println!("{}  {}", id, entity.summary()),
                Err(e) => println!("{}  (unreadable: {})", id, e),
            }
        }
        Ok(())
    }
}

/// Create or replace a record
#[derive(Args)]
pub struct SaveCommand {
    /// Store name
    pub store: StoreName,

    /// Record as a JSON object; an id is generated when absent
    pub json: String,
}

impl SaveCommand {
    pub async fn run(&self, persistence: &Persistence) -> Result<(), Box<dyn std::error::Error>> {
        let record = parse_record(self.store, &self.json)?;
        let id = record_id(&record).unwrap_or_default().to_string();

        persistence.save_record(self.store, record).await?;
        println!("Saved {} {}", self.store, id);
        Ok(())
    }
}

/// Parses `json` into a record that decodes as the store's entity type.
fn parse_record(store: StoreName, json: &str) -> Result<Record, Box<dyn std::error::Error>> {
    let mut record = match serde_json::from_str::<Value>(json)? {
        Value::Object(record) => record,
        _ => return Err("record must be a JSON object".into()),
    };
    if record_id(&record).is_none() {
        record.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
    }

    EntityRecord::decode(store, record.clone())
        .map_err(|e| format!("not a valid {} record: {}", store, e))?;
    Ok(record)
}

/// Delete a record by id
#[derive(Args)]
pub struct DeleteCommand {
    /// Store name
    pub store: StoreName,

    /// Record id
    pub id: String,
}

impl DeleteCommand {
    pub async fn run(&self, persistence: &Persistence) -> Result<(), Box<dyn std::error::Error>> {
        persistence.delete_item(self.store, &self.id).await?;
        println!("Deleted {} {}", self.store, self.id);
        Ok(())
    }
}
