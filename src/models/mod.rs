mod chat_session;
mod entity;
mod habit;
mod journal;
mod memory;
mod project;
mod store_name;
mod task;
mod thought;

pub use chat_session::ChatSession;
pub use entity::{record_id, Entity, EntityRecord, Record};
pub use habit::Habit;
pub use journal::JournalEntry;
pub use memory::Memory;
pub use project::Project;
pub use store_name::{StoreName, StoreNameError};
pub use task::Task;
pub use thought::Thought;
