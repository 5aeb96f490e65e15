//! Reference store implementation

pub mod in_memory;
pub mod record;
pub mod schema;
pub mod validators;

pub use in_memory::{InMemoryStore, MemoryQuery};
pub use record::Record;
pub use schema::{ColumnDef, Schema, TableSchema};
