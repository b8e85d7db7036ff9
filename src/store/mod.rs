//! Storage seam. The engine hands structured statements to a `Store`; writes run inside a
//! `StoreTransaction` that is committed or rolled back as a unit.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::StoreError;
use crate::sql::Statement;
use async_trait::async_trait;

/// One result row keyed by column name.
pub type Row = serde_json::Map<String, serde_json::Value>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>, StoreError>;

    async fn fetch_count(&self, statement: &Statement) -> Result<u64, StoreError>;

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Readiness probe.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Run a write; returns the `returning` columns of every affected row.
    async fn execute(&mut self, statement: &Statement) -> Result<Vec<Row>, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
