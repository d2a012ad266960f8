//! Встроенный реляционный движок и доступ к нему
//!
//! Слой backing-store: значения и схемы, минимальный SQL диалект,
//! блокировки строк, транзакционный движок, соединения и их провайдер.

pub mod connection;
pub mod engine;
pub mod lock;
pub mod provider;
pub mod schema;
pub mod sql;
pub mod value;

#[cfg(test)]
pub mod tests;

pub use connection::Connection;
pub use engine::{MemoryStore, RowSet, StoreStats};
pub use lock::{RowKey, RowLockManager, RowLockStats, TransactionId, WaitForGraph};
pub use provider::{client_initialized, init_client, ConnectionProvider};
pub use schema::{ColumnDef, ColumnType, ForeignKey, TableSchema, UniqueConstraint};
pub use sql::{IsolationLevel, Statement};
pub use value::Value;
