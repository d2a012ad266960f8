//! campusdb - Транзакционный слой доступа к данным планировщика кампуса
//!
//! Этот модуль предоставляет основную функциональность слоя доступа:
//! провайдер соединений, исполнитель одиночных запросов, блокирующее
//! чтение строк и координатор повторяемых сериализуемых транзакций
//! поверх встроенного реляционного движка.

pub mod common;
pub mod executor;
pub mod store;
pub mod tx;

pub use common::error::{DbError, Error, Result};
pub use common::{DbConfig, EngineConfig};
pub use executor::{ExecuteOptions, QueryExecutor, ResultSet, ResultShape, Rows};
pub use store::{init_client, Connection, ConnectionProvider, RowSet, Value};
pub use tx::{classify, select_for_update, ConflictKind, TransactionCoordinator};

/// Версия библиотеки
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
