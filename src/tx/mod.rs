//! Транзакционный слой
//!
//! Координатор повторяемых транзакций, блокирующее чтение строк и
//! классификация конфликтов backing-store.

pub mod classify;
pub mod coordinator;
pub mod lock_accessor;

#[cfg(test)]
pub mod tests;

pub use classify::{classify, ConflictKind};
pub use coordinator::{TransactionCoordinator, UnitFuture, DEFAULT_MAX_ATTEMPTS};
pub use lock_accessor::{select_for_update, with_lock_clause};
