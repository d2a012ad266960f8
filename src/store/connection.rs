//! Соединение со встроенным хранилищем
//!
//! Соединение несет не более одной открытой транзакции. Первый DML
//! оператор неявно начинает транзакцию; COMMIT и ROLLBACK принимаются
//! и как SQL операторы, и как методы. Закрытие соединения с открытой
//! транзакцией откатывает ее.

use crate::common::{Error, Result};
use crate::store::engine::{MemoryStore, RowSet};
use crate::store::lock::TransactionId;
use crate::store::sql::{self, Statement};
use crate::store::value::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Соединение со встроенным хранилищем
pub struct Connection {
    id: Uuid,
    store: Arc<MemoryStore>,
    transaction: Option<TransactionId>,
    closed: bool,
}

impl Connection {
    pub(crate) fn new(store: Arc<MemoryStore>) -> Self {
        let id = Uuid::new_v4();
        log::debug!("Открыто соединение {}", id);
        Self {
            id,
            store,
            transaction: None,
            closed: false,
        }
    }

    /// Идентификатор соединения
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Есть ли открытая транзакция
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Закрыто ли соединение
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::connection("connection handle is closed"));
        }
        Ok(())
    }

    /// Выполняет SQL оператор в транзакции соединения.
    ///
    /// Если транзакция не открыта, первый оператор открывает ее.
    /// COMMIT и ROLLBACK завершают текущую транзакцию.
    pub async fn execute(&mut self, sql: &str, binds: &[Value]) -> Result<RowSet> {
        self.ensure_open()?;
        let statement = sql::parse(sql)?;
        match statement {
            Statement::Commit => {
                self.commit()?;
                Ok(RowSet::default())
            }
            Statement::Rollback => {
                self.rollback()?;
                Ok(RowSet::default())
            }
            statement => {
                let transaction = match self.transaction {
                    Some(transaction) => transaction,
                    None => {
                        let transaction = self.store.begin();
                        self.transaction = Some(transaction);
                        transaction
                    }
                };
                self.store
                    .execute(transaction, &statement, binds)
                    .await
                    .map_err(Error::from)
            }
        }
    }

    /// Явно начинает транзакцию
    pub fn begin(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.transaction.is_some() {
            return Err(Error::validation("transaction is already open"));
        }
        self.transaction = Some(self.store.begin());
        Ok(())
    }

    /// Фиксирует текущую транзакцию.
    ///
    /// При нарушении ограничения на фиксации движок уже откатил
    /// транзакцию — соединение остается пригодным для новой.
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        match self.transaction.take() {
            Some(transaction) => self.store.commit(transaction).map_err(Error::from),
            None => Ok(()),
        }
    }

    /// Откатывает текущую транзакцию; без открытой транзакции — no-op
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        if let Some(transaction) = self.transaction.take() {
            self.store.rollback(transaction);
        }
        Ok(())
    }

    /// Закрывает соединение. Открытая транзакция откатывается —
    /// незафиксированные изменения при возврате соединения теряются.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if let Some(transaction) = self.transaction.take() {
            log::debug!(
                "Соединение {} закрывается с открытой транзакцией, откат",
                self.id
            );
            self.store.rollback(transaction);
        }
        self.closed = true;
        log::debug!("Закрыто соединение {}", self.id);
        Ok(())
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if !self.closed {
            if let Some(transaction) = self.transaction.take() {
                log::warn!(
                    "Соединение {} уничтожено без close(), откат транзакции",
                    self.id
                );
                self.store.rollback(transaction);
            }
        }
    }
}
