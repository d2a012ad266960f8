//! Координатор повторяемых транзакций
//!
//! Выполняет единицу работы в сериализуемой транзакции и прозрачно
//! повторяет ее при конфликтах записи. Каждая попытка идет на свежем
//! соединении; между попытками — экспоненциальная пауза с потолком.
//! Доменные ошибки и нарушения ограничений не повторяются никогда.

use crate::common::{Error, Result};
use crate::store::connection::Connection;
use crate::store::provider::ConnectionProvider;
use crate::tx::classify::classify;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Будущее значение единицы работы, привязанное к соединению попытки
pub type UnitFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Количество попыток по умолчанию
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// База экспоненциальной паузы, мс
const BACKOFF_BASE_MS: u64 = 100;

/// Потолок паузы между попытками, мс
const BACKOFF_CAP_MS: u64 = 1000;

/// Пауза перед попыткой с данным номером: min(100 * 2^attempt, 1000) мс
fn backoff_delay(attempt: u32) -> Duration {
    let millis = BACKOFF_BASE_MS.saturating_mul(1u64 << attempt.min(10));
    Duration::from_millis(millis.min(BACKOFF_CAP_MS))
}

/// Координатор повторяемых транзакций
pub struct TransactionCoordinator {
    provider: ConnectionProvider,
}

impl TransactionCoordinator {
    /// Создает координатор поверх провайдера соединений
    pub fn new(provider: ConnectionProvider) -> Self {
        Self { provider }
    }

    /// Выполняет единицу работы с количеством попыток по умолчанию
    pub async fn run_in_transaction<T, F>(&self, unit_of_work: F) -> Result<T>
    where
        F: for<'c> FnMut(&'c mut Connection) -> UnitFuture<'c, T>,
    {
        self.run_with_attempts(unit_of_work, DEFAULT_MAX_ATTEMPTS)
            .await
    }

    /// Выполняет единицу работы, повторяя ее при конфликтах записи.
    ///
    /// Каждая попытка: свежее соединение, транзакция с запросом
    /// SERIALIZABLE, вызов единицы работы, фиксация. При любой ошибке
    /// транзакция откатывается и соединение возвращается до решения о
    /// повторе. Повторяются только конфликты записи; после исчерпания
    /// попыток возвращается [`Error::TransactionExhausted`] с последним
    /// конфликтом внутри.
    pub async fn run_with_attempts<T, F>(&self, mut unit_of_work: F, max_attempts: u32) -> Result<T>
    where
        F: for<'c> FnMut(&'c mut Connection) -> UnitFuture<'c, T>,
    {
        if max_attempts == 0 {
            return Err(Error::validation("max_attempts must be at least 1"));
        }

        let mut attempt: u32 = 0;
        loop {
            let mut connection = self.provider.acquire().await?;
            let outcome = Self::attempt(&mut connection, &mut unit_of_work).await;

            match outcome {
                Ok(value) => {
                    Self::release(&mut connection);
                    return Ok(value);
                }
                Err(err) => {
                    if let Err(rollback_err) = connection.rollback() {
                        log::warn!("Откат попытки не удался: {}", rollback_err);
                    }
                    Self::release(&mut connection);

                    if !classify(&err).is_retryable() {
                        return Err(err);
                    }
                    attempt += 1;
                    if attempt >= max_attempts {
                        return Err(Error::TransactionExhausted {
                            attempts: max_attempts,
                            source: Box::new(err),
                        });
                    }
                    let delay = backoff_delay(attempt);
                    log::warn!(
                        "Конфликт записи на попытке {}, повтор через {} мс: {}",
                        attempt,
                        delay.as_millis(),
                        err
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Одна попытка: транзакция, единица работы, фиксация
    async fn attempt<T, F>(connection: &mut Connection, unit_of_work: &mut F) -> Result<T>
    where
        F: for<'c> FnMut(&'c mut Connection) -> UnitFuture<'c, T>,
    {
        connection.begin()?;
        // Уровень изоляции запрашивается на каждой попытке; если движок
        // его не поддерживает, транзакция идет на уровне по умолчанию
        if let Err(err) = connection
            .execute("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE", &[])
            .await
        {
            log::warn!(
                "SERIALIZABLE недоступен, транзакция идет на уровне по умолчанию: {}",
                err
            );
        }
        let value = unit_of_work(connection).await?;
        connection.commit()?;
        Ok(value)
    }

    /// Возвращает соединение; ошибка возврата логируется и не подменяет
    /// результат попытки
    fn release(connection: &mut Connection) {
        if let Err(err) = connection.close() {
            log::warn!("Не удалось закрыть соединение попытки: {}", err);
        }
    }

    /// Провайдер соединений координатора
    pub fn provider(&self) -> &ConnectionProvider {
        &self.provider
    }
}
