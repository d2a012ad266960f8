//! Блокировки строк встроенного движка
//!
//! Исключительные блокировки на уровне строки: владелец держит их до
//! конца своей транзакции, снятие — только при commit или rollback.
//! Ожидание асинхронное (tokio Notify), с обнаружением дедлоков по
//! графу ожидания и ограничением времени ожидания.

use crate::common::error::codes;
use crate::common::DbError;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Идентификатор транзакции
pub type TransactionId = u64;

/// Ключ заблокированной строки: (таблица, id строки)
pub type RowKey = (String, u64);

/// Граф ожидания для обнаружения дедлоков.
///
/// Транзакция ждет не больше одной строки за раз, поэтому у каждого
/// ожидающего ровно одно исходящее ребро, а цикл ищется проходом по
/// цепочке владельцев от запросившего.
#[derive(Debug, Default)]
pub struct WaitForGraph {
    /// Кто кого ждет: ожидающий -> владелец строки
    waiting_for: HashMap<TransactionId, TransactionId>,
}

impl WaitForGraph {
    /// Отмечает, что transaction ждет owner; прежнее ожидание заменяется
    pub fn wait_on(&mut self, transaction: TransactionId, owner: TransactionId) {
        self.waiting_for.insert(transaction, owner);
    }

    /// Убирает транзакцию из графа: она больше не ждет, и ребра,
    /// указывающие на нее, устарели
    pub fn remove_transaction(&mut self, transaction: TransactionId) {
        self.waiting_for.remove(&transaction);
        self.waiting_for.retain(|_, owner| *owner != transaction);
    }

    /// Ищет цикл, начинающийся в transaction.
    ///
    /// Цепочка «кто кого ждет» либо обрывается, либо возвращается к
    /// запросившему (дедлок). Цикл без запросившего не его забота:
    /// его обнаружит и разорвет собственный участник.
    pub fn cycle_from(&self, transaction: TransactionId) -> Option<Vec<TransactionId>> {
        let mut path = vec![transaction];
        let mut seen = HashSet::from([transaction]);
        let mut current = transaction;
        while let Some(&owner) = self.waiting_for.get(&current) {
            if owner == transaction {
                return Some(path);
            }
            if !seen.insert(owner) {
                return None;
            }
            path.push(owner);
            current = owner;
        }
        None
    }
}

/// Статистика менеджера блокировок строк
#[derive(Debug, Clone, Default)]
pub struct RowLockStats {
    /// Количество полученных блокировок
    pub locks_acquired: u64,
    /// Количество ожиданий (запрос не удовлетворен немедленно)
    pub lock_waits: u64,
    /// Количество обнаруженных дедлоков
    pub deadlocks_detected: u64,
    /// Количество таймаутов ожидания
    pub lock_timeouts: u64,
}

/// Внутреннее состояние под мьютексом
#[derive(Debug, Default)]
struct LockState {
    /// Владельцы: строка -> транзакция
    owners: HashMap<RowKey, TransactionId>,
    /// Граф ожидания
    graph: WaitForGraph,
    /// Статистика
    stats: RowLockStats,
}

/// Менеджер блокировок строк
pub struct RowLockManager {
    state: Mutex<LockState>,
    /// Оповещение о любом снятии блокировок
    released: Arc<Notify>,
    /// Максимальное время ожидания одной блокировки
    wait_timeout: Duration,
}

impl RowLockManager {
    /// Создает менеджер с заданным таймаутом ожидания
    pub fn new(wait_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            released: Arc::new(Notify::new()),
            wait_timeout,
        }
    }

    /// Получает исключительную блокировку строки для транзакции.
    ///
    /// Повторный запрос владельцем — no-op. При обнаружении цикла в графе
    /// ожидания запросивший получает код 60, при истечении таймаута — 30006.
    pub async fn acquire(&self, transaction: TransactionId, key: RowKey) -> Result<(), DbError> {
        let deadline = tokio::time::Instant::now() + self.wait_timeout;
        let mut waited = false;

        loop {
            // Будущее оповещение создаем до проверки состояния,
            // иначе снятие блокировки между проверкой и ожиданием теряется
            let released = self.released.notified();

            {
                let mut state = self.state.lock();
                match state.owners.get(&key).copied() {
                    None => {
                        state.owners.insert(key, transaction);
                        state.graph.remove_transaction(transaction);
                        state.stats.locks_acquired += 1;
                        return Ok(());
                    }
                    Some(owner) if owner == transaction => {
                        return Ok(());
                    }
                    Some(owner) => {
                        if !waited {
                            waited = true;
                            state.stats.lock_waits += 1;
                        }
                        state.graph.wait_on(transaction, owner);
                        if state.graph.cycle_from(transaction).is_some() {
                            state.graph.remove_transaction(transaction);
                            state.stats.deadlocks_detected += 1;
                            return Err(DbError::new(
                                codes::DEADLOCK_DETECTED,
                                format!(
                                    "deadlock detected while waiting for row {}:{}",
                                    key.0, key.1
                                ),
                            ));
                        }
                    }
                }
            }

            if tokio::time::timeout_at(deadline, released).await.is_err() {
                let mut state = self.state.lock();
                state.graph.remove_transaction(transaction);
                state.stats.lock_timeouts += 1;
                return Err(DbError::new(
                    codes::LOCK_WAIT_TIMEOUT,
                    format!(
                        "timed out waiting for row lock {}:{} after {} ms",
                        key.0,
                        key.1,
                        self.wait_timeout.as_millis()
                    ),
                ));
            }
        }
    }

    /// Снимает все блокировки транзакции и будит ожидающих.
    ///
    /// Вызывается только при завершении транзакции — блокировки никогда
    /// не снимаются по отдельности.
    pub fn release_all(&self, transaction: TransactionId) {
        let mut state = self.state.lock();
        state.owners.retain(|_, owner| *owner != transaction);
        state.graph.remove_transaction(transaction);
        drop(state);
        self.released.notify_waiters();
    }

    /// Проверяет, владеет ли транзакция блокировкой строки
    pub fn holds(&self, transaction: TransactionId, key: &RowKey) -> bool {
        self.state.lock().owners.get(key) == Some(&transaction)
    }

    /// Количество активных блокировок
    pub fn active_locks(&self) -> usize {
        self.state.lock().owners.len()
    }

    /// Получает статистику менеджера блокировок
    pub fn statistics(&self) -> RowLockStats {
        self.state.lock().stats.clone()
    }
}
