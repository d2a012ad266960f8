//! Классификация конфликтов backing-store
//!
//! Единственная точка, отделяющая повторяемые сбои от доменных ошибок.
//! Классификация идет строго по нативному коду: текст сообщения
//! нестабилен между версиями backing-store и в решениях не участвует.

use crate::common::error::codes;
use crate::common::Error;

/// Класс конфликта
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Нарушение уникального ограничения: состояние гонки закончилась,
    /// строка уже существует. Повтор даст тот же результат.
    UniqueViolation,
    /// Нарушение целостности (NOT NULL, внешний ключ): дефект данных
    /// или логики, повтор бессмыслен.
    IntegrityViolation,
    /// Конфликт записи (дедлок, сбой сериализации, таймаут блокировки):
    /// проигрыш гонки, повтор с новой попыткой оправдан.
    WriteConflict,
    /// Неопознанная ошибка: повтор запрещен, чтобы не продублировать
    /// частично примененный эффект.
    Unclassified,
}

impl ConflictKind {
    /// Оправдан ли автоматический повтор транзакции
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConflictKind::WriteConflict)
    }
}

/// Классифицирует ошибку по нативному коду backing-store.
///
/// Ошибки без нативного кода (соединение, разбор SQL, конфигурация)
/// всегда `Unclassified`. `TransactionExhausted` тоже: повторы уже
/// исчерпаны, вложенный координатор не должен запускать их заново,
/// хотя `db_code()` по-прежнему показывает код исходного конфликта.
pub fn classify(error: &Error) -> ConflictKind {
    if let Error::TransactionExhausted { .. } = error {
        return ConflictKind::Unclassified;
    }
    match error.db_code() {
        Some(codes::UNIQUE_VIOLATION) => ConflictKind::UniqueViolation,
        Some(codes::NULL_VIOLATION)
        | Some(codes::PARENT_KEY_NOT_FOUND)
        | Some(codes::CHILD_RECORD_FOUND) => ConflictKind::IntegrityViolation,
        Some(codes::DEADLOCK_DETECTED)
        | Some(codes::SERIALIZATION_FAILURE)
        | Some(codes::LOCK_WAIT_TIMEOUT) => ConflictKind::WriteConflict,
        _ => ConflictKind::Unclassified,
    }
}
