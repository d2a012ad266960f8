//! Обработка ошибок для campusdb

use thiserror::Error;

/// Нативные коды ошибок backing-store.
///
/// Схема кодов повторяет оракловскую нумерацию, на которую опирался
/// исходный бэкенд планировщика: обработчики ветвились по `errorNum`
/// (1, 2291 и т.д.).
pub mod codes {
    /// Нарушение уникального ограничения
    pub const UNIQUE_VIOLATION: u32 = 1;
    /// Обнаружен дедлок при ожидании ресурса
    pub const DEADLOCK_DETECTED: u32 = 60;
    /// Внутренняя ошибка движка
    pub const INTERNAL: u32 = 600;
    /// Недопустимый идентификатор (неизвестная колонка)
    pub const INVALID_IDENTIFIER: u32 = 904;
    /// Отсутствует или недопустима опция оператора
    pub const INVALID_OPTION: u32 = 922;
    /// Несовместимые типы данных
    pub const INCONSISTENT_DATATYPES: u32 = 932;
    /// Таблица не существует
    pub const TABLE_NOT_FOUND: u32 = 942;
    /// Не все позиционные параметры связаны
    pub const NOT_ALL_VARIABLES_BOUND: u32 = 1008;
    /// Попытка вставить NULL в NOT NULL колонку
    pub const NULL_VIOLATION: u32 = 1400;
    /// Переполнение при целочисленной арифметике
    pub const NUMERIC_OVERFLOW: u32 = 1426;
    /// SET TRANSACTION должен быть первым оператором транзакции
    pub const SET_TRANSACTION_NOT_FIRST: u32 = 1453;
    /// Родительский ключ не найден (нарушение внешнего ключа)
    pub const PARENT_KEY_NOT_FOUND: u32 = 2291;
    /// Найдена дочерняя запись (удаление родителя запрещено)
    pub const CHILD_RECORD_FOUND: u32 = 2292;
    /// Невозможно сериализовать доступ для транзакции
    pub const SERIALIZATION_FAILURE: u32 = 8177;
    /// Истек таймаут ожидания блокировки строки
    pub const LOCK_WAIT_TIMEOUT: u32 = 30006;
}

/// Ошибка backing-store с нативным кодом
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbError {
    /// Нативный код ошибки
    pub code: u32,
    /// Сообщение backing-store
    pub message: String,
}

impl DbError {
    /// Создает ошибку backing-store
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DB-{:05}: {}", self.code, self.message)
    }
}

/// Основной тип ошибки для campusdb
#[derive(Error, Debug)]
pub enum Error {
    /// Невозможно получить рабочее соединение
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Ошибка backing-store (несет нативный код)
    #[error("Database error: {0}")]
    Db(DbError),

    /// Ошибка разбора SQL
    #[error("SQL parsing error: {message}")]
    SqlParsing { message: String },

    /// Ошибка конфигурации
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Ошибка валидации
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Повторы транзакции исчерпаны: каждая попытка завершилась
    /// write-conflict'ом
    #[error("Transaction exhausted after {attempts} attempts: {source}")]
    TransactionExhausted {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    /// Внутренняя ошибка
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Тип результата для campusdb
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Создает ошибку соединения
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Создает ошибку backing-store
    pub fn db(code: u32, message: impl Into<String>) -> Self {
        Self::Db(DbError::new(code, message))
    }

    /// Создает ошибку разбора SQL
    pub fn sql_parsing(message: impl Into<String>) -> Self {
        Self::SqlParsing {
            message: message.into(),
        }
    }

    /// Создает ошибку конфигурации
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Создает ошибку валидации
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Создает внутреннюю ошибку
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Возвращает нативный код backing-store, если ошибка пришла оттуда.
    ///
    /// Для `TransactionExhausted` возвращает код исходного конфликта.
    pub fn db_code(&self) -> Option<u32> {
        match self {
            Error::Db(db) => Some(db.code),
            Error::TransactionExhausted { source, .. } => source.db_code(),
            _ => None,
        }
    }
}

impl From<DbError> for Error {
    fn from(err: DbError) -> Self {
        Error::Db(err)
    }
}
