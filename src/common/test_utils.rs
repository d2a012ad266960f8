//! Общие утилиты для тестирования
//!
//! Тестовая схема повторяет предметную область планировщика кампуса:
//! студенты, группы с лидером и счетчиком участников, членство, дружба
//! и таблица счетчиков идентификаторов.

use crate::common::{DbConfig, EngineConfig, Error, Result};
use crate::store::provider::{init_client, ConnectionProvider};
use crate::store::schema::{ColumnType, TableSchema};

/// Конфигурация подключения с уникальной строкой подключения.
///
/// Хранилища разделяются по строке подключения, поэтому каждый тест
/// использует собственный тег и получает чистое хранилище.
pub fn test_config(tag: &str) -> DbConfig {
    DbConfig::new("corn", "corn", format!("localhost:1521/{}", tag))
}

/// Схема тестовой предметной области
pub fn campus_schema() -> Vec<TableSchema> {
    vec![
        TableSchema::new("student")
            .column("student_id", ColumnType::Integer)
            .not_null_column("name", ColumnType::Text)
            .column("email", ColumnType::Text)
            .primary_key(&["student_id"])
            .unique("student_email_uq", &["email"]),
        TableSchema::new("student_group")
            .column("group_id", ColumnType::Integer)
            .column("g_name", ColumnType::Text)
            .column("leader", ColumnType::Integer)
            .not_null_column("member_count", ColumnType::Integer)
            .primary_key(&["group_id"])
            .foreign_key("group_leader_fk", &["leader"], "student", &["student_id"]),
        TableSchema::new("member")
            .column("group_id", ColumnType::Integer)
            .column("student_id", ColumnType::Integer)
            .primary_key(&["group_id", "student_id"])
            .foreign_key("member_group_fk", &["group_id"], "student_group", &["group_id"])
            .foreign_key("member_student_fk", &["student_id"], "student", &["student_id"]),
        TableSchema::new("friend")
            .column("student_id", ColumnType::Integer)
            .column("friend_id", ColumnType::Integer)
            .primary_key(&["student_id", "friend_id"])
            .foreign_key("friend_student_fk", &["student_id"], "student", &["student_id"])
            .foreign_key("friend_friend_fk", &["friend_id"], "student", &["student_id"]),
        TableSchema::new("id_counter")
            .column("name", ColumnType::Text)
            .not_null_column("id_value", ColumnType::Integer)
            .primary_key(&["name"]),
    ]
}

/// Провайдер с зарегистрированной тестовой схемой
pub fn campus_provider(tag: &str) -> Result<ConnectionProvider> {
    campus_provider_with_engine(tag, EngineConfig::default())
}

/// Провайдер с тестовой схемой и заданной конфигурацией движка
pub fn campus_provider_with_engine(
    tag: &str,
    engine: EngineConfig,
) -> Result<ConnectionProvider> {
    let config = test_config(tag);
    init_client(&config)?;
    let provider = ConnectionProvider::with_engine_config(config, engine)?;
    let store = provider.store();
    for schema in campus_schema() {
        match store.create_table(schema) {
            Ok(()) => {}
            // второй провайдер с тем же тегом видит уже созданные таблицы
            Err(Error::Validation { .. }) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(provider)
}
