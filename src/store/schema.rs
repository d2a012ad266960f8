//! Схемы таблиц встроенного движка
//!
//! Таблицы объявляются программно: текстовый DDL вне рамок слоя.
//! Схема несет именованные ограничения — их имена попадают в сообщения
//! об ошибках backing-store.

use crate::common::{Error, Result};
use crate::store::value::Value;
use serde::{Deserialize, Serialize};

/// Тип колонки
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    /// Целое число
    Integer,
    /// Число с плавающей точкой
    Real,
    /// Текст
    Text,
}

/// Определение колонки
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Имя колонки
    pub name: String,
    /// Тип данных
    pub column_type: ColumnType,
    /// Запрет NULL значений
    pub not_null: bool,
}

impl ColumnDef {
    /// Проверяет, допустимо ли значение для колонки (без учета not_null)
    pub fn accepts(&self, value: &Value) -> bool {
        match (self.column_type, value) {
            (_, Value::Null) => true,
            (ColumnType::Integer, Value::Integer(_)) => true,
            (ColumnType::Real, Value::Integer(_) | Value::Real(_)) => true,
            (ColumnType::Text, Value::Text(_)) => true,
            _ => false,
        }
    }
}

/// Именованное уникальное ограничение
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueConstraint {
    /// Имя ограничения
    pub name: String,
    /// Колонки, образующие ключ
    pub columns: Vec<String>,
}

/// Именованный внешний ключ
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Имя ограничения
    pub name: String,
    /// Колонки дочерней таблицы
    pub columns: Vec<String>,
    /// Родительская таблица
    pub parent_table: String,
    /// Колонки родительской таблицы
    pub parent_columns: Vec<String>,
}

/// Схема таблицы
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    /// Имя таблицы
    pub name: String,
    /// Колонки
    pub columns: Vec<ColumnDef>,
    /// Первичный ключ (имена колонок)
    pub primary_key: Vec<String>,
    /// Уникальные ограничения
    pub uniques: Vec<UniqueConstraint>,
    /// Внешние ключи
    pub foreign_keys: Vec<ForeignKey>,
}

/// Проверяет, что имя таблицы или колонки валидно
fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 128 {
        return false;
    }
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl TableSchema {
    /// Создает схему таблицы без колонок
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            uniques: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Добавляет колонку
    pub fn column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            column_type,
            not_null: false,
        });
        self
    }

    /// Добавляет NOT NULL колонку
    pub fn not_null_column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDef {
            name: name.into(),
            column_type,
            not_null: true,
        });
        self
    }

    /// Задает первичный ключ. Колонки ключа становятся NOT NULL,
    /// сам ключ — уникальным ограничением `<table>_pk`.
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Добавляет уникальное ограничение
    pub fn unique(mut self, name: impl Into<String>, columns: &[&str]) -> Self {
        self.uniques.push(UniqueConstraint {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Добавляет внешний ключ
    pub fn foreign_key(
        mut self,
        name: impl Into<String>,
        columns: &[&str],
        parent_table: impl Into<String>,
        parent_columns: &[&str],
    ) -> Self {
        self.foreign_keys.push(ForeignKey {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            parent_table: parent_table.into(),
            parent_columns: parent_columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Возвращает индекс колонки по имени
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Возвращает имена всех колонок
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Валидирует схему перед регистрацией в движке
    pub fn validate(&self) -> Result<()> {
        if !is_valid_name(&self.name) {
            return Err(Error::validation(format!(
                "Invalid table name: {}",
                self.name
            )));
        }
        if self.columns.is_empty() {
            return Err(Error::validation(format!(
                "Table {} must have at least one column",
                self.name
            )));
        }
        for column in &self.columns {
            if !is_valid_name(&column.name) {
                return Err(Error::validation(format!(
                    "Invalid column name: {}",
                    column.name
                )));
            }
        }
        for key_column in self
            .primary_key
            .iter()
            .chain(self.uniques.iter().flat_map(|u| u.columns.iter()))
            .chain(self.foreign_keys.iter().flat_map(|f| f.columns.iter()))
        {
            if self.column_index(key_column).is_none() {
                return Err(Error::validation(format!(
                    "Unknown constraint column {} in table {}",
                    key_column, self.name
                )));
            }
        }
        Ok(())
    }

    /// Эффективные уникальные ограничения: первичный ключ плюс явные
    pub(crate) fn effective_uniques(&self) -> Vec<UniqueConstraint> {
        let mut uniques = Vec::new();
        if !self.primary_key.is_empty() {
            uniques.push(UniqueConstraint {
                name: format!("{}_pk", self.name),
                columns: self.primary_key.clone(),
            });
        }
        uniques.extend(self.uniques.iter().cloned());
        uniques
    }

    /// Является ли колонка обязательной (NOT NULL или часть первичного ключа)
    pub(crate) fn is_required(&self, index: usize) -> bool {
        let column = &self.columns[index];
        column.not_null
            || self
                .primary_key
                .iter()
                .any(|pk| pk.eq_ignore_ascii_case(&column.name))
    }
}
