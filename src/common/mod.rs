//! Общие типы и утилиты для campusdb

pub mod config;
pub mod error;

#[cfg(test)]
pub mod test_utils;

pub use config::{DbConfig, EngineConfig};
pub use error::{codes, DbError, Error, Result};
