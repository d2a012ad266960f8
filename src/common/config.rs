//! Конфигурация для campusdb
//!
//! Параметры подключения читаются один раз при старте процесса;
//! отсутствие или некорректность учетных данных — фатальная ошибка запуска.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Конфигурация подключения к backing-store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Имя пользователя
    pub user: String,
    /// Пароль
    pub password: String,
    /// Строка подключения (цель)
    pub connect_string: String,
    /// Необязательный путь к клиентской библиотеке
    pub client_lib_dir: Option<PathBuf>,
}

impl DbConfig {
    /// Создает конфигурацию с заданными учетными данными
    pub fn new(
        user: impl Into<String>,
        password: impl Into<String>,
        connect_string: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
            connect_string: connect_string.into(),
            client_lib_dir: None,
        }
    }

    /// Загружает конфигурацию из переменных окружения.
    ///
    /// Отсутствие обязательной переменной — ошибка конфигурации.
    pub fn from_env() -> Result<Self> {
        let user = std::env::var("CAMPUSDB_USER")
            .map_err(|_| Error::configuration("CAMPUSDB_USER is not set"))?;
        let password = std::env::var("CAMPUSDB_PASSWORD")
            .map_err(|_| Error::configuration("CAMPUSDB_PASSWORD is not set"))?;
        let connect_string = std::env::var("CAMPUSDB_CONNECT_STRING")
            .map_err(|_| Error::configuration("CAMPUSDB_CONNECT_STRING is not set"))?;

        let mut config = Self::new(user, password, connect_string);
        if let Ok(dir) = std::env::var("CAMPUSDB_CLIENT_LIB_DIR") {
            config.client_lib_dir = Some(PathBuf::from(dir));
        }

        config.validate()?;
        Ok(config)
    }

    /// Загружает конфигурацию из TOML файла
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;
        let config: DbConfig = toml::from_str(&content)
            .map_err(|e| Error::configuration(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Валидирует конфигурацию
    pub fn validate(&self) -> Result<()> {
        if self.user.is_empty() {
            return Err(Error::configuration("User cannot be empty"));
        }
        if self.password.is_empty() {
            return Err(Error::configuration("Password cannot be empty"));
        }
        if self.connect_string.is_empty() {
            return Err(Error::configuration("Connect string cannot be empty"));
        }
        if let Some(dir) = &self.client_lib_dir {
            if dir.as_os_str().is_empty() {
                return Err(Error::configuration("Client library path cannot be empty"));
            }
        }
        Ok(())
    }
}

/// Конфигурация встроенного движка
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Принимает ли движок запрос уровня изоляции SERIALIZABLE.
    /// При `false` оператор `SET TRANSACTION` отклоняется — координатор
    /// обязан пережить это без отмены транзакции.
    pub supports_serializable: bool,
    /// Максимальное время ожидания блокировки строки (в миллисекундах)
    pub lock_wait_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            supports_serializable: true,
            lock_wait_timeout_ms: 5000, // 5 секунд
        }
    }
}

impl EngineConfig {
    /// Возвращает таймаут ожидания блокировки как Duration
    pub fn lock_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_wait_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let config = DbConfig::new("corn", "corn", "localhost:1521/xe");
        assert!(config.validate().is_ok());

        let config = DbConfig::new("", "corn", "localhost:1521/xe");
        assert!(config.validate().is_err());

        let config = DbConfig::new("corn", "corn", "");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert!(config.supports_serializable);
        assert_eq!(config.lock_wait_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_config_from_toml() {
        let content = r#"
            user = "corn"
            password = "corn"
            connect_string = "localhost:1521/xe"
        "#;
        let config: DbConfig = toml::from_str(content).unwrap();
        assert_eq!(config.user, "corn");
        assert_eq!(config.connect_string, "localhost:1521/xe");
        assert!(config.client_lib_dir.is_none());
    }
}
