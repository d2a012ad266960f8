//! Провайдер соединений
//!
//! Одноразовая инициализация клиентских библиотек плюс выдача
//! соединений. Хранилища разделяются по строке подключения: два
//! провайдера с одной строкой видят одни и те же данные, что
//! воспроизводит разделяемую базу за пулом соединений.

use crate::common::{DbConfig, EngineConfig, Error, Result};
use crate::store::connection::Connection;
use crate::store::engine::MemoryStore;
use dashmap::DashMap;
use lazy_static::lazy_static;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

lazy_static! {
    /// Хранилища по строке подключения
    static ref STORE_REGISTRY: DashMap<String, Arc<MemoryStore>> = DashMap::new();
}

/// Флаг одноразовой инициализации клиента
static CLIENT_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Инициализирует клиентские библиотеки. Идемпотентна: повторные
/// вызовы — no-op. Ошибка конфигурации фатальна — без успешной
/// инициализации провайдер не выдает соединений.
pub fn init_client(config: &DbConfig) -> Result<()> {
    config.validate()?;
    if CLIENT_INITIALIZED.swap(true, Ordering::SeqCst) {
        log::debug!("Клиентские библиотеки уже инициализированы");
        return Ok(());
    }
    if let Some(dir) = &config.client_lib_dir {
        log::info!("Клиентские библиотеки: {}", dir.display());
    }
    log::info!("Клиент инициализирован для {}", config.connect_string);
    Ok(())
}

/// Проверяет, инициализированы ли клиентские библиотеки
pub fn client_initialized() -> bool {
    CLIENT_INITIALIZED.load(Ordering::SeqCst)
}

/// Провайдер соединений со встроенным хранилищем
pub struct ConnectionProvider {
    config: DbConfig,
    store: Arc<MemoryStore>,
}

impl ConnectionProvider {
    /// Создает провайдер с движком по умолчанию
    pub fn new(config: DbConfig) -> Result<Self> {
        Self::with_engine_config(config, EngineConfig::default())
    }

    /// Создает провайдер с заданной конфигурацией движка.
    ///
    /// Конфигурация движка применяется только при первом создании
    /// хранилища для данной строки подключения; существующее хранилище
    /// переиспользуется как есть.
    pub fn with_engine_config(config: DbConfig, engine: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store = STORE_REGISTRY
            .entry(config.connect_string.clone())
            .or_insert_with(|| Arc::new(MemoryStore::new(engine)))
            .clone();
        Ok(Self { config, store })
    }

    /// Выдает новое соединение.
    ///
    /// Требует предварительного `init_client`; без него любая попытка
    /// завершается ошибкой соединения.
    pub async fn acquire(&self) -> Result<Connection> {
        if !client_initialized() {
            return Err(Error::connection(
                "client libraries are not initialized, call init_client first",
            ));
        }
        if self.config.user.is_empty() || self.config.password.is_empty() {
            return Err(Error::connection("invalid username or password"));
        }
        log::debug!(
            "Выдача соединения для {}@{}",
            self.config.user,
            self.config.connect_string
        );
        Ok(Connection::new(Arc::clone(&self.store)))
    }

    /// Разделяемое хранилище провайдера (для регистрации схем)
    pub fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }

    /// Конфигурация подключения
    pub fn config(&self) -> &DbConfig {
        &self.config
    }
}
