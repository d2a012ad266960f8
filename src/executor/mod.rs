//! Исполнитель одиночных запросов
//!
//! Жизненный цикл «получить соединение — выполнить — вернуть» для
//! операций, которым не нужна явная транзакция. Соединение возвращается
//! при любом исходе; ошибка возврата логируется и никогда не подменяет
//! результат самого запроса.

use crate::common::Result;
use crate::store::engine::RowSet;
use crate::store::provider::ConnectionProvider;
use crate::store::value::Value;
use indexmap::IndexMap;

#[cfg(test)]
pub mod tests;

/// Форма строк результата
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultShape {
    /// Строка как упорядоченная карта имя колонки -> значение
    #[default]
    Object,
    /// Строка как массив значений в порядке колонок
    Array,
}

/// Опции выполнения запроса
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Фиксировать ли изменения сразу после выполнения
    pub auto_commit: bool,
    /// Форма строк результата
    pub result_shape: ResultShape,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            auto_commit: true,
            result_shape: ResultShape::default(),
        }
    }
}

/// Строки результата в запрошенной форме
#[derive(Debug, Clone, PartialEq)]
pub enum Rows {
    /// Строки-объекты
    Objects(Vec<IndexMap<String, Value>>),
    /// Строки-массивы
    Arrays(Vec<Vec<Value>>),
}

impl Rows {
    /// Количество строк
    pub fn len(&self) -> usize {
        match self {
            Rows::Objects(rows) => rows.len(),
            Rows::Arrays(rows) => rows.len(),
        }
    }

    /// Пусты ли строки
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Результат выполнения запроса
#[derive(Debug, Clone)]
pub struct ResultSet {
    /// Имена колонок
    pub columns: Vec<String>,
    /// Строки в запрошенной форме
    pub rows: Rows,
    /// Количество строк: выбранных или затронутых
    pub row_count: usize,
    /// Сгенерированный ключ последней вставленной строки
    pub last_row_id: Option<u64>,
}

impl ResultSet {
    /// Строки результата как JSON, в той же форме, что и сам результат
    pub fn to_json(&self) -> serde_json::Value {
        match &self.rows {
            Rows::Objects(rows) => serde_json::Value::Array(
                rows.iter()
                    .map(|row| {
                        serde_json::Value::Object(
                            row.iter()
                                .map(|(name, value)| (name.clone(), serde_json::Value::from(value)))
                                .collect(),
                        )
                    })
                    .collect(),
            ),
            Rows::Arrays(rows) => serde_json::Value::Array(
                rows.iter()
                    .map(|row| {
                        serde_json::Value::Array(
                            row.iter().map(serde_json::Value::from).collect(),
                        )
                    })
                    .collect(),
            ),
        }
    }

    fn shape(row_set: RowSet, shape: ResultShape) -> Self {
        let rows = match shape {
            ResultShape::Array => Rows::Arrays(row_set.rows),
            ResultShape::Object => Rows::Objects(
                row_set
                    .rows
                    .into_iter()
                    .map(|row| {
                        row_set
                            .columns
                            .iter()
                            .cloned()
                            .zip(row)
                            .collect::<IndexMap<String, Value>>()
                    })
                    .collect(),
            ),
        };
        Self {
            columns: row_set.columns,
            rows,
            row_count: row_set.row_count,
            last_row_id: row_set.last_row_id,
        }
    }
}

/// Исполнитель одиночных запросов
pub struct QueryExecutor {
    provider: ConnectionProvider,
}

impl QueryExecutor {
    /// Создает исполнитель поверх провайдера соединений
    pub fn new(provider: ConnectionProvider) -> Self {
        Self { provider }
    }

    /// Выполняет запрос с опциями по умолчанию (автофиксация, объекты)
    pub async fn execute(&self, sql: &str, binds: &[Value]) -> Result<ResultSet> {
        self.execute_with_options(sql, binds, ExecuteOptions::default())
            .await
    }

    /// Выполняет запрос: получает соединение, выполняет оператор,
    /// фиксирует при auto_commit и возвращает соединение.
    pub async fn execute_with_options(
        &self,
        sql: &str,
        binds: &[Value],
        options: ExecuteOptions,
    ) -> Result<ResultSet> {
        let mut connection = self.provider.acquire().await?;

        let result = async {
            let row_set = connection.execute(sql, binds).await?;
            if options.auto_commit {
                connection.commit()?;
            }
            Ok(ResultSet::shape(row_set, options.result_shape))
        }
        .await;

        // Возврат соединения при любом исходе; без автофиксации
        // незафиксированные изменения откатываются при закрытии
        if let Err(err) = connection.close() {
            log::warn!("Не удалось закрыть соединение: {}", err);
        }

        result
    }

    /// Провайдер соединений исполнителя
    pub fn provider(&self) -> &ConnectionProvider {
        &self.provider
    }
}
