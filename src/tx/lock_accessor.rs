//! Доступ к строкам с блокировкой
//!
//! SELECT ... FOR UPDATE внутри открытой транзакции: возвращенные
//! строки исключительно заблокированы до конца транзакции. Вне
//! транзакции блокирующее чтение бессмысленно и отклоняется.

use crate::common::{Error, Result};
use crate::store::connection::Connection;
use crate::store::engine::RowSet;
use crate::store::sql::{self, Statement};
use crate::store::value::Value;

/// Добавляет FOR UPDATE к SELECT запросу. Идемпотентна: запрос,
/// уже оканчивающийся FOR UPDATE, не меняется.
pub fn with_lock_clause(sql: &str) -> String {
    let trimmed = sql.trim_end().trim_end_matches(';').trim_end();
    if trimmed.to_ascii_uppercase().ends_with("FOR UPDATE") {
        return trimmed.to_string();
    }
    format!("{} FOR UPDATE", trimmed)
}

/// Выполняет блокирующее чтение в транзакции соединения.
///
/// Запрос должен быть SELECT; FOR UPDATE добавляется при
/// необходимости. Ожидание занятых строк асинхронное: задача
/// приостанавливается до освобождения или исхода по дедлоку/таймауту.
pub async fn select_for_update(
    connection: &mut Connection,
    sql: &str,
    binds: &[Value],
) -> Result<RowSet> {
    if !connection.in_transaction() {
        return Err(Error::validation(
            "SELECT FOR UPDATE requires an open transaction",
        ));
    }
    match sql::parse(sql)? {
        Statement::Select(_) => {}
        _ => {
            return Err(Error::validation(
                "only SELECT statements can lock rows",
            ));
        }
    }
    let locked_sql = with_lock_clause(sql);
    connection.execute(&locked_sql, binds).await
}
