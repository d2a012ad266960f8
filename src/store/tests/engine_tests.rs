//! Тесты транзакционного движка

use crate::common::error::codes;
use crate::common::test_utils::campus_schema;
use crate::common::{DbError, EngineConfig};
use crate::store::engine::{MemoryStore, RowSet};
use crate::store::lock::TransactionId;
use crate::store::sql;
use crate::store::value::Value;
use std::sync::Arc;
use std::time::Duration;

fn campus_store(engine: EngineConfig) -> MemoryStore {
    let store = MemoryStore::new(engine);
    for schema in campus_schema() {
        store.create_table(schema).unwrap();
    }
    store
}

async fn run(
    store: &MemoryStore,
    transaction: TransactionId,
    sql_text: &str,
    binds: &[Value],
) -> Result<RowSet, DbError> {
    let statement = sql::parse(sql_text).unwrap();
    store.execute(transaction, &statement, binds).await
}

async fn insert_student(store: &MemoryStore, transaction: TransactionId, id: i64, name: &str) {
    run(
        store,
        transaction,
        "INSERT INTO student (student_id, name) VALUES (?, ?)",
        &[Value::Integer(id), Value::Text(name.into())],
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn test_insert_visible_only_inside_transaction() {
    let store = campus_store(EngineConfig::default());
    let writer = store.begin();
    insert_student(&store, writer, 1, "Ann").await;

    // Писатель видит свою незафиксированную строку
    let own = run(&store, writer, "SELECT * FROM student", &[]).await.unwrap();
    assert_eq!(own.row_count, 1);

    // Другая транзакция — нет
    let reader = store.begin();
    let other = run(&store, reader, "SELECT * FROM student", &[]).await.unwrap();
    assert_eq!(other.row_count, 0);

    store.commit(writer).unwrap();
    let after = run(&store, reader, "SELECT * FROM student", &[]).await.unwrap();
    assert_eq!(after.row_count, 1);
    store.rollback(reader);
}

#[tokio::test]
async fn test_rollback_discards_changes() {
    let store = campus_store(EngineConfig::default());
    let writer = store.begin();
    insert_student(&store, writer, 1, "Ann").await;
    store.rollback(writer);

    let reader = store.begin();
    let rows = run(&store, reader, "SELECT * FROM student", &[]).await.unwrap();
    assert_eq!(rows.row_count, 0);
    store.rollback(reader);

    let stats = store.stats();
    assert_eq!(stats.active_transactions, 0);
    assert_eq!(stats.rolled_back_transactions, 2);
}

#[tokio::test]
async fn test_insert_returns_generated_key() {
    let store = campus_store(EngineConfig::default());
    let transaction = store.begin();
    let first = run(
        &store,
        transaction,
        "INSERT INTO student (student_id, name) VALUES (1, 'Ann')",
        &[],
    )
    .await
    .unwrap();
    let second = run(
        &store,
        transaction,
        "INSERT INTO student (student_id, name) VALUES (2, 'Bob')",
        &[],
    )
    .await
    .unwrap();
    assert_eq!(first.row_count, 1);
    let first_id = first.last_row_id.unwrap();
    assert!(second.last_row_id.unwrap() > first_id);
    store.commit(transaction).unwrap();
}

#[tokio::test]
async fn test_unique_violation_code() {
    let store = campus_store(EngineConfig::default());
    let transaction = store.begin();
    insert_student(&store, transaction, 1, "Ann").await;
    let err = run(
        &store,
        transaction,
        "INSERT INTO student (student_id, name) VALUES (1, 'Bob')",
        &[],
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, codes::UNIQUE_VIOLATION);
    store.rollback(transaction);
}

#[tokio::test]
async fn test_unique_violation_on_email() {
    let store = campus_store(EngineConfig::default());
    let transaction = store.begin();
    run(
        &store,
        transaction,
        "INSERT INTO student (student_id, name, email) VALUES (1, 'Ann', 'a@x')",
        &[],
    )
    .await
    .unwrap();
    let err = run(
        &store,
        transaction,
        "INSERT INTO student (student_id, name, email) VALUES (2, 'Bob', 'a@x')",
        &[],
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, codes::UNIQUE_VIOLATION);

    // NULL в уникальной колонке не считается дубликатом
    run(
        &store,
        transaction,
        "INSERT INTO student (student_id, name, email) VALUES (3, 'Cyd', NULL)",
        &[],
    )
    .await
    .unwrap();
    run(
        &store,
        transaction,
        "INSERT INTO student (student_id, name, email) VALUES (4, 'Dan', NULL)",
        &[],
    )
    .await
    .unwrap();
    store.commit(transaction).unwrap();
}

#[tokio::test]
async fn test_null_violation_code() {
    let store = campus_store(EngineConfig::default());
    let transaction = store.begin();
    let err = run(
        &store,
        transaction,
        "INSERT INTO student (student_id, name) VALUES (1, NULL)",
        &[],
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, codes::NULL_VIOLATION);
    store.rollback(transaction);
}

#[tokio::test]
async fn test_foreign_key_codes() {
    let store = campus_store(EngineConfig::default());
    let transaction = store.begin();
    insert_student(&store, transaction, 1, "Ann").await;
    run(
        &store,
        transaction,
        "INSERT INTO student_group (group_id, g_name, member_count) VALUES (10, 'chess', 0)",
        &[],
    )
    .await
    .unwrap();

    // Родитель отсутствует
    let err = run(
        &store,
        transaction,
        "INSERT INTO member (group_id, student_id) VALUES (99, 1)",
        &[],
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, codes::PARENT_KEY_NOT_FOUND);

    // Удаление родителя с дочерней записью
    run(
        &store,
        transaction,
        "INSERT INTO member (group_id, student_id) VALUES (10, 1)",
        &[],
    )
    .await
    .unwrap();
    let err = run(
        &store,
        transaction,
        "DELETE FROM student WHERE student_id = 1",
        &[],
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, codes::CHILD_RECORD_FOUND);
    store.commit(transaction).unwrap();
}

#[tokio::test]
async fn test_statement_error_codes() {
    let store = campus_store(EngineConfig::default());
    let transaction = store.begin();

    let err = run(&store, transaction, "SELECT * FROM no_such_table", &[])
        .await
        .unwrap_err();
    assert_eq!(err.code, codes::TABLE_NOT_FOUND);

    let err = run(&store, transaction, "SELECT no_such_column FROM student", &[])
        .await
        .unwrap_err();
    assert_eq!(err.code, codes::INVALID_IDENTIFIER);

    let err = run(
        &store,
        transaction,
        "SELECT * FROM student WHERE student_id = ?",
        &[],
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, codes::NOT_ALL_VARIABLES_BOUND);

    let err = run(
        &store,
        transaction,
        "INSERT INTO student (student_id, name) VALUES ('oops', 'Ann')",
        &[],
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, codes::INCONSISTENT_DATATYPES);

    store.rollback(transaction);
}

#[tokio::test]
async fn test_update_delta_increment() {
    let store = campus_store(EngineConfig::default());
    let transaction = store.begin();
    run(
        &store,
        transaction,
        "INSERT INTO student_group (group_id, g_name, member_count) VALUES (10, 'chess', 0)",
        &[],
    )
    .await
    .unwrap();
    let updated = run(
        &store,
        transaction,
        "UPDATE student_group SET member_count = member_count + 1 WHERE group_id = ?",
        &[Value::Integer(10)],
    )
    .await
    .unwrap();
    assert_eq!(updated.row_count, 1);
    store.commit(transaction).unwrap();

    let reader = store.begin();
    let rows = run(
        &store,
        reader,
        "SELECT member_count FROM student_group WHERE group_id = 10",
        &[],
    )
    .await
    .unwrap();
    assert_eq!(rows.value(0, "member_count"), Some(&Value::Integer(1)));
    store.rollback(reader);
}

#[tokio::test]
async fn test_update_delta_overflow_is_an_error() {
    let store = campus_store(EngineConfig::default());
    let transaction = store.begin();
    run(
        &store,
        transaction,
        "INSERT INTO id_counter (name, id_value) VALUES ('student', ?)",
        &[Value::Integer(i64::MAX)],
    )
    .await
    .unwrap();

    let err = run(
        &store,
        transaction,
        "UPDATE id_counter SET id_value = id_value + ? WHERE name = 'student'",
        &[Value::Integer(1)],
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, codes::NUMERIC_OVERFLOW);

    // Переполнение вниз даёт тот же код, строка не изменена
    run(
        &store,
        transaction,
        "UPDATE id_counter SET id_value = ? WHERE name = 'student'",
        &[Value::Integer(i64::MIN)],
    )
    .await
    .unwrap();
    let err = run(
        &store,
        transaction,
        "UPDATE id_counter SET id_value = id_value - 1 WHERE name = 'student'",
        &[],
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, codes::NUMERIC_OVERFLOW);

    let rows = run(
        &store,
        transaction,
        "SELECT id_value FROM id_counter WHERE name = 'student'",
        &[],
    )
    .await
    .unwrap();
    assert_eq!(rows.value(0, "id_value"), Some(&Value::Integer(i64::MIN)));
    store.rollback(transaction);
}

#[tokio::test]
async fn test_set_transaction_rules() {
    let store = campus_store(EngineConfig::default());

    // Первым оператором — принимается
    let transaction = store.begin();
    run(
        &store,
        transaction,
        "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        &[],
    )
    .await
    .unwrap();
    assert_eq!(
        store.transaction_isolation(transaction),
        Some(crate::store::sql::IsolationLevel::Serializable)
    );
    insert_student(&store, transaction, 1, "Ann").await;

    // После DML — отклоняется
    let err = run(
        &store,
        transaction,
        "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        &[],
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, codes::SET_TRANSACTION_NOT_FIRST);
    store.rollback(transaction);
}

#[tokio::test]
async fn test_set_transaction_serializable_unsupported() {
    let store = campus_store(EngineConfig {
        supports_serializable: false,
        ..EngineConfig::default()
    });
    let transaction = store.begin();
    let err = run(
        &store,
        transaction,
        "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        &[],
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, codes::INVALID_OPTION);

    // Транзакция остается пригодной
    insert_student(&store, transaction, 1, "Ann").await;
    store.commit(transaction).unwrap();
}

#[tokio::test]
async fn test_commit_revalidates_unique() {
    let store = campus_store(EngineConfig::default());

    // Две транзакции вставляют один и тот же первичный ключ
    let first = store.begin();
    let second = store.begin();
    insert_student(&store, first, 1, "Ann").await;
    insert_student(&store, second, 1, "Bob").await;

    store.commit(first).unwrap();
    let err = store.commit(second).unwrap_err();
    assert_eq!(err.code, codes::UNIQUE_VIOLATION);

    // Проигравшая транзакция откачена автоматически
    let stats = store.stats();
    assert_eq!(stats.active_transactions, 0);
    assert_eq!(stats.committed_transactions, 1);
    assert_eq!(stats.rolled_back_transactions, 1);
}

#[tokio::test]
async fn test_for_update_blocks_concurrent_update() {
    let store = campus_store(EngineConfig {
        lock_wait_timeout_ms: 50,
        ..EngineConfig::default()
    });
    let setup = store.begin();
    run(
        &store,
        setup,
        "INSERT INTO student_group (group_id, g_name, member_count) VALUES (10, 'chess', 0)",
        &[],
    )
    .await
    .unwrap();
    store.commit(setup).unwrap();

    let holder = store.begin();
    let locked = run(
        &store,
        holder,
        "SELECT * FROM student_group WHERE group_id = 10 FOR UPDATE",
        &[],
    )
    .await
    .unwrap();
    assert_eq!(locked.row_count, 1);

    // Второй писатель не дожидается строки и получает таймаут
    let contender = store.begin();
    let err = run(
        &store,
        contender,
        "UPDATE student_group SET member_count = member_count + 1 WHERE group_id = 10",
        &[],
    )
    .await
    .unwrap_err();
    assert_eq!(err.code, codes::LOCK_WAIT_TIMEOUT);

    store.rollback(contender);
    store.commit(holder).unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deadlock_detected_between_writers() {
    let store = Arc::new(campus_store(EngineConfig::default()));
    let setup = store.begin();
    insert_student(&store, setup, 1, "Ann").await;
    insert_student(&store, setup, 2, "Bob").await;
    store.commit(setup).unwrap();

    let first = store.begin();
    let second = store.begin();
    run(
        &store,
        first,
        "SELECT * FROM student WHERE student_id = 1 FOR UPDATE",
        &[],
    )
    .await
    .unwrap();
    run(
        &store,
        second,
        "SELECT * FROM student WHERE student_id = 2 FOR UPDATE",
        &[],
    )
    .await
    .unwrap();

    // Первая транзакция повисает на строке второй
    let blocked = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let result = run(
                &store,
                first,
                "SELECT * FROM student WHERE student_id = 2 FOR UPDATE",
                &[],
            )
            .await;
            (first, result)
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Встречный запрос замыкает цикл: кто-то из двоих получает код 60
    let counter = run(
        &store,
        second,
        "SELECT * FROM student WHERE student_id = 1 FOR UPDATE",
        &[],
    )
    .await;
    store.rollback(second);
    let (first, blocked_result) = blocked.await.unwrap();
    store.rollback(first);

    let deadlocked = counter
        .err()
        .into_iter()
        .chain(blocked_result.err())
        .any(|e| e.code == codes::DEADLOCK_DETECTED);
    assert!(deadlocked, "Ожидался код дедлока у одной из транзакций");
    assert!(store.lock_stats().deadlocks_detected >= 1);
}

#[tokio::test]
async fn test_delete_and_own_insert_interplay() {
    let store = campus_store(EngineConfig::default());
    let transaction = store.begin();
    insert_student(&store, transaction, 1, "Ann").await;
    let deleted = run(
        &store,
        transaction,
        "DELETE FROM student WHERE student_id = 1",
        &[],
    )
    .await
    .unwrap();
    assert_eq!(deleted.row_count, 1);
    store.commit(transaction).unwrap();

    let reader = store.begin();
    let rows = run(&store, reader, "SELECT * FROM student", &[]).await.unwrap();
    assert_eq!(rows.row_count, 0);
    store.rollback(reader);
}
