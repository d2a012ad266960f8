//! Тесты блокирующего чтения строк

use crate::common::test_utils::campus_provider;
use crate::common::Error;
use crate::store::value::Value;
use crate::tx::lock_accessor::{select_for_update, with_lock_clause};

#[test]
fn test_with_lock_clause_appends() {
    assert_eq!(
        with_lock_clause("SELECT * FROM student WHERE student_id = ?"),
        "SELECT * FROM student WHERE student_id = ? FOR UPDATE"
    );
}

#[test]
fn test_with_lock_clause_idempotent() {
    assert_eq!(
        with_lock_clause("SELECT * FROM student FOR UPDATE"),
        "SELECT * FROM student FOR UPDATE"
    );
    assert_eq!(
        with_lock_clause("SELECT * FROM student for update"),
        "SELECT * FROM student for update"
    );
}

#[test]
fn test_with_lock_clause_strips_semicolon() {
    assert_eq!(
        with_lock_clause("SELECT * FROM student;  "),
        "SELECT * FROM student FOR UPDATE"
    );
    assert_eq!(
        with_lock_clause("SELECT * FROM student FOR UPDATE;"),
        "SELECT * FROM student FOR UPDATE"
    );
}

#[tokio::test]
async fn test_requires_open_transaction() {
    let provider = campus_provider("accessor_requires_tx").unwrap();
    let mut connection = provider.acquire().await.unwrap();

    let err = select_for_update(&mut connection, "SELECT * FROM student", &[])
        .await
        .unwrap_err();
    match err {
        Error::Validation { .. } => {}
        other => panic!("Ожидалась ошибка валидации, получено {:?}", other),
    }
    connection.close().unwrap();
}

#[tokio::test]
async fn test_rejects_non_select() {
    let provider = campus_provider("accessor_rejects_dml").unwrap();
    let mut connection = provider.acquire().await.unwrap();
    connection.begin().unwrap();

    let err = select_for_update(
        &mut connection,
        "UPDATE student SET name = 'x' WHERE student_id = 1",
        &[],
    )
    .await
    .unwrap_err();
    match err {
        Error::Validation { .. } => {}
        other => panic!("Ожидалась ошибка валидации, получено {:?}", other),
    }
    connection.close().unwrap();
}

#[tokio::test]
async fn test_locks_selected_rows() {
    let provider = campus_provider("accessor_locks_rows").unwrap();

    let mut setup = provider.acquire().await.unwrap();
    setup
        .execute(
            "INSERT INTO student (student_id, name) VALUES (1, 'Ann')",
            &[],
        )
        .await
        .unwrap();
    setup.commit().unwrap();
    setup.close().unwrap();

    let mut holder = provider.acquire().await.unwrap();
    holder.begin().unwrap();
    let rows = select_for_update(
        &mut holder,
        "SELECT name FROM student WHERE student_id = ?",
        &[Value::Integer(1)],
    )
    .await
    .unwrap();
    assert_eq!(rows.row_count, 1);
    assert_eq!(rows.rows[0][0], Value::Text("Ann".into()));

    // Блокировка держится до конца транзакции
    assert_eq!(provider.store().lock_stats().locks_acquired, 1);
    holder.commit().unwrap();
    holder.close().unwrap();
}
