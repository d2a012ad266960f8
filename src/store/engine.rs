//! Встроенный реляционный движок campusdb
//!
//! Разделяемое хранилище с транзакциями поверх оверлея записи:
//! изменения транзакции накапливаются отдельно и атомарно применяются
//! при commit либо отбрасываются при rollback. Ограничения целостности
//! (уникальность, внешние ключи, NOT NULL) проверяются при записи и
//! перепроверяются при фиксации; нарушения несут нативные коды ошибок.

use crate::common::error::codes;
use crate::common::{DbError, EngineConfig};
use crate::store::lock::{RowLockManager, RowLockStats, TransactionId};
use crate::store::schema::TableSchema;
use crate::store::sql::{
    AssignExpr, CompareOp, Condition, DeleteStatement, DeltaOp, InsertStatement, IsolationLevel,
    SelectStatement, Statement, Term, UpdateStatement,
};
use crate::store::value::Value;
use crate::common::{Error, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Результат выполнения одного оператора
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    /// Имена колонок (пусто для DML)
    pub columns: Vec<String>,
    /// Строки результата (пусто для DML)
    pub rows: Vec<Vec<Value>>,
    /// Количество строк: выбранных для SELECT, затронутых для DML
    pub row_count: usize,
    /// Сгенерированный ключ последней вставленной строки
    pub last_row_id: Option<u64>,
}

impl RowSet {
    /// Проверяет, пуст ли результат
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Возвращает значение колонки в строке
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))?;
        self.rows.get(row)?.get(index)
    }
}

/// Статистика хранилища
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Количество активных транзакций
    pub active_transactions: u64,
    /// Общее количество запущенных транзакций
    pub total_transactions: u64,
    /// Количество зафиксированных транзакций
    pub committed_transactions: u64,
    /// Количество откаченных транзакций
    pub rolled_back_transactions: u64,
}

/// Таблица: схема плюс зафиксированные строки
#[derive(Debug)]
struct Table {
    schema: TableSchema,
    /// Зафиксированные строки по монотонному id
    rows: BTreeMap<u64, Vec<Value>>,
    /// Следующий id строки (генерируемый ключ)
    next_row_id: u64,
}

/// Оверлей записи одной транзакции над одной таблицей
#[derive(Debug, Default)]
struct TableOverlay {
    inserted: BTreeMap<u64, Vec<Value>>,
    updated: HashMap<u64, Vec<Value>>,
    deleted: HashSet<u64>,
}

/// Состояние одной транзакции
#[derive(Debug)]
struct TxnState {
    isolation: IsolationLevel,
    /// Количество выполненных DML операторов (для SET TRANSACTION)
    statements_executed: u64,
    overlay: HashMap<String, TableOverlay>,
}

impl TxnState {
    fn new() -> Self {
        Self {
            isolation: IsolationLevel::ReadCommitted,
            statements_executed: 0,
            overlay: HashMap::new(),
        }
    }
}

/// Внутреннее состояние хранилища
#[derive(Debug, Default)]
struct StoreState {
    tables: HashMap<String, Table>,
    next_transaction_id: TransactionId,
    transactions: HashMap<TransactionId, TxnState>,
    stats: StoreStats,
}

/// Встроенное in-memory реляционное хранилище
pub struct MemoryStore {
    state: RwLock<StoreState>,
    locks: RowLockManager,
    config: EngineConfig,
}

impl MemoryStore {
    /// Создает пустое хранилище
    pub fn new(config: EngineConfig) -> Self {
        let locks = RowLockManager::new(config.lock_wait_timeout());
        Self {
            state: RwLock::new(StoreState {
                next_transaction_id: 1,
                ..StoreState::default()
            }),
            locks,
            config,
        }
    }

    /// Регистрирует таблицу. Родительские таблицы внешних ключей должны
    /// быть зарегистрированы раньше дочерних.
    pub fn create_table(&self, schema: TableSchema) -> Result<()> {
        schema.validate()?;
        let mut state = self.state.write();
        let name = schema.name.to_lowercase();
        if state.tables.contains_key(&name) {
            return Err(Error::validation(format!("Table {} already exists", name)));
        }
        for fk in &schema.foreign_keys {
            let parent = fk.parent_table.to_lowercase();
            if parent != name && !state.tables.contains_key(&parent) {
                return Err(Error::validation(format!(
                    "Parent table {} for constraint {} does not exist",
                    parent, fk.name
                )));
            }
        }
        state.tables.insert(
            name,
            Table {
                schema,
                rows: BTreeMap::new(),
                next_row_id: 1,
            },
        );
        Ok(())
    }

    /// Начинает новую транзакцию
    pub fn begin(&self) -> TransactionId {
        let mut state = self.state.write();
        let id = state.next_transaction_id;
        state.next_transaction_id += 1;
        state.transactions.insert(id, TxnState::new());
        state.stats.total_transactions += 1;
        state.stats.active_transactions += 1;
        id
    }

    /// Фиксирует транзакцию: перепроверяет ограничения и атомарно
    /// применяет оверлей. При нарушении ограничения оверлей отбрасывается
    /// (транзакция завершается откатом) и возвращается ошибка ограничения.
    pub fn commit(&self, transaction: TransactionId) -> std::result::Result<(), DbError> {
        let mut state = self.state.write();
        let Some(txn_state) = state.transactions.remove(&transaction) else {
            return Ok(());
        };

        // Перепроверка под общим замком: конкурирующая транзакция могла
        // зафиксировать конфликтующую строку, которую мы не видели
        let validation = validate_overlay(&state.tables, &txn_state.overlay);
        if let Err(err) = validation {
            state.stats.active_transactions -= 1;
            state.stats.rolled_back_transactions += 1;
            drop(state);
            self.locks.release_all(transaction);
            return Err(err);
        }

        for (table_name, overlay) in txn_state.overlay {
            if let Some(table) = state.tables.get_mut(&table_name) {
                for id in overlay.deleted {
                    table.rows.remove(&id);
                }
                for (id, row) in overlay.updated {
                    table.rows.insert(id, row);
                }
                for (id, row) in overlay.inserted {
                    table.rows.insert(id, row);
                }
            }
        }
        state.stats.active_transactions -= 1;
        state.stats.committed_transactions += 1;
        drop(state);
        self.locks.release_all(transaction);
        Ok(())
    }

    /// Откатывает транзакцию: отбрасывает оверлей и снимает блокировки
    pub fn rollback(&self, transaction: TransactionId) {
        let mut state = self.state.write();
        if state.transactions.remove(&transaction).is_some() {
            state.stats.active_transactions -= 1;
            state.stats.rolled_back_transactions += 1;
        }
        drop(state);
        self.locks.release_all(transaction);
    }

    /// Выполняет один оператор в рамках транзакции
    pub async fn execute(
        &self,
        transaction: TransactionId,
        statement: &Statement,
        binds: &[Value],
    ) -> std::result::Result<RowSet, DbError> {
        match statement {
            Statement::Select(select) => self.execute_select(transaction, select, binds).await,
            Statement::Insert(insert) => self.execute_insert(transaction, insert, binds),
            Statement::Update(update) => self.execute_update(transaction, update, binds).await,
            Statement::Delete(delete) => self.execute_delete(transaction, delete, binds).await,
            Statement::SetTransaction { isolation } => {
                self.set_transaction(transaction, *isolation)
            }
            Statement::Commit | Statement::Rollback => Err(DbError::new(
                codes::INTERNAL,
                "transaction control statements are handled by the connection",
            )),
        }
    }

    /// Получает статистику хранилища
    pub fn stats(&self) -> StoreStats {
        self.state.read().stats.clone()
    }

    /// Получает статистику блокировок строк
    pub fn lock_stats(&self) -> RowLockStats {
        self.locks.statistics()
    }

    /// Возвращает записанный уровень изоляции транзакции
    pub fn transaction_isolation(&self, transaction: TransactionId) -> Option<IsolationLevel> {
        self.state
            .read()
            .transactions
            .get(&transaction)
            .map(|t| t.isolation)
    }

    /// SET TRANSACTION: допустим только первым оператором транзакции;
    /// SERIALIZABLE принимается только если движок его поддерживает
    fn set_transaction(
        &self,
        transaction: TransactionId,
        isolation: IsolationLevel,
    ) -> std::result::Result<RowSet, DbError> {
        let mut state = self.state.write();
        let txn_state = state
            .transactions
            .get_mut(&transaction)
            .ok_or_else(|| DbError::new(codes::INTERNAL, "transaction is not active"))?;
        if txn_state.statements_executed > 0 {
            return Err(DbError::new(
                codes::SET_TRANSACTION_NOT_FIRST,
                "SET TRANSACTION must be the first statement of a transaction",
            ));
        }
        if isolation == IsolationLevel::Serializable && !self.config.supports_serializable {
            return Err(DbError::new(
                codes::INVALID_OPTION,
                "isolation level SERIALIZABLE is not enabled for this store",
            ));
        }
        txn_state.isolation = isolation;
        Ok(RowSet::default())
    }

    /// Блокирует зафиксированные строки, соответствующие фильтру,
    /// повторяя сопоставление до стабилизации множества: строка могла
    /// измениться, пока транзакция ждала ее блокировку.
    async fn lock_matching_rows(
        &self,
        transaction: TransactionId,
        table_name: &str,
        filter: &[Condition],
        binds: &[Value],
    ) -> std::result::Result<(), DbError> {
        let mut locked: HashSet<u64> = HashSet::new();
        loop {
            let to_lock: Vec<u64> = {
                let state = self.state.read();
                let table = lookup_table(&state.tables, table_name)?;
                let overlays = transaction_overlay(&state, transaction);
                let mut ids = Vec::new();
                for (id, row) in committed_view(table, overlays.get(table_name)) {
                    if row_matches(&table.schema, &row, filter, binds)? && !locked.contains(&id) {
                        ids.push(id);
                    }
                }
                ids
            };
            if to_lock.is_empty() {
                return Ok(());
            }
            // Детерминированный порядок уменьшает встречные дедлоки
            let mut to_lock = to_lock;
            to_lock.sort_unstable();
            for id in to_lock {
                self.locks
                    .acquire(transaction, (table_name.to_string(), id))
                    .await?;
                locked.insert(id);
            }
        }
    }

    async fn execute_select(
        &self,
        transaction: TransactionId,
        select: &SelectStatement,
        binds: &[Value],
    ) -> std::result::Result<RowSet, DbError> {
        if select.for_update {
            self.lock_matching_rows(transaction, &select.table, &select.filter, binds)
                .await?;
        }

        let mut state = self.state.write();
        let state = &mut *state;
        bump_statement_count(&mut state.transactions, transaction)?;
        let table = lookup_table(&state.tables, &select.table)?;
        let overlays = transactions_overlay(&state.transactions, transaction);

        let projection: Vec<usize> = match &select.columns {
            None => (0..table.schema.columns.len()).collect(),
            Some(names) => {
                let mut indexes = Vec::with_capacity(names.len());
                for name in names {
                    indexes.push(column_index(&table.schema, name)?);
                }
                indexes
            }
        };
        let columns: Vec<String> = projection
            .iter()
            .map(|&i| table.schema.columns[i].name.clone())
            .collect();

        let mut rows = Vec::new();
        for (_, row) in visible_rows(table, overlays.get(&select.table.to_lowercase())) {
            if row_matches(&table.schema, &row, &select.filter, binds)? {
                rows.push(projection.iter().map(|&i| row[i].clone()).collect());
            }
        }

        let row_count = rows.len();
        Ok(RowSet {
            columns,
            rows,
            row_count,
            last_row_id: None,
        })
    }

    fn execute_insert(
        &self,
        transaction: TransactionId,
        insert: &InsertStatement,
        binds: &[Value],
    ) -> std::result::Result<RowSet, DbError> {
        let mut state = self.state.write();
        let state = &mut *state;
        bump_statement_count(&mut state.transactions, transaction)?;
        let table = lookup_table(&state.tables, &insert.table)?;
        let table_name = insert.table.to_lowercase();

        // Выравниваем строку по схеме; неперечисленные колонки получают NULL
        let mut row = vec![Value::Null; table.schema.columns.len()];
        for (column, term) in insert.columns.iter().zip(insert.values.iter()) {
            let index = column_index(&table.schema, column)?;
            row[index] = resolve_term(term, binds)?;
        }
        check_row_types(&table.schema, &row)?;

        let overlays = transactions_overlay(&state.transactions, transaction);
        check_unique(&state.tables, overlays, &table_name, &row, None)?;
        check_foreign_keys(&state.tables, overlays, &table_name, &row)?;

        let table = state
            .tables
            .get_mut(&table_name)
            .ok_or_else(|| table_not_found(&table_name))?;
        let row_id = table.next_row_id;
        table.next_row_id += 1;

        let txn_state = state
            .transactions
            .get_mut(&transaction)
            .ok_or_else(|| DbError::new(codes::INTERNAL, "transaction is not active"))?;
        txn_state
            .overlay
            .entry(table_name)
            .or_default()
            .inserted
            .insert(row_id, row);

        Ok(RowSet {
            row_count: 1,
            last_row_id: Some(row_id),
            ..RowSet::default()
        })
    }

    async fn execute_update(
        &self,
        transaction: TransactionId,
        update: &UpdateStatement,
        binds: &[Value],
    ) -> std::result::Result<RowSet, DbError> {
        self.lock_matching_rows(transaction, &update.table, &update.filter, binds)
            .await?;

        let mut state = self.state.write();
        let state = &mut *state;
        bump_statement_count(&mut state.transactions, transaction)?;
        let table = lookup_table(&state.tables, &update.table)?;
        let table_name = update.table.to_lowercase();
        let overlays = transactions_overlay(&state.transactions, transaction);

        // Собираем новые версии совпавших строк
        let mut changes: Vec<(u64, Vec<Value>, bool)> = Vec::new();
        let own_inserted: HashSet<u64> = overlays
            .get(&table_name)
            .map(|o| o.inserted.keys().copied().collect())
            .unwrap_or_default();
        for (id, row) in visible_rows(table, overlays.get(&table_name)) {
            if !row_matches(&table.schema, &row, &update.filter, binds)? {
                continue;
            }
            let mut updated = row.clone();
            for assignment in &update.assignments {
                let target = column_index(&table.schema, &assignment.column)?;
                updated[target] = match &assignment.expr {
                    AssignExpr::Term(term) => resolve_term(term, binds)?,
                    AssignExpr::Delta { column, op, term } => {
                        let source = column_index(&table.schema, column)?;
                        apply_delta(&row[source], *op, &resolve_term(term, binds)?)?
                    }
                };
            }
            check_row_types(&table.schema, &updated)?;
            changes.push((id, updated, own_inserted.contains(&id)));
        }

        for (id, updated, _) in &changes {
            check_unique(&state.tables, overlays, &table_name, updated, Some(*id))?;
            check_foreign_keys(&state.tables, overlays, &table_name, updated)?;
        }

        let row_count = changes.len();
        let txn_state = state
            .transactions
            .get_mut(&transaction)
            .ok_or_else(|| DbError::new(codes::INTERNAL, "transaction is not active"))?;
        let overlay = txn_state.overlay.entry(table_name).or_default();
        for (id, updated, own) in changes {
            if own {
                overlay.inserted.insert(id, updated);
            } else {
                overlay.updated.insert(id, updated);
            }
        }

        Ok(RowSet {
            row_count,
            ..RowSet::default()
        })
    }

    async fn execute_delete(
        &self,
        transaction: TransactionId,
        delete: &DeleteStatement,
        binds: &[Value],
    ) -> std::result::Result<RowSet, DbError> {
        self.lock_matching_rows(transaction, &delete.table, &delete.filter, binds)
            .await?;

        let mut state = self.state.write();
        let state = &mut *state;
        bump_statement_count(&mut state.transactions, transaction)?;
        let table = lookup_table(&state.tables, &delete.table)?;
        let table_name = delete.table.to_lowercase();
        let overlays = transactions_overlay(&state.transactions, transaction);

        let own_inserted: HashSet<u64> = overlays
            .get(&table_name)
            .map(|o| o.inserted.keys().copied().collect())
            .unwrap_or_default();
        let mut victims: Vec<(u64, Vec<Value>, bool)> = Vec::new();
        for (id, row) in visible_rows(table, overlays.get(&table_name)) {
            if row_matches(&table.schema, &row, &delete.filter, binds)? {
                victims.push((id, row, own_inserted.contains(&id)));
            }
        }

        for (id, row, _) in &victims {
            check_no_children(&state.tables, overlays, &table_name, row, *id)?;
        }

        let row_count = victims.len();
        let txn_state = state
            .transactions
            .get_mut(&transaction)
            .ok_or_else(|| DbError::new(codes::INTERNAL, "transaction is not active"))?;
        let overlay = txn_state.overlay.entry(table_name).or_default();
        for (id, _, own) in victims {
            if own {
                overlay.inserted.remove(&id);
            } else {
                overlay.updated.remove(&id);
                overlay.deleted.insert(id);
            }
        }

        Ok(RowSet {
            row_count,
            ..RowSet::default()
        })
    }
}

/// Пустой оверлей для чтений вне транзакционного контекста
fn empty_overlays() -> &'static HashMap<String, TableOverlay> {
    use std::sync::OnceLock;
    static EMPTY: OnceLock<HashMap<String, TableOverlay>> = OnceLock::new();
    EMPTY.get_or_init(HashMap::new)
}

/// Оверлей транзакции из уже захваченного состояния
fn transaction_overlay(
    state: &StoreState,
    transaction: TransactionId,
) -> &HashMap<String, TableOverlay> {
    state
        .transactions
        .get(&transaction)
        .map(|t| &t.overlay)
        .unwrap_or_else(|| empty_overlays())
}

/// То же, но из разделенного заимствования карты транзакций
fn transactions_overlay(
    transactions: &HashMap<TransactionId, TxnState>,
    transaction: TransactionId,
) -> &HashMap<String, TableOverlay> {
    transactions
        .get(&transaction)
        .map(|t| &t.overlay)
        .unwrap_or_else(|| empty_overlays())
}

fn table_not_found(name: &str) -> DbError {
    DbError::new(
        codes::TABLE_NOT_FOUND,
        format!("table or view {} does not exist", name),
    )
}

fn lookup_table<'a>(
    tables: &'a HashMap<String, Table>,
    name: &str,
) -> std::result::Result<&'a Table, DbError> {
    tables
        .get(&name.to_lowercase())
        .ok_or_else(|| table_not_found(name))
}

fn column_index(schema: &TableSchema, name: &str) -> std::result::Result<usize, DbError> {
    schema.column_index(name).ok_or_else(|| {
        DbError::new(
            codes::INVALID_IDENTIFIER,
            format!("invalid identifier {}.{}", schema.name, name),
        )
    })
}

/// Увеличивает счетчик выполненных операторов транзакции
fn bump_statement_count(
    transactions: &mut HashMap<TransactionId, TxnState>,
    transaction: TransactionId,
) -> std::result::Result<(), DbError> {
    let txn_state = transactions
        .get_mut(&transaction)
        .ok_or_else(|| DbError::new(codes::INTERNAL, "transaction is not active"))?;
    txn_state.statements_executed += 1;
    Ok(())
}

/// Разрешает терм в значение
fn resolve_term(term: &Term, binds: &[Value]) -> std::result::Result<Value, DbError> {
    match term {
        Term::Literal(value) => Ok(value.clone()),
        Term::Bind(index) => binds.get(*index).cloned().ok_or_else(|| {
            DbError::new(
                codes::NOT_ALL_VARIABLES_BOUND,
                format!("not all variables bound: missing bind {}", index + 1),
            )
        }),
    }
}

fn op_symbol(op: DeltaOp) -> &'static str {
    match op {
        DeltaOp::Add => "+",
        DeltaOp::Sub => "-",
    }
}

/// Инкремент `col = col ± term`; NULL источник дает NULL
fn apply_delta(
    source: &Value,
    op: DeltaOp,
    delta: &Value,
) -> std::result::Result<Value, DbError> {
    match (source, delta) {
        (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
        (Value::Integer(a), Value::Integer(b)) => {
            let result = match op {
                DeltaOp::Add => a.checked_add(*b),
                DeltaOp::Sub => a.checked_sub(*b),
            };
            result.map(Value::Integer).ok_or_else(|| {
                DbError::new(
                    codes::NUMERIC_OVERFLOW,
                    format!("numeric overflow: {} {} {}", a, op_symbol(op), b),
                )
            })
        }
        (Value::Real(a), Value::Integer(b)) => Ok(Value::Real(match op {
            DeltaOp::Add => a + *b as f64,
            DeltaOp::Sub => a - *b as f64,
        })),
        (Value::Integer(a), Value::Real(b)) => Ok(Value::Real(match op {
            DeltaOp::Add => *a as f64 + b,
            DeltaOp::Sub => *a as f64 - b,
        })),
        (Value::Real(a), Value::Real(b)) => Ok(Value::Real(match op {
            DeltaOp::Add => a + b,
            DeltaOp::Sub => a - b,
        })),
        (a, b) => Err(DbError::new(
            codes::INCONSISTENT_DATATYPES,
            format!(
                "inconsistent datatypes: expected number, got {} and {}",
                a.type_name(),
                b.type_name()
            ),
        )),
    }
}

/// Проверяет строку по фильтру
fn row_matches(
    schema: &TableSchema,
    row: &[Value],
    filter: &[Condition],
    binds: &[Value],
) -> std::result::Result<bool, DbError> {
    for condition in filter {
        let index = column_index(schema, &condition.column)?;
        let cell = &row[index];
        let term = resolve_term(&condition.term, binds)?;
        if cell.is_null() || term.is_null() {
            // сравнение с NULL не истинно ни для одного оператора
            return Ok(false);
        }
        let ordering = cell.compare(&term).ok_or_else(|| {
            DbError::new(
                codes::INCONSISTENT_DATATYPES,
                format!(
                    "inconsistent datatypes: cannot compare {} with {}",
                    cell.type_name(),
                    term.type_name()
                ),
            )
        })?;
        let matched = match condition.op {
            CompareOp::Eq => ordering == std::cmp::Ordering::Equal,
            CompareOp::Ne => ordering != std::cmp::Ordering::Equal,
            CompareOp::Lt => ordering == std::cmp::Ordering::Less,
            CompareOp::Le => ordering != std::cmp::Ordering::Greater,
            CompareOp::Gt => ordering == std::cmp::Ordering::Greater,
            CompareOp::Ge => ordering != std::cmp::Ordering::Less,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Проверяет типы и обязательность значений строки
fn check_row_types(schema: &TableSchema, row: &[Value]) -> std::result::Result<(), DbError> {
    for (index, column) in schema.columns.iter().enumerate() {
        let value = &row[index];
        if value.is_null() {
            if schema.is_required(index) {
                return Err(DbError::new(
                    codes::NULL_VIOLATION,
                    format!(
                        "cannot insert NULL into ({}.{})",
                        schema.name, column.name
                    ),
                ));
            }
            continue;
        }
        if !column.accepts(value) {
            return Err(DbError::new(
                codes::INCONSISTENT_DATATYPES,
                format!(
                    "inconsistent datatypes: {} for column {}.{}",
                    value.type_name(),
                    schema.name,
                    column.name
                ),
            ));
        }
    }
    Ok(())
}

/// Зафиксированные строки глазами транзакции (без ее собственных вставок)
fn committed_view(table: &Table, overlay: Option<&TableOverlay>) -> Vec<(u64, Vec<Value>)> {
    let mut rows = Vec::new();
    for (&id, row) in &table.rows {
        if let Some(overlay) = overlay {
            if overlay.deleted.contains(&id) {
                continue;
            }
            if let Some(updated) = overlay.updated.get(&id) {
                rows.push((id, updated.clone()));
                continue;
            }
        }
        rows.push((id, row.clone()));
    }
    rows
}

/// Видимые строки таблицы: зафиксированные плюс собственные вставки
fn visible_rows(table: &Table, overlay: Option<&TableOverlay>) -> Vec<(u64, Vec<Value>)> {
    let mut rows = committed_view(table, overlay);
    if let Some(overlay) = overlay {
        for (&id, row) in &overlay.inserted {
            rows.push((id, row.clone()));
        }
    }
    rows
}

/// Проверяет уникальные ограничения кандидата
fn check_unique(
    tables: &HashMap<String, Table>,
    overlays: &HashMap<String, TableOverlay>,
    table_name: &str,
    candidate: &[Value],
    exclude_id: Option<u64>,
) -> std::result::Result<(), DbError> {
    let table = lookup_table(tables, table_name)?;
    for unique in table.schema.effective_uniques() {
        let mut key_indexes = Vec::with_capacity(unique.columns.len());
        for column in &unique.columns {
            key_indexes.push(column_index(&table.schema, column)?);
        }
        // NULL в ключе исключает строку из проверки уникальности
        if key_indexes.iter().any(|&i| candidate[i].is_null()) {
            continue;
        }
        for (id, row) in visible_rows(table, overlays.get(table_name)) {
            if Some(id) == exclude_id {
                continue;
            }
            if key_indexes.iter().all(|&i| candidate[i].sql_eq(&row[i])) {
                return Err(DbError::new(
                    codes::UNIQUE_VIOLATION,
                    format!("unique constraint ({}) violated", unique.name),
                ));
            }
        }
    }
    Ok(())
}

/// Проверяет наличие родительских ключей для внешних ключей строки
fn check_foreign_keys(
    tables: &HashMap<String, Table>,
    overlays: &HashMap<String, TableOverlay>,
    table_name: &str,
    candidate: &[Value],
) -> std::result::Result<(), DbError> {
    let table = lookup_table(tables, table_name)?;
    for fk in &table.schema.foreign_keys {
        let mut child_values = Vec::with_capacity(fk.columns.len());
        for column in &fk.columns {
            child_values.push(&candidate[column_index(&table.schema, column)?]);
        }
        if child_values.iter().any(|v| v.is_null()) {
            continue;
        }

        let parent_name = fk.parent_table.to_lowercase();
        let parent = lookup_table(tables, &parent_name)?;
        let mut parent_indexes = Vec::with_capacity(fk.parent_columns.len());
        for column in &fk.parent_columns {
            parent_indexes.push(column_index(&parent.schema, column)?);
        }

        let found = visible_rows(parent, overlays.get(&parent_name))
            .iter()
            .any(|(_, row)| {
                parent_indexes
                    .iter()
                    .zip(child_values.iter())
                    .all(|(&pi, cv)| cv.sql_eq(&row[pi]))
            });
        if !found {
            return Err(DbError::new(
                codes::PARENT_KEY_NOT_FOUND,
                format!(
                    "integrity constraint ({}) violated - parent key not found",
                    fk.name
                ),
            ));
        }
    }
    Ok(())
}

/// Проверяет, что на удаляемую строку не ссылаются дочерние записи
fn check_no_children(
    tables: &HashMap<String, Table>,
    overlays: &HashMap<String, TableOverlay>,
    table_name: &str,
    victim: &[Value],
    victim_id: u64,
) -> std::result::Result<(), DbError> {
    let parent = lookup_table(tables, table_name)?;
    for (child_name, child) in tables {
        for fk in &child.schema.foreign_keys {
            if fk.parent_table.to_lowercase() != table_name {
                continue;
            }
            let mut parent_values = Vec::with_capacity(fk.parent_columns.len());
            for column in &fk.parent_columns {
                parent_values.push(&victim[column_index(&parent.schema, column)?]);
            }
            if parent_values.iter().any(|v| v.is_null()) {
                continue;
            }
            let mut child_indexes = Vec::with_capacity(fk.columns.len());
            for column in &fk.columns {
                child_indexes.push(column_index(&child.schema, column)?);
            }

            let referenced = visible_rows(child, overlays.get(child_name))
                .iter()
                .any(|(id, row)| {
                    // самоссылка удаляемой строки не считается
                    !(child_name == table_name && *id == victim_id)
                        && child_indexes
                            .iter()
                            .zip(parent_values.iter())
                            .all(|(&ci, pv)| pv.sql_eq(&row[ci]))
                });
            if referenced {
                return Err(DbError::new(
                    codes::CHILD_RECORD_FOUND,
                    format!(
                        "integrity constraint ({}) violated - child record found",
                        fk.name
                    ),
                ));
            }
        }
    }
    Ok(())
}

/// Перепроверка оверлея при фиксации
fn validate_overlay(
    tables: &HashMap<String, Table>,
    overlays: &HashMap<String, TableOverlay>,
) -> std::result::Result<(), DbError> {
    for (table_name, overlay) in overlays {
        let table = lookup_table(tables, table_name)?;
        for (id, row) in overlay.inserted.iter().chain(overlay.updated.iter()) {
            check_unique(tables, overlays, table_name, row, Some(*id))?;
            check_foreign_keys(tables, overlays, table_name, row)?;
        }
        for id in &overlay.deleted {
            if let Some(row) = table.rows.get(id) {
                check_no_children(tables, overlays, table_name, row, *id)?;
            }
        }
    }
    Ok(())
}
