//! Минимальный SQL диалект слоя доступа
//!
//! Ровно столько SQL, сколько нужно для контракта блокировок:
//! SELECT (с FOR UPDATE), INSERT, UPDATE (включая `col = col + ?`),
//! DELETE, SET TRANSACTION, COMMIT и ROLLBACK. Позиционные параметры
//! поддерживаются в двух нотациях: `?` и `:n` (нумерация с единицы).

use crate::common::{Error, Result};
use crate::store::value::Value;

/// Разобранный SQL оператор
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// SELECT ... [FOR UPDATE]
    Select(SelectStatement),
    /// INSERT INTO ... VALUES (...)
    Insert(InsertStatement),
    /// UPDATE ... SET ...
    Update(UpdateStatement),
    /// DELETE FROM ...
    Delete(DeleteStatement),
    /// SET TRANSACTION ISOLATION LEVEL ...
    SetTransaction {
        /// Запрошенный уровень изоляции
        isolation: IsolationLevel,
    },
    /// COMMIT
    Commit,
    /// ROLLBACK
    Rollback,
}

/// Уровень изоляции транзакции
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Чтение зафиксированных данных
    ReadCommitted,
    /// Сериализуемость
    Serializable,
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IsolationLevel::ReadCommitted => write!(f, "READ COMMITTED"),
            IsolationLevel::Serializable => write!(f, "SERIALIZABLE"),
        }
    }
}

/// SELECT оператор
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    /// Выбираемые колонки; `None` означает `*`
    pub columns: Option<Vec<String>>,
    /// Таблица
    pub table: String,
    /// Конъюнкция условий WHERE
    pub filter: Vec<Condition>,
    /// Запрошена ли исключительная блокировка строк
    pub for_update: bool,
}

/// INSERT оператор
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    /// Таблица
    pub table: String,
    /// Перечисленные колонки
    pub columns: Vec<String>,
    /// Значения (по одному на колонку)
    pub values: Vec<Term>,
}

/// UPDATE оператор
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    /// Таблица
    pub table: String,
    /// Присваивания SET
    pub assignments: Vec<Assignment>,
    /// Конъюнкция условий WHERE
    pub filter: Vec<Condition>,
}

/// DELETE оператор
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    /// Таблица
    pub table: String,
    /// Конъюнкция условий WHERE
    pub filter: Vec<Condition>,
}

/// Присваивание в SET
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Колонка-приемник
    pub column: String,
    /// Правая часть
    pub expr: AssignExpr,
}

/// Правая часть присваивания
#[derive(Debug, Clone, PartialEq)]
pub enum AssignExpr {
    /// `col = <term>`
    Term(Term),
    /// `col = <col> +|- <term>` — инкремент счетчика
    Delta {
        column: String,
        op: DeltaOp,
        term: Term,
    },
}

/// Знак инкремента
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaOp {
    /// Прибавление
    Add,
    /// Вычитание
    Sub,
}

/// Условие `col <op> <term>`
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Колонка
    pub column: String,
    /// Оператор сравнения
    pub op: CompareOp,
    /// Сравниваемый терм
    pub term: Term,
}

/// Оператор сравнения
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Терм: позиционный параметр или литерал
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Позиционный параметр (индекс с нуля)
    Bind(usize),
    /// Литеральное значение
    Literal(Value),
}

/// Лексема SQL текста
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(String),
    StringLit(String),
    Bind(usize),
    Question,
    Comma,
    LParen,
    RParen,
    Star,
    Plus,
    Minus,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Разбивает SQL текст на лексемы
fn tokenize(sql: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = sql.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            ';' => {
                // завершающая точка с запятой допускается и игнорируется
                chars.next();
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '?' => {
                chars.next();
                tokens.push(Token::Question);
            }
            '=' => {
                chars.next();
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ne);
                } else {
                    return Err(Error::sql_parsing("Unexpected character '!'"));
                }
            }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some(&'=') => {
                        chars.next();
                        tokens.push(Token::Le);
                    }
                    Some(&'>') => {
                        chars.next();
                        tokens.push(Token::Ne);
                    }
                    _ => tokens.push(Token::Lt),
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            ':' => {
                chars.next();
                let mut digits = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() {
                        digits.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if digits.is_empty() {
                    return Err(Error::sql_parsing("Expected digit after ':' bind marker"));
                }
                let index: usize = digits
                    .parse()
                    .map_err(|_| Error::sql_parsing("Invalid bind number"))?;
                if index == 0 {
                    return Err(Error::sql_parsing("Bind numbers start at :1"));
                }
                tokens.push(Token::Bind(index - 1));
            }
            '\'' => {
                chars.next();
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => {
                            // '' внутри строки — экранированная кавычка
                            if chars.peek() == Some(&'\'') {
                                chars.next();
                                text.push('\'');
                            } else {
                                break;
                            }
                        }
                        Some(c) => text.push(c),
                        None => {
                            return Err(Error::sql_parsing("Unterminated string literal"));
                        }
                    }
                }
                tokens.push(Token::StringLit(text));
            }
            c if c.is_ascii_digit() => {
                let mut number = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        number.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Number(number));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(Error::sql_parsing(format!(
                    "Unexpected character '{}'",
                    other
                )));
            }
        }
    }

    Ok(tokens)
}

/// Парсер нисходящего спуска по потоку лексем
struct Parser {
    tokens: Vec<Token>,
    position: usize,
    /// Счетчик анонимных `?` параметров
    next_bind: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            next_bind: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    /// Проверяет, что следующая лексема — заданное ключевое слово
    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    /// Потребляет ключевое слово, если оно следующее
    fn accept_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    /// Требует ключевое слово
    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.accept_keyword(keyword) {
            Ok(())
        } else {
            Err(Error::sql_parsing(format!(
                "Expected keyword {}, found {:?}",
                keyword,
                self.peek()
            )))
        }
    }

    /// Требует лексему
    fn expect(&mut self, token: Token) -> Result<()> {
        match self.advance() {
            Some(found) if found == token => Ok(()),
            found => Err(Error::sql_parsing(format!(
                "Expected {:?}, found {:?}",
                token, found
            ))),
        }
    }

    /// Требует идентификатор
    fn expect_ident(&mut self) -> Result<String> {
        match self.advance() {
            Some(Token::Ident(name)) => Ok(name.to_lowercase()),
            found => Err(Error::sql_parsing(format!(
                "Expected identifier, found {:?}",
                found
            ))),
        }
    }

    /// Разбирает терм: параметр, число, строку или NULL
    fn parse_term(&mut self) -> Result<Term> {
        match self.advance() {
            Some(Token::Question) => {
                let index = self.next_bind;
                self.next_bind += 1;
                Ok(Term::Bind(index))
            }
            Some(Token::Bind(index)) => Ok(Term::Bind(index)),
            Some(Token::Number(text)) => parse_number(&text, false).map(Term::Literal),
            Some(Token::Minus) => match self.advance() {
                Some(Token::Number(text)) => parse_number(&text, true).map(Term::Literal),
                found => Err(Error::sql_parsing(format!(
                    "Expected number after '-', found {:?}",
                    found
                ))),
            },
            Some(Token::StringLit(text)) => Ok(Term::Literal(Value::Text(text))),
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("NULL") => {
                Ok(Term::Literal(Value::Null))
            }
            found => Err(Error::sql_parsing(format!(
                "Expected value term, found {:?}",
                found
            ))),
        }
    }

    /// Разбирает необязательный WHERE как конъюнкцию условий
    fn parse_where(&mut self) -> Result<Vec<Condition>> {
        let mut conditions = Vec::new();
        if !self.accept_keyword("WHERE") {
            return Ok(conditions);
        }
        loop {
            let column = self.expect_ident()?;
            let op = match self.advance() {
                Some(Token::Eq) => CompareOp::Eq,
                Some(Token::Ne) => CompareOp::Ne,
                Some(Token::Lt) => CompareOp::Lt,
                Some(Token::Le) => CompareOp::Le,
                Some(Token::Gt) => CompareOp::Gt,
                Some(Token::Ge) => CompareOp::Ge,
                found => {
                    return Err(Error::sql_parsing(format!(
                        "Expected comparison operator, found {:?}",
                        found
                    )));
                }
            };
            let term = self.parse_term()?;
            conditions.push(Condition { column, op, term });
            if !self.accept_keyword("AND") {
                break;
            }
        }
        Ok(conditions)
    }

    fn parse_select(&mut self) -> Result<Statement> {
        let columns = if matches!(self.peek(), Some(Token::Star)) {
            self.advance();
            None
        } else {
            let mut columns = vec![self.expect_ident()?];
            while matches!(self.peek(), Some(Token::Comma)) {
                self.advance();
                columns.push(self.expect_ident()?);
            }
            Some(columns)
        };

        self.expect_keyword("FROM")?;
        let table = self.expect_ident()?;
        let filter = self.parse_where()?;

        let for_update = if self.accept_keyword("FOR") {
            self.expect_keyword("UPDATE")?;
            true
        } else {
            false
        };

        Ok(Statement::Select(SelectStatement {
            columns,
            table,
            filter,
            for_update,
        }))
    }

    fn parse_insert(&mut self) -> Result<Statement> {
        self.expect_keyword("INTO")?;
        let table = self.expect_ident()?;

        self.expect(Token::LParen)?;
        let mut columns = vec![self.expect_ident()?];
        while matches!(self.peek(), Some(Token::Comma)) {
            self.advance();
            columns.push(self.expect_ident()?);
        }
        self.expect(Token::RParen)?;

        self.expect_keyword("VALUES")?;
        self.expect(Token::LParen)?;
        let mut values = vec![self.parse_term()?];
        while matches!(self.peek(), Some(Token::Comma)) {
            self.advance();
            values.push(self.parse_term()?);
        }
        self.expect(Token::RParen)?;

        if values.len() != columns.len() {
            return Err(Error::sql_parsing(format!(
                "INSERT column count {} does not match value count {}",
                columns.len(),
                values.len()
            )));
        }

        Ok(Statement::Insert(InsertStatement {
            table,
            columns,
            values,
        }))
    }

    fn parse_update(&mut self) -> Result<Statement> {
        let table = self.expect_ident()?;
        self.expect_keyword("SET")?;

        let mut assignments = Vec::new();
        loop {
            let column = self.expect_ident()?;
            self.expect(Token::Eq)?;

            // `col = col + ?` распознаем по идентификатору в правой части
            let expr = if matches!(self.peek(), Some(Token::Ident(word)) if !word.eq_ignore_ascii_case("NULL"))
            {
                let source = self.expect_ident()?;
                let op = match self.advance() {
                    Some(Token::Plus) => DeltaOp::Add,
                    Some(Token::Minus) => DeltaOp::Sub,
                    found => {
                        return Err(Error::sql_parsing(format!(
                            "Expected '+' or '-' after column reference, found {:?}",
                            found
                        )));
                    }
                };
                let term = self.parse_term()?;
                AssignExpr::Delta {
                    column: source,
                    op,
                    term,
                }
            } else {
                AssignExpr::Term(self.parse_term()?)
            };

            assignments.push(Assignment { column, expr });
            if !matches!(self.peek(), Some(Token::Comma)) {
                break;
            }
            self.advance();
        }

        let filter = self.parse_where()?;
        Ok(Statement::Update(UpdateStatement {
            table,
            assignments,
            filter,
        }))
    }

    fn parse_delete(&mut self) -> Result<Statement> {
        self.expect_keyword("FROM")?;
        let table = self.expect_ident()?;
        let filter = self.parse_where()?;
        Ok(Statement::Delete(DeleteStatement { table, filter }))
    }

    fn parse_set_transaction(&mut self) -> Result<Statement> {
        self.expect_keyword("TRANSACTION")?;
        self.expect_keyword("ISOLATION")?;
        self.expect_keyword("LEVEL")?;

        let isolation = if self.accept_keyword("SERIALIZABLE") {
            IsolationLevel::Serializable
        } else if self.accept_keyword("READ") {
            self.expect_keyword("COMMITTED")?;
            IsolationLevel::ReadCommitted
        } else {
            return Err(Error::sql_parsing(format!(
                "Unknown isolation level: {:?}",
                self.peek()
            )));
        };

        Ok(Statement::SetTransaction { isolation })
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        let statement = if self.accept_keyword("SELECT") {
            self.parse_select()?
        } else if self.accept_keyword("INSERT") {
            self.parse_insert()?
        } else if self.accept_keyword("UPDATE") {
            self.parse_update()?
        } else if self.accept_keyword("DELETE") {
            self.parse_delete()?
        } else if self.accept_keyword("SET") {
            self.parse_set_transaction()?
        } else if self.accept_keyword("COMMIT") {
            Statement::Commit
        } else if self.accept_keyword("ROLLBACK") {
            Statement::Rollback
        } else {
            return Err(Error::sql_parsing(format!(
                "Unknown statement start: {:?}",
                self.peek()
            )));
        };

        if let Some(extra) = self.peek() {
            return Err(Error::sql_parsing(format!(
                "Unexpected trailing token: {:?}",
                extra
            )));
        }
        Ok(statement)
    }
}

/// Разбирает числовой литерал
fn parse_number(text: &str, negative: bool) -> Result<Value> {
    if text.contains('.') {
        let value: f64 = text
            .parse()
            .map_err(|_| Error::sql_parsing(format!("Invalid number literal: {}", text)))?;
        Ok(Value::Real(if negative { -value } else { value }))
    } else {
        let value: i64 = text
            .parse()
            .map_err(|_| Error::sql_parsing(format!("Invalid number literal: {}", text)))?;
        Ok(Value::Integer(if negative { -value } else { value }))
    }
}

/// Разбирает один SQL оператор
pub fn parse(sql: &str) -> Result<Statement> {
    let tokens = tokenize(sql)?;
    if tokens.is_empty() {
        return Err(Error::sql_parsing("Empty statement"));
    }
    Parser::new(tokens).parse_statement()
}
