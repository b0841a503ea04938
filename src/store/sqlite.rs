// Local SQLite backend: same tables as the managed service, with the
// deduplication procedure implemented here.

use async_trait::async_trait;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::DataService;
use crate::error::{StoreError, StoreResult};
use crate::models::{Company, NewTransaction, Transaction, TransactionPage, TransactionWithCompany};
use crate::query::{Predicate, TransactionQuery};

/// Shared handle to one SQLite connection.
/// Blocking work runs on tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap a connection `setup_database` has already run on
    pub fn from_connection(conn: Connection) -> Self {
        SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Synchronous access for the CLI and tests
    pub fn with_connection<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T>,
    {
        let mut guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut guard)
    }

    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await?
    }
}

#[async_trait]
impl DataService for SqliteStore {
    async fn list_transactions(&self, query: &TransactionQuery) -> StoreResult<TransactionPage> {
        let query = query.clone();
        self.run(move |conn| list_transactions(conn, &query)).await
    }

    async fn update_transaction_status(&self, cnpj: &str, status: &str) -> StoreResult<Option<u64>> {
        let (cnpj, status) = (cnpj.to_string(), status.to_string());
        self.run(move |conn| {
            let updated = update_transaction_status(conn, &cnpj, &status)?;
            Ok(Some(updated as u64))
        })
        .await
    }

    async fn upsert_company(&self, company: &Company) -> StoreResult<()> {
        let company = company.clone();
        self.run(move |conn| upsert_company(conn, &company)).await
    }

    async fn remove_duplicate_transactions(&self) -> StoreResult<Option<u64>> {
        self.run(|conn| Ok(Some(remove_duplicate_transactions(conn)? as u64)))
            .await
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

/// SQL function folding case over all of Unicode; SQLite's `lower()` only folds ASCII
pub const UNICODE_LOWER: &str = "unicode_lower";

fn register_functions(conn: &Connection) -> StoreResult<()> {
    conn.create_scalar_function(
        UNICODE_LOWER,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let value: Option<String> = ctx.get(0)?;
            Ok(value.map(|v| v.to_lowercase()))
        },
    )?;
    Ok(())
}

/// Create tables and indexes and register the SQL functions queries rely on.
/// Must run on every connection before it is used.
pub fn setup_database(conn: &Connection) -> StoreResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    register_functions(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            nome_loja TEXT NOT NULL DEFAULT '',
            cpf_cnpj_loja TEXT NOT NULL,
            tid TEXT,
            nsu TEXT,
            status TEXT NOT NULL,
            data_transacao TEXT NOT NULL,
            valor REAL NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS companies_data (
            cnpj TEXT PRIMARY KEY,
            observation TEXT,
            tasks TEXT,
            attachment_url TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_cnpj ON transactions(cpf_cnpj_loja)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_order ON transactions(valor, data_transacao)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_nsu ON transactions(nsu, cpf_cnpj_loja)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// WRITES
// ============================================================================

/// Insert a batch in one SQLite transaction
pub fn insert_transactions(conn: &mut Connection, transactions: &[NewTransaction]) -> StoreResult<usize> {
    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO transactions (
                nome_loja, cpf_cnpj_loja, tid, nsu, status, data_transacao, valor
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;

        for t in transactions {
            stmt.execute(params![
                t.nome_loja,
                t.cpf_cnpj_loja,
                t.tid,
                t.nsu,
                t.status,
                t.data_transacao,
                t.valor,
            ])?;
        }
    }
    tx.commit()?;

    Ok(transactions.len())
}

pub fn update_transaction_status(conn: &Connection, cnpj: &str, status: &str) -> StoreResult<usize> {
    let updated = conn.execute(
        "UPDATE transactions SET status = ?1 WHERE cpf_cnpj_loja = ?2",
        params![status, cnpj],
    )?;
    Ok(updated)
}

/// Insert or fully replace the company row for `company.cnpj`
pub fn upsert_company(conn: &Connection, company: &Company) -> StoreResult<()> {
    let tasks_json = company
        .tasks
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO companies_data (cnpj, observation, tasks, attachment_url)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(cnpj) DO UPDATE SET
            observation = excluded.observation,
            tasks = excluded.tasks,
            attachment_url = excluded.attachment_url",
        params![company.cnpj, company.observation, tasks_json, company.attachment_url],
    )?;

    Ok(())
}

/// Delete transactions sharing (nsu, cpf_cnpj_loja) with an older row.
/// The lowest id of each group survives; rows without an NSU are never touched.
pub fn remove_duplicate_transactions(conn: &mut Connection) -> StoreResult<usize> {
    let tx = conn.transaction()?;
    let removed = tx.execute(
        "DELETE FROM transactions
         WHERE nsu IS NOT NULL
           AND id NOT IN (
               SELECT MIN(id) FROM transactions
               WHERE nsu IS NOT NULL
               GROUP BY nsu, cpf_cnpj_loja
           )",
        [],
    )?;
    tx.commit()?;

    debug!("removed {} duplicate transactions", removed);
    Ok(removed)
}

// ============================================================================
// READS
// ============================================================================

/// Escape LIKE wildcards so the search term matches literally
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// WHERE clause (possibly empty) and its bound values
fn where_clause(predicates: &[Predicate]) -> (String, Vec<SqlValue>) {
    let mut clauses = Vec::new();
    let mut values = Vec::new();

    for predicate in predicates {
        match predicate {
            Predicate::ContainsAny { columns, term } => {
                let pattern = like_pattern(term);
                let alternatives: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        values.push(SqlValue::Text(pattern.clone()));
                        format!(
                            "{}(COALESCE(t.{}, '')) LIKE ? ESCAPE '\\'",
                            UNICODE_LOWER,
                            c.name()
                        )
                    })
                    .collect();
                clauses.push(format!("({})", alternatives.join(" OR ")));
            }
            Predicate::Equals { column, value } => {
                clauses.push(format!("t.{} = ?", column.name()));
                values.push(SqlValue::Text(value.clone()));
            }
            Predicate::GreaterThan { column, value } => {
                clauses.push(format!("t.{} > ?", column.name()));
                values.push(SqlValue::Real(*value));
            }
        }
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), values)
    }
}

fn row_to_record(row: &Row) -> rusqlite::Result<TransactionWithCompany> {
    let company_cnpj: Option<String> = row.get(8)?;
    let companies_data = match company_cnpj {
        Some(cnpj) => {
            let tasks_json: Option<String> = row.get(10)?;
            let tasks = tasks_json
                .map(|s| serde_json::from_str(&s))
                .transpose()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(10, Type::Text, Box::new(e)))?;

            Some(Company {
                cnpj,
                observation: row.get(9)?,
                tasks,
                attachment_url: row.get(11)?,
            })
        }
        None => None,
    };

    Ok(TransactionWithCompany {
        transaction: Transaction {
            id: Value::from(row.get::<_, i64>(0)?),
            nome_loja: row.get(1)?,
            cpf_cnpj_loja: row.get(2)?,
            tid: row.get(3)?,
            nsu: row.get(4)?,
            status: row.get(5)?,
            data_transacao: row.get(6)?,
            valor: row.get(7)?,
            extra: Map::new(),
        },
        companies_data,
    })
}

pub fn list_transactions(conn: &Connection, query: &TransactionQuery) -> StoreResult<TransactionPage> {
    let (filter_sql, mut values) = where_clause(&query.predicates);

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM transactions t {}", filter_sql),
        params_from_iter(values.iter()),
        |row| row.get(0),
    )?;

    let mut order: Vec<String> = query
        .order
        .iter()
        .map(|k| format!("t.{} {}", k.column.name(), if k.descending { "DESC" } else { "ASC" }))
        .collect();
    order.push("t.id ASC".to_string());

    let sql = format!(
        "SELECT t.id, t.nome_loja, t.cpf_cnpj_loja, t.tid, t.nsu, t.status,
                t.data_transacao, t.valor,
                c.cnpj, c.observation, c.tasks, c.attachment_url
         FROM transactions t
         LEFT JOIN companies_data c ON c.cnpj = t.cpf_cnpj_loja
         {}
         ORDER BY {}
         LIMIT ? OFFSET ?",
        filter_sql,
        order.join(", ")
    );

    values.push(SqlValue::Integer(query.window.limit.min(i64::MAX as u64) as i64));
    values.push(SqlValue::Integer(query.window.offset.min(i64::MAX as u64) as i64));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), row_to_record)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TransactionPage {
        rows,
        total: total.max(0) as u64,
    })
}

pub fn get_company(conn: &Connection, cnpj: &str) -> StoreResult<Option<Company>> {
    let row = conn
        .query_row(
            "SELECT cnpj, observation, tasks, attachment_url FROM companies_data WHERE cnpj = ?1",
            [cnpj],
            |row| -> rusqlite::Result<(String, Option<String>, Option<String>, Option<String>)> {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            },
        )
        .optional()?;

    match row {
        Some((cnpj, observation, tasks, attachment_url)) => Ok(Some(Company {
            cnpj,
            observation,
            tasks: tasks.map(|s| serde_json::from_str(&s)).transpose()?,
            attachment_url,
        })),
        None => Ok(None),
    }
}

pub fn count_transactions(conn: &Connection) -> StoreResult<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
    Ok(count)
}
