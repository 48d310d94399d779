use crate::error::{BrowseError, Result};
use crate::view::{PageWindow, SearchSpec};
use rusqlite::{Connection, OpenFlags, params_from_iter};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

mod statement;
mod value;

pub use statement::{Predicate, Statement, quote_identifier};
pub use value::{NULL_SENTINEL, Row, Value};

/// A column as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Declared type from the table definition; empty when none was declared.
    pub decl_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, decl_type: impl Into<String>) -> Column {
        Column {
            name: name.into(),
            decl_type: decl_type.into(),
        }
    }
}

/// How rows are selected for the current view.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchMode {
    Full,
    Paged(PageWindow),
    Filtered(SearchSpec),
}

/// Executes reads and writes against a SQLite database file.
///
/// Each call opens its own connection on the blocking pool and drops it before
/// returning, so nothing stays open between user actions. Writes are committed as
/// soon as the statement finishes.
///
/// Rows come back in SQLite's natural order. No `ORDER BY` is applied, and that
/// order may change after writes (for example after a `VACUUM` or a delete that
/// frees pages), so a page fetched twice is not guaranteed to hold the same rows.
#[derive(Debug, Clone)]
pub struct StoreGateway {
    path: Arc<PathBuf>,
    busy_timeout: Duration,
}

impl StoreGateway {
    /// Opens the database once to check that it exists and is readable.
    pub async fn open(path: impl Into<PathBuf>, busy_timeout: Duration) -> Result<StoreGateway> {
        let gateway = StoreGateway {
            path: Arc::new(path.into()),
            busy_timeout,
        };

        gateway
            .with_connection(|conn| {
                conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
                    row.get::<_, i64>(0)
                })
                .map_err(|e| BrowseError::Connection(format!("not a usable database: {}", e)))
            })
            .await?;

        tracing::info!(path = %gateway.path.display(), "opened database");
        Ok(gateway)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn list_tables(&self) -> Result<Vec<String>> {
        self.with_connection(|conn| table_names(conn)).await
    }

    pub async fn get_columns(&self, table: &str) -> Result<Vec<Column>> {
        let table = table.to_string();
        self.with_connection(move |conn| table_columns(conn, &table))
            .await
    }

    pub async fn fetch_all(&self, table: &str) -> Result<(Vec<Row>, Vec<Column>)> {
        self.fetch(table, &FetchMode::Full).await
    }

    pub async fn fetch_page(
        &self,
        table: &str,
        offset: usize,
        limit: usize,
    ) -> Result<(Vec<Row>, Vec<Column>)> {
        self.fetch(table, &FetchMode::Paged(PageWindow { offset, limit }))
            .await
    }

    pub async fn fetch_filtered(
        &self,
        table: &str,
        column: &str,
        pattern: &str,
    ) -> Result<(Vec<Row>, Vec<Column>)> {
        self.fetch(table, &FetchMode::Filtered(SearchSpec::new(column, pattern)))
            .await
    }

    pub async fn fetch(&self, table: &str, mode: &FetchMode) -> Result<(Vec<Row>, Vec<Column>)> {
        let table = table.to_string();
        let mode = mode.clone();
        self.with_connection(move |conn| {
            let columns = table_columns(conn, &table)?;
            if let FetchMode::Filtered(search) = &mode {
                ensure_column(&table, &columns, &search.column)?;
            }

            let stmt = statement::select_statement(&table, &mode);
            let rows = query_rows(conn, &stmt)?;
            tracing::debug!(table = %table, mode = ?mode, rows = rows.len(), "fetched rows");
            Ok((rows, columns))
        })
        .await
    }

    pub async fn row_count(&self, table: &str) -> Result<usize> {
        let table = table.to_string();
        self.with_connection(move |conn| {
            ensure_table(conn, &table)?;
            let stmt = statement::count_statement(&table);
            let count: i64 = conn
                .query_row(&stmt.sql, [], |row| row.get(0))
                .map_err(query_error)?;
            Ok(count.max(0) as usize)
        })
        .await
    }

    /// Deletes every row whose values equal `prior` position by position.
    ///
    /// Without a unique key, duplicate rows all match and are all deleted.
    pub async fn delete_row(&self, table: &str, prior: &[Value], columns: &[Column]) -> Result<usize> {
        let table = table.to_string();
        let prior = prior.to_vec();
        let columns = columns.to_vec();
        self.with_connection(move |conn| {
            let live = table_columns(conn, &table)?;
            for column in &columns {
                ensure_column(&table, &live, &column.name)?;
            }

            let stmt = statement::delete_statement(&table, &columns, &prior)?;
            let affected = execute_matching(conn, &stmt)?;
            tracing::info!(table = %table, affected, "deleted row");
            Ok(affected)
        })
        .await
    }

    /// Sets one column on the rows matching `prior`. Same matching rule as `delete_row`.
    pub async fn update_cell(
        &self,
        table: &str,
        prior: &[Value],
        columns: &[Column],
        column: &str,
        new_value: Value,
    ) -> Result<usize> {
        let table = table.to_string();
        let prior = prior.to_vec();
        let columns = columns.to_vec();
        let column = column.to_string();
        self.with_connection(move |conn| {
            let live = table_columns(conn, &table)?;
            for c in &columns {
                ensure_column(&table, &live, &c.name)?;
            }
            ensure_column(&table, &live, &column)?;

            let stmt = statement::update_statement(&table, &columns, &prior, &column, &new_value)?;
            let affected = execute_matching(conn, &stmt)?;
            tracing::info!(table = %table, column = %column, affected, "updated cell");
            Ok(affected)
        })
        .await
    }

    /// Inserts one row; `values` must cover every column in table order.
    ///
    /// Returns the row as stored, after affinity conversion and rowid assignment.
    pub async fn insert_row(&self, table: &str, values: &[Value]) -> Result<Row> {
        let table = table.to_string();
        let values = values.to_vec();
        self.with_connection(move |conn| {
            let live = table_columns(conn, &table)?;
            if live.len() != values.len() {
                return Err(BrowseError::Mutation(format!(
                    "table '{}' has {} columns but {} values were given",
                    table,
                    live.len(),
                    values.len()
                )));
            }

            let stmt = statement::insert_statement(&table, &values)?;
            tracing::debug!(sql = %stmt.sql, "executing");
            let mut prepared = conn.prepare(&stmt.sql).map_err(mutation_error)?;
            let width = prepared.column_count();
            let stored = prepared
                .query_row(params_from_iter(stmt.params.iter()), |row| {
                    (0..width)
                        .map(|i| row.get::<_, Value>(i))
                        .collect::<rusqlite::Result<Row>>()
                })
                .map_err(mutation_error)?;
            tracing::info!(table = %table, "inserted row");
            Ok(stored)
        })
        .await
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let path = Arc::clone(&self.path);
        let busy_timeout = self.busy_timeout;
        tokio::task::spawn_blocking(move || {
            let conn = open_connection(&path, busy_timeout)?;
            f(&conn)
        })
        .await
        .map_err(|e| BrowseError::Connection(format!("store task failed: {}", e)))?
    }
}

fn open_connection(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    // No SQLITE_OPEN_CREATE: a mistyped path must fail instead of creating an empty file
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_URI
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;

    let conn = Connection::open_with_flags(path, flags).map_err(|e| {
        BrowseError::Connection(format!("failed to open '{}': {}", path.display(), e))
    })?;
    conn.busy_timeout(busy_timeout)
        .map_err(|e| BrowseError::Connection(format!("failed to set busy timeout: {}", e)))?;
    Ok(conn)
}

fn table_names(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn
        .prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .map_err(query_error)?;
    let mut names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(query_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(query_error)?;

    names.sort();
    names.dedup();
    Ok(names)
}

fn ensure_table(conn: &Connection, table: &str) -> Result<()> {
    let found: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND name = ?1",
            [table],
            |row| row.get(0),
        )
        .map_err(query_error)?;

    if found == 0 {
        return Err(BrowseError::NoSuchTable(table.to_string()));
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<Vec<Column>> {
    ensure_table(conn, table)?;

    let mut stmt = conn
        .prepare("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")
        .map_err(query_error)?;
    stmt.query_map([table], |row| {
        Ok(Column {
            name: row.get(0)?,
            decl_type: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        })
    })
    .map_err(query_error)?
    .collect::<rusqlite::Result<Vec<_>>>()
    .map_err(query_error)
}

fn ensure_column(table: &str, columns: &[Column], column: &str) -> Result<()> {
    if columns.iter().any(|c| c.name == column) {
        Ok(())
    } else {
        Err(BrowseError::InvalidColumn {
            table: table.to_string(),
            column: column.to_string(),
        })
    }
}

fn query_rows(conn: &Connection, stmt: &Statement) -> Result<Vec<Row>> {
    tracing::debug!(sql = %stmt.sql, "executing");
    let mut prepared = conn.prepare(&stmt.sql).map_err(query_error)?;
    let width = prepared.column_count();

    prepared
        .query_map(params_from_iter(stmt.params.iter()), move |row| {
            (0..width)
                .map(|i| row.get::<_, Value>(i))
                .collect::<rusqlite::Result<Row>>()
        })
        .map_err(query_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(query_error)
}

/// Runs a predicate-based write. Zero matches is an error, several are allowed.
fn execute_matching(conn: &Connection, stmt: &Statement) -> Result<usize> {
    tracing::debug!(sql = %stmt.sql, "executing");
    let affected = conn
        .execute(&stmt.sql, params_from_iter(stmt.params.iter()))
        .map_err(mutation_error)?;

    match affected {
        0 => Err(BrowseError::Mutation(
            "no row matched the selected values; it may have been changed or removed".to_string(),
        )),
        1 => Ok(1),
        n => {
            tracing::warn!(affected = n, "predicate matched duplicate rows, all were affected");
            Ok(n)
        }
    }
}

fn query_error(e: rusqlite::Error) -> BrowseError {
    BrowseError::Query(e.to_string())
}

fn mutation_error(e: rusqlite::Error) -> BrowseError {
    BrowseError::Mutation(e.to_string())
}
