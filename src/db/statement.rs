//! SQL text builders.
//!
//! Identifiers cannot be bound as parameters, so they are double-quoted here and
//! must already have been checked against the live schema by the caller. Every
//! cell value travels as a numbered `?N` parameter.

use super::{Column, FetchMode, Value};
use crate::error::{BrowseError, Result};

/// SQL text plus the parameters bound to its placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A WHERE clause matching a row by the full set of its prior values.
///
/// NULL cells compare with `IS NULL` since `= NULL` never matches. Duplicate rows
/// in the table all satisfy the same predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub clause: String,
    pub params: Vec<Value>,
}

impl Predicate {
    pub fn for_row(columns: &[Column], values: &[Value]) -> Result<Predicate> {
        Self::numbered_from(columns, values, 1)
    }

    fn numbered_from(columns: &[Column], values: &[Value], first: usize) -> Result<Predicate> {
        if columns.is_empty() {
            return Err(BrowseError::Mutation(
                "cannot match a row without columns".to_string(),
            ));
        }
        if columns.len() != values.len() {
            return Err(BrowseError::Mutation(format!(
                "row has {} values but the table has {} columns",
                values.len(),
                columns.len()
            )));
        }

        let mut terms = Vec::with_capacity(columns.len());
        let mut params = Vec::new();
        for (column, value) in columns.iter().zip(values) {
            let name = quote_identifier(&column.name);
            if value.is_null() {
                terms.push(format!("{} IS NULL", name));
            } else {
                params.push(value.clone());
                terms.push(format!("{} = ?{}", name, first + params.len() - 1));
            }
        }

        Ok(Predicate {
            clause: terms.join(" AND "),
            params,
        })
    }
}

pub fn select_statement(table: &str, mode: &FetchMode) -> Statement {
    let table = quote_identifier(table);
    match mode {
        FetchMode::Full => Statement {
            sql: format!("SELECT * FROM {}", table),
            params: Vec::new(),
        },
        FetchMode::Paged(window) => Statement {
            sql: format!("SELECT * FROM {} LIMIT ?1 OFFSET ?2", table),
            params: vec![
                Value::Integer(window.limit as i64),
                Value::Integer(window.offset as i64),
            ],
        },
        FetchMode::Filtered(search) => Statement {
            sql: format!(
                "SELECT * FROM {} WHERE {} LIKE ?1",
                table,
                quote_identifier(&search.column)
            ),
            params: vec![Value::Text(format!("%{}%", search.pattern))],
        },
    }
}

pub fn count_statement(table: &str) -> Statement {
    Statement {
        sql: format!("SELECT COUNT(*) FROM {}", quote_identifier(table)),
        params: Vec::new(),
    }
}

pub fn delete_statement(table: &str, columns: &[Column], prior: &[Value]) -> Result<Statement> {
    let predicate = Predicate::for_row(columns, prior)?;
    Ok(Statement {
        sql: format!(
            "DELETE FROM {} WHERE {}",
            quote_identifier(table),
            predicate.clause
        ),
        params: predicate.params,
    })
}

pub fn update_statement(
    table: &str,
    columns: &[Column],
    prior: &[Value],
    column: &str,
    new_value: &Value,
) -> Result<Statement> {
    // ?1 is the new value, the predicate numbers from ?2
    let predicate = Predicate::numbered_from(columns, prior, 2)?;
    let mut params = Vec::with_capacity(predicate.params.len() + 1);
    params.push(new_value.clone());
    params.extend(predicate.params);

    Ok(Statement {
        sql: format!(
            "UPDATE {} SET {} = ?1 WHERE {}",
            quote_identifier(table),
            quote_identifier(column),
            predicate.clause
        ),
        params,
    })
}

pub fn insert_statement(table: &str, values: &[Value]) -> Result<Statement> {
    if values.is_empty() {
        return Err(BrowseError::Mutation("cannot insert an empty row".to_string()));
    }
    let placeholders = (1..=values.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(Statement {
        sql: format!(
            "INSERT INTO {} VALUES ({}) RETURNING *",
            quote_identifier(table),
            placeholders
        ),
        params: values.to_vec(),
    })
}
