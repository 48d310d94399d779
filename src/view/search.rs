use crate::db::{Column, FetchMode, Row, StoreGateway};
use crate::error::{BrowseError, Result};
use serde::{Deserialize, Serialize};

/// A substring search on one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSpec {
    pub column: String,
    /// Matched with SQLite `LIKE`, so `%` and `_` keep their wildcard meaning.
    pub pattern: String,
}

impl SearchSpec {
    pub fn new(column: impl Into<String>, pattern: impl Into<String>) -> SearchSpec {
        SearchSpec {
            column: column.into(),
            pattern: pattern.into(),
        }
    }
}

/// Turns a column search into a filtered, unpaginated fetch.
pub struct SearchFilter<'a> {
    gateway: &'a StoreGateway,
}

impl<'a> SearchFilter<'a> {
    pub fn new(gateway: &'a StoreGateway) -> Self {
        SearchFilter { gateway }
    }

    /// Checks the column against `columns` before touching the store.
    pub async fn apply(
        &self,
        table: &str,
        columns: &[Column],
        search: &SearchSpec,
    ) -> Result<(Vec<Row>, Vec<Column>)> {
        if !columns.iter().any(|c| c.name == search.column) {
            return Err(BrowseError::InvalidColumn {
                table: table.to_string(),
                column: search.column.clone(),
            });
        }

        tracing::debug!(table = %table, column = %search.column, pattern = %search.pattern, "searching");
        self.gateway
            .fetch(table, &FetchMode::Filtered(search.clone()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Value;
    use crate::test_support::scratch_gateway;

    const TICKETS: &str = "CREATE TABLE tickets (id INTEGER, status TEXT);
        INSERT INTO tickets VALUES (1, 'open'), (2, 'closed'), (3, 'reopened'), (4, 'Open');";

    #[tokio::test]
    async fn test_apply_returns_substring_matches() {
        let (_dir, gateway) = scratch_gateway(TICKETS).await;
        let columns = gateway.get_columns("tickets").await.unwrap();

        let (rows, _) = SearchFilter::new(&gateway)
            .apply("tickets", &columns, &SearchSpec::new("status", "open"))
            .await
            .unwrap();

        // SQLite LIKE folds ASCII case by default
        let ids: Vec<&Value> = rows.iter().map(|r| &r[0]).collect();
        assert_eq!(
            ids,
            vec![&Value::Integer(1), &Value::Integer(3), &Value::Integer(4)]
        );
    }

    #[tokio::test]
    async fn test_apply_rejects_unknown_column() {
        let (_dir, gateway) = scratch_gateway(TICKETS).await;
        let columns = gateway.get_columns("tickets").await.unwrap();

        let err = SearchFilter::new(&gateway)
            .apply("tickets", &columns, &SearchSpec::new("owner", "x"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, BrowseError::InvalidColumn { ref column, .. } if column == "owner")
        );
    }
}
