use thiserror::Error;

use crate::view::RowHandle;

/// Errors raised by the store gateway and the table-state core.
#[derive(Debug, Error)]
pub enum BrowseError {
    /// The database file could not be opened or is not a database.
    #[error("connection error: {0}")]
    Connection(String),

    #[error("no such table: {0}")]
    NoSuchTable(String),

    #[error("no column '{column}' in table '{table}'")]
    InvalidColumn { table: String, column: String },

    /// An insert, update or delete was rejected by the store or matched no row.
    #[error("{0}")]
    Mutation(String),

    /// A handle issued for an earlier view was used after the view was reloaded.
    #[error("unknown row handle {0}")]
    UnknownHandle(RowHandle),

    #[error("query failed: {0}")]
    Query(String),

    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl BrowseError {
    /// True for errors that signal a defect in the caller rather than a store failure.
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            BrowseError::UnknownHandle(_) | BrowseError::InvalidTransition { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, BrowseError>;
