//! # LiteAdmin CLI
//!
//! LiteAdmin CLI is a terminal user interface for browsing and editing SQLite databases.
//! It opens a single database file, lists its tables and shows their rows a page at a time.
//!
//! ## Features
//!
//! - **Table Browsing**: Column names and declared types in the header, row or cell cursor
//! - **Pagination Support**: Fixed-size pages navigated with PageUp/PageDown (or `j`/`k`)
//! - **Search**: Substring match on a single column, cleared with Esc
//! - **Editing**: Delete rows, edit cells and add rows, each behind a confirmation step.
//!   Rows are addressed by their full prior values, so tables without a primary key work too
//!
//! ## Modules
//!
//! - `db`: SQLite access, identifier validation and parameterised statements
//! - `view`: Page cursor, row identity map and search filter for the open table
//! - `mutation`: Confirm/apply flow for delete, edit and insert
//! - `config`: Settings from `~/.liteadmin-cli/config.json` and the environment
//! - `logging`: Rolling log file
//! - `tui`: TUI rendering and interaction logic

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod mutation;
pub mod tui;
pub mod view;

#[cfg(test)]
mod test_support;

pub use config::Settings;
pub use db::StoreGateway;
pub use error::{BrowseError, Result};
