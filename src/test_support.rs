use crate::db::StoreGateway;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

pub const ACCOUNTS_SCHEMA: &str = "CREATE TABLE accounts (id INTEGER, name TEXT, note TEXT);";

/// Creates a database file in a fresh temp dir and runs `sql` against it.
pub fn scratch_db(sql: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("scratch.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch(sql).unwrap();
    (temp_dir, path)
}

pub async fn scratch_gateway(sql: &str) -> (TempDir, StoreGateway) {
    let (temp_dir, path) = scratch_db(sql);
    let gateway = StoreGateway::open(path, Duration::from_secs(1)).await.unwrap();
    (temp_dir, gateway)
}

/// `CREATE TABLE events (n INTEGER)` holding 1..=count.
pub fn events_schema(count: usize) -> String {
    format!(
        "CREATE TABLE events (n INTEGER);
         WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < {count})
         INSERT INTO events SELECT x FROM c;"
    )
}
