//! Table naming and DDL
//!
//! Every store is one two-column table: the encoded key as `TEXT PRIMARY KEY`
//! and the encoded value. Table names are interpolated into SQL, so they are
//! validated up front and always emitted quoted.

use kvstore_core::{Direction, KvError, Result};
use rusqlite::Connection;

/// Check that `name` is usable as a store's table name
///
/// Accepts ASCII letters, digits and `_`, not starting with a digit. Names in
/// SQLite's reserved `sqlite_` namespace are rejected.
pub fn validate_table_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if !valid_start || !valid_rest {
        return Err(KvError::Config(format!("invalid table name {:?}", name)));
    }
    if name.to_ascii_lowercase().starts_with("sqlite_") {
        return Err(KvError::Config(format!(
            "table name {:?} is reserved by SQLite",
            name
        )));
    }
    Ok(())
}

/// Create the store's table if it does not exist yet
pub fn create_table(conn: &Connection, table: &str) -> Result<()> {
    validate_table_name(table)?;
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL
        )",
        table
    ))
    .map_err(|e| KvError::Storage(e.to_string()))
}

/// Pre-rendered statements for one table
#[derive(Debug, Clone)]
pub struct TableSql {
    pub select_value: String,
    pub exists: String,
    pub upsert: String,
    pub delete: String,
    pub clear: String,
    pub count: String,
    scan_asc: String,
    scan_desc: String,
    keys_asc: String,
    keys_desc: String,
}

impl TableSql {
    /// Render the statements for a validated table name
    pub fn new(table: &str) -> Result<Self> {
        validate_table_name(table)?;
        let t = format!("\"{}\"", table);
        let scan = |d: Direction| format!("SELECT key, value FROM {} ORDER BY key {}", t, d.as_sql());
        let keys = |d: Direction| format!("SELECT key FROM {} ORDER BY key {}", t, d.as_sql());
        Ok(Self {
            select_value: format!("SELECT value FROM {} WHERE key = ?1", t),
            exists: format!("SELECT 1 FROM {} WHERE key = ?1", t),
            upsert: format!("INSERT OR REPLACE INTO {} (key, value) VALUES (?1, ?2)", t),
            delete: format!("DELETE FROM {} WHERE key = ?1", t),
            clear: format!("DELETE FROM {}", t),
            count: format!("SELECT COUNT(*) FROM {}", t),
            scan_asc: scan(Direction::Forward),
            scan_desc: scan(Direction::Backward),
            keys_asc: keys(Direction::Forward),
            keys_desc: keys(Direction::Backward),
        })
    }

    pub fn scan(&self, direction: Direction) -> &str {
        match direction {
            Direction::Forward => &self.scan_asc,
            Direction::Backward => &self.scan_desc,
        }
    }

    pub fn keys(&self, direction: Direction) -> &str {
        match direction {
            Direction::Forward => &self.keys_asc,
            Direction::Backward => &self.keys_desc,
        }
    }
}
