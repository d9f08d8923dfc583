//! Row operations shared by [`crate::Store`] and [`crate::TransactionContext`]
//!
//! Everything here runs against a caller-supplied connection, which is either
//! a pooled connection in autocommit mode or one inside an open transaction.

use crate::schema::TableSql;
use kvstore_core::{Codec, Direction, KvError, Result};
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use std::ops::ControlFlow;

fn storage(e: rusqlite::Error) -> KvError {
    KvError::Storage(e.to_string())
}

/// A table name bound to its statements and codec
#[derive(Debug, Clone)]
pub(crate) struct Table<C> {
    name: String,
    sql: TableSql,
    codec: C,
}

impl<C> Table<C> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<C: Codec> Table<C> {
    pub fn new(name: &str, codec: C) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            sql: TableSql::new(name)?,
            codec,
        })
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// `NotFound` error naming the rendered key
    pub fn not_found(&self, encoded_key: &str) -> KvError {
        KvError::NotFound(format!(
            "key {} in table {}",
            self.codec.render_key(encoded_key),
            self.name
        ))
    }

    pub fn fetch_raw(&self, conn: &Connection, encoded_key: &str) -> Result<Option<String>> {
        let mut stmt = conn.prepare_cached(&self.sql.select_value).map_err(storage)?;
        stmt.query_row([encoded_key], |row| row.get(0))
            .optional()
            .map_err(storage)
    }

    pub fn fetch<V: DeserializeOwned>(
        &self,
        conn: &Connection,
        encoded_key: &str,
    ) -> Result<Option<V>> {
        match self.fetch_raw(conn, encoded_key)? {
            Some(text) => self.codec.decode(&text).map(Some),
            None => Ok(None),
        }
    }

    pub fn exists(&self, conn: &Connection, encoded_key: &str) -> Result<bool> {
        let mut stmt = conn.prepare_cached(&self.sql.exists).map_err(storage)?;
        stmt.exists([encoded_key]).map_err(storage)
    }

    pub fn put(&self, conn: &Connection, encoded_key: &str, encoded_value: &str) -> Result<()> {
        let mut stmt = conn.prepare_cached(&self.sql.upsert).map_err(storage)?;
        stmt.execute([encoded_key, encoded_value]).map_err(storage)?;
        Ok(())
    }

    /// Returns the number of rows removed (0 or 1)
    pub fn remove(&self, conn: &Connection, encoded_key: &str) -> Result<usize> {
        let mut stmt = conn.prepare_cached(&self.sql.delete).map_err(storage)?;
        stmt.execute([encoded_key]).map_err(storage)
    }

    pub fn truncate(&self, conn: &Connection) -> Result<usize> {
        conn.execute(&self.sql.clear, []).map_err(storage)
    }

    pub fn count(&self, conn: &Connection) -> Result<u64> {
        let count: i64 = conn
            .query_row(&self.sql.count, [], |row| row.get(0))
            .map_err(storage)?;
        Ok(count as u64)
    }

    /// Stream rows in key order until `f` breaks or fails
    ///
    /// Rows are decoded one at a time; breaking drops the statement, which
    /// resets the cursor without reading the remaining rows.
    pub fn scan<K, V, F>(&self, conn: &Connection, direction: Direction, mut f: F) -> Result<()>
    where
        K: DeserializeOwned,
        V: DeserializeOwned,
        F: FnMut(K, V) -> Result<ControlFlow<()>>,
    {
        let mut stmt = conn.prepare_cached(self.sql.scan(direction)).map_err(storage)?;
        let mut rows = stmt.query([]).map_err(storage)?;

        while let Some(row) = rows.next().map_err(storage)? {
            let key_text: String = row.get(0).map_err(storage)?;
            let value_text: String = row.get(1).map_err(storage)?;
            let key = self.codec.decode(&key_text)?;
            let value = self.codec.decode(&value_text)?;
            if f(key, value)?.is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Key-only variant of [`Table::scan`]
    pub fn scan_keys<K, F>(&self, conn: &Connection, direction: Direction, mut f: F) -> Result<()>
    where
        K: DeserializeOwned,
        F: FnMut(K) -> Result<ControlFlow<()>>,
    {
        let mut stmt = conn.prepare_cached(self.sql.keys(direction)).map_err(storage)?;
        let mut rows = stmt.query([]).map_err(storage)?;

        while let Some(row) = rows.next().map_err(storage)? {
            let key_text: String = row.get(0).map_err(storage)?;
            if f(self.codec.decode(&key_text)?)?.is_break() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::create_table;
    use kvstore_core::JsonCodec;

    fn setup() -> (Connection, Table<JsonCodec>) {
        let conn = Connection::open_in_memory().unwrap();
        create_table(&conn, "t").unwrap();
        (conn, Table::new("t", JsonCodec).unwrap())
    }

    #[test]
    fn test_fetch_put_remove() {
        let (conn, table) = setup();
        let key = table.codec().encode("a").unwrap();

        assert_eq!(table.fetch::<u32>(&conn, &key).unwrap(), None);
        table.put(&conn, &key, "7").unwrap();
        assert_eq!(table.fetch::<u32>(&conn, &key).unwrap(), Some(7));
        assert!(table.exists(&conn, &key).unwrap());

        assert_eq!(table.remove(&conn, &key).unwrap(), 1);
        assert_eq!(table.remove(&conn, &key).unwrap(), 0);
        assert!(!table.exists(&conn, &key).unwrap());
    }

    #[test]
    fn test_scan_stops_early() {
        let (conn, table) = setup();
        for (i, k) in ["c", "a", "b"].iter().enumerate() {
            table
                .put(&conn, &table.codec().encode(k).unwrap(), &i.to_string())
                .unwrap();
        }

        let mut seen = Vec::new();
        table
            .scan::<String, u32, _>(&conn, Direction::Backward, |k, _| {
                seen.push(k);
                Ok(if seen.len() == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                })
            })
            .unwrap();
        assert_eq!(seen, vec!["c".to_string(), "b".to_string()]);

        // Cursor was released: the connection can write again
        table.truncate(&conn).unwrap();
        assert_eq!(table.count(&conn).unwrap(), 0);
    }

    #[test]
    fn test_not_found_renders_key() {
        let (_conn, table) = setup();
        let err = table.not_found(&table.codec().encode("user:1").unwrap());
        assert_eq!(err.to_string(), "Not found: key user:1 in table t");
    }
}
