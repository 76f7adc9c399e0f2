//! Database connection management
//!
//! This module provides the SQLite connection wrapper owned by a context.

use rusqlite::Connection;
use tracing::debug;

use crate::config::ConnectionSettings;
use crate::database::params::{bind_named, Params};
use crate::error::Result;

/// Core database connection wrapper
///
/// `DatabaseConn` provides a thin wrapper around SQLite connections,
/// handling both file-based and in-memory databases with consistent
/// configuration. All statement execution goes through the named-parameter
/// binder so `@Name` placeholders resolve against [`Params`].
pub struct DatabaseConn {
    pub conn: Connection,
}

impl DatabaseConn {
    /// Open a database at the specified path
    ///
    /// If the path is `None`, an in-memory database is created.
    pub fn open(path: Option<&str>, settings: &ConnectionSettings) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)?,
            None => Connection::open_in_memory()?,
        };

        let db = DatabaseConn { conn };
        db.configure(settings)?;
        Ok(db)
    }

    /// Create an in-memory database with default settings
    pub fn open_in_memory() -> Result<Self> {
        Self::open(None, &ConnectionSettings::default())
    }

    /// Apply connection pragmas
    fn configure(&self, settings: &ConnectionSettings) -> Result<()> {
        // journal_mode reports the resulting mode as a row
        let mode: String = self.conn.query_row(
            &format!("PRAGMA journal_mode={}", settings.journal_mode),
            [],
            |row| row.get(0),
        )?;
        debug!("journal mode set to {}", mode);

        self.conn
            .execute_batch(&format!("PRAGMA synchronous={}", settings.synchronous))?;

        self.conn.execute_batch(if settings.foreign_keys {
            "PRAGMA foreign_keys=ON"
        } else {
            "PRAGMA foreign_keys=OFF"
        })?;

        self.conn
            .busy_timeout(std::time::Duration::from_millis(settings.busy_timeout_ms))?;

        Ok(())
    }

    /// Execute a statement with named parameters, returning the affected row count
    pub fn execute(&self, sql: &str, params: &Params) -> Result<usize> {
        debug!(target: "sqlset::sql", "{}", sql);
        let mut stmt = self.conn.prepare(sql)?;
        bind_named(&mut stmt, params)?;
        Ok(stmt.raw_execute()?)
    }

    /// Execute a statement and read a single value from its first row
    pub fn query_scalar<V: rusqlite::types::FromSql>(&self, sql: &str, params: &Params) -> Result<V> {
        debug!(target: "sqlset::sql", "{}", sql);
        let mut stmt = self.conn.prepare(sql)?;
        bind_named(&mut stmt, params)?;
        let mut rows = stmt.raw_query();
        match rows.next()? {
            Some(row) => Ok(row.get(0)?),
            None => Err(rusqlite::Error::QueryReturnedNoRows.into()),
        }
    }

    /// Run a query and map every row
    pub fn query_map<T, F>(&self, sql: &str, params: &Params, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
    {
        debug!(target: "sqlset::sql", "{}", sql);
        let mut stmt = self.conn.prepare(sql)?;
        bind_named(&mut stmt, params)?;
        let mut rows = stmt.raw_query();
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(f(row)?);
        }
        Ok(result)
    }

    /// Execute several `;`-separated statements without parameters
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        debug!(target: "sqlset::sql", "{}", sql);
        Ok(self.conn.execute_batch(sql)?)
    }

    /// Begin an unchecked transaction
    ///
    /// This is useful for batch operations where we want to commit
    /// multiple statements atomically.
    pub fn transaction(&self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self.conn.unchecked_transaction()?)
    }

    /// Check if a table exists in the database
    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Check if an index exists in the database
    pub fn index_exists(&self, index_name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name=?1",
            [index_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = DatabaseConn::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn test_open_file_applies_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.db");
        let db = DatabaseConn::open(
            Some(path.to_str().unwrap()),
            &ConnectionSettings::default(),
        )
        .unwrap();

        let mode: String = db
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        let fk: i64 = db
            .conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn test_execute_with_named_params() {
        let db = DatabaseConn::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE test_table (name TEXT, qty INTEGER)")
            .unwrap();

        let affected = db
            .execute(
                "INSERT INTO test_table (name, qty) VALUES (@Name, @Qty)",
                &Params::new().with("Name", "bolt").with("Qty", 4_i64),
            )
            .unwrap();
        assert_eq!(affected, 1);

        let qty: i64 = db
            .query_scalar(
                "SELECT qty FROM test_table WHERE name = @Name",
                &Params::new().with("Name", "bolt"),
            )
            .unwrap();
        assert_eq!(qty, 4);
    }

    #[test]
    fn test_query_map() {
        let db = DatabaseConn::open_in_memory().unwrap();
        db.execute_batch(
            "CREATE TABLE test_table (id INTEGER PRIMARY KEY);
             INSERT INTO test_table (id) VALUES (1), (2), (3);",
        )
        .unwrap();

        let ids: Vec<i64> = db
            .query_map(
                "SELECT id FROM test_table WHERE id > @Min ORDER BY id",
                &Params::new().with("Min", 1_i64),
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_query_scalar_no_rows() {
        let db = DatabaseConn::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE test_table (id INTEGER)").unwrap();

        let result: Result<i64> = db.query_scalar("SELECT id FROM test_table", &Params::new());
        assert!(result.is_err());
    }

    #[test]
    fn test_table_exists() {
        let db = DatabaseConn::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE test_table (id INTEGER PRIMARY KEY)")
            .unwrap();

        assert!(db.table_exists("test_table").unwrap());
        assert!(!db.table_exists("nonexistent_table").unwrap());
    }

    #[test]
    fn test_bad_sql_is_store_error() {
        let db = DatabaseConn::open_in_memory().unwrap();
        let err = db.execute("DELETE FROM nowhere", &Params::new()).unwrap_err();
        assert!(err.as_store().is_some());
    }
}
