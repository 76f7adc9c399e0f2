//! Shared access to a context's connection
//!
//! Every entity set of a context issues its statements through the same
//! [`ConnectionHandle`]. Statements run one at a time under the handle's
//! mutex; the async path moves the store call onto tokio's blocking pool so
//! the calling task only suspends at that boundary.

use std::sync::{Arc, Mutex, PoisonError};

use super::connection::DatabaseConn;
use crate::error::{Error, Result};

/// Cloneable handle to a single SQLite connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<Mutex<Option<DatabaseConn>>>,
}

impl ConnectionHandle {
    pub fn new(db: DatabaseConn) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(db))),
        }
    }

    /// Run `f` against the connection on the current thread.
    ///
    /// Fails with [`Error::Closed`] once the connection has been closed.
    pub fn with<R>(&self, f: impl FnOnce(&DatabaseConn) -> Result<R>) -> Result<R> {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(db) => f(db),
            None => Err(Error::Closed),
        }
    }

    /// Run `f` against the connection on the blocking thread pool.
    pub async fn run<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&DatabaseConn) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let handle = self.clone();
        tokio::task::spawn_blocking(move || handle.with(f)).await?
    }

    /// Close the connection. Returns `false` if it was already closed.
    pub fn close(&self) -> Result<bool> {
        let taken = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(db) => {
                db.conn.close().map_err(|(_, e)| Error::Store(e))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::params::Params;

    fn handle() -> ConnectionHandle {
        let handle = ConnectionHandle::new(DatabaseConn::open_in_memory().unwrap());
        handle
            .with(|db| db.execute_batch("CREATE TABLE t (v INTEGER)"))
            .unwrap();
        handle
    }

    #[test]
    fn test_with_and_close() {
        let handle = handle();
        let clone = handle.clone();

        clone
            .with(|db| db.execute("INSERT INTO t (v) VALUES (1)", &Params::new()))
            .unwrap();

        assert!(handle.close().unwrap());
        assert!(!handle.close().unwrap());
        assert!(clone.is_closed());
        assert!(matches!(
            clone.with(|db| db.execute_batch("SELECT 1")),
            Err(Error::Closed)
        ));
    }

    #[tokio::test]
    async fn test_run_on_blocking_pool() {
        let handle = handle();

        let affected = handle
            .run(|db| db.execute("INSERT INTO t (v) VALUES (@V)", &Params::new().with("V", 7_i64)))
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let v: i64 = handle
            .run(|db| db.query_scalar("SELECT v FROM t", &Params::new()))
            .await
            .unwrap();
        assert_eq!(v, 7);
    }
}
