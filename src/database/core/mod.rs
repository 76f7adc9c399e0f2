//! Core database infrastructure
//!
//! This module provides the foundational database components used by contexts:
//! - `DatabaseConn`: Core SQLite connection wrapper with configuration
//! - `ConnectionHandle`: Shared, closable access to one connection (sync and async)
//! - `SchemaManager`: Schema creation and inspection

mod connection;
mod handle;
mod schema;

pub use connection::DatabaseConn;
pub use handle::ConnectionHandle;
pub use schema::{SchemaManager, SchemaStatus};
