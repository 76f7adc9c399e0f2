//! Database module
//!
//! Store-facing plumbing shared by contexts and entity sets:
//!
//! - **core**: SQLite connection wrapper, shared handle, schema management
//! - **params**: named parameter bags and `@Name` placeholder binding
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/           # Foundation
//! │   ├── connection  # SQLite DatabaseConn wrapper
//! │   ├── handle      # ConnectionHandle shared by all sets of a context
//! │   └── schema      # Schema creation and status checks
//! │
//! └── params          # Params and bind_named
//! ```

pub mod core;
pub mod params;

pub use core::{ConnectionHandle, DatabaseConn, SchemaManager, SchemaStatus};
pub use params::{bind_named, Params};
