#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! sqlset - attribute-driven SQLite mapping
//!
//! sqlset turns a plain record type into SQLite DDL and parameterized command
//! templates, then exposes a typed entity-set facade that runs those templates
//! with cancelable lifecycle hooks, in both blocking and async forms.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - **[`mapping`]**: record-type descriptions and table definitions
//!   - `attributes`: `Field`, `SemanticType`, `TypeDescriptor`
//!   - `definition`: `TableDefinition` and the process-wide `DefinitionCache`
//! - **[`database`]**: connection wrapper, shared handle, schema management,
//!   named parameter binding
//! - **[`entity`]**: the `Entity` trait implemented by record types
//! - **[`entity_set`]**: `EntitySet<T>`, the per-type CRUD facade and its hooks
//! - **[`context`]**: `Context`, owning the connection and the declared sets
//! - **[`config`]**: configuration file and connection settings
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use sqlset::{Context, DbSchema, Entity, EntitySet, Field, Params, SetRegistry, TypeDescriptor};
//!
//! struct Shop {
//!     orders: EntitySet<Order>,
//! }
//!
//! impl DbSchema for Shop {
//!     fn declare(registry: &mut SetRegistry) -> sqlset::Result<Self> {
//!         Ok(Shop { orders: registry.set("Orders")? })
//!     }
//! }
//!
//! let shop = Context::<Shop>::builder().path("shop.sqlite3").open()?;
//!
//! shop.orders.on_before_update(|args| {
//!     if args.entity.city == "Leon" {
//!         args.entity.city = "Atlanta".to_string();
//!     }
//! });
//!
//! let mut order = Order::new("Peter", "Boston");
//! shop.orders.insert(&mut order)?;
//!
//! let peters = shop.orders.select(
//!     "CustomerName = @CustomerName",
//!     Params::new().with("CustomerName", "Peter"),
//! )?;
//! ```
//!
//! # Logging
//!
//! Every SQL command is logged at `debug` level under the `sqlset::sql`
//! target; schema creation and context lifecycle are logged at `info`. The
//! library installs no subscriber.

pub mod config;
pub mod context;
pub mod database;
pub mod entity;
pub mod entity_set;
pub mod error;
pub mod mapping;

#[cfg(test)]
mod testing;

// =============================================================================
// Configuration
// =============================================================================

pub use config::{ConnectionSettings, SqlsetConfig};

// =============================================================================
// Errors
// =============================================================================

pub use error::{Error, Result};

// =============================================================================
// Mapping
// =============================================================================

pub use mapping::{
    Affinity, ColumnType, DefinitionCache, Field, SemanticType, TableDefinition, TypeDescriptor,
    DEFAULT_STRING_LENGTH, IDENTITY_QUERY, ROW_ID,
};

// =============================================================================
// Database
// =============================================================================

pub use database::{ConnectionHandle, DatabaseConn, Params, SchemaManager, SchemaStatus};

// =============================================================================
// Entities and contexts
// =============================================================================

pub use context::{Context, ContextBuilder, ContextEntry, ContextRegistry, DbSchema, SetRegistry};
pub use entity::{Entity, UNSET_ROW_ID};
pub use entity_set::{AnySet, EntityEvent, EntityEventArgs, EntitySet};
