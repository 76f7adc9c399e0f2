//! The record-type contract
//!
//! An [`Entity`] is a plain struct with a store-generated `RowId`. It
//! describes its columns once through [`Entity::descriptor`] and converts to
//! and from rows through named parameters and [`rusqlite::Row`].

use std::any::TypeId;
use std::sync::Arc;

use crate::database::Params;
use crate::error::Result;
use crate::mapping::{DefinitionCache, TableDefinition, TypeDescriptor};

/// Value of `RowId` for an entity that has not been stored.
pub const UNSET_ROW_ID: i64 = 0;

/// A record type that can be stored in an [`EntitySet`](crate::EntitySet).
///
/// ```rust,ignore
/// impl Entity for Order {
///     fn descriptor() -> TypeDescriptor {
///         TypeDescriptor::new("Order")
///             .field(Field::of::<String>("CustomerName").indexed())
///             .field(Field::of::<i32>("Amount"))
///     }
///
///     fn row_id(&self) -> i64 { self.row_id }
///     fn set_row_id(&mut self, row_id: i64) { self.row_id = row_id }
///
///     fn to_params(&self) -> Params {
///         Params::new()
///             .with("CustomerName", self.customer_name.clone())
///             .with("Amount", self.amount)
///     }
///
///     fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
///         Ok(Order {
///             row_id: row.get("RowId")?,
///             customer_name: row.get("CustomerName")?,
///             amount: row.get("Amount")?,
///         })
///     }
/// }
/// ```
pub trait Entity: Sized + Send + 'static {
    /// Columns and attributes of the record type.
    fn descriptor() -> TypeDescriptor;

    /// The store-generated identity; [`UNSET_ROW_ID`] before the first insert.
    fn row_id(&self) -> i64;

    fn set_row_id(&mut self, row_id: i64);

    /// Named values for every mapped column. `RowId` is supplied by the set.
    fn to_params(&self) -> Params;

    /// Rebuild a value from a row produced by the select template.
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;

    /// The cached table definition for this type.
    fn definition() -> Result<Arc<TableDefinition>> {
        DefinitionCache::global().get_or_build(TypeId::of::<Self>(), Self::descriptor)
    }

    /// Whether the entity has been assigned an identity by the store.
    fn is_stored(&self) -> bool {
        self.row_id() != UNSET_ROW_ID
    }
}
