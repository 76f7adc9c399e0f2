//! Record-type mapping
//!
//! - **attributes**: the structural description a record type gives of itself
//! - **definition**: DDL and command-template generation, plus the definition cache

mod attributes;
mod definition;

pub use attributes::{ColumnType, Field, SemanticType, TypeDescriptor, DEFAULT_STRING_LENGTH};
pub use definition::{
    Affinity, ColumnDefinition, DefinitionBuilder, DefinitionCache, TableDefinition,
    IDENTITY_QUERY, ROW_ID,
};
