//! Table definitions and the process-wide definition cache
//!
//! [`DefinitionBuilder`] turns a [`TypeDescriptor`] into a [`TableDefinition`]:
//! the `CREATE TABLE`/`CREATE INDEX` DDL plus the parameterized command
//! templates used by entity sets. Definitions are built once per record type
//! and memoized in a [`DefinitionCache`].

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::debug;

use super::attributes::{Field, SemanticType, TypeDescriptor, DEFAULT_STRING_LENGTH};
use crate::error::{Error, Result};

/// Name of the store-generated identity column.
pub const ROW_ID: &str = "RowId";

/// Query appended to the insert template so it yields the generated identity.
pub const IDENTITY_QUERY: &str = "SELECT last_insert_rowid();";

/// SQLite storage class assigned to a mapped column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affinity {
    /// `NVARCHAR(n)`; SQLite resolves it to TEXT affinity.
    NVarChar(usize),
    Integer,
    Numeric,
    Text,
    DateTime,
    Blob,
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Affinity::NVarChar(n) => write!(f, "NVARCHAR({})", n),
            Affinity::Integer => f.write_str("INTEGER"),
            Affinity::Numeric => f.write_str("NUMERIC"),
            Affinity::Text => f.write_str("TEXT"),
            Affinity::DateTime => f.write_str("DATETIME"),
            Affinity::Blob => f.write_str("BLOB"),
        }
    }
}

/// A column emitted into the table DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: &'static str,
    pub affinity: Affinity,
    pub nullable: bool,
    /// Maximum string length enforced with a CHECK constraint.
    pub length_check: Option<usize>,
}

impl ColumnDefinition {
    fn ddl(&self) -> String {
        let null_statement = if self.nullable { "NULL" } else { "NOT NULL" };
        match self.length_check {
            Some(n) => format!(
                "    [{name}] {} {} CHECK(length([{name}]) <= {})",
                self.affinity,
                null_statement,
                n,
                name = self.name
            ),
            None => format!("    [{}] {} {}", self.name, self.affinity, null_statement),
        }
    }
}

/// DDL and command templates for one mapped record type.
///
/// Immutable once built. The `*_where` helpers append caller-supplied
/// predicate text verbatim after `WHERE`; that text is not escaped or
/// validated, so it must never be assembled from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub table_name: String,
    pub table_definition: String,
    pub select_template: String,
    pub insert_template: String,
    pub update_template: String,
    pub delete_template: String,
    pub delete_where_template: String,
    pub exists_template: String,
    pub count_template: String,
    /// Mapped columns in declaration order, excluding `RowId`.
    pub property_names: Vec<&'static str>,
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    /// Build a definition from a descriptor without consulting any cache.
    pub fn build(descriptor: &TypeDescriptor) -> Result<Self> {
        DefinitionBuilder::new(descriptor).build()
    }

    /// `SELECT ... WHERE <predicate>`
    pub fn select_where(&self, predicate: &str) -> String {
        format!("{} WHERE {}", self.select_template, predicate)
    }

    /// `DELETE FROM [table] WHERE <predicate>`
    pub fn delete_where(&self, predicate: &str) -> String {
        format!("{} WHERE {}", self.delete_where_template, predicate)
    }

    /// `SELECT COUNT(*) FROM [table] WHERE <predicate>`
    pub fn count_where(&self, predicate: &str) -> String {
        format!("{} WHERE {}", self.count_template, predicate)
    }

    /// `SELECT EXISTS(SELECT 1 FROM [table] WHERE <predicate>)`
    pub fn exists_where(&self, predicate: &str) -> String {
        let inner = self
            .exists_template
            .strip_suffix(')')
            .unwrap_or(&self.exists_template);
        format!("{} WHERE {})", inner, predicate)
    }

    /// The insert statement without the trailing identity query.
    ///
    /// SQLite prepares one statement at a time, so the insert template is run
    /// as the insert followed by [`IDENTITY_QUERY`] on the same connection.
    pub fn insert_statement(&self) -> &str {
        self.insert_template
            .strip_suffix(IDENTITY_QUERY)
            .map(|s| s.trim_end().trim_end_matches(';'))
            .unwrap_or(&self.insert_template)
    }
}

/// Accumulates columns and indexes while walking a descriptor's fields.
pub struct DefinitionBuilder<'a> {
    descriptor: &'a TypeDescriptor,
    columns: Vec<ColumnDefinition>,
    indexes: Vec<String>,
}

impl<'a> DefinitionBuilder<'a> {
    pub fn new(descriptor: &'a TypeDescriptor) -> Self {
        Self {
            descriptor,
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Produce the table definition.
    ///
    /// Fails with [`Error::Definition`] when no field yields a column.
    pub fn build(mut self) -> Result<TableDefinition> {
        let table = self.descriptor.table_name();

        for field in &self.descriptor.fields {
            if field.name == ROW_ID || field.read_only || field.not_mapped {
                continue;
            }

            // fields without a column get no index either
            let Some(column) = classify(field) else {
                continue;
            };

            if field.indexed {
                self.indexes.push(format!(
                    "CREATE INDEX IF NOT EXISTS [IX_{table}_{col}] ON [{table}] ([{col}]);",
                    table = table,
                    col = field.name
                ));
            }

            if field.unique {
                self.indexes.push(format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS [UX_{table}_{col}] ON [{table}] ([{col}]);",
                    table = table,
                    col = field.name
                ));
            }

            self.columns.push(column);
        }

        if self.columns.is_empty() {
            return Err(Error::Definition {
                type_name: self.descriptor.type_name.to_string(),
                reason: "at least one mappable property is required".to_string(),
            });
        }

        let mut ddl = format!(
            "CREATE TABLE IF NOT EXISTS [{}] (\n    [{}] INTEGER PRIMARY KEY AUTOINCREMENT,\n",
            table, ROW_ID
        );
        ddl.push_str(
            &self
                .columns
                .iter()
                .map(ColumnDefinition::ddl)
                .collect::<Vec<_>>()
                .join(",\n"),
        );
        ddl.push_str("\n);\n");
        for index in &self.indexes {
            ddl.push_str(index);
            ddl.push('\n');
        }

        let property_names: Vec<&'static str> = self.columns.iter().map(|c| c.name).collect();
        let escaped = property_names
            .iter()
            .map(|p| format!("[{}]", p))
            .collect::<Vec<_>>()
            .join(", ");
        let parameters = property_names
            .iter()
            .map(|p| format!("@{}", p))
            .collect::<Vec<_>>()
            .join(", ");
        let assignments = property_names
            .iter()
            .map(|p| format!("[{p}] = @{p}", p = p))
            .collect::<Vec<_>>()
            .join(", ");

        debug!(
            "Built definition for {} -> [{}] ({} columns, {} indexes)",
            self.descriptor.type_name,
            table,
            property_names.len(),
            self.indexes.len()
        );

        Ok(TableDefinition {
            table_name: table.to_string(),
            table_definition: ddl,
            select_template: format!("SELECT [{}], {} FROM [{}]", ROW_ID, escaped, table),
            insert_template: format!(
                "INSERT INTO [{}] ({}) VALUES ({}); {}",
                table, escaped, parameters, IDENTITY_QUERY
            ),
            update_template: format!(
                "UPDATE [{}] SET {} WHERE [{rid}] = @{rid}",
                table,
                assignments,
                rid = ROW_ID
            ),
            delete_template: format!(
                "DELETE FROM [{}] WHERE [{rid}] = @{rid}",
                table,
                rid = ROW_ID
            ),
            delete_where_template: format!("DELETE FROM [{}]", table),
            exists_template: format!("SELECT EXISTS(SELECT 1 FROM [{}])", table),
            count_template: format!("SELECT COUNT(*) FROM [{}]", table),
            property_names,
            columns: self.columns,
        })
    }
}

/// Assign an affinity to a field, or `None` when the field has no column.
fn classify(field: &Field) -> Option<ColumnDefinition> {
    let (semantic, wrapped) = match &field.semantic_type {
        SemanticType::Nullable(inner) => (inner.as_ref(), true),
        other => (other, false),
    };

    let column = |affinity, nullable| ColumnDefinition {
        name: field.name,
        affinity,
        nullable,
        length_check: None,
    };

    match semantic {
        SemanticType::Text => {
            let length = field.max_length.unwrap_or(DEFAULT_STRING_LENGTH);
            Some(ColumnDefinition {
                name: field.name,
                affinity: Affinity::NVarChar(length),
                nullable: !field.required,
                length_check: (length != DEFAULT_STRING_LENGTH).then_some(length),
            })
        }
        SemanticType::Integer => Some(column(Affinity::Integer, wrapped)),
        SemanticType::Decimal | SemanticType::Boolean => Some(column(Affinity::Numeric, wrapped)),
        SemanticType::DateTime => Some(column(Affinity::DateTime, wrapped)),
        SemanticType::OtherValue => Some(column(Affinity::Text, wrapped)),
        SemanticType::Bytes => Some(column(Affinity::Blob, wrapped)),
        SemanticType::Reference | SemanticType::Nullable(_) => None,
    }
}

/// Memoized table definitions keyed by record type.
///
/// Population is compute-if-absent under the write lock: concurrent callers
/// asking for the same type observe a single build and share one
/// `Arc<TableDefinition>`. Failed builds are not cached.
#[derive(Default)]
pub struct DefinitionCache {
    entries: RwLock<HashMap<TypeId, Arc<TableDefinition>>>,
}

static GLOBAL_CACHE: OnceLock<DefinitionCache> = OnceLock::new();

impl DefinitionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache used by entity sets.
    pub fn global() -> &'static DefinitionCache {
        GLOBAL_CACHE.get_or_init(DefinitionCache::new)
    }

    /// Look up a cached definition.
    pub fn get(&self, type_id: TypeId) -> Option<Arc<TableDefinition>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&type_id)
            .cloned()
    }

    /// Return the cached definition for `type_id`, building it from the
    /// descriptor on first use.
    pub fn get_or_build<F>(&self, type_id: TypeId, descriptor: F) -> Result<Arc<TableDefinition>>
    where
        F: FnOnce() -> TypeDescriptor,
    {
        if let Some(found) = self.get(type_id) {
            return Ok(found);
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(found) = entries.get(&type_id) {
            return Ok(found.clone());
        }

        let definition = Arc::new(TableDefinition::build(&descriptor())?);
        entries.insert(type_id, definition.clone());
        Ok(definition)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
